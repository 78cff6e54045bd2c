//! The decoded identity record and its derived, display-ready strings

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::tags::FieldTag;

/// Residence date the card stores when the address was never updated
const NO_ADDRESS_DATE: &str = "01010001";

/// Label formats used for exported addresses
const EXPORT_FORMATS: (&str, &str, &str) = ("ulaz %s", "%s. sprat", "br. %s");

/// Identity data read from one card
///
/// Values are kept exactly as the card stores them. Accessors for dates and the
/// composed name and address strings format on the fly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRecord {
    fields: BTreeMap<FieldTag, String>,
}

/// Accumulates field values for an [`IdentityRecord`]
#[derive(Debug, Clone, Default)]
pub struct IdentityRecordBuilder {
    fields: BTreeMap<FieldTag, String>,
}

impl IdentityRecordBuilder {
    /// Set a field, replacing any earlier value
    pub fn add_value(&mut self, tag: FieldTag, value: impl Into<String>) -> &mut Self {
        self.fields.insert(tag, value.into());
        self
    }

    /// Finish the record
    pub fn build(self) -> IdentityRecord {
        IdentityRecord {
            fields: self.fields,
        }
    }
}

impl FromIterator<(FieldTag, String)> for IdentityRecord {
    fn from_iter<I: IntoIterator<Item = (FieldTag, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IdentityRecord {
    /// Start an empty builder
    pub fn builder() -> IdentityRecordBuilder {
        IdentityRecordBuilder::default()
    }

    /// Raw value of a field
    pub fn get(&self, tag: FieldTag) -> Option<&str> {
        self.fields.get(&tag).map(String::as_str)
    }

    /// Whether a field is present with a non-empty value
    pub fn has(&self, tag: FieldTag) -> bool {
        self.get(tag).is_some_and(|value| !value.is_empty())
    }

    /// Present fields in tag order
    pub fn fields(&self) -> impl Iterator<Item = (FieldTag, &str)> {
        self.fields.iter().map(|(tag, value)| (*tag, value.as_str()))
    }

    /// Whether no field was read
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn raw(&self, tag: FieldTag) -> &str {
        self.get(tag).unwrap_or_default()
    }

    /// Registered document number
    pub fn doc_reg_no(&self) -> Option<&str> {
        self.get(FieldTag::DocRegNo)
    }

    /// Issuing date as `DD.MM.YYYY`
    pub fn issuing_date(&self) -> Option<String> {
        self.get(FieldTag::IssuingDate).map(format_date)
    }

    /// Expiry date as `DD.MM.YYYY`
    pub fn expiry_date(&self) -> Option<String> {
        self.get(FieldTag::ExpiryDate).map(format_date)
    }

    /// Issuing authority
    pub fn issuing_authority(&self) -> Option<&str> {
        self.get(FieldTag::IssuingAuthority)
    }

    /// Personal identification number, unvalidated
    pub fn personal_number(&self) -> Option<&str> {
        self.get(FieldTag::PersonalNumber)
    }

    /// Surname
    pub fn surname(&self) -> Option<&str> {
        self.get(FieldTag::Surname)
    }

    /// Given name
    pub fn given_name(&self) -> Option<&str> {
        self.get(FieldTag::GivenName)
    }

    /// Parent's given name
    pub fn parent_given_name(&self) -> Option<&str> {
        self.get(FieldTag::ParentGivenName)
    }

    /// Sex
    pub fn sex(&self) -> Option<&str> {
        self.get(FieldTag::Sex)
    }

    /// Place of birth
    pub fn place_of_birth(&self) -> Option<&str> {
        self.get(FieldTag::PlaceOfBirth)
    }

    /// Municipality of birth
    pub fn community_of_birth(&self) -> Option<&str> {
        self.get(FieldTag::CommunityOfBirth)
    }

    /// State of birth
    pub fn state_of_birth(&self) -> Option<&str> {
        self.get(FieldTag::StateOfBirth)
    }

    /// Date of birth as `DD.MM.YYYY`
    pub fn date_of_birth(&self) -> Option<String> {
        self.get(FieldTag::DateOfBirth).map(format_date)
    }

    /// State of residence
    pub fn state(&self) -> Option<&str> {
        self.get(FieldTag::State)
    }

    /// Municipality of residence
    pub fn community(&self) -> Option<&str> {
        self.get(FieldTag::Community)
    }

    /// Place of residence
    pub fn place(&self) -> Option<&str> {
        self.get(FieldTag::Place)
    }

    /// Street name
    pub fn street(&self) -> Option<&str> {
        self.get(FieldTag::Street)
    }

    /// House number
    pub fn house_number(&self) -> Option<&str> {
        self.get(FieldTag::HouseNumber)
    }

    /// House letter
    pub fn house_letter(&self) -> Option<&str> {
        self.get(FieldTag::HouseLetter)
    }

    /// Entrance label
    pub fn entrance(&self) -> Option<&str> {
        self.get(FieldTag::Entrance)
    }

    /// Floor number
    pub fn floor(&self) -> Option<&str> {
        self.get(FieldTag::Floor)
    }

    /// Apartment number
    pub fn apartment_number(&self) -> Option<&str> {
        self.get(FieldTag::ApartmentNumber)
    }

    /// Date of the last address change as `DD.MM.YYYY`
    ///
    /// `None` when the card has no date or carries the never-updated sentinel.
    pub fn address_date(&self) -> Option<String> {
        self.get(FieldTag::AddressDate)
            .filter(|date| *date != NO_ADDRESS_DATE)
            .map(format_date)
    }

    /// Given name, parent's given name and surname separated by spaces
    pub fn full_name(&self) -> String {
        format!(
            "{} {} {}",
            self.raw(FieldTag::GivenName),
            self.raw(FieldTag::ParentGivenName),
            self.raw(FieldTag::Surname)
        )
    }

    /// Multi-line residence address
    ///
    /// The formats wrap the entrance, floor and apartment values; `%s` stands for
    /// the value. A format without `%s` falls back to the bare value. Without an
    /// entrance or floor the apartment is written in the short `55A/12` form.
    pub fn place_full(
        &self,
        entrance_format: &str,
        floor_format: &str,
        apartment_format: &str,
    ) -> String {
        let entrance_format = sanitize_format(entrance_format);
        let floor_format = sanitize_format(floor_format);
        let apartment_format = sanitize_format(apartment_format);

        let mut out = String::new();
        self.append(&mut out, "", None, FieldTag::Street);
        self.append(&mut out, " ", None, FieldTag::HouseNumber);
        self.append(&mut out, "", None, FieldTag::HouseLetter);
        self.append(&mut out, " ", Some(entrance_format), FieldTag::Entrance);
        self.append(&mut out, ", ", Some(floor_format), FieldTag::Floor);

        if self.has(FieldTag::Entrance) || self.has(FieldTag::Floor) {
            self.append(&mut out, ", ", Some(apartment_format), FieldTag::ApartmentNumber);
        } else {
            self.append(&mut out, "/", None, FieldTag::ApartmentNumber);
        }

        self.append(&mut out, "\n", None, FieldTag::Place);
        self.append(&mut out, ", ", None, FieldTag::Community);

        out.push('\n');
        match self.raw(FieldTag::State) {
            "SRB" => out.push_str("REPUBLIKA SRBIJA"),
            state => out.push_str(state),
        }
        out
    }

    /// Place of birth, municipality and state, skipping absent parts
    pub fn place_of_birth_full(&self) -> String {
        let mut out = String::new();
        self.append(&mut out, "", None, FieldTag::PlaceOfBirth);
        self.append(&mut out, ", ", None, FieldTag::CommunityOfBirth);
        self.append(&mut out, "\n", None, FieldTag::StateOfBirth);
        out
    }

    fn append(&self, out: &mut String, prefix: &str, format: Option<&str>, tag: FieldTag) {
        if !self.has(tag) {
            return;
        }
        let value = self.raw(tag);
        out.push_str(prefix);
        match format {
            Some(format) => out.push_str(&format.replacen("%s", value, 1)),
            None => out.push_str(value),
        }
    }

    /// Whether the personal number has 13 digits and a matching check digit
    ///
    /// Some genuine cards fail this, so it is only ever used as a diagnostic.
    pub fn personal_number_is_well_formed(&self) -> bool {
        self.personal_number().is_some_and(personal_number_checksum_ok)
    }
}

/// Reformat an eight character `DDMMYYYY` date as `DD.MM.YYYY`
///
/// Anything that is not eight characters long is returned unchanged.
pub fn format_date(date: &str) -> String {
    let chars: Vec<char> = date.chars().collect();
    if chars.len() != 8 {
        return date.to_owned();
    }
    let day: String = chars[..2].iter().collect();
    let month: String = chars[2..4].iter().collect();
    let year: String = chars[4..].iter().collect();
    format!("{day}.{month}.{year}")
}

fn sanitize_format(format: &str) -> &str {
    if format.contains("%s") { format } else { "%s" }
}

fn personal_number_checksum_ok(number: &str) -> bool {
    const WEIGHTS: [u32; 12] = [7, 6, 5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

    let digits: Option<Vec<u32>> = number.chars().map(|c| c.to_digit(10)).collect();
    let Some(digits) = digits.filter(|d| d.len() == 13) else {
        return false;
    };

    let sum: u32 = digits.iter().zip(WEIGHTS).map(|(d, w)| d * w).sum();
    let check = match 11 - sum % 11 {
        check @ 0..=9 => check,
        _ => 0,
    };
    digits[12] == check
}

impl fmt::Display for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tag, value) in self.fields() {
            writeln!(f, "{tag}: {value}")?;
        }
        Ok(())
    }
}

impl Serialize for IdentityRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (entrance, floor, apartment) = EXPORT_FORMATS;
        let mut map = serializer.serialize_map(Some(self.fields.len() + 3))?;
        map.serialize_entry("name_full", &self.full_name())?;
        map.serialize_entry("place_full", &self.place_full(entrance, floor, apartment))?;
        map.serialize_entry("place_of_birth_full", &self.place_of_birth_full())?;
        for (tag, value) in self.fields() {
            map.serialize_entry(tag.key(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(FieldTag, &str)]) -> IdentityRecord {
        fields
            .iter()
            .map(|(tag, value)| (*tag, (*value).to_string()))
            .collect()
    }

    fn address() -> Vec<(FieldTag, &'static str)> {
        vec![
            (FieldTag::Street, "Street"),
            (FieldTag::HouseNumber, "55"),
            (FieldTag::Place, "Place"),
            (FieldTag::Community, "Community"),
            (FieldTag::State, "State"),
        ]
    }

    #[test]
    fn test_builder_last_write_wins() {
        let mut builder = IdentityRecord::builder();
        builder
            .add_value(FieldTag::Surname, "First")
            .add_value(FieldTag::Surname, "Second");
        let record = builder.build();
        assert_eq!(record.surname(), Some("Second"));
    }

    #[test]
    fn test_has_requires_non_empty() {
        let record = record(&[(FieldTag::Entrance, ""), (FieldTag::Floor, "2")]);
        assert!(!record.has(FieldTag::Entrance));
        assert!(record.has(FieldTag::Floor));
        assert!(!record.has(FieldTag::Street));
        assert_eq!(record.entrance(), Some(""));
    }

    #[test]
    fn test_full_name() {
        let record = record(&[
            (FieldTag::GivenName, "Name"),
            (FieldTag::ParentGivenName, "Parent"),
            (FieldTag::Surname, "Surname"),
        ]);
        assert_eq!(record.full_name(), "Name Parent Surname");
    }

    #[test]
    fn test_dates() {
        assert_eq!(format_date("01011950"), "01.01.1950");
        assert_eq!(format_date("N/A"), "N/A");
        assert_eq!(format_date(""), "");

        let record = record(&[
            (FieldTag::DateOfBirth, "01011950"),
            (FieldTag::ExpiryDate, "N/A"),
            (FieldTag::AddressDate, "01010001"),
        ]);
        assert_eq!(record.date_of_birth().as_deref(), Some("01.01.1950"));
        assert_eq!(record.expiry_date().as_deref(), Some("N/A"));
        assert_eq!(record.issuing_date(), None);
        assert_eq!(record.address_date(), None);

        let record = record_with(FieldTag::AddressDate, "15032019");
        assert_eq!(record.address_date().as_deref(), Some("15.03.2019"));
    }

    fn record_with(tag: FieldTag, value: &str) -> IdentityRecord {
        record(&[(tag, value)])
    }

    #[test]
    fn test_place_full_long_form() {
        let mut fields = address();
        fields.extend([
            (FieldTag::HouseLetter, "letter"),
            (FieldTag::Entrance, "entrance"),
            (FieldTag::Floor, "floor"),
        ]);
        let without_apartment = record(&fields);
        assert_eq!(
            without_apartment.place_full("", "", ""),
            "Street 55letter entrance, floor\nPlace, Community\nState"
        );

        fields.push((FieldTag::ApartmentNumber, "1212"));
        let with_apartment = record(&fields);
        assert_eq!(
            with_apartment.place_full("", "", ""),
            "Street 55letter entrance, floor, 1212\nPlace, Community\nState"
        );
    }

    #[test]
    fn test_place_full_short_form() {
        let mut fields = address();
        fields.extend([
            (FieldTag::HouseLetter, "L"),
            (FieldTag::ApartmentNumber, "1212"),
        ]);
        assert_eq!(
            record(&fields).place_full("", "", ""),
            "Street 55L/1212\nPlace, Community\nState"
        );
    }

    #[test]
    fn test_place_full_formats() {
        let mut fields = address();
        fields.extend([
            (FieldTag::HouseLetter, "L"),
            (FieldTag::Entrance, "E"),
            (FieldTag::ApartmentNumber, "666"),
        ]);
        let record = record(&fields);
        assert_eq!(
            record.place_full("AA %s", "BB %s", "CC %s"),
            "Street 55L AA E, CC 666\nPlace, Community\nState"
        );
        // No placeholder means the bare value
        assert_eq!(
            record.place_full("ulaz", "%s. sprat", "br."),
            "Street 55L E, 666\nPlace, Community\nState"
        );
    }

    #[test]
    fn test_place_full_state_code() {
        let mut fields = address();
        fields.push((FieldTag::State, "SRB"));
        let record = record(&fields);
        assert!(record.place_full("", "", "").ends_with("\nREPUBLIKA SRBIJA"));
    }

    #[test]
    fn test_place_of_birth_full() {
        let full = record(&[
            (FieldTag::PlaceOfBirth, "City"),
            (FieldTag::CommunityOfBirth, "Community"),
            (FieldTag::StateOfBirth, "State"),
        ]);
        assert_eq!(full.place_of_birth_full(), "City, Community\nState");

        let partial = record(&[
            (FieldTag::PlaceOfBirth, "City"),
            (FieldTag::StateOfBirth, "State"),
        ]);
        assert_eq!(partial.place_of_birth_full(), "City\nState");
    }

    #[test]
    fn test_personal_number_check() {
        let well_formed =
            |number| record_with(FieldTag::PersonalNumber, number).personal_number_is_well_formed();
        assert!(well_formed("0101990710008"));
        assert!(well_formed("1505965710122"));
        assert!(!well_formed("0101990710009"));
        assert!(!well_formed("010199071000"));
        assert!(!well_formed("01019907100A8"));
        assert!(!IdentityRecord::default().personal_number_is_well_formed());
    }

    #[test]
    fn test_display_lists_fields_in_tag_order() {
        let record = record(&[
            (FieldTag::Surname, "Surname"),
            (FieldTag::DocRegNo, "123"),
        ]);
        assert_eq!(record.to_string(), "Document reg. number: 123\nSurname: Surname\n");
    }

    #[test]
    fn test_json_export() {
        let mut fields = address();
        fields.extend([
            (FieldTag::State, "SRB"),
            (FieldTag::Entrance, "2"),
            (FieldTag::Floor, "5"),
            (FieldTag::ApartmentNumber, "4"),
            (FieldTag::GivenName, "Name"),
            (FieldTag::ParentGivenName, "Parent"),
            (FieldTag::Surname, "Surname"),
            (FieldTag::DateOfBirth, "01011950"),
        ]);
        let json = serde_json::to_value(record(&fields)).unwrap();
        assert_eq!(json["name_full"], "Name Parent Surname");
        assert_eq!(
            json["place_full"],
            "Street 55 ulaz 2, 5. sprat, br. 4\nPlace, Community\nREPUBLIKA SRBIJA"
        );
        assert_eq!(json["place_of_birth_full"], "");
        assert_eq!(json["date_of_birth"], "01011950");
        assert_eq!(json["entrance_label"], "2");
        assert_eq!(json["appartment_number"], "4");
        assert!(json.get("doc_reg_no").is_none());
    }
}
