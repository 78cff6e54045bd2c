//! Field tags and the per-file tables that map card record tags onto them

use std::fmt;

use crate::commands::ElementaryFile;
use Mapping::{Field, Ignored};

/// A named field of the identity record
///
/// Fields are ordered by their code, which groups them as document, personal,
/// birth and residence data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldTag {
    /// Registered document number
    DocRegNo,
    /// Date the document was issued
    IssuingDate,
    /// Date the document expires
    ExpiryDate,
    /// Authority that issued the document
    IssuingAuthority,
    /// Personal identification number
    ///
    /// Mostly unique, though a few numbers were allocated twice and some carry
    /// a wrong check digit.
    PersonalNumber,
    /// Family name
    Surname,
    /// Given name
    GivenName,
    /// Parent's given name
    ParentGivenName,
    /// Sex
    Sex,
    /// Place of birth
    PlaceOfBirth,
    /// Municipality of birth
    CommunityOfBirth,
    /// State of birth
    StateOfBirth,
    /// Date of birth
    DateOfBirth,
    /// State of residence
    State,
    /// Municipality of residence
    Community,
    /// Place of residence
    Place,
    /// Street name
    Street,
    /// House number
    HouseNumber,
    /// House letter
    HouseLetter,
    /// Entrance label
    Entrance,
    /// Floor number
    Floor,
    /// Apartment number
    ApartmentNumber,
    /// Date the address was last changed
    AddressDate,
}

impl FieldTag {
    /// All fields in code order
    pub const ALL: [Self; 23] = [
        Self::DocRegNo,
        Self::IssuingDate,
        Self::ExpiryDate,
        Self::IssuingAuthority,
        Self::PersonalNumber,
        Self::Surname,
        Self::GivenName,
        Self::ParentGivenName,
        Self::Sex,
        Self::PlaceOfBirth,
        Self::CommunityOfBirth,
        Self::StateOfBirth,
        Self::DateOfBirth,
        Self::State,
        Self::Community,
        Self::Place,
        Self::Street,
        Self::HouseNumber,
        Self::HouseLetter,
        Self::Entrance,
        Self::Floor,
        Self::ApartmentNumber,
        Self::AddressDate,
    ];

    /// Stable numeric code
    pub const fn code(self) -> u16 {
        match self {
            Self::DocRegNo => 101,
            Self::IssuingDate => 102,
            Self::ExpiryDate => 103,
            Self::IssuingAuthority => 104,
            Self::PersonalNumber => 201,
            Self::Surname => 202,
            Self::GivenName => 203,
            Self::ParentGivenName => 204,
            Self::Sex => 205,
            Self::PlaceOfBirth => 301,
            Self::CommunityOfBirth => 302,
            Self::StateOfBirth => 303,
            Self::DateOfBirth => 305,
            Self::State => 401,
            Self::Community => 402,
            Self::Place => 403,
            Self::Street => 404,
            Self::HouseNumber => 405,
            Self::HouseLetter => 406,
            Self::Entrance => 407,
            Self::Floor => 408,
            Self::ApartmentNumber => 409,
            Self::AddressDate => 410,
        }
    }

    /// Stable key used in exported data
    pub const fn key(self) -> &'static str {
        match self {
            Self::DocRegNo => "doc_reg_no",
            Self::IssuingDate => "issuing_date",
            Self::ExpiryDate => "expiry_date",
            Self::IssuingAuthority => "issuing_authority",
            Self::PersonalNumber => "personal_number",
            Self::Surname => "surname",
            Self::GivenName => "given_name",
            Self::ParentGivenName => "parent_given_name",
            Self::Sex => "sex",
            Self::PlaceOfBirth => "place_of_birth",
            Self::CommunityOfBirth => "community_of_birth",
            Self::StateOfBirth => "state_of_birth",
            Self::DateOfBirth => "date_of_birth",
            Self::State => "state",
            Self::Community => "community",
            Self::Place => "place",
            Self::Street => "street",
            Self::HouseNumber => "house_number",
            Self::HouseLetter => "house_letter",
            Self::Entrance => "entrance_label",
            Self::Floor => "floor_number",
            Self::ApartmentNumber => "appartment_number",
            Self::AddressDate => "address_date",
        }
    }

    /// Human readable label
    pub const fn label(self) -> &'static str {
        match self {
            Self::DocRegNo => "Document reg. number",
            Self::IssuingDate => "Issuing date",
            Self::ExpiryDate => "Expiry date",
            Self::IssuingAuthority => "Issuing authority",
            Self::PersonalNumber => "Personal number",
            Self::Surname => "Surname",
            Self::GivenName => "Given name",
            Self::ParentGivenName => "Parent given name",
            Self::Sex => "Gender",
            Self::PlaceOfBirth => "Place of birth",
            Self::CommunityOfBirth => "Community of birth",
            Self::StateOfBirth => "State of birth",
            Self::DateOfBirth => "Date of birth",
            Self::State => "State",
            Self::Community => "Community",
            Self::Place => "Place",
            Self::Street => "Street name",
            Self::HouseNumber => "House number",
            Self::HouseLetter => "House letter",
            Self::Entrance => "Entrance label",
            Self::Floor => "Floor number",
            Self::ApartmentNumber => "Apartment number",
            Self::AddressDate => "Address date",
        }
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a known record tag goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// Store the value under this field
    Field(FieldTag),
    /// Known tag whose value is dropped
    Ignored,
}

/// Fixed mapping from record tags to fields for one elementary file
#[derive(Debug, Clone, Copy)]
pub struct TagTable {
    file: ElementaryFile,
    entries: &'static [(u16, Mapping)],
}

impl TagTable {
    /// File whose records this table maps
    pub const fn file(&self) -> ElementaryFile {
        self.file
    }

    /// Look up a record tag
    pub fn get(&self, tag: u16) -> Option<Mapping> {
        self.entries
            .iter()
            .find(|(known, _)| *known == tag)
            .map(|(_, mapping)| *mapping)
    }
}

/// Document file, tags 1545 to 1553
pub const DOCUMENT_TAGS: TagTable = TagTable {
    file: ElementaryFile::Document,
    entries: &[
        // issuing country code
        (1545, Ignored),
        (1546, Field(FieldTag::DocRegNo)),
        // document type
        (1547, Ignored),
        // document type followed by the registration number
        (1548, Ignored),
        (1549, Field(FieldTag::IssuingDate)),
        (1550, Field(FieldTag::ExpiryDate)),
        (1551, Field(FieldTag::IssuingAuthority)),
        (1552, Ignored),
        (1553, Ignored),
    ],
};

/// Personal file, tags 1558 to 1567
pub const PERSONAL_TAGS: TagTable = TagTable {
    file: ElementaryFile::Personal,
    entries: &[
        (1558, Field(FieldTag::PersonalNumber)),
        (1559, Field(FieldTag::Surname)),
        (1560, Field(FieldTag::GivenName)),
        (1561, Field(FieldTag::ParentGivenName)),
        (1562, Field(FieldTag::Sex)),
        (1563, Field(FieldTag::PlaceOfBirth)),
        (1564, Field(FieldTag::CommunityOfBirth)),
        (1565, Field(FieldTag::StateOfBirth)),
        (1566, Field(FieldTag::DateOfBirth)),
        // state of birth country code
        (1567, Ignored),
    ],
};

/// Residence file, tags 1568 to 1580
pub const RESIDENCE_TAGS: TagTable = TagTable {
    file: ElementaryFile::Residence,
    entries: &[
        (1568, Field(FieldTag::State)),
        (1569, Field(FieldTag::Community)),
        (1570, Field(FieldTag::Place)),
        (1571, Field(FieldTag::Street)),
        (1572, Field(FieldTag::HouseNumber)),
        (1573, Field(FieldTag::HouseLetter)),
        (1574, Field(FieldTag::Entrance)),
        (1575, Field(FieldTag::Floor)),
        (1578, Field(FieldTag::ApartmentNumber)),
        (1580, Field(FieldTag::AddressDate)),
    ],
};
