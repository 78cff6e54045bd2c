use eid_card::{CardGeneration, FieldTag, IdentityRecord, Photo, UnknownTags};

/// Print a record in the layout of the printed card
pub(crate) fn print_record(generation: CardGeneration, record: &IdentityRecord) {
    println!("Card: {generation}");
    println!();
    println!("Name:              {}", record.full_name());
    print_field("Personal number:", record.personal_number());
    print_field("Sex:", record.sex());
    print_field("Date of birth:", record.date_of_birth().as_deref());
    println!("Place of birth:    {}", indent(&record.place_of_birth_full()));
    println!();
    println!("Address:           {}", indent(&record.place_full("", "", "")));
    print_field("Address changed:", record.address_date().as_deref());
    println!();
    print_field("Document number:", record.doc_reg_no());
    print_field("Issued:", record.issuing_date().as_deref());
    print_field("Expires:", record.expiry_date().as_deref());
    print_field("Issued by:", record.issuing_authority());
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("{label:<18} {value}");
    }
}

fn indent(text: &str) -> String {
    text.replace('\n', "\n                   ")
}

/// Print tags the decoder did not know
pub(crate) fn print_unknown_tags(unknown: &UnknownTags) {
    if unknown.is_empty() {
        return;
    }
    println!();
    println!("Unknown tags (please report):");
    for tag in unknown {
        println!("  {} {}: {} [{}]", tag.file, tag.tag, tag.text(), hex::encode_upper(&tag.value));
    }
}

/// Print where the photo went
pub(crate) fn print_photo_saved(photo: &Photo, path: &std::path::Path) {
    println!(
        "Photo: {}x{} JPEG, {} bytes, saved to {}",
        photo.width(),
        photo.height(),
        photo.as_bytes().len(),
        path.display()
    );
}

/// Print every field the decoder knows with its JSON key
pub(crate) fn print_fields() {
    println!("{:<5} {:<20} Label", "Code", "Key");
    for row in field_rows() {
        println!("{row}");
    }
}

fn field_rows() -> impl Iterator<Item = String> {
    FieldTag::ALL
        .into_iter()
        .map(|field| format!("{:<5} {:<20} {}", field.code(), field.key(), field.label()))
}
