//! Record decoding for the identity files
//!
//! Document, personal and residence files are a flat run of records, each a
//! little-endian `u16` tag, a little-endian `u16` length and that many value bytes.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::commands::ElementaryFile;
use crate::error::{Error, Result};
use crate::info::IdentityRecordBuilder;
use crate::tags::{Mapping, TagTable};

/// Values of one file keyed by record tag
pub type RawRecord = BTreeMap<u16, Bytes>;

/// A record whose tag is not in the file's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag {
    /// File the record was found in
    pub file: ElementaryFile,
    /// Record tag
    pub tag: u16,
    /// Raw value
    pub value: Bytes,
}

impl UnknownTag {
    /// Value decoded the same way mapped fields are
    pub fn text(&self) -> String {
        decode_value(&self.value)
    }
}

/// Records skipped during a read because their tags are not mapped
pub type UnknownTags = Vec<UnknownTag>;

/// Split a file's content into its records
///
/// Fewer than four trailing bytes cannot hold a record header and are dropped. A
/// record that declares more bytes than remain fails the whole file with
/// [`Error::MalformedRecord`]. A repeated tag keeps the last value.
pub fn parse_tlv(data: &[u8]) -> Result<RawRecord> {
    let mut record = RawRecord::new();
    let mut rest = data;

    while let Some((header, tail)) = rest.split_first_chunk::<4>() {
        let tag = u16::from_le_bytes([header[0], header[1]]);
        let declared = usize::from(u16::from_le_bytes([header[2], header[3]]));
        if declared > tail.len() {
            return Err(Error::MalformedRecord {
                tag,
                declared,
                remaining: tail.len(),
            });
        }

        let (value, tail) = tail.split_at(declared);
        record.insert(tag, Bytes::copy_from_slice(value));
        rest = tail;
    }

    if !rest.is_empty() {
        trace!(trailing = rest.len(), "Ignoring bytes after last record");
    }
    Ok(record)
}

/// Decode a record value as text
///
/// UTF-8 first, then Latin-1 when every byte is printable in it, then a hex dump.
pub fn decode_value(value: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(value) {
        return text.to_owned();
    }

    warn!(value = %hex::encode_upper(value), "Value is not valid UTF-8");
    let printable_latin1 = value
        .iter()
        .all(|&b| matches!(b, b'\t' | b'\n' | b'\r' | 0x20..=0x7E | 0xA0..=0xFF));
    if printable_latin1 {
        value.iter().copied().map(char::from).collect()
    } else {
        hex::encode_upper(value)
    }
}

/// Feed a file's records into `builder` through the file's tag table
///
/// Ignored tags are dropped. Tags missing from the table are returned, unless
/// their value is empty.
pub fn map_tags(
    record: &RawRecord,
    table: &TagTable,
    builder: &mut IdentityRecordBuilder,
) -> UnknownTags {
    let mut unknown = UnknownTags::new();
    for (&tag, value) in record {
        match table.get(tag) {
            Some(Mapping::Field(field)) => {
                builder.add_value(field, decode_value(value));
            }
            Some(Mapping::Ignored) => {}
            None if value.is_empty() => {}
            None => unknown.push(UnknownTag {
                file: table.file(),
                tag,
                value: value.clone(),
            }),
        }
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{DOCUMENT_TAGS, FieldTag, PERSONAL_TAGS};
    use crate::testing::tlv;
    use hex_literal::hex;
    use proptest::prelude::*;

    #[test]
    fn test_parse_single_record() {
        let record = parse_tlv(&hex!("FECA0100FE")).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record[&0xCAFE].as_ref(), &[0xFE]);
    }

    #[test]
    fn test_parse_ignores_trailing_bytes() {
        let record = parse_tlv(&hex!("FECA0100FEBEBA05000102030405FFFF")).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record[&0xCAFE].as_ref(), &[0xFE]);
        assert_eq!(record[&0xBABE].as_ref(), &hex!("0102030405"));
    }

    #[test]
    fn test_parse_empty_and_zero_length() {
        assert!(parse_tlv(&[]).unwrap().is_empty());
        assert!(parse_tlv(&hex!("010203")).unwrap().is_empty());

        let record = parse_tlv(&hex!("0A060000")).unwrap();
        assert!(record[&1546].is_empty());
    }

    #[test]
    fn test_parse_overrun_is_malformed() {
        let err = parse_tlv(&hex!("FECA0100FEBEBA0500010203")).unwrap_err();
        match err {
            Error::MalformedRecord {
                tag,
                declared,
                remaining,
            } => {
                assert_eq!(tag, 0xBABE);
                assert_eq!(declared, 5);
                assert_eq!(remaining, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_duplicate_tag_keeps_last() {
        let record = parse_tlv(&hex!("01000100410100010042")).unwrap();
        assert_eq!(record[&1].as_ref(), b"B");
    }

    #[test]
    fn test_decode_value() {
        assert_eq!(decode_value("ČAČAK".as_bytes()), "ČAČAK");
        // Latin-1 "Müller"
        assert_eq!(decode_value(&hex!("4DFC6C6C6572")), "Müller");
        assert_eq!(decode_value(&hex!("00FF01")), "00FF01");
    }

    #[test]
    fn test_map_tags() {
        let mut data = Vec::new();
        data.extend(tlv(1545, b"SRB"));
        data.extend(tlv(1546, b"009876543"));
        data.extend(tlv(1549, b"01012020"));
        data.extend(tlv(1599, b"mystery"));
        data.extend(tlv(1600, b""));

        let mut builder = IdentityRecordBuilder::default();
        let unknown = map_tags(&parse_tlv(&data).unwrap(), &DOCUMENT_TAGS, &mut builder);
        let record = builder.build();

        assert_eq!(record.get(FieldTag::DocRegNo), Some("009876543"));
        assert_eq!(record.get(FieldTag::IssuingDate), Some("01012020"));
        assert_eq!(record.fields().count(), 2);

        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].file, ElementaryFile::Document);
        assert_eq!(unknown[0].tag, 1599);
        assert_eq!(unknown[0].text(), "mystery");
    }

    #[test]
    fn test_map_tags_uses_file_table() {
        // A document tag means nothing in the personal file
        let record = parse_tlv(&tlv(1546, b"009876543")).unwrap();
        let mut builder = IdentityRecordBuilder::default();
        let unknown = map_tags(&record, &PERSONAL_TAGS, &mut builder);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].file, ElementaryFile::Personal);
        assert!(builder.build().is_empty());
    }

    fn records() -> impl Strategy<Value = BTreeMap<u16, Vec<u8>>> {
        prop::collection::btree_map(any::<u16>(), prop::collection::vec(any::<u8>(), 0..64), 0..12)
    }

    proptest! {
        #[test]
        fn prop_parse_recovers_records(
            records in records(),
            trailing in prop::collection::vec(any::<u8>(), 0..4),
        ) {
            let mut data = Vec::new();
            for (tag, value) in &records {
                data.extend(tlv(*tag, value));
            }
            data.extend(&trailing);

            let parsed = parse_tlv(&data).unwrap();
            let parsed: BTreeMap<u16, Vec<u8>> =
                parsed.into_iter().map(|(tag, value)| (tag, value.to_vec())).collect();
            prop_assert_eq!(parsed, records);
        }

        #[test]
        fn prop_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = parse_tlv(&data);
        }
    }
}
