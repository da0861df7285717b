//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! Read attribute records from a dBASE (`.dbf`) table paired with a Shapefile.

use crate::error::{Error, Result};
use crate::types::{AttributeRecord, AttributeValue};
use byteorder::{ByteOrder, LittleEndian};

pub const HEADER_LEN: usize = 32;
pub const DESCRIPTOR_LEN: usize = 32;
/// Ends the field descriptor array.
pub const TERMINATOR: u8 = 0x0D;
/// Deletion flag value of a record's leading byte.
pub const DELETED: u8 = 0x2A;

/// Table header.
///
/// ```text
/// offset  field          type  order
/// 4       record count   u32   little
/// 8       header length  u16   little
/// 10      record length  u16   little
/// 32      descriptors    32 bytes each, until 0x0D
/// ```
#[derive(PartialEq, Clone, Debug)]
pub struct DbfHeader {
    pub record_count: u32,
    pub header_length: u16,
    pub record_length: u16,
    pub fields: Vec<FieldDescriptor>,
}

/// Field descriptor.
///
/// ```text
/// offset  field   size
/// 0       name    11 (null padded)
/// 11      type    1  (ASCII)
/// 16      length  1
/// ```
#[derive(PartialEq, Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: char,
    pub length: u8,
}

impl FieldDescriptor {
    pub fn is_numeric(&self) -> bool {
        matches!(self.field_type, 'N' | 'F')
    }
}

impl DbfHeader {
    pub fn read(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(Error::MalformedDbf(format!(
                "buffer of {} bytes is shorter than the {} byte header",
                raw.len(),
                HEADER_LEN
            )));
        }
        let record_count = LittleEndian::read_u32(&raw[4..8]);
        let header_length = LittleEndian::read_u16(&raw[8..10]);
        let record_length = LittleEndian::read_u16(&raw[10..12]);

        let mut fields = Vec::new();
        let mut pos = HEADER_LEN;
        loop {
            match raw.get(pos) {
                Some(&TERMINATOR) => break,
                Some(_) if pos + DESCRIPTOR_LEN <= raw.len() => {}
                _ => {
                    return Err(Error::MalformedDbf(format!(
                        "field descriptor at offset {} is truncated or unterminated",
                        pos
                    )))
                }
            }
            let desc = &raw[pos..pos + DESCRIPTOR_LEN];
            let name: Vec<u8> = desc[..11].iter().copied().filter(|&b| b != 0).collect();
            fields.push(FieldDescriptor {
                name: decode_text(&name).trim().to_string(),
                field_type: desc[11] as char,
                length: desc[16],
            });
            pos += DESCRIPTOR_LEN;
        }

        Ok(DbfHeader { record_count, header_length, record_length, fields })
    }
}

/// What to emit for a record flagged as deleted.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum DeletedRecord {
    /// Emit nothing. Later records shift one position towards the front.
    #[default]
    Skip,
    /// Emit an empty record so positions keep matching the geometry sequence.
    Placeholder,
}

#[derive(Clone, Debug, Default)]
pub struct DbfDecoder {
    pub on_deleted: DeletedRecord,
}

impl DbfDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_deleted_placeholders(mut self) -> Self {
        self.on_deleted = DeletedRecord::Placeholder;
        self
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Vec<AttributeRecord>> {
        let header = DbfHeader::read(raw)?;
        let mut records = Vec::with_capacity((header.record_count as usize).min(raw.len()));
        let mut deleted = 0usize;
        if header.record_length == 0 && header.record_count > 1 {
            tracing::warn!(
                record_count = header.record_count,
                "zero record length, every record repeats the first"
            );
        }

        for i in 0..header.record_count as usize {
            let offset = i
                .checked_mul(header.record_length as usize)
                .and_then(|n| n.checked_add(header.header_length as usize))
                .filter(|&offset| offset < raw.len())
                .ok_or_else(|| {
                    Error::MalformedDbf(format!(
                        "record {} starts past the end of a {} byte buffer",
                        i,
                        raw.len()
                    ))
                })?;

            if raw[offset] == DELETED {
                deleted += 1;
                if self.on_deleted == DeletedRecord::Placeholder {
                    records.push(AttributeRecord::new());
                }
                continue;
            }

            let mut record = AttributeRecord::new();
            let mut pos = offset + 1;
            for field in header.fields.iter() {
                let end = pos + field.length as usize;
                let bytes = raw.get(pos..end).ok_or_else(|| {
                    Error::MalformedDbf(format!(
                        "field {} of record {} spans bytes {}..{} of a {} byte buffer",
                        field.name,
                        i,
                        pos,
                        end,
                        raw.len()
                    ))
                })?;
                let text = decode_text(bytes);
                let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
                let value = if field.is_numeric() {
                    AttributeValue::Number(parse_number(text))
                } else {
                    AttributeValue::String(text.to_string())
                };
                record.insert(field.name.clone(), value);
                pos = end;
            }
            records.push(record);
        }

        tracing::debug!(
            records = records.len(),
            deleted,
            fields = header.fields.len(),
            "decoded dbf"
        );
        Ok(records)
    }
}

/// Decodes with the default options.
pub fn decode(raw: &[u8]) -> Result<Vec<AttributeRecord>> {
    DbfDecoder::default().decode(raw)
}

// UTF-8 when valid, Latin-1 otherwise.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn parse_number(text: &str) -> f64 {
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}
