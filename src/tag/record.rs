// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-width tag record codec.
//!
//! A record is 48 ASCII characters:
//!
//! | field     | width | example          |
//! |-----------|-------|------------------|
//! | date code | 5     | `C2625`          |
//! | vendor id | 4     | `0276`           |
//! | batch     | 2     | `A2`             |
//! | film id   | 6     | `101001`         |
//! | color     | 7     | `0FFFFFF`        |
//! | length    | 4     | `014A`           |
//! | serial    | 6     | `000123`         |
//! | reserved  | 14    | `00000000000000` |

use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, EncodingError};

pub const DATE_CODE_LEN: usize = 5;
pub const VENDOR_ID_LEN: usize = 4;
pub const BATCH_LEN: usize = 2;
pub const FILM_ID_LEN: usize = 6;
pub const COLOR_LEN: usize = 7;
pub const LENGTH_LEN: usize = 4;
pub const SERIAL_LEN: usize = 6;
pub const RESERVED_LEN: usize = 14;

/// Total encoded record length.
pub const RECORD_LEN: usize = DATE_CODE_LEN
    + VENDOR_ID_LEN
    + BATCH_LEN
    + FILM_ID_LEN
    + COLOR_LEN
    + LENGTH_LEN
    + SERIAL_LEN
    + RESERVED_LEN;

const VENDOR_OFFSET: usize = DATE_CODE_LEN;

/// Six-digit spool serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(u32);

impl Serial {
    pub const MAX: u32 = 999_999;

    pub fn new(value: u32) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl FromStr for Serial {
    type Err = DecodeError;

    /// Accepts exactly six ASCII digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SERIAL_LEN {
            return Err(invalid("serial", s));
        }
        parse_number("serial", s, 10).map(Self)
    }
}

/// Manufacturing date packed as `<month hex><day><year>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCode {
    pub month: u8,
    pub day: u8,
    pub year: u8,
}

impl DateCode {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month() as u8,
            day: date.day() as u8,
            year: (date.year().rem_euclid(100)) as u8,
        }
    }

    fn encode(&self) -> Result<String, EncodingError> {
        fit(
            "date_code",
            format!("{:X}{:02}{:02}", self.month, self.day, self.year),
            DATE_CODE_LEN,
        )
    }

    fn parse(value: &str) -> Result<Self, DecodeError> {
        let month = value
            .chars()
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| invalid("date_code", value))?;
        let day = parse_number("date_code", &value[1..3], 10)?;
        let year = parse_number("date_code", &value[3..5], 10)?;

        Ok(Self {
            month: month as u8,
            day: day as u8,
            year: year as u8,
        })
    }
}

/// Spool color: a reserved leading digit plus 24-bit RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagColor {
    pub prefix: u8,
    pub rgb: u32,
}

impl TagColor {
    pub fn from_rgb(rgb: u32) -> Self {
        Self { prefix: 0, rgb }
    }

    /// Parse `RRGGBB` or `#RRGGBB`.
    pub fn from_hex(hex: &str) -> Result<Self, DecodeError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return Err(invalid("color", hex));
        }
        parse_number("color", digits, 16).map(Self::from_rgb)
    }

    /// RGB part as six uppercase hex digits.
    pub fn hex(&self) -> String {
        format!("{:06X}", self.rgb)
    }

    fn encode(&self) -> Result<String, EncodingError> {
        fit(
            "color",
            format!("{:X}{:06X}", self.prefix, self.rgb),
            COLOR_LEN,
        )
    }

    fn parse(value: &str) -> Result<Self, DecodeError> {
        let prefix = value
            .chars()
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| invalid("color", value))?;
        let rgb = parse_number("color", &value[1..], 16)?;
        Ok(Self {
            prefix: prefix as u8,
            rgb,
        })
    }
}

/// Decoded tag record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub date_code: DateCode,
    pub vendor_id: String,
    pub batch: String,
    pub film_id: u32,
    pub color: TagColor,
    /// Filament length in metres.
    pub length_m: u16,
    pub serial: Serial,
    pub reserved: String,
}

impl TagRecord {
    /// Build a record with a zero-filled reserve.
    pub fn new(
        date: NaiveDate,
        vendor_id: impl Into<String>,
        batch: impl Into<String>,
        film_id: u32,
        color: TagColor,
        length_m: u16,
        serial: Serial,
    ) -> Self {
        Self {
            date_code: DateCode::from_date(date),
            vendor_id: vendor_id.into(),
            batch: batch.into(),
            film_id,
            color,
            length_m,
            serial,
            reserved: "0".repeat(RESERVED_LEN),
        }
    }
}

/// What a raw tag payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagContent {
    /// Factory blank: every character is `0`.
    Blank,
    /// Vendor field does not look like one of ours.
    Foreign { vendor_id: String },
    Valid(TagRecord),
}

/// Encode a record into its 48-character form.
pub fn encode(record: &TagRecord) -> Result<String, EncodingError> {
    let mut out = String::with_capacity(RECORD_LEN);

    out.push_str(&record.date_code.encode()?);
    out.push_str(&pad_text("vendor_id", &record.vendor_id, VENDOR_ID_LEN, true)?);
    out.push_str(&pad_text("batch", &record.batch, BATCH_LEN, false)?);
    out.push_str(&fit("film_id", format!("{:06}", record.film_id), FILM_ID_LEN)?);
    out.push_str(&record.color.encode()?);
    out.push_str(&format!("{:04X}", record.length_m));
    out.push_str(&fit("serial", record.serial.to_string(), SERIAL_LEN)?);
    out.push_str(&pad_text("reserved", &record.reserved, RESERVED_LEN, false)?);

    debug_assert_eq!(out.len(), RECORD_LEN);
    Ok(out)
}

/// Decode the first 48 characters of `data`. No checksum is verified.
pub fn decode(data: &str) -> Result<TagRecord, DecodeError> {
    let head = record_slice(data)?;
    let mut fields = Fields { data: head, pos: 0 };

    let date_code = DateCode::parse(fields.take(DATE_CODE_LEN))?;
    let vendor_id = fields.take(VENDOR_ID_LEN).to_string();
    let batch = fields.take(BATCH_LEN).to_string();
    let film_id = parse_number("film_id", fields.take(FILM_ID_LEN), 10)?;
    let color = TagColor::parse(fields.take(COLOR_LEN))?;
    let length_m = parse_number("length", fields.take(LENGTH_LEN), 16)? as u16;
    let serial = Serial(parse_number("serial", fields.take(SERIAL_LEN), 10)?);
    let reserved = fields.take(RESERVED_LEN).to_string();

    Ok(TagRecord {
        date_code,
        vendor_id,
        batch,
        film_id,
        color,
        length_m,
        serial,
        reserved,
    })
}

/// Sort a raw payload into blank, foreign or valid.
pub fn classify(data: &str) -> Result<TagContent, DecodeError> {
    let head = record_slice(data)?;

    if head.bytes().all(|b| b == b'0') {
        return Ok(TagContent::Blank);
    }

    let vendor_id = &head[VENDOR_OFFSET..VENDOR_OFFSET + VENDOR_ID_LEN];
    if !is_known_vendor(vendor_id) {
        return Ok(TagContent::Foreign {
            vendor_id: vendor_id.to_string(),
        });
    }

    decode(head).map(TagContent::Valid)
}

/// Four decimal digits (official vendors) or `F` plus three digits (custom brands).
pub fn is_known_vendor(vendor_id: &str) -> bool {
    if vendor_id.len() != VENDOR_ID_LEN {
        return false;
    }
    let digits = vendor_id.strip_prefix('F').unwrap_or(vendor_id);
    digits.len() >= 3 && digits.bytes().all(|b| b.is_ascii_digit())
}

struct Fields<'a> {
    data: &'a str,
    pos: usize,
}

impl<'a> Fields<'a> {
    fn take(&mut self, len: usize) -> &'a str {
        let field = &self.data[self.pos..self.pos + len];
        self.pos += len;
        field
    }
}

fn record_slice(data: &str) -> Result<&str, DecodeError> {
    let count = data.chars().count();
    if count < RECORD_LEN {
        return Err(DecodeError::TooShort {
            expected: RECORD_LEN,
            actual: count,
        });
    }

    let head = match data.char_indices().nth(RECORD_LEN) {
        Some((end, _)) => &data[..end],
        None => data,
    };
    if !head.is_ascii() {
        return Err(DecodeError::NonAscii);
    }
    Ok(head)
}

fn parse_number(field: &'static str, value: &str, radix: u32) -> Result<u32, DecodeError> {
    if value.is_empty() || !value.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid(field, value));
    }
    u32::from_str_radix(value, radix).map_err(|_| invalid(field, value))
}

fn invalid(field: &'static str, value: &str) -> DecodeError {
    DecodeError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn fit(field: &'static str, value: String, width: usize) -> Result<String, EncodingError> {
    if value.len() > width {
        return Err(EncodingError::FieldTooWide {
            field,
            max: width,
            actual: value.len(),
        });
    }
    Ok(value)
}

fn pad_text(
    field: &'static str,
    value: &str,
    width: usize,
    pad_left: bool,
) -> Result<String, EncodingError> {
    if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(EncodingError::InvalidCharacter {
            field,
            value: value.to_string(),
        });
    }
    let value = fit(field, value.to_string(), width)?;
    let padding = "0".repeat(width - value.len());
    Ok(if pad_left {
        padding + &value
    } else {
        value + &padding
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "C26250276A21010010FFFFFF014A00012300000000000000";

    fn sample_record() -> TagRecord {
        TagRecord::new(
            NaiveDate::from_ymd_opt(2025, 12, 26).unwrap(),
            "0276",
            "A2",
            101001,
            TagColor::from_rgb(0xFFFFFF),
            330,
            Serial::new(123).unwrap(),
        )
    }

    #[test]
    fn test_record_length() {
        assert_eq!(RECORD_LEN, 48);
        assert_eq!(SAMPLE.len(), RECORD_LEN);
    }

    #[test]
    fn test_encode_sample() {
        assert_eq!(encode(&sample_record()).unwrap(), SAMPLE);
    }

    #[test]
    fn test_decode_sample() {
        let record = decode(SAMPLE).unwrap();
        assert_eq!(record, sample_record());
        assert_eq!(record.date_code, DateCode { month: 12, day: 26, year: 25 });
        assert_eq!(record.length_m, 330);
        assert_eq!(record.serial.to_string(), "000123");
    }

    #[test]
    fn test_encode_pads_short_fields() {
        let mut record = sample_record();
        record.vendor_id = "76".to_string();
        record.batch = "A".to_string();
        record.film_id = 42;
        record.reserved = String::new();

        let encoded = encode(&record).unwrap();
        assert_eq!(encoded.len(), RECORD_LEN);
        assert_eq!(&encoded[5..9], "0076");
        assert_eq!(&encoded[9..11], "A0");
        assert_eq!(&encoded[11..17], "000042");
        assert!(encoded.ends_with("00000000000000"));
    }

    #[test]
    fn test_encode_rejects_wide_fields() {
        let mut record = sample_record();
        record.film_id = 1_000_000;
        assert_eq!(
            encode(&record),
            Err(EncodingError::FieldTooWide {
                field: "film_id",
                max: 6,
                actual: 7
            })
        );

        let mut record = sample_record();
        record.vendor_id = "02760".to_string();
        assert!(matches!(
            encode(&record),
            Err(EncodingError::FieldTooWide { field: "vendor_id", .. })
        ));

        let mut record = sample_record();
        record.color.rgb = 0x1000000;
        assert!(matches!(
            encode(&record),
            Err(EncodingError::FieldTooWide { field: "color", .. })
        ));

        let mut record = sample_record();
        record.date_code.day = 100;
        assert!(matches!(
            encode(&record),
            Err(EncodingError::FieldTooWide { field: "date_code", .. })
        ));
    }

    #[test]
    fn test_encode_rejects_separator_characters() {
        let mut record = sample_record();
        record.batch = "A|".to_string();
        assert!(matches!(
            encode(&record),
            Err(EncodingError::InvalidCharacter { field: "batch", .. })
        ));
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(
            decode("C2625"),
            Err(DecodeError::TooShort {
                expected: 48,
                actual: 5
            })
        );
    }

    #[test]
    fn test_decode_ignores_trailing_data() {
        let padded = format!("{}\0\0\0", SAMPLE);
        assert_eq!(decode(&padded).unwrap(), sample_record());
    }

    #[test]
    fn test_decode_rejects_garbage_fields() {
        let bad = SAMPLE.replacen("101001", "10X001", 1);
        assert!(matches!(
            decode(&bad),
            Err(DecodeError::InvalidField { field: "film_id", .. })
        ));
    }

    #[test]
    fn test_decode_non_ascii() {
        let bad = format!("é{}", &SAMPLE[1..]);
        assert_eq!(decode(&bad), Err(DecodeError::NonAscii));
    }

    #[test]
    fn test_lowercase_hex_is_not_canonical() {
        let lower = SAMPLE.replacen("014A", "014a", 1);
        let record = decode(&lower).unwrap();
        assert_eq!(record.length_m, 330);
        assert_eq!(encode(&record).unwrap(), SAMPLE);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&"0".repeat(48)).unwrap(), TagContent::Blank);
        assert_eq!(
            classify(SAMPLE).unwrap(),
            TagContent::Valid(sample_record())
        );

        let foreign = SAMPLE.replacen("0276", "XY12", 1);
        assert_eq!(
            classify(&foreign).unwrap(),
            TagContent::Foreign {
                vendor_id: "XY12".to_string()
            }
        );

        assert!(matches!(
            classify("0000"),
            Err(DecodeError::TooShort { .. })
        ));
    }

    #[test]
    fn test_known_vendor() {
        assert!(is_known_vendor("0276"));
        assert!(is_known_vendor("F001"));
        assert!(!is_known_vendor("F01"));
        assert!(!is_known_vendor("ABCD"));
        assert!(!is_known_vendor("FF01"));
    }

    #[test]
    fn test_date_code_from_date() {
        let code = DateCode::from_date(NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
        assert_eq!(code.encode().unwrap(), "30726");
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(TagColor::from_hex("#ff8800").unwrap().rgb, 0xFF8800);
        assert_eq!(TagColor::from_hex("00FF00").unwrap().hex(), "00FF00");
        assert!(TagColor::from_hex("FFF").is_err());
        assert!(TagColor::from_hex("GGGGGG").is_err());
    }

    #[test]
    fn test_serial_parse() {
        assert_eq!("000123".parse::<Serial>().unwrap().value(), 123);
        assert!("12345".parse::<Serial>().is_err());
        assert!("+12345".parse::<Serial>().is_err());
        assert!("1234567".parse::<Serial>().is_err());
        assert!(Serial::new(1_000_000).is_none());
    }
}
