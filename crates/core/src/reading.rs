//! Temperature reading and its `timestamp,value` wire format.
//!
//! The producer publishes one UTF-8 line per sensor per tick:
//!
//! ```text
//! 10/25/23 8:00:00,125.3
//! 10/25/23 8:00:30,No Reading
//! ```
//!
//! There is no envelope and no escaping, so a timestamp containing a comma
//! cannot be represented.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReadingError;

/// Literal token used on the wire when a sensor had no data for a tick.
pub const NO_READING: &str = "No Reading";

/// A single timestamped temperature sample from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Opaque timestamp token copied from the dataset.
    pub timestamp: String,
    /// Temperature, or `None` when the sensor reported nothing.
    pub value: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }

    /// A reading with no temperature for this tick.
    pub fn absent(timestamp: impl Into<String>) -> Self {
        Self::new(timestamp, None)
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    /// Decode a raw delivery body.
    pub fn decode(body: &[u8]) -> Result<Self, ReadingError> {
        std::str::from_utf8(body)?.parse()
    }

    /// Render the wire form, rejecting timestamps the format cannot carry.
    pub fn encode(&self) -> Result<String, ReadingError> {
        if self.timestamp.contains(',') {
            return Err(ReadingError::CommaInTimestamp(self.timestamp.clone()));
        }
        Ok(self.to_string())
    }
}

/// Parse the value field: a decimal number or the `No Reading` token.
pub fn parse_value(raw: &str) -> Result<Option<f64>, ReadingError> {
    let raw = raw.trim();
    if raw == NO_READING {
        return Ok(None);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| ReadingError::InvalidValue(raw.to_string()))?;
    if !value.is_finite() {
        return Err(ReadingError::NonFinite(raw.to_string()));
    }
    Ok(Some(value))
}

impl FromStr for Reading {
    type Err = ReadingError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        let [timestamp, value] = fields.as_slice() else {
            return Err(ReadingError::FieldCount {
                found: fields.len(),
            });
        };

        let timestamp = timestamp.trim();
        if timestamp.is_empty() {
            return Err(ReadingError::EmptyTimestamp);
        }

        Ok(Self {
            timestamp: timestamp.to_string(),
            value: parse_value(value)?,
        })
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{},{}", self.timestamp, v),
            None => write!(f, "{},{}", self.timestamp, NO_READING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_numeric_reading() {
        let r: Reading = "10/25/23 8:00:00,125.3".parse().unwrap();
        assert_eq!(r.timestamp, "10/25/23 8:00:00");
        assert_eq!(r.value, Some(125.3));
        assert!(!r.is_absent());
    }

    #[test]
    fn parse_no_reading_token() {
        let r: Reading = "10/25/23 8:00:30,No Reading".parse().unwrap();
        assert_eq!(r, Reading::absent("10/25/23 8:00:30"));
    }

    #[test]
    fn parse_tolerates_whitespace_and_newline() {
        let r: Reading = "t1, 100.5 \n".parse().unwrap();
        assert_eq!(r.value, Some(100.5));
    }

    #[test]
    fn decode_from_bytes() {
        let r = Reading::decode(b"t7,-4").unwrap();
        assert_eq!(r.value, Some(-4.0));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = Reading::decode(&[0xff, 0xfe, b',', b'1']).unwrap_err();
        assert!(matches!(err, ReadingError::InvalidUtf8(_)));
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        assert_eq!(
            "t1".parse::<Reading>().unwrap_err(),
            ReadingError::FieldCount { found: 1 }
        );
        assert_eq!(
            "t1,1,2".parse::<Reading>().unwrap_err(),
            ReadingError::FieldCount { found: 3 }
        );
    }

    #[test]
    fn parse_rejects_non_numeric_value() {
        let err = "t1,hot".parse::<Reading>().unwrap_err();
        assert_eq!(err, ReadingError::InvalidValue("hot".into()));
        assert!(err.to_string().contains("hot"));
    }

    #[test]
    fn parse_rejects_non_finite_value() {
        assert!(matches!(
            "t1,NaN".parse::<Reading>(),
            Err(ReadingError::NonFinite(_))
        ));
        assert!(matches!(
            "t1,inf".parse::<Reading>(),
            Err(ReadingError::NonFinite(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_timestamp() {
        assert_eq!(
            ",12".parse::<Reading>().unwrap_err(),
            ReadingError::EmptyTimestamp
        );
    }

    #[test]
    fn encode_renders_wire_form() {
        assert_eq!(Reading::new("t1", Some(116.0)).encode().unwrap(), "t1,116");
        assert_eq!(Reading::absent("t2").encode().unwrap(), "t2,No Reading");
    }

    #[test]
    fn encode_rejects_comma_in_timestamp() {
        let err = Reading::new("Oct 25, 2023", Some(1.0)).encode().unwrap_err();
        assert!(matches!(err, ReadingError::CommaInTimestamp(_)));
    }
}
