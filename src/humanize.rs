//! Human-readable duration formatting and parsing utilities

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid duration format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

/// Duration wrapper with human-readable parsing ("500ms", "60s", "24h")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }

    pub fn to_human_readable(&self) -> String {
        const UNITS: &[(&str, u64)] = &[
            ("ms", 1),
            ("s", 1000),
            ("m", 60 * 1000),
            ("h", 60 * 60 * 1000),
            ("d", 24 * 60 * 60 * 1000),
        ];

        let ms = self.as_millis();
        if ms == 0 {
            return "0ms".to_string();
        }

        // Largest unit that divides evenly, so the output parses back unchanged
        for &(unit, divisor) in UNITS.iter().rev() {
            if ms % divisor == 0 {
                return format!("{}{}", ms / divisor, unit);
            }
        }

        format!("{}ms", ms)
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"500ms\", \"24h\") or integer milliseconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration::from_millis(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(HumanDuration::from_millis)
                    .map_err(|_| E::custom(format!("duration cannot be negative: {}", v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        // Plain numbers are milliseconds
        if let Ok(num) = s.parse::<u64>() {
            return Ok(HumanDuration::from_millis(num));
        }

        let (num_str, unit) = if let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) {
            (&s[..pos], &s[pos..])
        } else {
            return Err(ParseError::InvalidFormat(s.to_string()));
        };

        if num_str.is_empty() {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let num: u64 = num_str.parse()?;

        let multiplier: u64 = match unit.trim() {
            "ms" => 1,
            "s" | "sec" | "secs" => 1000,
            "m" | "min" | "mins" => 60 * 1000,
            "h" | "hr" | "hrs" => 60 * 60 * 1000,
            "d" | "day" | "days" => 24 * 60 * 60 * 1000,
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        };

        Ok(HumanDuration::from_millis(num * multiplier))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_millis() {
        assert_eq!("1500".parse::<HumanDuration>().unwrap().as_millis(), 1500);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!("500ms".parse::<HumanDuration>().unwrap().as_millis(), 500);
        assert_eq!("60s".parse::<HumanDuration>().unwrap().as_millis(), 60_000);
        assert_eq!("5m".parse::<HumanDuration>().unwrap().as_millis(), 300_000);
        assert_eq!("24h".parse::<HumanDuration>().unwrap().as_millis(), 86_400_000);
        assert_eq!("7d".parse::<HumanDuration>().unwrap().as_millis(), 7 * 86_400_000);
    }

    #[test]
    fn test_parse_rejects_unknown_unit() {
        assert!(matches!(
            "3 weeks".parse::<HumanDuration>(),
            Err(ParseError::InvalidUnit(_))
        ));
        assert!(matches!(
            "ms".parse::<HumanDuration>(),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(HumanDuration::from_millis(500).to_human_readable(), "500ms");
        assert_eq!(HumanDuration::from_secs(60).to_human_readable(), "1m");
        assert_eq!(HumanDuration::from_millis(1500).to_human_readable(), "1500ms");
        assert_eq!(HumanDuration::from_secs(86_400).to_human_readable(), "1d");
    }

    #[test]
    fn test_deserialize_string() {
        let json = r#"{"delay": "30s"}"#;
        #[derive(Deserialize)]
        struct TestStruct {
            delay: HumanDuration,
        }
        let parsed: TestStruct = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.delay.as_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_deserialize_number() {
        let json = r#"{"delay": 250}"#;
        #[derive(Deserialize)]
        struct TestStruct {
            delay: HumanDuration,
        }
        let parsed: TestStruct = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.delay.as_millis(), 250);
    }

    #[test]
    fn test_serialize_round_trips_through_display() {
        let value = serde_json::to_string(&HumanDuration::from_secs(3600)).unwrap();
        assert_eq!(value, "\"1h\"");
    }
}
