use chrono::{DateTime, SecondsFormat, Utc};
use num_bigint_dig::BigInt;
use serde_json::Value;

use super::ChunkId;

/// Escapes a user string so it can never be read as a reference token.
pub fn escape_string(value: &str) -> String {
    if value.starts_with('$') { format!("${value}") } else { value.to_string() }
}

pub fn unescape_string(value: &str) -> &str {
    if value.starts_with("$$") { &value[1..] } else { value }
}

pub fn by_value(id: ChunkId) -> String {
    format!("${id:x}")
}

pub fn lazy(id: ChunkId) -> String {
    format!("$L{id:x}")
}

pub fn promise(id: ChunkId) -> String {
    format!("$@{id:x}")
}

pub fn server_reference(id: ChunkId) -> String {
    format!("$F{id:x}")
}

pub fn map(id: ChunkId) -> String {
    format!("$Q{id:x}")
}

pub fn set(id: ChunkId) -> String {
    format!("$W{id:x}")
}

pub fn symbol(name: &str) -> String {
    format!("$S{name}")
}

pub fn provider(name: &str) -> String {
    format!("$P{name}")
}

pub fn date(value: &DateTime<Utc>) -> String {
    format!("$D{}", value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn bigint(value: &BigInt) -> String {
    format!("$n{value}")
}

pub const UNDEFINED: &str = "$undefined";

pub const ELEMENT: &str = "$";

/// JSON for a number. Non-finite values and negative zero become tokens.
pub fn number(value: f64) -> Value {
    if value.is_nan() {
        return Value::from("$NaN");
    }
    if value.is_infinite() {
        return Value::from(if value > 0.0 { "$Infinity" } else { "$-Infinity" });
    }
    if value == 0.0 && value.is_sign_negative() {
        return Value::from("$-0");
    }
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Value::from(value as i64);
    }
    Value::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("$x"), "$$x");
        assert_eq!(escape_string("$"), "$$");
        assert_eq!(escape_string("plain"), "plain");
        assert_eq!(unescape_string(&escape_string("$$already")), "$$already");
    }

    #[test]
    fn test_reference_tokens_use_hex() {
        assert_eq!(by_value(255), "$ff");
        assert_eq!(lazy(10), "$La");
        assert_eq!(promise(16), "$@10");
        assert_eq!(server_reference(1), "$F1");
        assert_eq!(map(2), "$Q2");
        assert_eq!(set(3), "$W3");
    }

    #[test]
    fn test_number_tokens() {
        assert_eq!(number(-0.0), Value::from("$-0"));
        assert_eq!(number(0.0), Value::from(0));
        assert_eq!(number(f64::NAN), Value::from("$NaN"));
        assert_eq!(number(f64::INFINITY), Value::from("$Infinity"));
        assert_eq!(number(f64::NEG_INFINITY), Value::from("$-Infinity"));
        assert_eq!(number(1.5), Value::from(1.5));
        assert_eq!(serde_json::to_string(&number(3.0)).unwrap(), "3");
    }

    #[test]
    fn test_date_token() {
        let value = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(date(&value), "$D2024-01-02T03:04:05.000Z");
    }

    #[test]
    fn test_bigint_token() {
        let value: BigInt = "123456789012345678901234567890".parse().unwrap();
        assert_eq!(bigint(&value), "$n123456789012345678901234567890");
    }
}
