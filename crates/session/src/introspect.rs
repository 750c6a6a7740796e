//! Local, unverified reads of a bearer token's claims segment.
//!
//! Nothing here checks a signature. The decoded expiry is a scheduling hint
//! and must never be used for an authorization decision.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::{Map, Value};

/// URL-safe base64 that accepts the segment with or without padding
const CLAIMS_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The decoded claims object of a token
#[derive(Debug, Clone, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Expiry in epoch milliseconds, from the numeric `exp` claim (epoch seconds)
    pub fn expires_at_ms(&self) -> Option<i64> {
        seconds_to_ms(self.0.get("exp")?)
    }

    /// Issue time in epoch milliseconds, from the numeric `iat` claim
    pub fn issued_at_ms(&self) -> Option<i64> {
        seconds_to_ms(self.0.get("iat")?)
    }

    /// The `sub` claim
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// Any claim by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

fn seconds_to_ms(value: &Value) -> Option<i64> {
    let seconds = value.as_f64()?;
    // a zero timestamp is treated the same as a missing one
    if seconds == 0.0 || !seconds.is_finite() {
        return None;
    }
    Some((seconds * 1000.0) as i64)
}

/// Decode the claims segment (the second `.`-delimited part) of a token.
///
/// Returns `None` for anything that is not `<x>.<base64url JSON object>[...]`.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let segment = token.split('.').nth(1)?;
    let bytes = CLAIMS_ENGINE.decode(segment).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(Claims(map)),
        _ => None,
    }
}

/// Decode a token's expiry in epoch milliseconds. Never panics.
pub fn decode_expiry(token: &str) -> Option<i64> {
    decode_claims(token)?.expires_at_ms()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn segment(json: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    #[test]
    fn test_decode_expiry_from_signed_token() {
        let claims = serde_json::json!({ "sub": "admin@msf.org", "exp": 1_900_000_000u64 });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert_eq!(decode_expiry(&token), Some(1_900_000_000_000));
        assert_eq!(decode_claims(&token).unwrap().subject(), Some("admin@msf.org"));
    }

    #[test]
    fn test_decode_accepts_padded_segment() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":12}"#);
        assert!(padded.ends_with('='));
        assert_eq!(decode_expiry(&format!("h.{}.s", padded)), Some(12_000));
    }

    #[test]
    fn test_decode_only_needs_claims_segment() {
        let token = format!("header.{}", segment(r#"{"exp":1.5}"#));
        assert_eq!(decode_expiry(&token), Some(1_500));
    }

    #[test]
    fn test_malformed_tokens_decode_to_none() {
        let cases = vec![
            String::new(),
            "no-delimiter".to_string(),
            "a.".to_string(),
            "a..c".to_string(),
            "a.%%%not-base64%%%.c".to_string(),
            format!("a.{}.c", segment("not json")),
            format!("a.{}.c", segment("[1,2,3]")),
            format!("a.{}.c", segment(r#"{"sub":"x"}"#)),
            format!("a.{}.c", segment(r#"{"exp":"soon"}"#)),
            format!("a.{}.c", segment(r#"{"exp":0}"#)),
            format!("a.{}.c", segment(r#"{"exp":null}"#)),
            "a.\u{1F600}.c".to_string(),
        ];

        for token in cases {
            assert_eq!(decode_expiry(&token), None, "token {:?}", token);
        }
    }

    #[test]
    fn test_invalid_utf8_claims_decode_to_none() {
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0x7b]);
        assert_eq!(decode_claims(&format!("a.{}.c", raw)), None);
    }
}
