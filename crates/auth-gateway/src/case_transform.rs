//! JSON key casing conversion between the external and backend conventions.
//!
//! Callers speak lowerCamel (`userName`); the backend speaks snake_case
//! (`user_name`). Request bodies are converted [`Direction::ToBackend`] before
//! dispatch and response bodies [`Direction::ToExternal`] before they reach the
//! caller.
//!
//! Conversion is best-effort: bytes that are not a JSON object are handed back
//! untouched rather than failing the request.

use serde_json::{Map, Value};

/// Which convention object keys are renamed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// lowerCamel -> snake_case.
    ToBackend,
    /// snake_case -> lowerCamel.
    ToExternal,
}

impl Direction {
    /// Rename a single key for this direction.
    pub fn rename(self, key: &str) -> String {
        match self {
            Direction::ToBackend => to_snake(key),
            Direction::ToExternal => to_lower_camel(key),
        }
    }
}

/// Recursively convert every object key in `value`.
///
/// Objects get renamed keys and converted values, arrays keep their length and
/// order with each element converted, scalars pass through. When two keys
/// rename to the same name the later one in iteration order wins.
pub fn convert(value: Value, direction: Direction) -> Value {
    match value {
        Value::Object(map) => {
            let mut converted = Map::with_capacity(map.len());
            for (key, inner) in map {
                let renamed = direction.rename(&key);
                if converted
                    .insert(renamed.clone(), convert(inner, direction))
                    .is_some()
                {
                    tracing::warn!(
                        target: "gateway.case_transform",
                        key = %key,
                        renamed = %renamed,
                        "Renamed key collides with an existing key"
                    );
                }
            }
            Value::Object(converted)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| convert(item, direction))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Convert a raw JSON body.
///
/// Returns the input unchanged when it is not valid JSON or when the top-level
/// value is not an object; only object keys are ever renamed.
pub fn convert_body(body: &[u8], direction: Direction) -> Vec<u8> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return body.to_vec(),
    };

    if !value.is_object() {
        return body.to_vec();
    }

    match serde_json::to_vec(&convert(value, direction)) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(target: "gateway.case_transform", error = %e, "Failed to re-encode converted body");
            body.to_vec()
        }
    }
}

/// Whether `bytes` parse as a single JSON document.
pub fn is_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}

/// Split an identifier into words.
///
/// Breaks on `_`, `-`, `.`, `:` and whitespace, on lower->upper transitions,
/// and before the last capital of an acronym run (`HTTPServer` -> `HTTP`,
/// `Server`). Digits stay attached to the word before them.
fn split_words(identifier: &str) -> Vec<String> {
    let chars: Vec<char> = identifier.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '-' | '.' | ':') || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = i.checked_sub(1).and_then(|p| chars.get(p)).copied();
            let next = chars.get(i + 1).copied();

            let after_lower_or_digit =
                prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            let acronym_end = prev.is_some_and(char::is_uppercase)
                && next.is_some_and(char::is_lowercase);

            if after_lower_or_digit || acronym_end {
                words.push(std::mem::take(&mut current));
            }
        }

        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// `userName` -> `user_name`, `HTTPServer` -> `http_server`.
pub fn to_snake(identifier: &str) -> String {
    split_words(identifier)
        .iter()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// `user_name` -> `userName`, `email-verified` -> `emailVerified`.
pub fn to_lower_camel(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len());

    for (index, word) in split_words(identifier).iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
            continue;
        }

        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_to_snake() {
        assert_eq!(to_snake("userName"), "user_name");
        assert_eq!(to_snake("UserName"), "user_name");
        assert_eq!(to_snake("user_name"), "user_name");
        assert_eq!(to_snake("id"), "id");
        assert_eq!(to_snake("userID"), "user_id");
        assert_eq!(to_snake("HTTPServer"), "http_server");
        assert_eq!(to_snake("getHTTPResponseCode"), "get_http_response_code");
        assert_eq!(to_snake("address2Line"), "address2_line");
        assert_eq!(to_snake(""), "");
    }

    #[test]
    fn test_to_lower_camel() {
        assert_eq!(to_lower_camel("user_name"), "userName");
        assert_eq!(to_lower_camel("userName"), "userName");
        assert_eq!(to_lower_camel("email_verified"), "emailVerified");
        assert_eq!(to_lower_camel("custom:tenant_id"), "customTenantId");
        assert_eq!(to_lower_camel("given-name"), "givenName");
        assert_eq!(to_lower_camel("user_id"), "userId");
        assert_eq!(to_lower_camel("address2_line"), "address2Line");
        assert_eq!(to_lower_camel("Email"), "email");
        assert_eq!(to_lower_camel(""), "");
    }

    #[test]
    fn test_convert_nested_objects_and_arrays() {
        let input = json!({
            "userName": "a",
            "homeAddress": {"streetName": "Main", "zipCode": 12345},
            "phoneNumbers": [{"countryCode": "+1"}, "raw-string", 7],
            "isActive": true,
            "lastLogin": null
        });

        let output = convert(input, Direction::ToBackend);

        assert_eq!(
            output,
            json!({
                "user_name": "a",
                "home_address": {"street_name": "Main", "zip_code": 12345},
                "phone_numbers": [{"country_code": "+1"}, "raw-string", 7],
                "is_active": true,
                "last_login": null
            })
        );
    }

    #[test]
    fn test_convert_key_collision_keeps_last_and_warns() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer_buffer = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || Capture(Arc::clone(&writer_buffer)))
            .finish();

        // "user_name" follows "userName" both in source and in sorted key order
        let output = tracing::subscriber::with_default(subscriber, || {
            convert(json!({"userName": 1, "user_name": 2}), Direction::ToBackend)
        });

        assert_eq!(output, json!({"user_name": 2}));
        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Renamed key collides with an existing key"));
        assert!(logs.contains("user_name"));
    }

    #[test]
    fn test_convert_without_collision_does_not_warn() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer_buffer = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || Capture(Arc::clone(&writer_buffer)))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            convert(json!({"userName": 1, "homeAddress": {"zipCode": 2}}), Direction::ToBackend)
        });

        assert!(buffer.lock().unwrap().is_empty());
    }

    #[test]
    fn test_convert_does_not_touch_string_values() {
        let output = convert(json!({"userName": "firstName"}), Direction::ToBackend);
        assert_eq!(output, json!({"user_name": "firstName"}));
    }

    #[test]
    fn test_round_trip_lower_camel_keys() {
        let original = json!({
            "userName": "a",
            "accountSettings": {
                "emailAlerts": [{"alertKind": "daily", "sentCount": 3}],
                "theme": "dark"
            },
            "tags": ["x", "y"],
            "address2Line": "apt 4"
        });

        let backend = convert(original.clone(), Direction::ToBackend);
        let external = convert(backend, Direction::ToExternal);

        assert_eq!(external, original);
    }

    #[test]
    fn test_convert_body_rewrites_object() {
        let body = br#"{"userName":"a"}"#;
        let converted = convert_body(body, Direction::ToBackend);
        assert_eq!(converted, br#"{"user_name":"a"}"#.to_vec());
    }

    #[test]
    fn test_convert_body_leaves_malformed_input_unchanged() {
        let inputs: [&[u8]; 6] = [
            b"",
            b"{",
            b"not json at all",
            b"{\"userName\": }",
            &[0xff, 0xfe, 0x00, 0x7b],
            b"{\"a\":1}{\"b\":2}",
        ];

        for input in inputs {
            assert_eq!(convert_body(input, Direction::ToBackend), input.to_vec());
            assert_eq!(convert_body(input, Direction::ToExternal), input.to_vec());
        }
    }

    #[test]
    fn test_convert_body_leaves_non_object_top_level_unchanged() {
        let inputs: [&[u8]; 4] = [
            br#"[{"userName":"a"}]"#,
            br#""userName""#,
            b"42",
            b"null",
        ];

        for input in inputs {
            assert_eq!(convert_body(input, Direction::ToBackend), input.to_vec());
        }
    }

    #[test]
    fn test_is_json() {
        assert!(is_json(br#"{"a":1}"#));
        assert!(is_json(b"[1,2,3]"));
        assert!(is_json(b" 42 "));
        assert!(!is_json(b""));
        assert!(!is_json(b"{"));
        assert!(!is_json(b"hello"));
    }
}
