//! Key-Value Form encoding used by OpenID direct responses and signature payloads.
//!
//! Each pair is written as `key:value\n`. Decoding strictness is chosen with
//! [`Conformance`].

use crate::errors::ProtocolError;

/// Decoding strictness
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Conformance {
    /// Trim every line and skip blank ones
    Loose,
    /// No whitespace next to the colon, trailing newline required, keys and values trimmed
    OpenId11,
    /// No whitespace next to the colon, trailing newline required
    OpenId20,
}

/// Encode pairs in the given order.
pub fn encode<I, K, V>(pairs: I) -> Result<String, ProtocolError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut output = String::new();
    for (key, value) in pairs {
        let (key, value) = (key.as_ref(), value.as_ref());
        if key.is_empty() || key.contains('\n') || key.contains(':') {
            return Err(ProtocolError::MalformedKeyValueForm(format!(
                "invalid key {key:?}"
            )));
        }
        if value.contains('\n') {
            return Err(ProtocolError::MalformedKeyValueForm(format!(
                "value for {key} contains a newline"
            )));
        }
        output.push_str(key);
        output.push(':');
        output.push_str(value);
        output.push('\n');
    }
    Ok(output)
}

/// Decode a Key-Value Form document. Duplicate keys are rejected.
pub fn decode(data: &str, conformance: Conformance) -> Result<Vec<(String, String)>, ProtocolError> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    for (index, raw_line) in data.lines().enumerate() {
        let line_number = index + 1;
        let line = if conformance == Conformance::Loose {
            let trimmed = raw_line.trim();
            if trimmed.is_empty() {
                continue;
            }
            trimmed
        } else {
            raw_line
        };

        let (key, value) = line.split_once(':').ok_or_else(|| {
            ProtocolError::MalformedKeyValueForm(format!("missing ':' on line {line_number}"))
        })?;

        if conformance > Conformance::Loose {
            let space_before = key.chars().last().is_none_or(char::is_whitespace);
            let space_after = value.chars().next().is_some_and(char::is_whitespace);
            if space_before || space_after {
                return Err(ProtocolError::MalformedKeyValueForm(format!(
                    "whitespace around ':' on line {line_number}"
                )));
            }
        }

        let (key, value) = if conformance < Conformance::OpenId20 {
            (key.trim(), value.trim())
        } else {
            (key, value)
        };

        if pairs.iter().any(|(existing, _)| existing == key) {
            return Err(ProtocolError::MalformedKeyValueForm(format!(
                "duplicate key {key} on line {line_number}"
            )));
        }
        pairs.push((key.to_string(), value.to_string()));
    }

    if conformance > Conformance::Loose && !data.is_empty() && !data.ends_with('\n') {
        return Err(ProtocolError::MalformedKeyValueForm(
            "missing trailing newline".into(),
        ));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let encoded = encode([("mode", "error"), ("error", "bad things")]).unwrap();
        assert_eq!(encoded, "mode:error\nerror:bad things\n");
    }

    #[test]
    fn test_encode_rejects_ambiguous_pairs() {
        assert!(encode([("a:b", "c")]).is_err());
        assert!(encode([("a", "b\nc:d")]).is_err());
        assert!(encode([("", "x")]).is_err());
        // A colon inside a value is unambiguous
        assert_eq!(encode([("url", "http://x")]).unwrap(), "url:http://x\n");
    }

    #[test]
    fn test_decode_strict() {
        let pairs = decode("ns:http://specs.openid.net/auth/2.0\nis_valid:true\n", Conformance::OpenId20)
            .unwrap();
        assert_eq!(pairs[0], ("ns".to_string(), "http://specs.openid.net/auth/2.0".to_string()));
        assert_eq!(pairs[1], ("is_valid".to_string(), "true".to_string()));

        assert!(decode("is_valid:true", Conformance::OpenId20).is_err());
        assert!(decode("is_valid: true\n", Conformance::OpenId20).is_err());
        assert!(decode("is_valid :true\n", Conformance::OpenId11).is_err());
        assert!(decode("a:1\na:2\n", Conformance::OpenId20).is_err());
        assert!(decode("no colon here\n", Conformance::OpenId20).is_err());
    }

    #[test]
    fn test_decode_loose() {
        let pairs = decode("\n  a:1  \n\nb:2", Conformance::Loose).unwrap();
        assert_eq!(
            pairs,
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_decode_openid11_trims_trailing_space() {
        let pairs = decode("a:1 \n", Conformance::OpenId11).unwrap();
        assert_eq!(pairs[0].1, "1");

        let pairs = decode("a:1 \n", Conformance::OpenId20).unwrap();
        assert_eq!(pairs[0].1, "1 ");
    }

    #[test]
    fn test_empty_value() {
        let pairs = decode("invalidate_handle:\n", Conformance::OpenId20).unwrap();
        assert_eq!(pairs[0], ("invalidate_handle".to_string(), String::new()));
    }
}
