//! RFC 5849 percent-encoding, URL normalization and the `Authorization: OAuth` header.

use url::Url;

use crate::errors::ProtocolError;

const AUTHORIZATION_SCHEME: &str = "OAuth";

/// Percent-encode everything except `A-Za-z0-9-._~`
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

pub fn percent_decode(value: &str) -> Result<String, ProtocolError> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ProtocolError::MalformedMessage(format!("invalid percent-encoding: {e}")))
}

/// Base string URI: scheme and host in lower case, the port only when it is
/// not the scheme default, and no query or fragment.
pub fn normalize_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Parse `OAuth k="v", ...` into decoded pairs. `realm` is not a protocol
/// parameter and is dropped.
pub fn parse_authorization_header(value: &str) -> Result<Vec<(String, String)>, ProtocolError> {
    let value = value.trim();
    let parameters = value
        .get(..AUTHORIZATION_SCHEME.len())
        .filter(|scheme| scheme.eq_ignore_ascii_case(AUTHORIZATION_SCHEME))
        .and_then(|_| value.get(AUTHORIZATION_SCHEME.len()..))
        .ok_or_else(|| ProtocolError::MalformedMessage("not an OAuth authorization header".into()))?;

    let mut pairs = Vec::new();
    for item in parameters.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (key, raw) = item
            .split_once('=')
            .ok_or_else(|| ProtocolError::MalformedMessage(format!("header parameter without value: {item}")))?;
        let key = percent_decode(key.trim())?;
        if key == "realm" {
            continue;
        }
        let raw = raw.trim();
        let quoted = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .ok_or_else(|| ProtocolError::MalformedMessage(format!("header value for {key} is not quoted")))?;
        pairs.push((key, percent_decode(quoted)?));
    }
    Ok(pairs)
}

/// Render protocol parameters as an `Authorization` header value
pub fn format_authorization_header(parameters: &[(String, String)], realm: Option<&str>) -> String {
    let realm = realm.map(|realm| format!("realm=\"{}\"", percent_encode(realm)));
    let rendered = parameters
        .iter()
        .filter(|(key, _)| key.starts_with("oauth_"))
        .map(|(key, value)| format!("{}=\"{}\"", percent_encode(key), percent_encode(value)));
    let joined: Vec<String> = realm.into_iter().chain(rendered).collect();
    format!("{AUTHORIZATION_SCHEME} {}", joined.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode_reserved_characters() {
        assert_eq!(percent_encode("abcABC123-._~"), "abcABC123-._~");
        assert_eq!(percent_encode("a b+c/d=e&f"), "a%20b%2Bc%2Fd%3De%26f");
        assert_eq!(percent_encode("é"), "%C3%A9");
        assert_eq!(percent_decode("a%20b%2Bc").unwrap(), "a b+c");
    }

    #[test]
    fn test_normalize_url() {
        let url = Url::parse("HTTP://Example.COM:80/r%20v/X?id=123#frag").unwrap();
        assert_eq!(normalize_url(&url), "http://example.com/r%20v/X");

        let url = Url::parse("https://www.example.net:8080/?q=1").unwrap();
        assert_eq!(normalize_url(&url), "https://www.example.net:8080/");
    }

    #[test]
    fn test_authorization_header_round_trip() {
        let parameters = vec![
            ("oauth_consumer_key".to_string(), "ck".to_string()),
            ("oauth_signature".to_string(), "a/b+c=".to_string()),
            ("foo".to_string(), "not in header".to_string()),
        ];
        let header = format_authorization_header(&parameters, Some("Photos"));
        assert_eq!(
            header,
            r#"OAuth realm="Photos", oauth_consumer_key="ck", oauth_signature="a%2Fb%2Bc%3D""#
        );

        let parsed = parse_authorization_header(&header).unwrap();
        assert_eq!(parsed, parameters[..2].to_vec());
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(parse_authorization_header("Bearer abc").is_err());
        assert!(parse_authorization_header(r#"OAuth oauth_token=unquoted"#).is_err());
        assert!(parse_authorization_header("oauth ").unwrap().is_empty());
    }
}
