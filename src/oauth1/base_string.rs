//! Signature base string construction (RFC 5849 section 3.4.1).

use url::Url;

use super::encoding::{normalize_url, percent_encode};

/// Encode each pair, sort by encoded key then encoded value and join as
/// `k=v&...`. `oauth_signature` is excluded; repeated keys are all kept.
pub fn normalize_parameters(parameters: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = parameters
        .iter()
        .filter(|(key, _)| key != "oauth_signature")
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// `METHOD&enc(base URI)&enc(normalized parameters)`.
///
/// `parameters` are the protocol and body parameters; the query string of
/// `url` is folded in here.
pub fn signature_base_string(method: &str, url: &Url, parameters: &[(String, String)]) -> String {
    let mut all: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    all.extend(parameters.iter().cloned());
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&normalize_url(url)),
        percent_encode(&normalize_parameters(&all))
    )
}
