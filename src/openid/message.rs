//! OpenID message model and the declarative field schemas for each message type.
//!
//! Fields are held without the `openid.` prefix. The prefix is added when a
//! message is rendered as URL or form parameters and omitted in Key-Value Form.

use base64::{Engine, prelude::BASE64_STANDARD};
use std::collections::BTreeMap;
use url::Url;

use super::key_value_form::{self, Conformance};
use super::protocol::{Mode, PARAMETER_PREFIX, ProtocolVersion};
use crate::errors::ProtocolError;

/// How a field value is validated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Url,
    Integer,
    Base64,
}

/// One row of a message schema
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Required from `min_version` onward
    pub required: bool,
    /// First version in which the field exists
    pub min_version: ProtocolVersion,
    pub kind: FieldKind,
}

const fn field(
    name: &'static str,
    required: bool,
    min_version: ProtocolVersion,
    kind: FieldKind,
) -> FieldSpec {
    FieldSpec {
        name,
        required,
        min_version,
        kind,
    }
}

use FieldKind::{Base64, Integer, Text, Url as UrlField};
use ProtocolVersion::{V1_1, V2_0};

pub const ASSOCIATE_REQUEST: &[FieldSpec] = &[
    field("ns", true, V2_0, Text),
    field("mode", true, V1_1, Text),
    field("assoc_type", true, V1_1, Text),
    field("dh_modulus", false, V1_1, Base64),
    field("dh_gen", false, V1_1, Base64),
    field("dh_consumer_public", false, V1_1, Base64),
];

pub const ASSOCIATE_SUCCESS_RESPONSE: &[FieldSpec] = &[
    field("assoc_handle", true, V1_1, Text),
    field("assoc_type", true, V1_1, Text),
    field("expires_in", true, V1_1, Integer),
    field("mac_key", false, V1_1, Base64),
    field("dh_server_public", false, V1_1, Base64),
    field("enc_mac_key", false, V1_1, Base64),
];

pub const CHECKID_REQUEST: &[FieldSpec] = &[
    field("ns", true, V2_0, Text),
    field("mode", true, V1_1, Text),
    field("claimed_id", false, V2_0, Text),
    field("identity", false, V1_1, Text),
    field("assoc_handle", false, V1_1, Text),
    field("return_to", true, V1_1, UrlField),
    field("realm", false, V2_0, Text),
    field("trust_root", false, V1_1, Text),
];

pub const POSITIVE_ASSERTION: &[FieldSpec] = &[
    field("ns", true, V2_0, Text),
    field("mode", true, V1_1, Text),
    field("op_endpoint", true, V2_0, UrlField),
    field("claimed_id", false, V2_0, Text),
    field("identity", false, V1_1, Text),
    field("return_to", true, V1_1, UrlField),
    field("response_nonce", true, V2_0, Text),
    field("invalidate_handle", false, V1_1, Text),
    field("assoc_handle", true, V1_1, Text),
    field("signed", true, V1_1, Text),
    field("sig", true, V1_1, Base64),
];

/// Whether `name` is one of the protocol fields of a positive assertion
pub fn is_assertion_field(name: &str) -> bool {
    POSITIVE_ASSERTION.iter().any(|spec| spec.name == name)
}

pub const CHECK_AUTHENTICATION_RESPONSE: &[FieldSpec] = &[
    field("is_valid", true, V1_1, Text),
    field("invalidate_handle", false, V1_1, Text),
];

pub const ERROR_RESPONSE: &[FieldSpec] = &[
    field("error", true, V1_1, Text),
    field("error_code", false, V2_0, Text),
    field("reference", false, V2_0, Text),
    field("contact", false, V2_0, Text),
];

/// An OpenID message
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    fields: BTreeMap<String, String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a message in the given version and mode
    pub fn with_mode(version: ProtocolVersion, mode: Mode) -> Self {
        let mut message = Self::new();
        if let Some(namespace) = version.namespace() {
            message.set("ns", namespace);
        }
        message.set("mode", mode.as_str());
        message
    }

    /// Collect `openid.`-prefixed parameters, ignoring everything else.
    ///
    /// A parameter repeated with different values is malformed.
    pub fn from_parameters<I, K, V>(parameters: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut message = Self::new();
        for (key, value) in parameters {
            let Some(name) = key.as_ref().strip_prefix(PARAMETER_PREFIX) else {
                continue;
            };
            let value = value.into();
            match message.fields.get(name) {
                Some(existing) if *existing != value => {
                    return Err(ProtocolError::MalformedMessage(format!(
                        "parameter {PARAMETER_PREFIX}{name} repeated"
                    )));
                }
                _ => {
                    message.fields.insert(name.to_string(), value);
                }
            }
        }
        Ok(message)
    }

    /// Parse a Key-Value Form direct response body
    pub fn from_key_value_form(body: &str, conformance: Conformance) -> Result<Self, ProtocolError> {
        let pairs = key_value_form::decode(body, conformance)?;
        Ok(Self {
            fields: pairs.into_iter().collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, ProtocolError> {
        self.get(name)
            .ok_or_else(|| ProtocolError::MissingParameter(format!("{PARAMETER_PREFIX}{name}")))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn version(&self) -> Result<ProtocolVersion, ProtocolError> {
        ProtocolVersion::detect(self.get("ns"))
    }

    pub fn mode(&self) -> Result<Mode, ProtocolError> {
        self.require("mode")?.parse()
    }

    /// Fields with the `openid.` prefix, for query strings and form bodies
    pub fn to_parameters(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| (format!("{PARAMETER_PREFIX}{k}"), v.clone()))
            .collect()
    }

    /// Direct response body
    pub fn to_key_value_form(&self) -> Result<String, ProtocolError> {
        key_value_form::encode(self.iter())
    }

    /// `base` with this message appended to its query string
    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.query_pairs_mut().extend_pairs(self.to_parameters());
        url
    }

    /// Check the message against a schema for its version.
    pub fn validate(&self, schema: &[FieldSpec], version: ProtocolVersion) -> Result<(), ProtocolError> {
        for spec in schema {
            let applies = version >= spec.min_version;
            match self.get(spec.name) {
                None if spec.required && applies => {
                    return Err(ProtocolError::MissingParameter(format!(
                        "{PARAMETER_PREFIX}{}",
                        spec.name
                    )));
                }
                None => {}
                Some(value) => validate_kind(spec, value)?,
            }
        }
        Ok(())
    }
}

fn validate_kind(spec: &FieldSpec, value: &str) -> Result<(), ProtocolError> {
    let invalid = |reason: String| {
        ProtocolError::InvalidParameter(format!("{PARAMETER_PREFIX}{}", spec.name), reason)
    };
    match spec.kind {
        FieldKind::Text => Ok(()),
        FieldKind::Url => Url::parse(value).map(|_| ()).map_err(|e| invalid(e.to_string())),
        FieldKind::Integer => value.parse::<u64>().map(|_| ()).map_err(|e| invalid(e.to_string())),
        FieldKind::Base64 => BASE64_STANDARD
            .decode(value)
            .map(|_| ())
            .map_err(|e| invalid(e.to_string())),
    }
}
