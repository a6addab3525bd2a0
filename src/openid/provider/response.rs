//! Provider responses, ready for the HTTP layer to send.

use url::Url;

use crate::errors::ProtocolError;
use crate::openid::key_value_form::Conformance;
use crate::openid::message::Message;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderResponse {
    /// Key-Value Form body answering a direct request
    Direct { status: u16, body: String },
    /// 302 to the relying party
    Redirect { location: Url },
    /// Auto-submitted HTML form, for messages too large for a URL
    FormPost {
        action: Url,
        fields: Vec<(String, String)>,
    },
}

impl ProviderResponse {
    pub fn direct(status: u16, message: &Message) -> Result<Self, ProtocolError> {
        Ok(ProviderResponse::Direct {
            status,
            body: message.to_key_value_form()?,
        })
    }

    /// Deliver `message` to `target` by redirect, or by form post once the
    /// URL would exceed `threshold` bytes.
    pub fn indirect(target: &Url, message: &Message, threshold: usize) -> Self {
        let location = message.to_url(target);
        if location.as_str().len() <= threshold {
            ProviderResponse::Redirect { location }
        } else {
            ProviderResponse::FormPost {
                action: target.clone(),
                fields: message.to_parameters(),
            }
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ProviderResponse::Direct { status, .. } => *status,
            ProviderResponse::Redirect { .. } => 302,
            ProviderResponse::FormPost { .. } => 200,
        }
    }

    /// The OpenID message carried by this response
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        match self {
            ProviderResponse::Direct { body, .. } => Message::from_key_value_form(body, Conformance::OpenId20),
            ProviderResponse::Redirect { location } => Message::from_parameters(location.query_pairs()),
            ProviderResponse::FormPost { fields, .. } => Message::from_parameters(fields.clone()),
        }
    }
}
