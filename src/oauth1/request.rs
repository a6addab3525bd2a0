//! Requests before and after signing.

use http::Method;
use rsa::RsaPrivateKey;
use url::Url;

use super::OAUTH_VERSION;
use super::base_string::signature_base_string;
use super::encoding::format_authorization_header;
use super::signing::{SignatureMethod, SigningSecrets, sign};
use super::types::Credentials;
use crate::errors::CryptoError;
use crate::nonce::OAuthNonce;
use crate::transport::DirectRequest;

/// Where the protocol parameters travel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParameterPlacement {
    #[default]
    AuthorizationHeader,
    QueryString,
    /// Form body; only possible for POST, other methods fall back to the query string
    FormBody,
}

/// A request to be signed
#[derive(Clone, Debug)]
pub struct OAuthRequest {
    pub method: Method,
    /// May carry query parameters; they are signed
    pub url: Url,
    /// Form body parameters; they are signed
    pub body: Vec<(String, String)>,
}

impl OAuthRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: Vec::new(),
        }
    }

    pub fn post(url: Url, body: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            body,
        }
    }
}

/// A request with its `oauth_*` parameters and signature attached
#[derive(Clone, Debug)]
pub struct SignedRequest {
    pub request: OAuthRequest,
    /// Protocol parameters including `oauth_signature`
    pub oauth_parameters: Vec<(String, String)>,
    pub base_string: String,
}

impl SignedRequest {
    pub fn signature(&self) -> Option<&str> {
        self.oauth_parameters
            .iter()
            .find(|(k, _)| k == "oauth_signature")
            .map(|(_, v)| v.as_str())
    }

    pub fn authorization_header(&self, realm: Option<&str>) -> String {
        format_authorization_header(&self.oauth_parameters, realm)
    }

    pub fn into_direct_request(self, placement: ParameterPlacement, realm: Option<&str>) -> DirectRequest {
        let is_post = self.request.method == Method::POST;
        match placement {
            ParameterPlacement::AuthorizationHeader => {
                let header = self.authorization_header(realm);
                with_body(self.request.method, self.request.url, self.request.body).with_header("Authorization", header)
            }
            ParameterPlacement::FormBody if is_post => {
                let mut body = self.request.body;
                body.extend(self.oauth_parameters);
                DirectRequest::post_form(self.request.url, body)
            }
            ParameterPlacement::QueryString | ParameterPlacement::FormBody => {
                let mut url = self.request.url;
                url.query_pairs_mut().extend_pairs(&self.oauth_parameters);
                with_body(self.request.method, url, self.request.body)
            }
        }
    }
}

/// Everything needed to sign a request on behalf of a consumer
#[derive(Clone, Copy)]
pub struct RequestSigner<'a> {
    pub consumer: &'a Credentials,
    /// Request or access token, absent when asking for a request token
    pub token: Option<&'a Credentials>,
    pub method: SignatureMethod,
    /// Required for RSA-SHA1
    pub rsa_private_key: Option<&'a RsaPrivateKey>,
}

impl RequestSigner<'_> {
    /// Attach the protocol parameters and `extra` (such as `oauth_callback` or
    /// `oauth_verifier`) to `request` and sign it.
    pub fn sign(
        &self,
        request: OAuthRequest,
        nonce: &OAuthNonce,
        extra: &[(&str, &str)],
    ) -> Result<SignedRequest, CryptoError> {
        let mut oauth_parameters: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer.token.clone()),
            ("oauth_signature_method".into(), self.method.as_str().into()),
            ("oauth_timestamp".into(), nonce.timestamp.to_string()),
            ("oauth_nonce".into(), nonce.nonce.clone()),
            ("oauth_version".into(), OAUTH_VERSION.into()),
        ];
        if let Some(token) = self.token {
            oauth_parameters.push(("oauth_token".into(), token.token.clone()));
        }
        oauth_parameters.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let signed_parameters: Vec<(String, String)> = oauth_parameters
            .iter()
            .chain(request.body.iter())
            .cloned()
            .collect();
        let base_string = signature_base_string(request.method.as_str(), &request.url, &signed_parameters);

        let secrets = SigningSecrets {
            rsa_private_key: self.rsa_private_key,
            ..SigningSecrets::shared(
                &self.consumer.secret,
                self.token.map(|t| t.secret.as_str()).unwrap_or_default(),
            )
        };
        let signature = sign(self.method, &base_string, secrets)?;
        oauth_parameters.push(("oauth_signature".into(), signature));

        Ok(SignedRequest {
            request,
            oauth_parameters,
            base_string,
        })
    }
}

fn with_body(method: Method, url: Url, body: Vec<(String, String)>) -> DirectRequest {
    if body.is_empty() {
        DirectRequest {
            method,
            ..DirectRequest::get(url)
        }
    } else {
        DirectRequest {
            method,
            ..DirectRequest::post_form(url, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(method: Method, body: Vec<(String, String)>) -> SignedRequest {
        SignedRequest {
            request: OAuthRequest {
                method,
                url: Url::parse("https://sp.example.com/photos?size=large").unwrap(),
                body,
            },
            oauth_parameters: vec![
                ("oauth_consumer_key".into(), "ck".into()),
                ("oauth_signature".into(), "s/g=".into()),
            ],
            base_string: String::new(),
        }
    }

    #[test]
    fn test_header_placement() {
        let request = signed(Method::GET, vec![]).into_direct_request(ParameterPlacement::AuthorizationHeader, None);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.query(), Some("size=large"));
        assert_eq!(
            request.header("authorization"),
            Some(r#"OAuth oauth_consumer_key="ck", oauth_signature="s%2Fg%3D""#)
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn test_query_and_form_placement() {
        let request = signed(Method::GET, vec![]).into_direct_request(ParameterPlacement::FormBody, None);
        assert_eq!(
            request.url.query(),
            Some("size=large&oauth_consumer_key=ck&oauth_signature=s%2Fg%3D")
        );

        let request = signed(Method::POST, vec![("title".into(), "x".into())])
            .into_direct_request(ParameterPlacement::FormBody, None);
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.form_parameters(),
            vec![
                ("title".to_string(), "x".to_string()),
                ("oauth_consumer_key".to_string(), "ck".to_string()),
                ("oauth_signature".to_string(), "s/g=".to_string()),
            ]
        );
        assert!(request.header("authorization").is_none());
    }

    #[test]
    fn test_plaintext_signer_covers_token_secret() {
        let consumer = Credentials::new("ck", "c s");
        let token = Credentials::new("at", "ts");
        let signer = RequestSigner {
            consumer: &consumer,
            token: Some(&token),
            method: SignatureMethod::Plaintext,
            rsa_private_key: None,
        };
        let request = OAuthRequest::get(Url::parse("https://sp.example.com/photos").unwrap());
        let signed = signer
            .sign(request, &OAuthNonce::new("abcdefgh", 1234567890), &[("oauth_verifier", "v")])
            .unwrap();
        assert_eq!(signed.signature(), Some("c%20s&ts"));
        assert!(
            signed
                .oauth_parameters
                .iter()
                .any(|(k, v)| k == "oauth_verifier" && v == "v")
        );
        assert!(signed.base_string.starts_with("GET&https%3A%2F%2Fsp.example.com%2Fphotos&"));
    }
}
