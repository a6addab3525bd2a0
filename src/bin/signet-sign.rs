//! signet OAuth 1.0a signing tool
//!
//! Signs a request the way a consumer would and prints the signature base
//! string, the signature and the `Authorization` header. With `--send` the
//! signed request is also sent and the response printed.
//!
//! ## Usage
//!
//! ```bash
//! signet-sign --consumer-key ck --consumer-secret cs \
//!   --token rt --token-secret rts \
//!   --nonce abcdefgh --timestamp 1234567890 \
//!   "http://example.com/resource?foo=bar"
//!
//! signet-sign --method POST --consumer-key ck --consumer-secret cs \
//!   --param title=holiday --placement body --send \
//!   https://sp.example.com/photos
//! ```
//!
//! Exit codes:
//! - 0: Success
//! - 1: Invalid arguments or unreadable key file
//! - 2: Signing failed
//! - 3: The request was sent and the Service Provider refused it

use clap::{Parser, ValueEnum};
use http::Method;
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use signet::errors::{CryptoError, ProtocolError, TransportError};
use signet::nonce::OAuthNonce;
use signet::oauth1::{Credentials, OAuthRequest, ParameterPlacement, RequestSigner, SignatureMethod};
use signet::transport::{ReqwestTransport, send_direct};

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Signing(#[from] CryptoError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Service Provider answered {0}")]
    Refused(u16),
}

/// Where the protocol parameters travel
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Placement {
    /// Authorization header
    Header,
    /// Query string
    Query,
    /// Form body (POST only)
    Body,
}

impl From<Placement> for ParameterPlacement {
    fn from(placement: Placement) -> Self {
        match placement {
            Placement::Header => ParameterPlacement::AuthorizationHeader,
            Placement::Query => ParameterPlacement::QueryString,
            Placement::Body => ParameterPlacement::FormBody,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "signet-sign",
    about = "Sign an OAuth 1.0a request and print the result",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Request URL; query parameters are signed
    url: Url,

    #[arg(long, default_value = "GET", help = "HTTP method")]
    method: Method,

    #[arg(long)]
    consumer_key: String,

    #[arg(long, default_value = "")]
    consumer_secret: String,

    #[arg(long, help = "Request or access token")]
    token: Option<String>,

    #[arg(long, default_value = "")]
    token_secret: String,

    #[arg(long, default_value = "HMAC-SHA1", help = "HMAC-SHA1, PLAINTEXT or RSA-SHA1")]
    signature_method: String,

    #[arg(long, help = "PKCS#8 PEM private key for RSA-SHA1")]
    rsa_key: Option<PathBuf>,

    #[arg(long, help = "Fixed nonce instead of a random one")]
    nonce: Option<String>,

    #[arg(long, help = "Fixed timestamp in seconds since the epoch")]
    timestamp: Option<i64>,

    #[arg(long = "param", value_name = "NAME=VALUE", help = "Form body parameter, repeatable")]
    params: Vec<String>,

    #[arg(long = "oauth", value_name = "NAME=VALUE", help = "Extra protocol parameter such as oauth_callback or oauth_verifier")]
    oauth_params: Vec<String>,

    #[arg(long)]
    realm: Option<String>,

    #[arg(long, value_enum, default_value = "header")]
    placement: Placement,

    #[arg(long, help = "Send the signed request and print the response")]
    send: bool,

    #[arg(long, default_value = "10", help = "Timeout in seconds for --send")]
    timeout: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => process::exit(0),
        Err(err @ AppError::Usage(_)) | Err(err @ AppError::Protocol(_)) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
        Err(err @ AppError::Signing(_)) => {
            eprintln!("Error: {err}");
            process::exit(2);
        }
        Err(err @ AppError::Transport(_)) | Err(err @ AppError::Refused(_)) => {
            eprintln!("Error: {err}");
            process::exit(3);
        }
    }
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    let method: SignatureMethod = cli.signature_method.parse()?;
    let rsa_private_key = cli.rsa_key.as_deref().map(read_private_key).transpose()?;
    if method == SignatureMethod::RsaSha1 && rsa_private_key.is_none() {
        return Err(AppError::Usage("RSA-SHA1 needs --rsa-key".into()));
    }

    let consumer = Credentials::new(cli.consumer_key.clone(), cli.consumer_secret.clone());
    let token = cli
        .token
        .as_ref()
        .map(|token| Credentials::new(token.clone(), cli.token_secret.clone()));
    let signer = RequestSigner {
        consumer: &consumer,
        token: token.as_ref(),
        method,
        rsa_private_key: rsa_private_key.as_ref(),
    };

    let body = cli
        .params
        .iter()
        .map(|param| split_pair(param).map(|(k, v)| (k.to_string(), v.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    let extra = cli
        .oauth_params
        .iter()
        .map(|param| split_pair(param))
        .collect::<Result<Vec<_>, _>>()?;

    let generated = OAuthNonce::generate();
    let nonce = OAuthNonce::new(
        cli.nonce.clone().unwrap_or(generated.nonce),
        cli.timestamp.unwrap_or(generated.timestamp),
    );

    let request = OAuthRequest {
        method: cli.method.clone(),
        url: cli.url.clone(),
        body,
    };
    let signed = signer.sign(request, &nonce, &extra)?;

    println!("base string: {}", signed.base_string);
    println!("signature: {}", signed.signature().unwrap_or_default());
    println!("Authorization: {}", signed.authorization_header(cli.realm.as_deref()));

    if !cli.send {
        return Ok(());
    }

    let timeout = Duration::from_secs(cli.timeout);
    let transport = ReqwestTransport::build(concat!("signet-sign/", env!("CARGO_PKG_VERSION")), timeout)?;
    let request = signed.into_direct_request(cli.placement.into(), cli.realm.as_deref());
    let response = send_direct(&transport, request, timeout, &CancellationToken::new()).await?;

    println!();
    println!("status: {}", response.status);
    println!("{}", String::from_utf8_lossy(&response.body));
    if (200..300).contains(&response.status) {
        Ok(())
    } else {
        Err(AppError::Refused(response.status))
    }
}

fn read_private_key(path: &Path) -> Result<RsaPrivateKey, AppError> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| AppError::Usage(format!("cannot read {}: {e}", path.display())))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .map_err(|e| AppError::Usage(format!("invalid private key in {}: {e}", path.display())))
}

fn split_pair(value: &str) -> Result<(&str, &str), AppError> {
    value
        .split_once('=')
        .ok_or_else(|| AppError::Usage(format!("expected NAME=VALUE, got {value}")))
}
