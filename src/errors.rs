//! Standardized error types following the `error-signet-<domain>-<number>` format.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-signet-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-signet-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-signet-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-signet-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when boolean string cannot be parsed
    #[error(
        "error-signet-config-5 Failed to parse boolean '{0}': expected true/false/1/0/yes/no/on/off"
    )]
    BoolParsingFailed(String),

    /// Error when an integer setting cannot be parsed
    #[error("error-signet-config-6 Failed to parse integer '{0}': {1}")]
    IntegerParsingFailed(String, std::num::ParseIntError),

    /// Error when a URL setting cannot be parsed
    #[error("error-signet-config-7 Invalid URL '{0}': {1}")]
    InvalidUrl(String, url::ParseError),

    /// Error when the hash bit length range is empty or unsupported
    #[error("error-signet-config-8 Invalid hash bit length range: {0}")]
    InvalidHashBitLength(String),
}

/// HTTP server errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Error when template rendering fails
    #[error("error-signet-http-1 Template rendering failed: {0}")]
    TemplateRenderingFailed(String),

    /// Error when request processing fails
    #[error("error-signet-http-2 Request processing failed: {0}")]
    RequestProcessingFailed(String),
}

/// Structural problems with an incoming or outgoing protocol message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A required parameter is absent
    #[error("error-signet-protocol-1 Missing required parameter: {0}")]
    MissingParameter(String),

    /// A parameter is present but its value is unusable
    #[error("error-signet-protocol-2 Invalid value for parameter {0}: {1}")]
    InvalidParameter(String, String),

    /// The `mode` parameter names something this endpoint does not handle
    #[error("error-signet-protocol-3 Unsupported mode: {0}")]
    UnsupportedMode(String),

    /// A secure channel is required for this exchange
    #[error("error-signet-protocol-4 Insecure transport: {0}")]
    InsecureTransport(String),

    /// Unknown or disallowed association type
    #[error("error-signet-protocol-5 Unsupported association type: {0}")]
    UnsupportedAssociationType(String),

    /// Unknown or disallowed session type
    #[error("error-signet-protocol-6 Unsupported session type: {0}")]
    UnsupportedSessionType(String),

    /// Session hash length does not match the association secret length
    #[error("error-signet-protocol-7 Session type {0} cannot carry association type {1}")]
    SessionTypeMismatch(String, String),

    /// Key-Value Form input or output is malformed
    #[error("error-signet-protocol-8 Malformed Key-Value Form: {0}")]
    MalformedKeyValueForm(String),

    /// A field that must be covered by the signature is not listed in `signed`
    #[error("error-signet-protocol-9 Required parameter is not signed: {0}")]
    UnsignedRequiredParameter(String),

    /// Unknown OAuth signature method
    #[error("error-signet-protocol-10 Unsupported signature method: {0}")]
    UnsupportedSignatureMethod(String),

    /// The message namespace is not a recognized protocol version
    #[error("error-signet-protocol-11 Unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    /// A Diffie-Hellman parameter or public value is out of range
    #[error("error-signet-protocol-12 Invalid Diffie-Hellman value: {0}")]
    InvalidDiffieHellmanValue(String),

    /// The message could not be decoded at all
    #[error("error-signet-protocol-13 Malformed message: {0}")]
    MalformedMessage(String),
}

/// Signature verification failure, without detail
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("error-signet-signature-1 Signature verification failed")]
    Invalid,
}

/// Nonce rejection and nonce storage failures
#[derive(Debug, Error)]
pub enum NonceError {
    /// The nonce timestamp is outside the accepted window
    #[error("error-signet-nonce-1 Nonce expired")]
    Expired,

    /// The nonce has already been used in this context
    #[error("error-signet-nonce-2 Nonce replayed")]
    Replayed,

    /// The nonce could not be parsed
    #[error("error-signet-nonce-3 Malformed nonce: {0}")]
    Malformed(String),

    /// The nonce store failed
    #[error("error-signet-nonce-4 Nonce storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Association lifecycle errors
#[derive(Debug, Error)]
pub enum AssociationError {
    /// No usable association for the handle
    #[error("error-signet-association-1 Association not found: {0}")]
    NotFound(String),

    /// The association has expired and cannot sign
    #[error("error-signet-association-2 Association expired: {0}")]
    Expired(String),

    /// Secret length does not match the association algorithm
    #[error("error-signet-association-3 Secret length {1} does not match expected length {0}")]
    SecretLengthMismatch(usize, usize),

    /// Expiration is not after issuance
    #[error("error-signet-association-4 Association must expire after it is issued")]
    InvalidLifetime,

    /// Handle is empty, too long or contains non-printable characters
    #[error("error-signet-association-5 Invalid association handle: {0}")]
    InvalidHandle(String),

    /// A self-encoded handle failed decryption or authentication
    #[error("error-signet-association-6 Association handle could not be decoded: {0}")]
    Undecodable(String),

    /// A self-encoded handle was issued for the other usage
    #[error("error-signet-association-7 Association handle usage mismatch: {0}")]
    UsageMismatch(String),

    #[error("error-signet-association-8 Association crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("error-signet-association-9 Association payload invalid: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("error-signet-association-10 Association storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Cryptographic primitive failures
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key had an unusable length
    #[error("error-signet-crypto-1 Invalid key length: {0}")]
    InvalidKeyLength(String),

    /// Symmetric encryption failed
    #[error("error-signet-crypto-2 Encryption failed")]
    EncryptionFailed,

    /// Symmetric decryption or authentication failed
    #[error("error-signet-crypto-3 Decryption failed")]
    DecryptionFailed,

    /// RSA signing failed or no RSA key was configured
    #[error("error-signet-crypto-4 RSA operation failed: {0}")]
    RsaFailed(String),

    /// An internal invariant did not hold
    #[error("error-signet-crypto-5 Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Outbound HTTP failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be completed
    #[error("error-signet-transport-1 Request failed: {0}")]
    RequestFailed(String),

    /// The request did not complete within the configured bound
    #[error("error-signet-transport-2 Request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request
    #[error("error-signet-transport-3 Request cancelled")]
    Cancelled,

    /// The counterparty answered with a status the exchange cannot use
    #[error("error-signet-transport-4 Unexpected response status {0}")]
    UnexpectedStatus(u16),

    /// The response body could not be read
    #[error("error-signet-transport-5 Invalid response body: {0}")]
    InvalidResponse(String),
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when a store lock cannot be acquired
    #[error("error-signet-storage-1 Lock error: {0}")]
    LockFailed(String),

    /// Error when data validation fails
    #[error("error-signet-storage-2 Invalid data: {0}")]
    InvalidData(String),

    /// Error when requested resource is not found
    #[error("error-signet-storage-3 Not found: {0}")]
    NotFound(String),

    /// Error when the configured backend is not available
    #[error("error-signet-storage-4 Unsupported storage backend: {0}")]
    UnsupportedBackend(String),
}

/// Provider-side request processing errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("error-signet-provider-1 {0}")]
    Protocol(#[from] ProtocolError),

    #[error("error-signet-provider-2 {0}")]
    Nonce(#[from] NonceError),

    #[error("error-signet-provider-3 {0}")]
    Association(#[from] AssociationError),

    #[error("error-signet-provider-4 {0}")]
    Crypto(#[from] CryptoError),

    #[error("error-signet-provider-5 {0}")]
    Storage(#[from] StorageError),

    /// Response requested before the host made an authentication decision
    #[error("error-signet-provider-6 Response is not ready")]
    ResponseNotReady,

    /// Response requested a second time
    #[error("error-signet-provider-7 Response already sent")]
    ResponseAlreadySent,

    /// A provider behavior refused the request
    #[error("error-signet-provider-8 Request rejected: {0}")]
    Rejected(String),
}

/// Consumer and relying party errors.
///
/// `Transport` means the counterparty could not be reached; every other
/// variant means it answered but the answer cannot be trusted or used.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("error-signet-consumer-1 {0}")]
    Transport(#[from] TransportError),

    #[error("error-signet-consumer-2 {0}")]
    Signature(#[from] SignatureError),

    #[error("error-signet-consumer-3 {0}")]
    Protocol(#[from] ProtocolError),

    #[error("error-signet-consumer-4 {0}")]
    Nonce(#[from] NonceError),

    #[error("error-signet-consumer-5 {0}")]
    Storage(#[from] StorageError),

    #[error("error-signet-consumer-6 {0}")]
    Crypto(#[from] CryptoError),

    #[error("error-signet-consumer-7 {0}")]
    Association(#[from] AssociationError),

    /// No temporary credential was saved before the callback arrived
    #[error("error-signet-consumer-8 No temporary credential is pending")]
    MissingTemporaryCredential,

    /// Callback token differs from the saved temporary credential
    #[error("error-signet-consumer-9 Token mismatch: {0}")]
    TokenMismatch(String),

    /// The remote party answered with an explicit error message
    #[error("error-signet-consumer-10 Remote party reported an error: {0}")]
    RemoteError(String),

    /// The assertion answers no request this relying party made
    #[error("error-signet-consumer-11 Assertion was not solicited by this relying party")]
    UnsolicitedAssertion,
}

/// OAuth 1.0a Service Provider errors
#[derive(Debug, Error)]
pub enum ServiceProviderError {
    #[error("error-signet-service-provider-1 Unknown consumer: {0}")]
    UnknownConsumer(String),

    #[error("error-signet-service-provider-2 Invalid token: {0}")]
    InvalidToken(String),

    #[error("error-signet-service-provider-3 Verifier mismatch")]
    VerifierMismatch,

    #[error("error-signet-service-provider-4 {0}")]
    Signature(#[from] SignatureError),

    #[error("error-signet-service-provider-5 {0}")]
    Nonce(#[from] NonceError),

    #[error("error-signet-service-provider-6 {0}")]
    Protocol(#[from] ProtocolError),

    #[error("error-signet-service-provider-7 {0}")]
    Storage(#[from] StorageError),

    #[error("error-signet-service-provider-8 {0}")]
    Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, HttpError>;

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self, "internal server error");
        (StatusCode::INTERNAL_SERVER_ERROR).into_response()
    }
}
