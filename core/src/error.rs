//! Error taxonomy for the swap coordinator.
//!
//! Variants are grouped by the kinds from the error-handling design:
//! `Validation`, `Authorization`, `State`, `Cryptographic`, `ExternalFailure`,
//! and `Internal`. The grouping is informative only — there is a single flat
//! enum, not a type per kind — but [`Error::kind`] recovers it, which is what
//! the retry policy switches on.

use std::fmt;
use thiserror::Error;

/// Result type alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// The six error kinds from the error-handling design. `Validation`,
/// `Authorization`, `State`, and `Cryptographic` are surfaced immediately and
/// never retried automatically. `ExternalFailure` is retried with backoff.
/// `Internal` parks the swap for operator intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    Cryptographic,
    ExternalFailure,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Cryptographic => "cryptographic",
            ErrorKind::ExternalFailure => "external",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in the swap coordinator.
#[derive(Error, Debug)]
pub enum Error {
    // --- Validation ---
    #[error("title must be 1-100 bytes, got {0}")]
    InvalidTitle(usize),
    #[error("note must be at most 140 bytes, got {0}")]
    NoteTooLong(usize),
    #[error("metadata field exceeds 500 bytes: {0}")]
    InvalidMetadata(&'static str),
    #[error("buyer must differ from seller and be non-zero")]
    InvalidBuyer,
    #[error("hash commitment must be non-zero")]
    InvalidHash,
    #[error("price must be greater than zero")]
    InvalidPrice,
    #[error("expiry is less than the minimum 1h window from now")]
    ExpiryTooSoon,
    #[error("expiry exceeds the maximum 30d window from now")]
    ExpiryTooFar,
    #[error("duplicate token id {0}")]
    DuplicateTokenId(u64),
    #[error("duplicate swap hash {0}")]
    DuplicateHash(String),
    #[error("malformed hex: expected 64 lowercase hex digits")]
    MalformedHex,
    #[error("timelock buffer must be between 1h and 24h, got {0}s")]
    InvalidBuffer(u64),
    #[error("funding amount {actual} sats is below the expected {expected} sats")]
    InsufficientAmount { actual: u64, expected: u64 },

    // --- Authorization ---
    #[error("caller is not the token owner")]
    NotOwner,
    #[error("caller is not the escrow buyer")]
    NotBuyer,

    // --- State ---
    #[error("token {0} does not exist")]
    NoSuchToken(u64),
    #[error("token {0} metadata is frozen")]
    Frozen(u64),
    #[error("metadata is already frozen")]
    AlreadyFrozen,
    #[error("token {0} is currently in escrow")]
    InEscrow(u64),
    #[error("token {0} has no active escrow")]
    NotInEscrow(u64),
    #[error("escrow has expired")]
    Expired,
    #[error("refund is not yet available: expiry has not passed")]
    RefundNotYet,

    // --- Cryptographic ---
    #[error("secret does not hash to the expected commitment")]
    BadSecret,

    // --- ExternalFailure ---
    #[error("chain RPC unavailable: {0}")]
    RpcUnavailable(String),
    #[error("actuator call timed out after {0:?}")]
    ActuatorTimeout(std::time::Duration),
    #[error("ledger rejected operation: {0}")]
    LedgerRejected(String),
    #[error("failed to parse ledger response: {0}")]
    ParseFailure(String),
    #[error("chain reorg invalidated a previously observed transaction")]
    ChainReorg,
    #[error("persistent external failure after {attempts} attempts: {source}")]
    PersistentExternalFailure {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    // --- Internal ---
    #[error("secure RNG unavailable: {0}")]
    RngFailure(String),
    #[error("internal invariant violated: {0}")]
    Internal(String),

    // --- Generic passthrough (configuration / io) ---
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify this error into one of the six kinds from the error-handling
    /// design. Used by the retry policy to decide whether to retry.
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            InvalidTitle(_) | NoteTooLong(_) | InvalidMetadata(_) | InvalidBuyer | InvalidHash
            | InvalidPrice | ExpiryTooSoon | ExpiryTooFar | DuplicateTokenId(_)
            | DuplicateHash(_) | MalformedHex | InvalidBuffer(_)
            | InsufficientAmount { .. } => ErrorKind::Validation,

            NotOwner | NotBuyer => ErrorKind::Authorization,

            NoSuchToken(_) | Frozen(_) | AlreadyFrozen | InEscrow(_) | NotInEscrow(_)
            | Expired | RefundNotYet => ErrorKind::State,

            BadSecret => ErrorKind::Cryptographic,

            RpcUnavailable(_)
            | ActuatorTimeout(_)
            | LedgerRejected(_)
            | ParseFailure(_)
            | ChainReorg
            | PersistentExternalFailure { .. } => ErrorKind::ExternalFailure,

            RngFailure(_) | Internal(_) => ErrorKind::Internal,

            Config(_) | Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether the retry policy in the error-handling design (§7) considers
    /// this error retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ExternalFailure
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(format!("{:#}", err))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
