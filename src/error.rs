//! Error Types
//!
//! Error definitions for the CKB git remote helper. Nothing in this crate
//! retries on error; every variant propagates to the process boundary where
//! `main` logs it out-of-band and exits nonzero.

use thiserror::Error;

/// Helper error
#[derive(Error, Debug)]
pub enum HelperError {
    /// RPC connection error
    #[error("CKB RPC connection failed: {0}")]
    RpcConnection(String),

    /// RPC request error
    #[error("CKB RPC request failed: {0}")]
    RpcRequest(String),

    /// RPC response error
    #[error("CKB RPC response error: {message}")]
    RpcResponse { code: i32, message: String },

    /// No live repository cell exists for the queried type id
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// More than one live cell shares the repository type id
    #[error("repository state corrupted: {0}")]
    Corrupted(String),

    /// A predecessor transaction in the history chain is unreachable
    #[error("history chain broken: {0}")]
    BrokenChain(String),

    /// Owner funds cannot cover capacity plus fee
    #[error("insufficient funds: required {required} shannons, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// External signer failed to produce a signature
    #[error("signer failed: {0}")]
    SignerFailure(String),

    /// The node rejected a submitted transaction
    #[error("ledger rejected transaction: {0}")]
    SubmissionRejected(String),

    /// The consumed repository cell was already spent by a concurrent update
    #[error("repository cell already consumed by a concurrent update: {0}")]
    Conflict(String),

    /// A ref other than the single tracked branch was requested
    #[error("unsupported ref: {0}")]
    UnsupportedRef(String),

    /// Unrecognized or malformed remote-helper command
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Remote URL parsing error
    #[error("invalid remote url: {0}")]
    InvalidUrl(String),

    /// CKB address parsing error
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Serialization or deserialization error
    #[error("codec error: {0}")]
    Codec(String),

    /// Transaction building error
    #[error("transaction build failed: {0}")]
    TransactionBuild(String),

    /// Git subprocess error
    #[error("git error: {0}")]
    Git(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Helper result type
pub type HelperResult<T> = Result<T, HelperError>;

impl From<reqwest::Error> for HelperError {
    fn from(e: reqwest::Error) -> Self {
        HelperError::RpcConnection(e.to_string())
    }
}

impl From<serde_json::Error> for HelperError {
    fn from(e: serde_json::Error) -> Self {
        HelperError::Codec(e.to_string())
    }
}

impl From<hex::FromHexError> for HelperError {
    fn from(e: hex::FromHexError) -> Self {
        HelperError::Codec(format!("hex decode error: {}", e))
    }
}
