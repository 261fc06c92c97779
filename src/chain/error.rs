use thiserror::Error;

/// Errors surfaced to callers of the chain client.
///
/// Validation variants are raised before any network I/O. `ChainUnreachable`
/// and `ConfirmationTimeout` are the only ones worth retrying.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("chain unreachable: {0}")]
    ChainUnreachable(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no signing session: set a wallet before signing")]
    NoSigningSession,

    #[error("transaction {hash} rejected with code {code}: {raw_log}")]
    TransactionRejected {
        code: u32,
        raw_log: String,
        hash: String,
        gas_wanted: u64,
        gas_used: u64,
    },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("transaction {hash} was not included before the confirmation deadline")]
    ConfirmationTimeout { hash: String },

    #[error("malformed node response: {0}")]
    MalformedResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the caller may try the same operation again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::ChainUnreachable(_) | ClientError::ConfirmationTimeout { .. }
        )
    }
}

/// Failure of a single transport for a single call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,

    #[error("request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("grpc error: {0}")]
    Grpc(tonic::Status),

    #[error("node returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// The node answered and the answer is final; trying another transport
    /// would not change it.
    pub fn is_definitive(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }

    /// The request never left this process.
    pub fn is_unsent(&self) -> bool {
        matches!(self, TransportError::NotConnected)
    }
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::NotFound => TransportError::NotFound(status.message().to_string()),
            tonic::Code::DeadlineExceeded => TransportError::Timeout,
            _ => TransportError::Grpc(status),
        }
    }
}

impl From<prost::DecodeError> for TransportError {
    fn from(err: prost::DecodeError) -> Self {
        TransportError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
