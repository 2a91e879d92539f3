use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("no wallet session for {chain}")]
    NotSignedIn { chain: String },

    #[error("wallet is on chain {actual}, expected {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("transaction was not signed or was refused by the network: {0}")]
    SubmissionRejected(String),

    #[error("transaction reverted on chain: {0}")]
    CallReverted(String),

    #[error("timed out waiting for the transaction")]
    Timeout,

    #[error("the token owner cannot buy it back")]
    SelfPurchase,

    #[error("terms and conditions were not accepted")]
    TermsNotAccepted,

    #[error("the token has no active offer")]
    NoActiveOffer,

    #[error("indexer unavailable: {0}")]
    IndexerUnavailable(String),

    #[error("token not found")]
    NotFound,

    #[error("invalid amount `{0}`")]
    InvalidAmount(String),

    #[error("`{0}` is not a <tokenId>:<collectionId> reference")]
    InvalidTokenRef(String),

    #[error("price must be at least {minimum}")]
    PriceTooLow { minimum: String },

    #[error("an identical operation is already pending for this token")]
    OperationPending,

    #[error("{method} is not available on {chain}")]
    Unsupported { chain: String, method: String },

    #[error("settings store error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MarketError {
    /// Kinds that are handled locally instead of surfacing as a failure notice.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MarketError::NotSignedIn { .. } | MarketError::IndexerUnavailable(_)
        )
    }

    /// Text for the feedback channel. Revert reasons are not parsed, every
    /// chain-side failure gets the same retry notice.
    pub fn user_message(&self) -> String {
        match self {
            MarketError::SelfPurchase
            | MarketError::TermsNotAccepted
            | MarketError::NoActiveOffer
            | MarketError::PriceTooLow { .. }
            | MarketError::InvalidAmount(_)
            | MarketError::InvalidTokenRef(_)
            | MarketError::OperationPending
            | MarketError::Unsupported { .. }
            | MarketError::NotSignedIn { .. } => self.to_string(),
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}

impl From<mongodb::error::Error> for MarketError {
    fn from(err: mongodb::error::Error) -> Self {
        MarketError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for MarketError {
    fn from(err: reqwest::Error) -> Self {
        MarketError::IndexerUnavailable(err.to_string())
    }
}
