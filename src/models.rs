use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Placeholder the market contract writes when a token has no bidder account.
pub const NO_BIDDER: &str = "accountbidder";
/// Placeholder for "no highest bid".
pub const NO_HIGHEST_BID: &str = "notienealtos";
/// Placeholder for "no lowest bid".
pub const NO_LOWEST_BID: &str = "notienebajos";

/// Indexer status code of a token listed for sale.
pub const STATUS_FOR_SALE: &str = "S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainKind {
    Evm,
    Near,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub label: &'static str,
    pub kind: ChainKind,
    pub currency: &'static str,
}

/// Ordered list of selectable chains. The persisted selection is an index into it.
pub static SUPPORTED_CHAINS: [ChainInfo; 3] = [
    ChainInfo {
        label: "Aurora",
        kind: ChainKind::Evm,
        currency: "ETH",
    },
    ChainInfo {
        label: "Polygon",
        kind: ChainKind::Evm,
        currency: "MATIC",
    },
    ChainInfo {
        label: "NEAR",
        kind: ChainKind::Near,
        currency: "NEAR",
    },
];

pub const DEFAULT_CHAIN_INDEX: usize = 2;

/// Label shown by the chain dropdown before anything was picked.
pub const UNSELECTED_CHAIN_LABEL: &str = "Blockchain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSelection {
    pub index: usize,
    /// Bumped on every switch so holders of an older selection can tell it is stale.
    pub generation: u64,
}

impl ChainSelection {
    pub fn info(&self) -> &'static ChainInfo {
        &SUPPORTED_CHAINS[self.index]
    }

    /// Resolves a persisted value. Missing, garbage, out of range and the
    /// placeholder label all fall back to the default chain.
    pub fn index_from_persisted(raw: Option<&str>) -> usize {
        match raw.map(str::trim) {
            None | Some(UNSELECTED_CHAIN_LABEL) => DEFAULT_CHAIN_INDEX,
            Some(value) => match value.parse::<usize>() {
                Ok(index) if index < SUPPORTED_CHAINS.len() => index,
                _ => DEFAULT_CHAIN_INDEX,
            },
        }
    }
}

/// A bid field that may hold the contract's "nothing here" placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidSlot {
    Empty,
    Value(String),
}

impl BidSlot {
    pub fn parse(raw: Option<&str>, sentinel: &str) -> Self {
        match raw {
            None => BidSlot::Empty,
            Some(value) if value.is_empty() || value == sentinel => BidSlot::Empty,
            Some(value) => BidSlot::Value(value.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, BidSlot::Empty)
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            BidSlot::Empty => None,
            BidSlot::Value(value) => Some(value),
        }
    }
}

/// Route key of a token: `"<tokenId>:<collectionId>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRef {
    pub token_id: String,
    pub collection_id: String,
}

impl TokenRef {
    pub fn new(token_id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            collection_id: collection_id.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, MarketError> {
        let mut parts = raw.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(token_id), Some(collection_id), None)
                if !token_id.is_empty() && !collection_id.is_empty() =>
            {
                Ok(Self::new(token_id, collection_id))
            }
            _ => Err(MarketError::InvalidTokenRef(raw.to_string())),
        }
    }
}

impl std::fmt::Display for TokenRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.token_id, self.collection_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub title: String,
    pub description: String,
    pub media: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenRef,
    pub owner: String,
    pub creator: String,
    pub contract: String,
    pub collection: String,
    pub metadata: TokenMetadata,
    /// Smallest unit of the chain the token was read from.
    pub price: U256,
    /// Decimals of `price`. Indexer rows are yocto, contract reads are wei.
    pub price_decimals: u32,
    pub on_sale: bool,
    pub bidder: BidSlot,
    pub highest_bid: BidSlot,
    pub lowest_bid: BidSlot,
}

impl Token {
    pub fn is_owned_by(&self, account: &str) -> bool {
        self.owner.to_uppercase() == account.to_uppercase()
    }

    pub fn has_active_offer(&self) -> bool {
        !self.highest_bid.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: u64,
    pub token_id: String,
    pub collection_id: String,
    pub contract: String,
    pub bidder: String,
    /// Smallest chain unit.
    pub price: U256,
}

/// What the view renders for progress and outcome of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub show: bool,
    pub title: String,
    pub message: String,
    pub loading: bool,
    pub disabled: bool,
}

impl Feedback {
    pub fn progress(title: &str, message: &str) -> Self {
        Self {
            show: true,
            title: title.to_string(),
            message: message.to_string(),
            loading: true,
            disabled: true,
        }
    }

    pub fn notice(title: &str, message: &str) -> Self {
        Self {
            show: true,
            title: title.to_string(),
            message: message.to_string(),
            loading: false,
            disabled: false,
        }
    }

    pub fn hidden() -> Self {
        Self::default()
    }
}
