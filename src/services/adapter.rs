use async_trait::async_trait;
use ethers::types::U256;
use serde::Serialize;

use crate::error::MarketError;
use crate::models::{ChainInfo, Token};
use crate::services::units;

/// Market entry points every chain's contract offers in some form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketMethod {
    /// NEAR `market_buy_generic`, EVM `comprarNft`.
    Buy,
    /// NEAR `market_sell_generic`, EVM `revender`. Used for offers and relisting.
    Sell,
    /// NEAR `market_close_bid_generic`.
    CloseBid,
}

/// Arguments shared by the generic market methods. Serialized as-is into
/// the NEAR call; the EVM adapter only reads `token_id` and `price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketPayload {
    pub address_contract: String,
    pub token_id: String,
    pub collection: String,
    pub collection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
}

impl MarketPayload {
    pub fn for_token(token: &Token) -> Self {
        Self {
            address_contract: token.contract.clone(),
            token_id: token.id.token_id.clone(),
            collection: token.collection.clone(),
            collection_id: token.id.collection_id.clone(),
            price: None,
            status: None,
        }
    }

    pub fn with_price(mut self, price: U256) -> Self {
        self.price = Some(price.to_string());
        self
    }

    pub fn with_status(mut self, status: bool) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub method: MarketMethod,
    pub payload: MarketPayload,
    pub gas: u64,
    /// Smallest unit.
    pub attached: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub success: bool,
    /// Transaction hash, when the chain reported one.
    pub receipt: Option<String>,
}

/// Called by the adapter once the wallet has signed and the transaction is
/// on its way to the network.
pub type OnSubmitted = Box<dyn FnOnce(Option<String>) + Send>;

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> &ChainInfo;

    fn decimals(&self) -> u32;

    async fn is_signed_in(&self) -> bool;

    async fn get_active_account(&self) -> Result<String, MarketError>;

    async fn ensure_network(&self) -> Result<(), MarketError>;

    async fn invoke(
        &self,
        call: ContractCall,
        on_submitted: OnSubmitted,
    ) -> Result<CallOutcome, MarketError>;

    /// Drops the wallet session. Later calls fail with `NotSignedIn`.
    async fn sign_out(&self);

    fn to_smallest_unit(&self, display: &str) -> Result<U256, MarketError> {
        units::to_smallest_unit(display, self.decimals())
    }

    fn to_display_unit(&self, amount: U256) -> Result<String, MarketError> {
        units::to_display_unit(amount, self.decimals())
    }
}

pub fn method_name(chain: &ChainInfo, method: MarketMethod) -> &'static str {
    use crate::models::ChainKind;

    match (chain.kind, method) {
        (ChainKind::Near, MarketMethod::Buy) => "market_buy_generic",
        (ChainKind::Near, MarketMethod::Sell) => "market_sell_generic",
        (ChainKind::Near, MarketMethod::CloseBid) => "market_close_bid_generic",
        (ChainKind::Evm, MarketMethod::Buy) => "comprarNft",
        (ChainKind::Evm, MarketMethod::Sell) => "revender",
        (ChainKind::Evm, MarketMethod::CloseBid) => "closeBid",
    }
}
