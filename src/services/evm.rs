use std::sync::Arc;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, MiddlewareError, Provider, ProviderError};
use ethers::types::{Address, U256};
use hex::encode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::EvmConfig;
use crate::error::MarketError;
use crate::models::{BidSlot, ChainInfo, Offer, Token, TokenMetadata, TokenRef};
use crate::services::adapter::{
    method_name, CallOutcome, ChainAdapter, ContractCall, MarketMethod, OnSubmitted,
};
use crate::services::indexer::MarketIndexer;
use crate::services::units::EVM_DECIMALS;
use crate::NativoMarket;

/// JSON blob the EVM contract keeps per token.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenData {
    title: String,
    description: String,
    image: String,
    creator: String,
    tags: Vec<String>,
}

pub struct EvmAdapter {
    chain: &'static ChainInfo,
    provider: Provider<Http>,
    market: Address,
    expected_chain_id: u64,
    wallet: RwLock<Option<LocalWallet>>,
}

impl EvmAdapter {
    pub fn new(
        chain: &'static ChainInfo,
        config: &EvmConfig,
        private_key: Option<&str>,
    ) -> Result<Self, MarketError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|err| MarketError::Config(format!("{} rpc url: {}", chain.label, err)))?;
        let market: Address = config
            .market_address
            .parse()
            .map_err(|err| MarketError::Config(format!("{} market address: {}", chain.label, err)))?;

        let wallet = match private_key {
            Some(key) => Some(
                key.parse::<LocalWallet>()
                    .map_err(|err| MarketError::Config(format!("EVM_PRIVATE_KEY: {}", err)))?
                    .with_chain_id(config.chain_id),
            ),
            None => None,
        };

        Ok(Self {
            chain,
            provider,
            market,
            expected_chain_id: config.chain_id,
            wallet: RwLock::new(wallet),
        })
    }

    fn reader(&self) -> NativoMarket<Provider<Http>> {
        NativoMarket::new(self.market, Arc::new(self.provider.clone()))
    }

    pub async fn total_supply(&self) -> Result<U256, MarketError> {
        self.reader()
            .total_supply()
            .call()
            .await
            .map_err(|err| MarketError::IndexerUnavailable(err.to_string()))
    }

    /// Reads a token straight from the contract, for chains without an indexer.
    pub async fn token_on_chain(&self, token_id: U256) -> Result<Token, MarketError> {
        if token_id >= self.total_supply().await? {
            return Err(MarketError::NotFound);
        }

        let contract = self.reader();
        let (id, price, on_sale, data): (U256, U256, bool, String) = contract
            .tokens_data(token_id)
            .call()
            .await
            .map_err(|err| MarketError::IndexerUnavailable(err.to_string()))?;
        let owner: Address = contract
            .owner_of(token_id)
            .call()
            .await
            .map_err(|err| MarketError::IndexerUnavailable(err.to_string()))?;

        let data: TokenData = serde_json::from_str(&data).unwrap_or_else(|err| {
            warn!(token = %id, error = %err, "token data is not valid json");
            TokenData::default()
        });

        Ok(Token {
            id: TokenRef::new(id.to_string(), "0"),
            owner: format_address(owner),
            creator: data.creator,
            contract: format_address(self.market),
            collection: self.chain.label.to_string(),
            metadata: TokenMetadata {
                title: data.title,
                description: data.description,
                media: data.image,
                tags: data.tags,
            },
            price,
            price_decimals: EVM_DECIMALS,
            on_sale,
            bidder: BidSlot::Empty,
            highest_bid: BidSlot::Empty,
            lowest_bid: BidSlot::Empty,
        })
    }
}

fn format_address(address: Address) -> String {
    format!("0x{}", encode(address.as_fixed_bytes()))
}

fn parse_u256(raw: &str, what: &str) -> Result<U256, MarketError> {
    U256::from_dec_str(raw).map_err(|_| MarketError::InvalidAmount(format!("{} `{}`", what, raw)))
}

fn timed_out(err: &ProviderError) -> bool {
    matches!(err, ProviderError::HTTPError(e) if e.is_timeout())
}

fn classify<M: Middleware>(err: ContractError<M>) -> MarketError {
    if err.is_revert() {
        return MarketError::CallReverted(err.to_string());
    }
    let provider = match &err {
        ContractError::MiddlewareError { e } => e.as_provider_error(),
        ContractError::ProviderError { e } => Some(e),
        _ => None,
    };
    if provider.is_some_and(timed_out) {
        MarketError::Timeout
    } else {
        // 4001 "user rejected", signer failures and nonce/funds refusals alike
        MarketError::SubmissionRejected(err.to_string())
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> &ChainInfo {
        self.chain
    }

    fn decimals(&self) -> u32 {
        EVM_DECIMALS
    }

    async fn is_signed_in(&self) -> bool {
        self.wallet.read().await.is_some()
    }

    async fn get_active_account(&self) -> Result<String, MarketError> {
        match self.wallet.read().await.as_ref() {
            Some(wallet) => Ok(format_address(wallet.address())),
            None => Err(MarketError::NotSignedIn {
                chain: self.chain.label.to_string(),
            }),
        }
    }

    async fn ensure_network(&self) -> Result<(), MarketError> {
        let actual = self
            .provider
            .get_chainid()
            .await
            .map_err(|err| MarketError::SubmissionRejected(format!("network unreachable: {}", err)))?
            .as_u64();

        if actual != self.expected_chain_id {
            return Err(MarketError::NetworkMismatch {
                expected: self.expected_chain_id,
                actual,
            });
        }
        Ok(())
    }

    async fn invoke(
        &self,
        call: ContractCall,
        on_submitted: OnSubmitted,
    ) -> Result<CallOutcome, MarketError> {
        let wallet = self
            .wallet
            .read()
            .await
            .clone()
            .ok_or_else(|| MarketError::NotSignedIn {
                chain: self.chain.label.to_string(),
            })?;

        let client = Arc::new(SignerMiddleware::new(self.provider.clone(), wallet));
        let contract = NativoMarket::new(self.market, client);
        let token_id = parse_u256(&call.payload.token_id, "token id")?;

        let tx = match call.method {
            MarketMethod::Buy => contract.comprar_nft(token_id).value(call.attached),
            MarketMethod::Sell => {
                let price = call
                    .payload
                    .price
                    .as_deref()
                    .ok_or_else(|| MarketError::InvalidAmount("missing price".to_string()))?;
                contract.revender(token_id, parse_u256(price, "price")?)
            }
            MarketMethod::CloseBid => {
                return Err(MarketError::Unsupported {
                    chain: self.chain.label.to_string(),
                    method: method_name(self.chain, call.method).to_string(),
                })
            }
        };

        let pending = tx.send().await.map_err(classify)?;
        let tx_hash = format!("{:?}", pending.tx_hash());
        info!(chain = self.chain.label, tx = %tx_hash, method = method_name(self.chain, call.method), "transaction submitted");
        on_submitted(Some(tx_hash.clone()));

        let receipt = pending.await.map_err(|err| {
            if timed_out(&err) {
                MarketError::Timeout
            } else {
                MarketError::SubmissionRejected(err.to_string())
            }
        })?;

        match receipt {
            None => {
                warn!(chain = self.chain.label, tx = %tx_hash, "transaction dropped from the mempool");
                Ok(CallOutcome {
                    success: false,
                    receipt: Some(tx_hash),
                })
            }
            Some(receipt) if receipt.status == Some(U64::from(1u64)) => Ok(CallOutcome {
                success: true,
                receipt: Some(tx_hash),
            }),
            Some(_) => Err(MarketError::CallReverted(tx_hash)),
        }
    }

    async fn sign_out(&self) {
        *self.wallet.write().await = None;
        info!(chain = self.chain.label, "wallet session cleared");
    }
}

/// Chains without a subgraph read tokens straight from the market contract.
/// The contract keeps no offer book.
#[async_trait]
impl MarketIndexer for EvmAdapter {
    async fn get_token(&self, token: &TokenRef) -> Result<Token, MarketError> {
        self.token_on_chain(parse_u256(&token.token_id, "token id")?).await
    }

    async fn get_offers(&self, _token: &TokenRef) -> Result<Vec<Offer>, MarketError> {
        Ok(Vec::new())
    }
}
