use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use near_gas::NearGas;

use crate::error::MarketError;
use crate::models::{ChainKind, SUPPORTED_CHAINS};

const DEFAULT_INDEXER_URL: &str =
    "https://api.thegraph.com/subgraphs/name/luisdaniel2166/nativojson";
const DEFAULT_NEAR_RPC_URL: &str = "https://rpc.testnet.near.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub indexer_url: String,
    pub mongo_uri: String,
    pub mongo_db: String,
    pub log_path: PathBuf,
    pub near: NearConfig,
    /// Keyed by chain label, only for EVM chains whose variables are set.
    pub evm: HashMap<&'static str, EvmConfig>,
    pub evm_private_key: Option<String>,
    pub market: MarketConstants,
}

#[derive(Debug, Clone)]
pub struct NearConfig {
    pub rpc_url: String,
    pub market_contract: String,
    pub account_id: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub market_address: String,
    pub chain_id: u64,
}

/// Protocol values the market contracts expect, in native display units.
#[derive(Debug, Clone)]
pub struct MarketConstants {
    pub min_offer: String,
    pub gas: NearGas,
    pub close_bid_stake: String,
}

impl Default for MarketConstants {
    fn default() -> Self {
        Self {
            min_offer: "0.1".to_string(),
            gas: NearGas::from_tgas(300),
            close_bid_stake: "0.05".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, MarketError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, MarketError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let near = NearConfig {
            rpc_url: lookup("NEAR_RPC_URL").unwrap_or_else(|| DEFAULT_NEAR_RPC_URL.to_string()),
            market_contract: lookup("NEAR_MARKET_CONTRACT").ok_or_else(|| {
                MarketError::Config("NEAR_MARKET_CONTRACT must be set".to_string())
            })?,
            account_id: lookup("NEAR_ACCOUNT_ID"),
            secret_key: lookup("NEAR_SECRET_KEY"),
        };

        let mut evm = HashMap::new();
        for chain in SUPPORTED_CHAINS.iter().filter(|c| c.kind == ChainKind::Evm) {
            let prefix = chain.label.to_uppercase();
            let rpc_url = lookup(&format!("{}_RPC_URL", prefix));
            let market_address = lookup(&format!("{}_MARKET_ADDRESS", prefix));
            let (Some(rpc_url), Some(market_address)) = (rpc_url, market_address) else {
                continue;
            };
            let chain_id_key = format!("{}_CHAIN_ID", prefix);
            let chain_id = lookup(&chain_id_key)
                .ok_or_else(|| MarketError::Config(format!("{} must be set", chain_id_key)))?
                .parse::<u64>()
                .map_err(|err| MarketError::Config(format!("{}: {}", chain_id_key, err)))?;
            evm.insert(
                chain.label,
                EvmConfig {
                    rpc_url,
                    market_address,
                    chain_id,
                },
            );
        }

        let mut market = MarketConstants::default();
        if let Some(min_offer) = lookup("MIN_OFFER") {
            market.min_offer = min_offer;
        }
        if let Some(stake) = lookup("CLOSE_BID_STAKE") {
            market.close_bid_stake = stake;
        }
        if let Some(tgas) = lookup("GAS_TGAS") {
            let tgas = tgas
                .parse::<u64>()
                .map_err(|err| MarketError::Config(format!("GAS_TGAS: {}", err)))?;
            market.gas = NearGas::from_tgas(tgas);
        }

        Ok(Self {
            indexer_url: lookup("INDEXER_URL").unwrap_or_else(|| DEFAULT_INDEXER_URL.to_string()),
            mongo_uri: lookup("MONGO_URI")
                .unwrap_or_else(|| "mongodb://localhost:27017".to_string()),
            mongo_db: lookup("MONGO_DB").unwrap_or_else(|| "nativo".to_string()),
            log_path: lookup("LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs/nativo.log")),
            near,
            evm,
            evm_private_key: lookup("EVM_PRIVATE_KEY"),
            market,
        })
    }

    pub fn evm_network(&self, label: &str) -> Result<&EvmConfig, MarketError> {
        self.evm.get(label).ok_or_else(|| {
            MarketError::Config(format!(
                "{0}_RPC_URL, {0}_MARKET_ADDRESS and {0}_CHAIN_ID must be set",
                label.to_uppercase()
            ))
        })
    }
}
