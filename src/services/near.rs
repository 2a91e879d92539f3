use std::str::FromStr;

use async_trait::async_trait;
use near_crypto::{InMemorySigner, SecretKey, Signer};
use near_jsonrpc_client::{methods, JsonRpcClient};
use near_jsonrpc_primitives::types::query::QueryResponseKind;
use near_jsonrpc_primitives::types::transactions::RpcTransactionError;
use near_primitives::hash::CryptoHash;
use near_primitives::transaction::{Action, FunctionCallAction, Transaction, TransactionV0};
use near_primitives::types::{AccountId, BlockReference, Finality};
use near_primitives::views::{FinalExecutionStatus, QueryRequest, TxExecutionStatus};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::NearConfig;
use crate::error::MarketError;
use crate::models::ChainInfo;
use crate::services::adapter::{method_name, CallOutcome, ChainAdapter, ContractCall, OnSubmitted};
use crate::services::units::NEAR_DECIMALS;

#[derive(Clone)]
struct NearSession {
    account_id: AccountId,
    signer: Signer,
}

pub struct NearAdapter {
    chain: &'static ChainInfo,
    client: JsonRpcClient,
    market: AccountId,
    session: RwLock<Option<NearSession>>,
}

impl NearAdapter {
    pub fn new(chain: &'static ChainInfo, config: &NearConfig) -> Result<Self, MarketError> {
        let market = AccountId::from_str(&config.market_contract)
            .map_err(|err| MarketError::Config(format!("NEAR_MARKET_CONTRACT: {}", err)))?;

        let session = match (&config.account_id, &config.secret_key) {
            (Some(account_id), Some(secret_key)) => {
                let account_id = AccountId::from_str(account_id)
                    .map_err(|err| MarketError::Config(format!("NEAR_ACCOUNT_ID: {}", err)))?;
                let secret_key = SecretKey::from_str(secret_key)
                    .map_err(|err| MarketError::Config(format!("NEAR_SECRET_KEY: {}", err)))?;
                let signer = InMemorySigner::from_secret_key(account_id.clone(), secret_key);
                Some(NearSession { account_id, signer })
            }
            (None, None) => None,
            _ => {
                return Err(MarketError::Config(
                    "NEAR_ACCOUNT_ID and NEAR_SECRET_KEY must be set together".to_string(),
                ))
            }
        };

        info!(rpc = %config.rpc_url, market = %market, "near adapter ready");

        Ok(Self {
            chain,
            client: JsonRpcClient::connect(&config.rpc_url),
            market,
            session: RwLock::new(session),
        })
    }

    async fn latest_block_hash(&self) -> Result<CryptoHash, MarketError> {
        let block = self
            .client
            .call(methods::block::RpcBlockRequest {
                block_reference: BlockReference::Finality(Finality::Final),
            })
            .await
            .map_err(|err| MarketError::SubmissionRejected(format!("block query failed: {}", err)))?;
        Ok(block.header.hash)
    }

    async fn next_nonce(&self, session: &NearSession) -> Result<u64, MarketError> {
        let response = self
            .client
            .call(methods::query::RpcQueryRequest {
                block_reference: BlockReference::Finality(Finality::Final),
                request: QueryRequest::ViewAccessKey {
                    account_id: session.account_id.clone(),
                    public_key: session.signer.public_key(),
                },
            })
            .await
            .map_err(|err| {
                MarketError::SubmissionRejected(format!("access key query failed: {}", err))
            })?;

        match response.kind {
            QueryResponseKind::AccessKey(access_key) => Ok(access_key.nonce + 1),
            other => Err(MarketError::SubmissionRejected(format!(
                "unexpected query response: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl ChainAdapter for NearAdapter {
    fn chain(&self) -> &ChainInfo {
        self.chain
    }

    fn decimals(&self) -> u32 {
        NEAR_DECIMALS
    }

    async fn is_signed_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn get_active_account(&self) -> Result<String, MarketError> {
        match self.session.read().await.as_ref() {
            Some(session) => Ok(session.account_id.to_string()),
            None => Err(MarketError::NotSignedIn {
                chain: self.chain.label.to_string(),
            }),
        }
    }

    async fn ensure_network(&self) -> Result<(), MarketError> {
        Ok(())
    }

    async fn invoke(
        &self,
        call: ContractCall,
        on_submitted: OnSubmitted,
    ) -> Result<CallOutcome, MarketError> {
        // Snapshot only; a sign-out must not wait for this call to settle.
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or_else(|| MarketError::NotSignedIn {
                chain: self.chain.label.to_string(),
            })?;

        let deposit = u128::try_from(call.attached)
            .map_err(|_| MarketError::InvalidAmount(call.attached.to_string()))?;
        let args = serde_json::to_vec(&call.payload)
            .map_err(|err| MarketError::InvalidAmount(err.to_string()))?;
        let method = method_name(self.chain, call.method);

        let tx = Transaction::V0(TransactionV0 {
            signer_id: session.account_id.clone(),
            public_key: session.signer.public_key(),
            nonce: self.next_nonce(&session).await?,
            receiver_id: self.market.clone(),
            block_hash: self.latest_block_hash().await?,
            actions: vec![Action::FunctionCall(Box::new(FunctionCallAction {
                method_name: method.to_string(),
                args,
                gas: call.gas,
                deposit,
            }))],
        });
        let signed = tx.sign(&session.signer);

        let tx_hash = self
            .client
            .call(methods::broadcast_tx_async::RpcBroadcastTxAsyncRequest {
                signed_transaction: signed,
            })
            .await
            .map_err(|err| MarketError::SubmissionRejected(err.to_string()))?;

        info!(chain = self.chain.label, tx = %tx_hash, method, "transaction submitted");
        on_submitted(Some(tx_hash.to_string()));

        let status = self
            .client
            .call(methods::tx::RpcTransactionStatusRequest {
                transaction_info: methods::tx::TransactionInfo::TransactionId {
                    tx_hash,
                    sender_account_id: session.account_id.clone(),
                },
                wait_until: TxExecutionStatus::Final,
            })
            .await
            .map_err(|err| match err.handler_error() {
                Some(RpcTransactionError::TimeoutError) => MarketError::Timeout,
                _ => MarketError::SubmissionRejected(err.to_string()),
            })?;

        let Some(outcome) = status.final_execution_outcome.map(|o| o.into_outcome()) else {
            warn!(chain = self.chain.label, tx = %tx_hash, "transaction not final yet");
            return Ok(CallOutcome {
                success: false,
                receipt: Some(tx_hash.to_string()),
            });
        };

        match outcome.status {
            FinalExecutionStatus::SuccessValue(_) => Ok(CallOutcome {
                success: true,
                receipt: Some(tx_hash.to_string()),
            }),
            FinalExecutionStatus::Failure(failure) => {
                Err(MarketError::CallReverted(format!("{:?}", failure)))
            }
            FinalExecutionStatus::NotStarted | FinalExecutionStatus::Started => Ok(CallOutcome {
                success: false,
                receipt: Some(tx_hash.to_string()),
            }),
        }
    }

    async fn sign_out(&self) {
        *self.session.write().await = None;
        info!(chain = self.chain.label, "wallet session cleared");
    }
}
