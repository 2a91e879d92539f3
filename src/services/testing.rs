//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::U256;
use tokio::sync::Notify;

use crate::error::MarketError;
use crate::models::{BidSlot, ChainInfo, ChainKind, Offer, Token, TokenMetadata, TokenRef};
use crate::services::adapter::{CallOutcome, ChainAdapter, ContractCall, OnSubmitted};
use crate::services::feedback::{FeedbackEvent, FeedbackSink};
use crate::services::indexer::MarketIndexer;
use crate::services::units::{to_smallest_unit, EVM_DECIMALS, NEAR_DECIMALS};

pub struct FakeAdapter {
    chain: &'static ChainInfo,
    account: Mutex<Option<String>>,
    outcome: Mutex<Result<CallOutcome, MarketError>>,
    network: Mutex<Result<(), MarketError>>,
    pub calls: Mutex<Vec<ContractCall>>,
    pub network_checks: AtomicUsize,
    /// When set, `invoke` parks after recording the call until notified.
    gate: Option<Arc<Notify>>,
    pub entered: Arc<Notify>,
    /// Same for `sign_out`, after the session is already gone.
    sign_out_gate: Option<Arc<Notify>>,
    pub signing_out: Arc<Notify>,
}

impl FakeAdapter {
    pub fn signed_in(chain: &'static ChainInfo, account: &str) -> Self {
        Self {
            chain,
            account: Mutex::new(Some(account.to_string())),
            outcome: Mutex::new(Ok(CallOutcome {
                success: true,
                receipt: Some("tx-1".to_string()),
            })),
            network: Mutex::new(Ok(())),
            calls: Mutex::new(Vec::new()),
            network_checks: AtomicUsize::new(0),
            gate: None,
            entered: Arc::new(Notify::new()),
            sign_out_gate: None,
            signing_out: Arc::new(Notify::new()),
        }
    }

    pub fn signed_out(chain: &'static ChainInfo) -> Self {
        let adapter = Self::signed_in(chain, "");
        *adapter.account.lock().unwrap() = None;
        adapter
    }

    pub fn with_outcome(self, outcome: Result<CallOutcome, MarketError>) -> Self {
        *self.outcome.lock().unwrap() = outcome;
        self
    }

    pub fn with_network(self, network: Result<(), MarketError>) -> Self {
        *self.network.lock().unwrap() = network;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn gated_sign_out(mut self, gate: Arc<Notify>) -> Self {
        self.sign_out_gate = Some(gate);
        self
    }

    pub fn recorded_calls(&self) -> Vec<ContractCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainAdapter for FakeAdapter {
    fn chain(&self) -> &ChainInfo {
        self.chain
    }

    fn decimals(&self) -> u32 {
        match self.chain.kind {
            ChainKind::Evm => EVM_DECIMALS,
            ChainKind::Near => NEAR_DECIMALS,
        }
    }

    async fn is_signed_in(&self) -> bool {
        self.account.lock().unwrap().is_some()
    }

    async fn get_active_account(&self) -> Result<String, MarketError> {
        self.account
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| MarketError::NotSignedIn {
                chain: self.chain.label.to_string(),
            })
    }

    async fn ensure_network(&self) -> Result<(), MarketError> {
        self.network_checks.fetch_add(1, Ordering::SeqCst);
        self.network.lock().unwrap().clone()
    }

    async fn invoke(
        &self,
        call: ContractCall,
        on_submitted: OnSubmitted,
    ) -> Result<CallOutcome, MarketError> {
        self.calls.lock().unwrap().push(call);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let outcome = self.outcome.lock().unwrap().clone();
        if let Ok(ref ok) = outcome {
            on_submitted(ok.receipt.clone());
        }
        outcome
    }

    async fn sign_out(&self) {
        *self.account.lock().unwrap() = None;
        self.signing_out.notify_one();
        if let Some(gate) = &self.sign_out_gate {
            gate.notified().await;
        }
    }
}

pub struct FakeIndexer {
    token: Result<Token, MarketError>,
    offers: Result<Vec<Offer>, MarketError>,
}

impl FakeIndexer {
    pub fn new(token: Result<Token, MarketError>, offers: Result<Vec<Offer>, MarketError>) -> Self {
        Self { token, offers }
    }
}

#[async_trait]
impl MarketIndexer for FakeIndexer {
    async fn get_token(&self, _token: &TokenRef) -> Result<Token, MarketError> {
        self.token.clone()
    }

    async fn get_offers(&self, _token: &TokenRef) -> Result<Vec<Offer>, MarketError> {
        self.offers.clone()
    }
}

#[derive(Default)]
pub struct RecordingFeedback {
    pub events: Mutex<Vec<FeedbackEvent>>,
    pub sign_in_requests: Mutex<Vec<&'static str>>,
}

impl RecordingFeedback {
    pub fn phases(&self) -> Vec<crate::services::feedback::Phase> {
        self.events.lock().unwrap().iter().map(|e| e.phase).collect()
    }

    pub fn last(&self) -> Option<FeedbackEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl FeedbackSink for RecordingFeedback {
    fn report(&self, event: FeedbackEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn sign_in_required(&self, chain: &ChainInfo) {
        self.sign_in_requests.lock().unwrap().push(chain.label);
    }
}

pub fn sample_token(owner: &str, price: &str) -> Token {
    Token {
        id: TokenRef::new("12", "3"),
        owner: owner.to_string(),
        creator: "carla.testnet".to_string(),
        contract: "nft.nativo.testnet".to_string(),
        collection: "Arte Nativo".to_string(),
        metadata: TokenMetadata {
            title: "Jaguar".to_string(),
            description: "Oil on canvas".to_string(),
            media: "bafybeigd".to_string(),
            tags: vec!["art".to_string()],
        },
        price: to_smallest_unit(price, NEAR_DECIMALS).unwrap(),
        price_decimals: NEAR_DECIMALS,
        on_sale: true,
        bidder: BidSlot::Empty,
        highest_bid: BidSlot::Empty,
        lowest_bid: BidSlot::Empty,
    }
}

/// A token as read from an EVM market contract, price in wei.
pub fn sample_evm_token(owner: &str, price: &str) -> Token {
    Token {
        price: to_smallest_unit(price, EVM_DECIMALS).unwrap(),
        price_decimals: EVM_DECIMALS,
        contract: "0xf4351ba9ca701cf689442833cda5f7ff18c2e00c".to_string(),
        ..sample_token(owner, "0")
    }
}

pub fn sample_offer(offer_id: u64, price: &str) -> Offer {
    Offer {
        offer_id,
        token_id: "12".to_string(),
        collection_id: "3".to_string(),
        contract: "nft.nativo.testnet".to_string(),
        bidder: "bob.testnet".to_string(),
        price: U256::from_dec_str(price).unwrap(),
    }
}
