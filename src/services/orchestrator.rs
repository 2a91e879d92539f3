use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ethers::types::U256;
use tracing::{error, info, warn};

use crate::config::MarketConstants;
use crate::error::MarketError;
use crate::models::{Feedback, Token, TokenRef};
use crate::services::adapter::{CallOutcome, ChainAdapter, ContractCall, MarketMethod, MarketPayload};
use crate::services::feedback::{FeedbackEvent, FeedbackSink, Operation, Phase, Settlement};
use crate::services::selector::AdapterSelector;
use crate::services::units;

type FlightKey = (TokenRef, Operation);

/// Current phase per (token, operation) plus the sink every change goes to.
/// Shared with the submission callback, which outlives the borrow of the orchestrator.
#[derive(Clone)]
struct Tracker {
    phases: Arc<Mutex<HashMap<FlightKey, Phase>>>,
    sink: Arc<dyn FeedbackSink>,
}

impl Tracker {
    fn report(&self, token: &TokenRef, operation: Operation, phase: Phase, feedback: Feedback) {
        if let Ok(mut phases) = self.phases.lock() {
            if let Some(current) = phases.get_mut(&(token.clone(), operation)) {
                *current = phase;
            }
        }
        self.sink.report(FeedbackEvent {
            token: token.clone(),
            operation,
            phase,
            feedback,
        });
    }
}

/// Held for the duration of one operation. Dropping it returns the key to `Idle`.
struct InFlight {
    tracker: Tracker,
    key: FlightKey,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut phases) = self.tracker.phases.lock() {
            phases.remove(&self.key);
        }
    }
}

/// Drives buy, offer and offer-resolution flows against whichever chain is
/// selected when the flow starts.
pub struct TransactionOrchestrator {
    selector: Arc<AdapterSelector>,
    tracker: Tracker,
    market: MarketConstants,
}

impl TransactionOrchestrator {
    pub fn new(
        selector: Arc<AdapterSelector>,
        sink: Arc<dyn FeedbackSink>,
        market: MarketConstants,
    ) -> Self {
        Self {
            selector,
            tracker: Tracker {
                phases: Arc::new(Mutex::new(HashMap::new())),
                sink,
            },
            market,
        }
    }

    pub fn phase_of(&self, token: &TokenRef, operation: Operation) -> Phase {
        self.tracker
            .phases
            .lock()
            .ok()
            .and_then(|phases| phases.get(&(token.clone(), operation)).copied())
            .unwrap_or(Phase::Idle)
    }

    pub fn is_in_flight(&self, token: &TokenRef, operation: Operation) -> bool {
        self.phase_of(token, operation) != Phase::Idle
    }

    /// Buys a listed token at its indexed price, attached as deposit/value in
    /// the selected chain's smallest unit.
    pub async fn buy(&self, token: &Token) -> Result<CallOutcome, MarketError> {
        let operation = Operation::Buy;
        let _flight = self.enter(&token.id, operation)?;
        let result = async {
            let adapter = self.selector.current().await;
            let account = self.connect(adapter.as_ref()).await?;
            if token.is_owned_by(&account) {
                return Err(MarketError::SelfPurchase);
            }

            let call = ContractCall {
                method: MarketMethod::Buy,
                payload: MarketPayload::for_token(token),
                gas: self.market.gas.as_gas(),
                attached: units::rescale(token.price, token.price_decimals, adapter.decimals())?,
            };
            self.submit(&token.id, operation, adapter.as_ref(), call).await
        }
        .await;
        self.settle(&token.id, operation, result).await
    }

    /// `price` is in display units of the selected chain.
    pub async fn make_offer(
        &self,
        token: &Token,
        price: &str,
        terms_accepted: bool,
    ) -> Result<CallOutcome, MarketError> {
        let operation = Operation::MakeOffer;
        let _flight = self.enter(&token.id, operation)?;
        let result = async {
            if !terms_accepted {
                return Err(MarketError::TermsNotAccepted);
            }
            let adapter = self.selector.current().await;
            let amount = self.checked_price(adapter.as_ref(), price)?;
            self.connect(adapter.as_ref()).await?;

            let call = ContractCall {
                method: MarketMethod::Sell,
                payload: MarketPayload::for_token(token).with_price(amount),
                gas: self.market.gas.as_gas(),
                attached: U256::zero(),
            };
            self.submit(&token.id, operation, adapter.as_ref(), call).await
        }
        .await;
        self.settle(&token.id, operation, result).await
    }

    /// Closes the highest bid, accepting it or giving it back.
    ///
    /// The contract decides who may close a bid; no owner check happens here.
    pub async fn resolve_offer(&self, token: &Token, accept: bool) -> Result<CallOutcome, MarketError> {
        let operation = if accept {
            Operation::AcceptOffer
        } else {
            Operation::DeclineOffer
        };
        let _flight = self.enter(&token.id, operation)?;
        let result = async {
            if !token.has_active_offer() {
                return Err(MarketError::NoActiveOffer);
            }
            let adapter = self.selector.current().await;
            let stake = adapter.to_smallest_unit(&self.market.close_bid_stake)?;
            self.connect(adapter.as_ref()).await?;

            let call = ContractCall {
                method: MarketMethod::CloseBid,
                payload: MarketPayload::for_token(token).with_status(accept),
                gas: self.market.gas.as_gas(),
                attached: stake,
            };
            self.submit(&token.id, operation, adapter.as_ref(), call).await
        }
        .await;
        self.settle(&token.id, operation, result).await
    }

    /// Puts an owned token back on sale at a new display-unit price.
    pub async fn resell(&self, token: &Token, price: &str) -> Result<CallOutcome, MarketError> {
        let operation = Operation::Resell;
        let _flight = self.enter(&token.id, operation)?;
        let result = async {
            let adapter = self.selector.current().await;
            let amount = self.checked_price(adapter.as_ref(), price)?;
            self.connect(adapter.as_ref()).await?;

            let call = ContractCall {
                method: MarketMethod::Sell,
                payload: MarketPayload::for_token(token).with_price(amount),
                gas: self.market.gas.as_gas(),
                attached: U256::zero(),
            };
            self.submit(&token.id, operation, adapter.as_ref(), call).await
        }
        .await;
        self.settle(&token.id, operation, result).await
    }

    fn enter(&self, token: &TokenRef, operation: Operation) -> Result<InFlight, MarketError> {
        let key = (token.clone(), operation);
        {
            let mut phases = self
                .tracker
                .phases
                .lock()
                .map_err(|_| MarketError::OperationPending)?;
            if phases.contains_key(&key) {
                warn!(token = %token, operation = ?operation, "operation already in flight");
                return Err(MarketError::OperationPending);
            }
            phases.insert(key.clone(), Phase::Idle);
        }

        self.tracker.report(
            token,
            operation,
            Phase::Validating,
            Feedback {
                disabled: true,
                ..Feedback::hidden()
            },
        );
        Ok(InFlight {
            tracker: self.tracker.clone(),
            key,
        })
    }

    async fn connect(&self, adapter: &dyn ChainAdapter) -> Result<String, MarketError> {
        adapter.ensure_network().await?;
        adapter.get_active_account().await
    }

    fn checked_price(&self, adapter: &dyn ChainAdapter, price: &str) -> Result<U256, MarketError> {
        let amount = adapter.to_smallest_unit(price)?;
        let minimum = adapter.to_smallest_unit(&self.market.min_offer)?;
        if amount < minimum {
            return Err(MarketError::PriceTooLow {
                minimum: self.market.min_offer.clone(),
            });
        }
        Ok(amount)
    }

    async fn submit(
        &self,
        token: &TokenRef,
        operation: Operation,
        adapter: &dyn ChainAdapter,
        call: ContractCall,
    ) -> Result<CallOutcome, MarketError> {
        self.tracker.report(
            token,
            operation,
            Phase::AwaitingSignature,
            Feedback::progress("Loading", "Confirm the transaction in your wallet"),
        );
        info!(
            token = %token,
            operation = ?operation,
            chain = adapter.chain().label,
            attached = %call.attached,
            "submitting market call"
        );

        let tracker = self.tracker.clone();
        let token = token.clone();
        adapter
            .invoke(
                call,
                Box::new(move |receipt| {
                    info!(token = %token, receipt = ?receipt, "transaction submitted");
                    tracker.report(
                        &token,
                        operation,
                        Phase::Submitted,
                        Feedback::progress("Loading", "Waiting for the network to confirm"),
                    );
                }),
            )
            .await
    }

    async fn settle(
        &self,
        token: &TokenRef,
        operation: Operation,
        result: Result<CallOutcome, MarketError>,
    ) -> Result<CallOutcome, MarketError> {
        match &result {
            Ok(outcome) if outcome.success => {
                info!(token = %token, operation = ?operation, receipt = ?outcome.receipt, "operation settled");
                self.tracker.report(
                    token,
                    operation,
                    Phase::Settled(Settlement::Success),
                    Feedback::notice("Success", success_message(operation)),
                );
            }
            Ok(outcome) => {
                warn!(token = %token, operation = ?operation, receipt = ?outcome.receipt, "transaction not confirmed");
                self.tracker.report(
                    token,
                    operation,
                    Phase::Settled(Settlement::Failure),
                    Feedback::notice("Error", "Something went wrong, please try again"),
                );
            }
            Err(MarketError::NotSignedIn { chain }) => {
                warn!(token = %token, operation = ?operation, chain = %chain, "wallet session missing");
                let adapter = self.selector.current().await;
                self.tracker.sink.sign_in_required(adapter.chain());
                self.tracker.report(
                    token,
                    operation,
                    Phase::Settled(Settlement::Failure),
                    Feedback::hidden(),
                );
            }
            Err(err) => {
                error!(token = %token, operation = ?operation, error = %err, "operation failed");
                self.tracker.report(
                    token,
                    operation,
                    Phase::Settled(Settlement::Failure),
                    Feedback::notice("Error", &err.user_message()),
                );
            }
        }
        result
    }
}

fn success_message(operation: Operation) -> &'static str {
    match operation {
        Operation::Buy => "Token purchased",
        Operation::MakeOffer => "Offer sent",
        Operation::AcceptOffer => "Offer accepted",
        Operation::DeclineOffer => "Offer declined",
        Operation::Resell => "Token listed for sale",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BidSlot, SUPPORTED_CHAINS};
    use crate::services::selector::AdapterFactory;
    use crate::services::store::MemorySettingsStore;
    use crate::services::testing::{sample_evm_token, sample_token, FakeAdapter, RecordingFeedback};
    use std::sync::atomic::Ordering;
    use tokio::sync::Notify;

    struct Harness {
        orchestrator: Arc<TransactionOrchestrator>,
        adapter: Arc<FakeAdapter>,
        feedback: Arc<RecordingFeedback>,
    }

    async fn harness(adapter: FakeAdapter) -> Harness {
        let adapter = Arc::new(adapter);
        let shared = adapter.clone();
        let factory: AdapterFactory = Box::new(move |_| Ok(shared.clone() as Arc<dyn ChainAdapter>));
        let store = Arc::new(MemorySettingsStore::default());
        let selector = Arc::new(AdapterSelector::load(store, factory).await.unwrap());
        let feedback = Arc::new(RecordingFeedback::default());
        let orchestrator = Arc::new(TransactionOrchestrator::new(
            selector,
            feedback.clone(),
            MarketConstants::default(),
        ));
        Harness {
            orchestrator,
            adapter,
            feedback,
        }
    }

    fn near() -> &'static crate::models::ChainInfo {
        &SUPPORTED_CHAINS[2]
    }

    fn aurora() -> &'static crate::models::ChainInfo {
        &SUPPORTED_CHAINS[0]
    }

    fn with_highest_bid(mut token: Token) -> Token {
        token.highest_bid = BidSlot::Value("1000".to_string());
        token
    }

    #[tokio::test]
    async fn buy_attaches_the_listed_price_in_yocto() {
        let h = harness(FakeAdapter::signed_in(near(), "bob.testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        let outcome = h.orchestrator.buy(&token).await.unwrap();

        assert!(outcome.success);
        let calls = h.adapter.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, MarketMethod::Buy);
        assert_eq!(calls[0].attached, U256::from(25u64) * U256::exp10(23));
        assert_eq!(calls[0].gas, 300_000_000_000_000);
        assert_eq!(calls[0].payload.token_id, "12");
        assert_eq!(calls[0].payload.collection_id, "3");
        assert_eq!(
            h.feedback.phases(),
            vec![
                Phase::Validating,
                Phase::AwaitingSignature,
                Phase::Submitted,
                Phase::Settled(Settlement::Success),
            ]
        );
    }

    #[tokio::test]
    async fn owner_cannot_buy_their_own_token() {
        let h = harness(FakeAdapter::signed_in(near(), "Alice.Testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        let result = h.orchestrator.buy(&token).await;

        assert_eq!(result, Err(MarketError::SelfPurchase));
        assert!(h.adapter.recorded_calls().is_empty());
        let last = h.feedback.last().unwrap();
        assert_eq!(last.phase, Phase::Settled(Settlement::Failure));
        assert!(last.feedback.show);
        assert!(!last.feedback.disabled);
    }

    #[tokio::test]
    async fn offer_without_terms_never_reaches_the_chain() {
        let h = harness(FakeAdapter::signed_in(near(), "bob.testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        let result = h.orchestrator.make_offer(&token, "1", false).await;

        assert_eq!(result, Err(MarketError::TermsNotAccepted));
        assert!(h.adapter.recorded_calls().is_empty());
        assert_eq!(h.adapter.network_checks.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.feedback.phases(),
            vec![Phase::Validating, Phase::Settled(Settlement::Failure)]
        );
    }

    #[tokio::test]
    async fn offer_below_minimum_is_rejected_before_any_call() {
        let h = harness(FakeAdapter::signed_in(near(), "bob.testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        let result = h.orchestrator.make_offer(&token, "0.09", true).await;

        assert_eq!(
            result,
            Err(MarketError::PriceTooLow {
                minimum: "0.1".to_string()
            })
        );
        assert!(h.adapter.recorded_calls().is_empty());
        assert_eq!(h.adapter.network_checks.load(Ordering::SeqCst), 0);
        let last = h.feedback.last().unwrap();
        assert!(last.feedback.message.contains("0.1"));
    }

    #[tokio::test]
    async fn offer_sends_price_in_payload_and_attaches_nothing() {
        let h = harness(FakeAdapter::signed_in(near(), "bob.testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        h.orchestrator.make_offer(&token, "0.1", true).await.unwrap();

        let calls = h.adapter.recorded_calls();
        assert_eq!(calls[0].method, MarketMethod::Sell);
        assert_eq!(calls[0].attached, U256::zero());
        assert_eq!(calls[0].payload.price, Some(U256::exp10(23).to_string()));
    }

    #[tokio::test]
    async fn malformed_offer_price_is_invalid() {
        let h = harness(FakeAdapter::signed_in(near(), "bob.testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        let result = h.orchestrator.make_offer(&token, "1,5", true).await;

        assert!(matches!(result, Err(MarketError::InvalidAmount(_))));
        assert!(h.adapter.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn resolving_without_bids_fails_locally() {
        let h = harness(FakeAdapter::signed_in(near(), "alice.testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        let result = h.orchestrator.resolve_offer(&token, true).await;

        assert_eq!(result, Err(MarketError::NoActiveOffer));
        assert!(h.adapter.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn non_owner_accept_still_reaches_the_contract() {
        let h = harness(FakeAdapter::signed_in(near(), "mallory.testnet")).await;
        let token = with_highest_bid(sample_token("alice.testnet", "2.5"));

        h.orchestrator.resolve_offer(&token, true).await.unwrap();

        let calls = h.adapter.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, MarketMethod::CloseBid);
        assert_eq!(calls[0].payload.status, Some(true));
        assert_eq!(calls[0].attached, U256::from(5u64) * U256::exp10(22));
    }

    #[tokio::test]
    async fn decline_reports_its_own_operation() {
        let h = harness(FakeAdapter::signed_in(near(), "alice.testnet")).await;
        let token = with_highest_bid(sample_token("alice.testnet", "2.5"));

        h.orchestrator.resolve_offer(&token, false).await.unwrap();

        assert_eq!(h.adapter.recorded_calls()[0].payload.status, Some(false));
        let last = h.feedback.last().unwrap();
        assert_eq!(last.operation, Operation::DeclineOffer);
        assert_eq!(last.feedback.message, "Offer declined");
    }

    #[tokio::test]
    async fn missing_session_prompts_sign_in() {
        let h = harness(FakeAdapter::signed_out(near())).await;
        let token = sample_token("alice.testnet", "2.5");

        let result = h.orchestrator.buy(&token).await;

        assert!(matches!(result, Err(MarketError::NotSignedIn { .. })));
        assert_eq!(*h.feedback.sign_in_requests.lock().unwrap(), vec!["NEAR"]);
        assert!(h.adapter.recorded_calls().is_empty());
        assert!(!h.feedback.last().unwrap().feedback.show);
    }

    #[tokio::test]
    async fn wrong_network_aborts_before_signing() {
        let adapter = FakeAdapter::signed_in(near(), "bob.testnet").with_network(Err(
            MarketError::NetworkMismatch {
                expected: 1313161555,
                actual: 1,
            },
        ));
        let h = harness(adapter).await;

        let result = h.orchestrator.buy(&sample_token("alice.testnet", "2.5")).await;

        assert!(matches!(result, Err(MarketError::NetworkMismatch { .. })));
        assert!(h.adapter.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn reverted_call_shows_generic_retry_message() {
        let adapter = FakeAdapter::signed_in(near(), "bob.testnet")
            .with_outcome(Err(MarketError::CallReverted("not enough deposit".to_string())));
        let h = harness(adapter).await;

        let result = h.orchestrator.buy(&sample_token("alice.testnet", "2.5")).await;

        assert!(matches!(result, Err(MarketError::CallReverted(_))));
        let last = h.feedback.last().unwrap();
        assert_eq!(last.phase, Phase::Settled(Settlement::Failure));
        assert_eq!(last.feedback.message, "Something went wrong, please try again");
        assert!(!h.orchestrator.is_in_flight(&last.token, Operation::Buy));
    }

    #[tokio::test]
    async fn unconfirmed_outcome_settles_as_failure() {
        let adapter = FakeAdapter::signed_in(near(), "bob.testnet").with_outcome(Ok(CallOutcome {
            success: false,
            receipt: Some("tx-9".to_string()),
        }));
        let h = harness(adapter).await;

        let outcome = h.orchestrator.buy(&sample_token("alice.testnet", "2.5")).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(
            h.feedback.last().unwrap().phase,
            Phase::Settled(Settlement::Failure)
        );
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_refused() {
        let gate = Arc::new(Notify::new());
        let h = harness(FakeAdapter::signed_in(near(), "bob.testnet").gated(gate.clone())).await;
        let token = sample_token("alice.testnet", "2.5");

        let first = {
            let orchestrator = h.orchestrator.clone();
            let token = token.clone();
            tokio::spawn(async move { orchestrator.buy(&token).await })
        };
        h.adapter.entered.notified().await;

        assert_eq!(
            h.orchestrator.phase_of(&token.id, Operation::Buy),
            Phase::AwaitingSignature
        );
        assert_eq!(h.orchestrator.buy(&token).await, Err(MarketError::OperationPending));

        gate.notify_one();
        assert!(first.await.unwrap().unwrap().success);
        assert_eq!(h.adapter.recorded_calls().len(), 1);
        assert_eq!(h.orchestrator.phase_of(&token.id, Operation::Buy), Phase::Idle);
    }

    #[tokio::test]
    async fn resell_lists_at_new_price() {
        let h = harness(FakeAdapter::signed_in(near(), "alice.testnet")).await;
        let token = sample_token("alice.testnet", "2.5");

        h.orchestrator.resell(&token, "3").await.unwrap();

        let calls = h.adapter.recorded_calls();
        assert_eq!(calls[0].method, MarketMethod::Sell);
        assert_eq!(calls[0].payload.price, Some((U256::from(3u64) * U256::exp10(24)).to_string()));
        assert_eq!(h.feedback.last().unwrap().feedback.message, "Token listed for sale");
    }

    #[tokio::test]
    async fn buy_on_evm_attaches_wei_for_an_indexed_price() {
        let h = harness(FakeAdapter::signed_in(aurora(), "0xb0b")).await;
        let token = sample_token("alice.testnet", "2.5");

        h.orchestrator.buy(&token).await.unwrap();

        let calls = h.adapter.recorded_calls();
        assert_eq!(calls[0].attached, U256::from(25u64) * U256::exp10(17));
    }

    #[tokio::test]
    async fn buy_on_evm_keeps_a_contract_price_as_is() {
        let h = harness(FakeAdapter::signed_in(aurora(), "0xb0b")).await;
        let token = sample_evm_token("0xa11ce", "2.5");

        h.orchestrator.buy(&token).await.unwrap();

        assert_eq!(
            h.adapter.recorded_calls()[0].attached,
            U256::from(25u64) * U256::exp10(17)
        );
    }

    #[tokio::test]
    async fn evm_offer_is_priced_in_wei_with_the_same_minimum() {
        let h = harness(FakeAdapter::signed_in(aurora(), "0xb0b")).await;
        let token = sample_evm_token("0xa11ce", "2.5");

        assert!(matches!(
            h.orchestrator.make_offer(&token, "0.09", true).await,
            Err(MarketError::PriceTooLow { .. })
        ));
        h.orchestrator.make_offer(&token, "0.5", true).await.unwrap();

        let calls = h.adapter.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payload.price, Some((U256::from(5u64) * U256::exp10(17)).to_string()));
        assert_eq!(calls[0].attached, U256::zero());
    }

    #[tokio::test]
    async fn evm_resell_is_priced_in_wei() {
        let h = harness(FakeAdapter::signed_in(aurora(), "0xa11ce")).await;
        let token = sample_evm_token("0xa11ce", "2.5");

        h.orchestrator.resell(&token, "3").await.unwrap();

        assert_eq!(
            h.adapter.recorded_calls()[0].payload.price,
            Some((U256::from(3u64) * U256::exp10(18)).to_string())
        );
    }
}
