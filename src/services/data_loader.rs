use futures::join;
use tracing::{info, warn};

use crate::error::MarketError;
use crate::models::{Offer, Token, TokenRef};
use crate::services::indexer::MarketIndexer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDetail {
    Ready { token: Token, offers: Vec<Offer> },
    /// The indexer could not be reached; the view shows a placeholder.
    Unavailable,
}

pub mod token_detail {
    use super::*;

    /// Token metadata and its offers are fetched concurrently. Either failing
    /// with `IndexerUnavailable` degrades the whole page, a missing token is an error.
    pub async fn load_detail(
        indexer: &dyn MarketIndexer,
        token_ref: &TokenRef,
    ) -> Result<TokenDetail, MarketError> {
        let (token, offers) = join!(indexer.get_token(token_ref), indexer.get_offers(token_ref));

        match (token, offers) {
            (Ok(token), Ok(offers)) => {
                info!(token = %token_ref, offers = offers.len(), "token detail loaded");
                Ok(TokenDetail::Ready { token, offers })
            }
            (Err(MarketError::NotFound), _) => Err(MarketError::NotFound),
            (Err(err), _) | (_, Err(err)) if err.is_recoverable() => {
                warn!(token = %token_ref, error = %err, "indexer unavailable, showing placeholder");
                Ok(TokenDetail::Unavailable)
            }
            (Err(err), _) | (_, Err(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::token_detail::load_detail;
    use super::*;
    use crate::services::testing::{sample_offer, sample_token, FakeIndexer};

    #[tokio::test]
    async fn ready_detail_keeps_offer_order_from_indexer() {
        let token = sample_token("alice.testnet", "2.5");
        let offers = vec![sample_offer(3, "1000"), sample_offer(1, "500")];
        let indexer = FakeIndexer::new(Ok(token.clone()), Ok(offers.clone()));

        let detail = load_detail(&indexer, &token.id).await.unwrap();

        assert_eq!(detail, TokenDetail::Ready { token, offers });
    }

    #[tokio::test]
    async fn unavailable_indexer_degrades_instead_of_failing() {
        let token = sample_token("alice.testnet", "2.5");
        let indexer = FakeIndexer::new(
            Ok(token.clone()),
            Err(MarketError::IndexerUnavailable("502".to_string())),
        );

        let detail = load_detail(&indexer, &token.id).await.unwrap();

        assert_eq!(detail, TokenDetail::Unavailable);
    }

    #[tokio::test]
    async fn missing_token_is_surfaced() {
        let indexer = FakeIndexer::new(Err(MarketError::NotFound), Ok(Vec::new()));

        let result = load_detail(&indexer, &TokenRef::new("99", "1")).await;

        assert_eq!(result, Err(MarketError::NotFound));
    }
}
