use async_trait::async_trait;
use ethers::types::U256;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::MarketError;
use crate::services::units::NEAR_DECIMALS;
use crate::models::{
    BidSlot, Offer, Token, TokenMetadata, TokenRef, NO_BIDDER, NO_HIGHEST_BID, NO_LOWEST_BID,
    STATUS_FOR_SALE,
};

const TOKEN_QUERY: &str = r#"
query($tokenId: String, $collectionID: String){
  tokens(where: {tokenId: $tokenId, collectionID: $collectionID}) {
    id collection collectionID contract tokenId owner_id title description media
    creator price status adressbidder highestbidder lowestbidder expires_at starts_at extra
  }
}"#;

const OFFERS_QUERY: &str = r#"
query($tokenId: Int, $collectionID: Int){
  offers(orderBy: offerID, where: {tokenId: $tokenId, collectionID: $collectionID}, orderDirection: desc) {
    offerID tokenId contract price collectionID owner_id
  }
}"#;

/// Read side of the market. Records are as fresh as the indexer is.
#[async_trait]
pub trait MarketIndexer: Send + Sync {
    async fn get_token(&self, token: &TokenRef) -> Result<Token, MarketError>;

    /// Most recent first, as returned by the indexer. Not re-sorted here.
    async fn get_offers(&self, token: &TokenRef) -> Result<Vec<Offer>, MarketError>;
}

#[derive(Debug, Deserialize)]
struct GraphResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokensData {
    tokens: Vec<TokenRecord>,
}

#[derive(Debug, Deserialize)]
struct OffersData {
    offers: Vec<OfferRecord>,
}

/// Subgraph numbers arrive as strings or as JSON numbers depending on the field type.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRecord {
    pub id: String,
    #[serde(default)]
    pub collection: String,
    #[serde(rename = "collectionID", deserialize_with = "lenient_string")]
    pub collection_id: String,
    #[serde(default)]
    pub contract: String,
    #[serde(rename = "tokenId", deserialize_with = "lenient_string")]
    pub token_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub price: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub adressbidder: Option<String>,
    #[serde(default)]
    pub highestbidder: Option<String>,
    #[serde(default)]
    pub lowestbidder: Option<String>,
    #[serde(default)]
    pub expires_at: Option<Value>,
    #[serde(default)]
    pub starts_at: Option<Value>,
    #[serde(default)]
    pub extra: Option<String>,
}

impl TokenRecord {
    pub fn into_token(self) -> Result<Token, MarketError> {
        let price = parse_amount(&self.price)?;
        // `extra` is "<space separated tags>:<anything else>"
        let tags = self
            .extra
            .as_deref()
            .and_then(|extra| extra.split(':').next())
            .map(|tags| {
                tags.split(' ')
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Token {
            id: TokenRef::new(self.token_id, self.collection_id),
            on_sale: self.status.as_deref() == Some(STATUS_FOR_SALE),
            owner: self.owner_id,
            creator: self.creator.unwrap_or_default(),
            contract: self.contract,
            collection: self.collection,
            metadata: TokenMetadata {
                title: self.title.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
                media: self.media.unwrap_or_default(),
                tags,
            },
            price,
            price_decimals: NEAR_DECIMALS,
            bidder: BidSlot::parse(self.adressbidder.as_deref(), NO_BIDDER),
            highest_bid: BidSlot::parse(self.highestbidder.as_deref(), NO_HIGHEST_BID),
            lowest_bid: BidSlot::parse(self.lowestbidder.as_deref(), NO_LOWEST_BID),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferRecord {
    #[serde(rename = "offerID", deserialize_with = "lenient_string")]
    pub offer_id: String,
    #[serde(rename = "tokenId", deserialize_with = "lenient_string")]
    pub token_id: String,
    #[serde(default)]
    pub contract: String,
    #[serde(deserialize_with = "lenient_string")]
    pub price: String,
    #[serde(rename = "collectionID", deserialize_with = "lenient_string")]
    pub collection_id: String,
    pub owner_id: String,
}

impl OfferRecord {
    pub fn into_offer(self) -> Result<Offer, MarketError> {
        let offer_id = self.offer_id.parse::<u64>().map_err(|_| {
            MarketError::IndexerUnavailable(format!("offer id `{}` is not numeric", self.offer_id))
        })?;
        Ok(Offer {
            offer_id,
            price: parse_amount(&self.price)?,
            token_id: self.token_id,
            collection_id: self.collection_id,
            contract: self.contract,
            bidder: self.owner_id,
        })
    }
}

fn parse_amount(raw: &str) -> Result<U256, MarketError> {
    if raw.is_empty() {
        return Err(MarketError::IndexerUnavailable("record without a price".to_string()));
    }
    U256::from_dec_str(raw)
        .map_err(|_| MarketError::IndexerUnavailable(format!("amount `{}` is not an integer", raw)))
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, MarketError> {
    let response: GraphResponse<T> = serde_json::from_value(body)
        .map_err(|err| MarketError::IndexerUnavailable(format!("malformed response: {}", err)))?;

    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(MarketError::IndexerUnavailable(messages.join("; ")));
    }
    response
        .data
        .ok_or_else(|| MarketError::IndexerUnavailable("response without data".to_string()))
}

fn tokens_from(body: Value) -> Result<Token, MarketError> {
    let data: TokensData = decode(body)?;
    data.tokens
        .into_iter()
        .next()
        .ok_or(MarketError::NotFound)?
        .into_token()
}

fn offers_from(body: Value) -> Result<Vec<Offer>, MarketError> {
    let data: OffersData = decode(body)?;
    data.offers.into_iter().map(OfferRecord::into_offer).collect()
}

pub struct GraphIndexerClient {
    http: reqwest::Client,
    url: String,
}

impl GraphIndexerClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value, MarketError> {
        let body = self
            .http
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl MarketIndexer for GraphIndexerClient {
    async fn get_token(&self, token: &TokenRef) -> Result<Token, MarketError> {
        debug!(token = %token, "querying token");
        let body = self
            .query(
                TOKEN_QUERY,
                json!({ "tokenId": token.token_id, "collectionID": token.collection_id }),
            )
            .await?;
        tokens_from(body)
    }

    async fn get_offers(&self, token: &TokenRef) -> Result<Vec<Offer>, MarketError> {
        let (Ok(token_id), Ok(collection_id)) = (
            token.token_id.parse::<i64>(),
            token.collection_id.parse::<i64>(),
        ) else {
            warn!(token = %token, "non-numeric token reference has no offers");
            return Ok(Vec::new());
        };

        debug!(token = %token, "querying offers");
        let body = self
            .query(
                OFFERS_QUERY,
                json!({ "tokenId": token_id, "collectionID": collection_id }),
            )
            .await?;
        offers_from(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_body(status: &str, highest: &str) -> Value {
        json!({
            "data": {
                "tokens": [{
                    "id": "12:3",
                    "collection": "Arte Nativo",
                    "collectionID": "3",
                    "contract": "nft.nativo.testnet",
                    "tokenId": "12",
                    "owner_id": "alice.testnet",
                    "title": "Jaguar",
                    "description": "Oil on canvas",
                    "media": "bafybeigd",
                    "creator": "carla.testnet",
                    "price": "2500000000000000000000000",
                    "status": status,
                    "adressbidder": "accountbidder",
                    "highestbidder": highest,
                    "lowestbidder": "notienebajos",
                    "expires_at": null,
                    "starts_at": null,
                    "extra": "art oil jungle:1"
                }]
            }
        })
    }

    #[test]
    fn decodes_token_record() {
        let token = tokens_from(token_body("S", "notienealtos")).unwrap();

        assert_eq!(token.id, TokenRef::new("12", "3"));
        assert_eq!(token.owner, "alice.testnet");
        assert!(token.on_sale);
        assert_eq!(token.price, U256::from(25u64) * U256::exp10(23));
        assert_eq!(token.price_decimals, NEAR_DECIMALS);
        assert_eq!(token.metadata.tags, vec!["art", "oil", "jungle"]);
        assert!(token.bidder.is_empty());
        assert!(!token.has_active_offer());
        assert!(token.lowest_bid.is_empty());
    }

    #[test]
    fn sale_status_comes_only_from_status_code() {
        let token = tokens_from(token_body("N", "1000")).unwrap();
        assert!(!token.on_sale);
        assert_eq!(token.highest_bid.value(), Some("1000"));
    }

    #[test]
    fn token_without_price_is_not_treated_as_free() {
        let mut body = token_body("S", "notienealtos");
        body["data"]["tokens"][0]["price"] = Value::Null;

        let err = tokens_from(body).unwrap_err();

        assert!(matches!(err, MarketError::IndexerUnavailable(_)));
    }

    #[test]
    fn empty_token_list_is_not_found() {
        let err = tokens_from(json!({ "data": { "tokens": [] } })).unwrap_err();
        assert_eq!(err, MarketError::NotFound);
    }

    #[test]
    fn graphql_errors_mean_indexer_unavailable() {
        let err = tokens_from(json!({ "errors": [{ "message": "indexing halted" }] })).unwrap_err();
        assert_eq!(err, MarketError::IndexerUnavailable("indexing halted".to_string()));
    }

    #[test]
    fn offers_keep_indexer_order() {
        let offers = offers_from(json!({
            "data": { "offers": [
                { "offerID": "1", "tokenId": 12, "contract": "nft.nativo.testnet", "price": "500", "collectionID": 3, "owner_id": "bob.testnet" },
                { "offerID": 3, "tokenId": "12", "contract": "nft.nativo.testnet", "price": "1000", "collectionID": "3", "owner_id": "carol.testnet" }
            ]}
        }))
        .unwrap();

        let ids: Vec<u64> = offers.iter().map(|o| o.offer_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(offers[1].price, U256::from(1000u64));
        assert_eq!(offers[0].bidder, "bob.testnet");
        assert_eq!(offers[0].token_id, "12");
    }

    #[test]
    fn empty_offer_list_is_valid() {
        let offers = offers_from(json!({ "data": { "offers": [] } })).unwrap();
        assert!(offers.is_empty());
    }
}
