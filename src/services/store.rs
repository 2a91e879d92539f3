use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bson::doc;
use mongodb::options::{ClientOptions, UpdateOptions};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Key of the persisted chain index.
pub const CHAIN_KEY: &str = "blockchain";
/// Key of the listing views' pagination cursor.
pub const PAGE_KEY: &str = "page";

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), MarketError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

pub struct MongoSettingsStore {
    settings: Collection<Setting>,
}

impl MongoSettingsStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, MarketError> {
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.app_name = Some("nativo-market".to_string());
        let client = Client::with_options(client_options)?;
        let db = client.database(database);

        Ok(Self {
            settings: db.collection::<Setting>("settings"),
        })
    }
}

#[async_trait]
impl SettingsStore for MongoSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        let setting = self.settings.find_one(doc! {"key": key}, None).await?;
        Ok(setting.map(|s| s.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), MarketError> {
        self.settings
            .update_one(
                doc! {"key": key},
                doc! {"$set": {"value": value}},
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        let values = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), MarketError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
