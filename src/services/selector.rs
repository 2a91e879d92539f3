use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::info;

use crate::error::MarketError;
use crate::models::{ChainInfo, ChainSelection, SUPPORTED_CHAINS};
use crate::services::adapter::ChainAdapter;
use crate::services::store::{SettingsStore, CHAIN_KEY, PAGE_KEY};

/// Builds a fresh adapter for a chain. Called at startup and on every switch.
pub type AdapterFactory =
    Box<dyn Fn(&'static ChainInfo) -> Result<Arc<dyn ChainAdapter>, MarketError> + Send + Sync>;

struct Active {
    selection: ChainSelection,
    adapter: Arc<dyn ChainAdapter>,
}

/// Owner of the process-wide chain choice.
///
/// Switching is destructive: the old adapter is signed out and replaced, and
/// in-flight work holding the old adapter is left to fail on its own. Do not
/// offer a switch while a transaction is awaiting signature or submitted.
pub struct AdapterSelector {
    store: Arc<dyn SettingsStore>,
    factory: AdapterFactory,
    active: RwLock<Active>,
    notifier: watch::Sender<ChainSelection>,
}

impl AdapterSelector {
    pub async fn load(
        store: Arc<dyn SettingsStore>,
        factory: AdapterFactory,
    ) -> Result<Self, MarketError> {
        let persisted = store.get(CHAIN_KEY).await?;
        let index = ChainSelection::index_from_persisted(persisted.as_deref());
        if persisted.as_deref() != Some(index.to_string().as_str()) {
            store.set(CHAIN_KEY, &index.to_string()).await?;
        }

        let selection = ChainSelection {
            index,
            generation: 0,
        };
        let adapter = factory(selection.info())?;
        let (notifier, _) = watch::channel(selection);

        info!(chain = selection.info().label, "chain selection loaded");

        Ok(Self {
            store,
            factory,
            active: RwLock::new(Active { selection, adapter }),
            notifier,
        })
    }

    pub async fn current(&self) -> Arc<dyn ChainAdapter> {
        self.active.read().await.adapter.clone()
    }

    pub async fn selection(&self) -> ChainSelection {
        self.active.read().await.selection
    }

    /// Fires after every switch.
    pub fn subscribe(&self) -> watch::Receiver<ChainSelection> {
        self.notifier.subscribe()
    }

    pub async fn switch_to(&self, index: usize) -> Result<ChainSelection, MarketError> {
        let chain = SUPPORTED_CHAINS.get(index).ok_or_else(|| {
            MarketError::Config(format!(
                "chain index {} out of range 0..{}",
                index,
                SUPPORTED_CHAINS.len()
            ))
        })?;
        let fresh = (self.factory)(chain)?;

        let mut active = self.active.write().await;

        self.store.set(CHAIN_KEY, &index.to_string()).await?;
        self.store.set(PAGE_KEY, "0").await?;

        let selection = ChainSelection {
            index,
            generation: active.selection.generation + 1,
        };
        let replaced = std::mem::replace(
            &mut *active,
            Active {
                selection,
                adapter: fresh,
            },
        );
        drop(active);
        self.notifier.send_replace(selection);

        // Outside the lock: readers get the new adapter while the old one
        // lets go of its session.
        replaced.adapter.sign_out().await;

        info!(
            from = replaced.selection.info().label,
            to = chain.label,
            generation = selection.generation,
            "chain switched"
        );

        Ok(selection)
    }
}
