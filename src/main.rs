use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::Result;

use nativo_market::config::Config;
use nativo_market::error::MarketError;
use nativo_market::models::{ChainInfo, ChainKind, Token, TokenRef, SUPPORTED_CHAINS};
use nativo_market::services::adapter::{CallOutcome, ChainAdapter};
use nativo_market::services::data_loader::token_detail::load_detail;
use nativo_market::services::data_loader::TokenDetail;
use nativo_market::services::evm::EvmAdapter;
use nativo_market::services::feedback::LogFeedback;
use nativo_market::services::indexer::{GraphIndexerClient, MarketIndexer};
use nativo_market::services::logging::logger;
use nativo_market::services::near::NearAdapter;
use nativo_market::services::orchestrator::TransactionOrchestrator;
use nativo_market::services::selector::{AdapterFactory, AdapterSelector};
use nativo_market::services::store::MongoSettingsStore;
use nativo_market::services::units::to_display_unit;

#[derive(Parser)]
#[command(name = "nativo", about = "Buy, bid on and resell Nativo NFTs")]
struct Cli {
    /// Seconds to wait for a market call before giving up.
    #[arg(long, env = "NATIVO_TIMEOUT", default_value_t = 180)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Token details and offers, by `<tokenId>:<collectionId>`.
    Show {
        token: String,
    },
    Buy {
        token: String,
    },
    /// Bid on a token. Price in the chain's display unit.
    Offer {
        token: String,
        price: String,
        #[arg(long)]
        accept_terms: bool,
    },
    Accept {
        token: String,
    },
    Decline {
        token: String,
    },
    Resell {
        token: String,
        price: String,
    },
    /// Select another chain by index. Signs out and resets the listing page.
    Switch {
        index: usize,
    },
    /// Print the selected chain and the ones available.
    Chain,
}

fn adapter_factory(config: Arc<Config>) -> AdapterFactory {
    Box::new(move |chain| {
        let adapter: Arc<dyn ChainAdapter> = match chain.kind {
            ChainKind::Near => Arc::new(NearAdapter::new(chain, &config.near)?),
            ChainKind::Evm => Arc::new(EvmAdapter::new(
                chain,
                config.evm_network(chain.label)?,
                config.evm_private_key.as_deref(),
            )?),
        };
        Ok(adapter)
    })
}

async fn with_timeout<F>(seconds: u64, call: F) -> Result<CallOutcome, MarketError>
where
    F: Future<Output = Result<CallOutcome, MarketError>>,
{
    tokio::time::timeout(Duration::from_secs(seconds), call)
        .await
        .map_err(|_| MarketError::Timeout)?
}

/// NEAR tokens come from the subgraph, EVM tokens from the market contract.
fn market_reader(
    config: &Config,
    chain: &'static ChainInfo,
    indexer: Arc<GraphIndexerClient>,
) -> Result<Arc<dyn MarketIndexer>, MarketError> {
    match chain.kind {
        ChainKind::Near => Ok(indexer),
        ChainKind::Evm => Ok(Arc::new(EvmAdapter::new(
            chain,
            config.evm_network(chain.label)?,
            None,
        )?)),
    }
}

fn print_token(adapter: &dyn ChainAdapter, token: &Token) -> Result<()> {
    let currency = adapter.chain().currency;
    println!("{} ({})", token.metadata.title, token.id);
    println!("  collection: {}", token.collection);
    println!("  owner:      {}", token.owner);
    println!("  creator:    {}", token.creator);
    println!(
        "  price:      {} {}{}",
        to_display_unit(token.price, token.price_decimals)?,
        currency,
        if token.on_sale { "" } else { " (not for sale)" }
    );
    if let Some(bid) = token.highest_bid.value() {
        println!("  highest bid: {}", bid);
    }
    if !token.metadata.tags.is_empty() {
        println!("  tags:       {}", token.metadata.tags.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);
    logger::init(&config.log_path)?;

    let store = Arc::new(MongoSettingsStore::connect(&config.mongo_uri, &config.mongo_db).await?);
    let selector =
        Arc::new(AdapterSelector::load(store, adapter_factory(config.clone())).await?);
    let indexer = Arc::new(GraphIndexerClient::new(config.indexer_url.clone()));
    let reader = market_reader(&config, selector.selection().await.info(), indexer)?;
    let orchestrator =
        TransactionOrchestrator::new(selector.clone(), Arc::new(LogFeedback), config.market.clone());

    let outcome = match cli.command {
        Command::Chain => {
            let selection = selector.selection().await;
            for (index, chain) in SUPPORTED_CHAINS.iter().enumerate() {
                let marker = if index == selection.index { "*" } else { " " };
                println!("{} {} {} ({})", marker, index, chain.label, chain.currency);
            }
            return Ok(());
        }
        Command::Switch { index } => {
            let selection = selector.switch_to(index).await?;
            println!("switched to {}, sign in again", selection.info().label);
            return Ok(());
        }
        Command::Show { token } => {
            let token_ref = TokenRef::parse(&token)?;
            let adapter = selector.current().await;

            match load_detail(reader.as_ref(), &token_ref).await? {
                TokenDetail::Ready { token, offers } => {
                    print_token(adapter.as_ref(), &token)?;
                    println!("  offers:");
                    for offer in offers {
                        println!(
                            "    #{} {} {} by {}",
                            offer.offer_id,
                            adapter.to_display_unit(offer.price)?,
                            adapter.chain().currency,
                            offer.bidder
                        );
                    }
                }
                TokenDetail::Unavailable => println!("market data is unavailable right now"),
            }
            return Ok(());
        }
        Command::Buy { token } => {
            let token = reader.get_token(&TokenRef::parse(&token)?).await?;
            with_timeout(cli.timeout, orchestrator.buy(&token)).await?
        }
        Command::Offer {
            token,
            price,
            accept_terms,
        } => {
            let token = reader.get_token(&TokenRef::parse(&token)?).await?;
            with_timeout(cli.timeout, orchestrator.make_offer(&token, &price, accept_terms)).await?
        }
        Command::Accept { token } => {
            let token = reader.get_token(&TokenRef::parse(&token)?).await?;
            with_timeout(cli.timeout, orchestrator.resolve_offer(&token, true)).await?
        }
        Command::Decline { token } => {
            let token = reader.get_token(&TokenRef::parse(&token)?).await?;
            with_timeout(cli.timeout, orchestrator.resolve_offer(&token, false)).await?
        }
        Command::Resell { token, price } => {
            let token = reader.get_token(&TokenRef::parse(&token)?).await?;
            with_timeout(cli.timeout, orchestrator.resell(&token, &price)).await?
        }
    };

    match outcome.receipt {
        Some(receipt) if outcome.success => println!("done: {}", receipt),
        Some(receipt) => println!("not confirmed yet: {}", receipt),
        None => println!("done"),
    }

    Ok(())
}
