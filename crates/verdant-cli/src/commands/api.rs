use chrono::Utc;
use clap::Subcommand;
use verdant_core::focus::{ApiConfig, DistractionClassifier, Provider};

use super::{open_engine, open_store, print_json, CliResult};

#[derive(Subcommand)]
pub enum ApiAction {
    /// Show the analyzer settings (key redacted)
    Show,
    /// Select the provider: mock or openai
    Provider { provider: String },
    /// Store an API key, optionally with an OpenAI-compatible base URL
    Key {
        key: String,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Forget the stored API key
    ClearKey,
    /// Turn the classification cache on or off
    Cache {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Drop every cached site classification
    ClearCache,
    /// Drop cached classifications older than seven days
    PruneCache,
    /// Send a tiny request to check the credentials
    Test,
}

pub async fn run(action: ApiAction) -> CliResult {
    let store = open_store()?;

    match action {
        ApiAction::Show => {
            let api: ApiConfig = store.get()?;
            return print_json(&api.redacted());
        }
        ApiAction::Provider { provider } => {
            let provider: Provider = provider.parse()?;
            store.update(|api: &mut ApiConfig| api.provider = provider)?;
            if provider == Provider::Openai && store.get::<ApiConfig>()?.api_key.is_none() {
                eprintln!("no API key stored yet; scoring stays heuristic until `verdant api key` is set");
            }
        }
        ApiAction::Key { key, base_url } => {
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err("API key must not be empty".into());
            }
            store.update(|api: &mut ApiConfig| {
                api.api_key = Some(key.clone());
                if base_url.is_some() {
                    api.base_url = base_url.clone();
                }
            })?;
        }
        ApiAction::ClearKey => {
            store.update(|api: &mut ApiConfig| api.api_key = None)?;
        }
        ApiAction::Cache { enabled } => {
            store.update(|api: &mut ApiConfig| api.use_cache = enabled)?;
        }
        ApiAction::ClearCache => {
            DistractionClassifier::heuristic(store).clear_cache()?;
        }
        ApiAction::PruneCache => {
            let removed = DistractionClassifier::heuristic(store).prune_expired(Utc::now())?;
            println!("removed {removed} expired classifications");
            return Ok(());
        }
        ApiAction::Test => {
            let check = open_engine()?.test_api().await?;
            print_json(&check)?;
            if !check.ok {
                return Err(check.message.into());
            }
            return Ok(());
        }
    }
    println!("ok");
    Ok(())
}
