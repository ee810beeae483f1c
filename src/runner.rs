use crate::export;
use crate::extract;
use crate::session::{self, Session};
use crate::storage::{self, Store};
use crate::traversal::{Step, Traversal};
use fantoccini::{Client, ClientBuilder};
use scraper::Html;
use serde_json::Value;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Configuration for a live-browser run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// URL of the WebDriver server
    pub webdriver_url: String,
    /// Directory the CSV artifact is written to
    pub out_dir: PathBuf,
    /// Seconds to let a freshly loaded page settle before extracting
    pub settle_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            out_dir: PathBuf::from("."),
            settle_secs: 10,
        }
    }
}

/// Connects to the WebDriver server, trying common fallback URLs when the
/// configured one is unreachable
async fn connect(webdriver_url: &str) -> Option<Client> {
    match ClientBuilder::native().connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Some(client);
        }
        Err(e) => {
            ::log::error!("Failed to connect to WebDriver at {}: {}", webdriver_url, e);
        }
    }

    let fallback_urls = [
        "http://localhost:9515", // ChromeDriver default
        "http://localhost:4444", // Selenium/GeckoDriver default
        "http://127.0.0.1:4444", // Try with IP instead of localhost
    ];

    for url in fallback_urls.iter() {
        if *url == webdriver_url {
            continue;
        }
        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = ClientBuilder::native().connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Some(client);
        }
    }

    ::log::error!("Failed to connect to any WebDriver server");
    None
}

/// Resolves a pagination href against the page it was found on
fn absolute_href(current_url: &str, href: &str) -> String {
    match Url::parse(current_url).and_then(|base| base.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_string(),
    }
}

async fn run_is_active(store: &dyn Store, origin: &str) -> bool {
    matches!(
        store.get(&storage::scraping_key(origin)).await,
        Some(Value::String(ref flag)) if flag == storage::RUN_ACTIVE
    )
}

/// Writes the accumulated results as the final CSV artifact and clears the
/// stored result set
async fn write_artifact(
    store: &dyn Store,
    origin: &str,
    doc: &Html,
    config: &RunnerConfig,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    let records = extract::load_results(store, origin).await;
    if records.is_empty() {
        ::log::warn!("Run for {} produced no records", origin);
        return Ok(None);
    }
    let name = export::artifact_name(&session::page_title(doc), "Scraper");
    let path = export::write_csv(&records, &config.out_dir, &name)?;
    store.remove(&storage::data_key(origin)).await;
    Ok(Some(path))
}

/// Drives a scraping run against a live browser.
///
/// Every pass of the loop plays the part of a fresh agent instance after a
/// navigation: the page source is re-fetched, the session is rehydrated from
/// the store, and the traversal engine decides from its checkpoint alone
/// where to go next. The run ends when the pagination is exhausted, when the
/// run flag is no longer active, or when no pagination was ever captured
/// (in which case the current page is extracted once).
pub async fn run(
    store: &dyn Store,
    start_url: &str,
    config: &RunnerConfig,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    let client = connect(&config.webdriver_url)
        .await
        .ok_or("Failed to connect to a WebDriver server")?;

    // The WebDriver session is closed on every exit path, error included.
    let outcome = drive(&client, store, start_url, config).await;
    if let Err(e) = client.close().await {
        ::log::warn!("Failed to close WebDriver client: {}", e);
    }
    outcome
}

async fn drive(
    client: &Client,
    store: &dyn Store,
    start_url: &str,
    config: &RunnerConfig,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    client.goto(start_url).await?;

    let traversal = Traversal::with_settle_delay(Duration::from_secs(config.settle_secs));
    let mut current_url = start_url.to_string();

    let artifact = loop {
        let source = client.source().await?;
        let doc = Html::parse_document(&source);
        let origin = storage::page_origin(&current_url);

        if !run_is_active(store, &origin).await {
            ::log::info!("Run for {} is not active, stopping", origin);
            break write_artifact(store, &origin, &doc, config).await?;
        }

        // A navigation destroyed everything the previous pass held in
        // memory; rebuild the session from persistence alone.
        let session = Session::load(store, &origin).await;
        let registry = session.registry.clone();
        if registry.is_empty() {
            ::log::warn!("No targets captured for {}", origin);
        }

        let doc_ref = &doc;
        let origin_ref = origin.as_str();
        let step = traversal
            .advance(&doc, store, &origin, || async {
                let records = extract::extract_from_targets(doc_ref, &registry);
                ::log::info!("Extracted {} records from {}", records.len(), current_url);
                extract::append_results(store, origin_ref, records).await;
            })
            .await;

        match step {
            Step::Navigate { href } => {
                let destination = absolute_href(&current_url, &href);
                ::log::info!("Advancing to {}", destination);
                // The goto is the moment this "process instance" dies.
                client.goto(&destination).await?;
                current_url = destination;
            }
            Step::Done => {
                ::log::info!("Scraping done for {}", origin);
                break write_artifact(store, &origin, &doc, config).await?;
            }
            Step::NoPagination => {
                // Single-page run: extract once and finish.
                let records = extract::extract_from_targets(&doc, &registry);
                ::log::info!("Extracted {} records from {}", records.len(), current_url);
                extract::append_results(store, &origin, records).await;
                store
                    .set(
                        &storage::scraping_key(&origin),
                        Value::String(storage::RUN_INACTIVE.to_string()),
                    )
                    .await;
                break write_artifact(store, &origin, &doc, config).await?;
            }
        }
    };

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_href_resolution() {
        assert_eq!(
            absolute_href("https://example.com/list?page=1", "/list?page=2"),
            "https://example.com/list?page=2"
        );
        assert_eq!(
            absolute_href("https://example.com/a/b", "c"),
            "https://example.com/a/c"
        );
        // Absolute hrefs pass through untouched.
        assert_eq!(
            absolute_href("https://example.com/", "https://other.com/p/2"),
            "https://other.com/p/2"
        );
    }
}
