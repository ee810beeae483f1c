use mark_page::runner::{self, RunnerConfig};
use mark_page::storage::{self, FileStore, Store};
use serde_json::Value;

mod args;
use args::Args;
use clap::Parser;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let mut args = Args::parse();

    // Override the WebDriver URL with an environment variable if provided
    if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
        if !webdriver_url.is_empty() {
            args.webdriver_url = webdriver_url;
        }
    }

    ::log::info!("Starting run for: {}", args.url);
    println!("Note: running requires a WebDriver server (e.g., ChromeDriver).");
    println!(
        "Set WEBDRIVER_URL environment variable if not using the default http://localhost:4444"
    );

    let store = FileStore::open(&args.state_file).await;

    // Arm the run; the flag is what lets it survive every navigation.
    let origin = storage::page_origin(&args.url);
    store
        .set(
            &storage::scraping_key(&origin),
            Value::String(storage::RUN_ACTIVE.to_string()),
        )
        .await;

    let config = RunnerConfig {
        webdriver_url: args.webdriver_url,
        out_dir: args.out_dir,
        settle_secs: args.settle,
    };

    let start_time = std::time::Instant::now();
    match runner::run(&store, &args.url, &config).await {
        Ok(Some(path)) => {
            ::log::info!(
                "Run complete in {:.2} seconds, artifact at {}",
                start_time.elapsed().as_secs_f64(),
                path.display()
            );
            println!("Saved results to {}", path.display());
        }
        Ok(None) => {
            ::log::info!("Run complete, no records were extracted");
            println!("No records were extracted.");
        }
        Err(e) => {
            ::log::error!("Run failed: {}", e);
        }
    }
}
