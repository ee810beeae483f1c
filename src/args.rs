use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mark-page")]
#[command(about = "Replays captured page marks across a paginated site and collects the results")]
#[command(version)]
pub struct Args {
    /// Page URL to start the run from
    pub url: String,

    /// WebDriver server URL
    #[arg(long, default_value = "http://localhost:4444")]
    pub webdriver_url: String,

    /// JSON file holding the captured targets, pagination and checkpoint
    #[arg(long, default_value = "mark-page-state.json")]
    pub state_file: PathBuf,

    /// Directory the CSV artifact is written to
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Seconds to let a page settle before extracting
    #[arg(long, default_value_t = 10)]
    pub settle: u64,
}
