pub mod cli;
pub mod db;
pub mod settings;
pub mod summary;
pub mod timer;
pub mod utils;

use clap::Parser;

pub use cli::{Cli, Commands};

const DEBUG_ENV: &str = "FOCUS_FRIENDS_DEBUG";

pub fn run() -> anyhow::Result<()> {
    let debug_mode = std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    utils::logging::init(debug_mode);

    let cli = Cli::parse();

    log::debug!("Focus Friends starting up...");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::execute(cli))
}
