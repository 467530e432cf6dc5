//! `tsplay` - run a TypeScript file with line-mapped console output
//!
//! ```bash
//! tsplay main.ts
//! tsplay --watch -e API_URL=http://localhost:8080 main.ts
//! RUST_LOG=tsplay_core=debug tsplay --json main.ts
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tsplay_runner::cli::{self, Args};

fn init_logging() {
    // Diagnostics go to stderr so they never mix with program output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli::run(args))?;
    std::process::exit(code);
}
