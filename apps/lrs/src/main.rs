//! # LRS - Learning Record Store
//!
//! The command-line binary over the `lrs-core` record store.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                apps/lrs (THE BINARY)          │
//! │                                               │
//! │   ┌─────────────┐        ┌────────────────┐   │
//! │   │    CLI      │        │     Config     │   │
//! │   │   (clap)    │        │ (toml + env)   │   │
//! │   └──────┬──────┘        └───────┬────────┘   │
//! │          └───────────┬───────────┘            │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │   lrs-core    │                │
//! │              │  (THE LOGIC)  │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! lrs init
//! lrs statement store -f statements.json
//! lrs statement list --agent learner@example.com --limit 10
//! lrs state put --activity http://example.com/lesson --agent learner@example.com -s bookmark -f state.json
//! lrs --json status
//! ```

use clap::Parser;
use lrs::cli;
use lrs::config::{LogFormat, LrsConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Resolve configuration before logging starts; it selects the log format.
    let config = match LrsConfig::resolve(cli.config.as_deref(), &cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format, cli.verbose);

    // Display startup banner
    if !cli.quiet && !cli.json {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the tracing subscriber. Logs go to stderr so stdout stays
/// parseable in `--json` mode.
fn init_tracing(format: LogFormat, verbose: bool) {
    let default_filter = if verbose {
        "lrs=debug,lrs_core=debug"
    } else {
        "lrs=info,lrs_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  ██╗     ██████╗ ███████╗
  ██║     ██╔══██╗██╔════╝
  ██║     ██████╔╝███████╗
  ██║     ██╔══██╗╚════██║
  ███████╗██║  ██║███████║
  ╚══════╝╚═╝  ╚═╝╚══════╝

  Learning Record Store v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
