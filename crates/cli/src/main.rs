//! Edustore CLI - Inspect and edit the cart from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart (guest cart unless EDUSTORE_SESSION_TOKEN is set)
//! edustore show
//!
//! # Add three copies of a lab manual
//! edustore add lab-manual-42 -q 3
//!
//! # Adjust a line
//! edustore inc lab-manual-42
//! edustore dec lab-manual-42
//! edustore set lab-manual-42 5
//!
//! # Push the stored guest cart into the account cart
//! EDUSTORE_SESSION_TOKEN=... edustore sync
//! ```
//!
//! # Commands
//!
//! - `show` - Print cart lines and totals
//! - `add`, `inc`, `dec`, `set`, `remove`, `clear` - Edit the cart
//! - `sync` - Run (or retry) the login drain
//! - `logout` - Drop the account cart view and the stored guest cart

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use edustore_cart::CartConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "edustore")]
#[command(author, version, about = "Edustore cart client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cart
    Show,
    /// Add an item to the cart
    Add {
        /// Item (lab manual) ID
        item: String,

        /// Number of copies to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Add one copy of an item
    Inc {
        /// Item (lab manual) ID
        item: String,
    },
    /// Remove one copy of an item
    Dec {
        /// Item (lab manual) ID
        item: String,
    },
    /// Set the number of copies of an item
    Set {
        /// Item (lab manual) ID
        item: String,

        /// New quantity (at least 1)
        quantity: u32,
    },
    /// Remove an item's line
    Remove {
        /// Item (lab manual) ID
        item: String,
    },
    /// Empty the cart
    Clear,
    /// Sync the stored guest cart into the account cart
    Sync,
    /// Log out: drop the account cart view and the stored guest cart
    Logout,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "edustore_cart=info,edustore_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration is needed before tracing for the Sentry DSN
    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    match commands::run(cli.command, config).await {
        Ok(output) => print_output(&output),
        Err(e) => {
            tracing::error!("Command failed: {e}");
            std::process::exit(1);
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_output(output: &str) {
    println!("{output}");
}
