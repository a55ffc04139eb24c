//! Live travel-insurance quote watcher.
//!
//! Reads the wizard's stored trip, requests live quotes and prints the
//! filtered plan list as results stream in.
//!
//! ```bash
//! cargo run --bin quote_watch -- generate-config
//! cargo run --bin quote_watch -- --trip-file wizard.json --band show_all watch
//! cargo run --bin quote_watch -- --trip-file wizard.json show-request
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use travel_quote_sdk::{
    logging::{init_logging, LogFormat},
    AppConfig, CoverageBand, InsurerFilter, PriceSort, QuoteClient, QuoteFilters, QuoteView,
    ViewStatus,
};

#[derive(Parser)]
#[command(name = "quote_watch")]
#[command(version, about = "Live travel-insurance quote watcher", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "quote_watch.toml")]
    config: String,

    /// Override the wizard document holding the trip
    #[arg(long)]
    trip_file: Option<PathBuf>,

    /// Override network (production, staging, localhost, or a URL)
    #[arg(long)]
    network: Option<String>,

    /// Auth token for the quoting service (overrides config)
    #[arg(long, env = "QUOTE_SERVICE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Show only this insurer's plans
    #[arg(long)]
    insurer: Option<String>,

    /// Coverage band (upto_25k, 25k_50k, ..., above_1m, most_popular, show_all)
    #[arg(long)]
    band: Option<CoverageBand>,

    /// Premium order (low_to_high, high_to_low)
    #[arg(long)]
    sort: Option<PriceSort>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<String>,

    /// Log file path (logs to both file and stdout)
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sample config file
    GenerateConfig {
        /// Output file path
        #[arg(short, long, default_value = "quote_watch.toml")]
        output: String,
    },
    /// Validate config without connecting
    ValidateConfig,
    /// Print the request composed from the stored trip
    ShowRequest,
    /// Stream quotes and print the plan list (default)
    Watch {
        /// Exit after the list has been settled and unchanged this long (0 = until Ctrl+C)
        #[arg(long, default_value_t = 15)]
        idle_secs: u64,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = if Path::new(&cli.config).exists() {
        AppConfig::load(&cli.config)?
    } else {
        AppConfig::default()
    };

    if let Some(network) = &cli.network {
        config.network.base_url = network.clone();
    }
    if let Some(token) = &cli.token {
        config.network.auth_token = Some(token.clone());
    }
    if let Some(trip_file) = &cli.trip_file {
        config.storage.trip_file = trip_file.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.stdout_format = format.parse::<LogFormat>()?;
    }
    if let Some(log_file) = &cli.log_file {
        config.logging.log_file = Some(log_file.clone());
    }
    config.validate()?;
    Ok(config)
}

fn generate_sample_config(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let content = AppConfig::default().to_toml_string()?;
    let with_comments = format!(
        r#"# Live quote watcher configuration
# See: cargo run --bin quote_watch -- --help

{content}
# Set the service token via the QUOTE_SERVICE_TOKEN environment variable
# or uncomment below:
# [network]
# auth_token = "your_token_here"
"#
    );
    std::fs::write(path, with_comments)?;
    println!("Sample config written to: {path}");
    Ok(())
}

fn filters_from_cli(cli: &Cli) -> QuoteFilters {
    QuoteFilters {
        insurer: cli
            .insurer
            .clone()
            .map(InsurerFilter::Named)
            .unwrap_or_default(),
        coverage_band: cli.band.unwrap_or_default(),
        price_sort: cli.sort.unwrap_or_default(),
    }
}

fn print_view(view: &QuoteView) {
    let status = match view.status {
        ViewStatus::Loading => "loading".to_string(),
        ViewStatus::ConnectingWarning => format!(
            "connection problem: {}",
            view.connectivity_warning.as_deref().unwrap_or("retrying")
        ),
        ViewStatus::Populated => format!(
            "{} of {} plans shown, {} purchasable",
            view.quotes.len(),
            view.total_received,
            view.purchasable_count
        ),
        ViewStatus::Empty if view.purchasable_count > 0 => "no plans match the filters".to_string(),
        ViewStatus::Empty => "no plans available".to_string(),
    };
    println!();
    println!("== {status}{}", if view.is_loading { " ..." } else { "" });
    if view.any_filter_active {
        println!(
            "   filters: insurer={:?} band={} sort={:?}",
            view.filters.insurer, view.filters.coverage_band, view.filters.price_sort
        );
    }
    for quote in &view.quotes {
        let premium = if quote.is_purchasable() {
            format!("{:>10.2}", quote.net_premium)
        } else {
            format!("{:>10}", "n/a")
        };
        println!(
            "   {:<18} {:<36} {premium}  SI {:>10.0}",
            quote.provider, quote.plan_name, quote.sum_insured
        );
    }
    if let Some(error) = &view.error {
        println!("   last event error: {error}");
    }
}

async fn watch(
    config: &AppConfig,
    filters: QuoteFilters,
    idle_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = QuoteClient::from_config(config)?;
    let pipeline = client.watch_quotes(filters).await?;
    let mut views = pipeline.subscribe();
    let idle = Duration::from_secs(idle_secs);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut shown: Option<QuoteView> = None;
    loop {
        let settled = shown.as_ref().is_some_and(|view| !view.is_loading);
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = views.changed() => {
                if changed.is_err() {
                    warn!("Quote pipeline stopped");
                    break;
                }
                let view = views.borrow_and_update().clone();
                if shown.as_ref() != Some(&view) {
                    print_view(&view);
                    shown = Some(view);
                }
            }
            _ = tokio::time::sleep(idle), if idle_secs > 0 && settled => {
                info!(idle_secs, "Quote list settled, exiting");
                break;
            }
        }
    }

    let stats = client.manager().health_stats();
    info!(
        reconnections = stats.reconnection_count,
        transport = ?stats.transport,
        "Connection summary"
    );
    pipeline.close().await;
    client.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (before parsing CLI args)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::GenerateConfig { output }) => {
            generate_sample_config(output)?;
            return Ok(());
        }
        Some(Commands::ValidateConfig) => {
            let config = load_config(&cli)?;
            println!("Configuration is valid:\n{config:#?}");
            return Ok(());
        }
        Some(Commands::ShowRequest) => {
            let config = load_config(&cli)?;
            let request = QuoteClient::from_config(&config)?.compose_request().await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
            return Ok(());
        }
        Some(Commands::Watch { .. }) | None => {}
    }

    let config = load_config(&cli)?;
    let _guards = init_logging(&config.logging, None)?;

    let idle_secs = match &cli.command {
        Some(Commands::Watch { idle_secs }) => *idle_secs,
        _ => 15,
    };
    info!(
        network = %config.network.base_url,
        trip_file = %config.storage.trip_file.display(),
        "Starting quote watcher"
    );
    watch(&config, filters_from_cli(&cli), idle_secs).await
}
