use clap::Parser;
use harvester::Harvester;
use moltbook_client::MoltbookClient;
use moltscrape_core::{ClientConfig, ConfigError, CoreError, HarvestConfig};
use std::time::Duration;
use storage::{PostSink, StateStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Moltbook post harvester with cross-run deduplication")]
struct Args {
    /// Submolts to scrape, in order
    #[arg(long, short = 's', num_args = 1.., default_values_t = ["general".to_string(), "introductions".to_string()])]
    submolts: Vec<String>,

    /// Target number of new posts per submolt
    #[arg(long, short = 'n', default_value_t = 100)]
    count: usize,

    /// Moltbook API key (optional)
    #[arg(long, short = 'k')]
    api_key: Option<String>,

    /// Directory for snapshots and per-submolt sinks
    #[arg(long, default_value = "data")]
    data_dir: String,

    /// Seconds to wait before every API request
    #[arg(long, default_value_t = 1.0)]
    delay: f64,

    /// Posts requested per page
    #[arg(long, default_value_t = 25)]
    page_size: u32,
}

fn validate(args: &Args) -> Result<(), ConfigError> {
    if args.count == 0 {
        return Err(ConfigError::InvalidValue {
            field: "count".to_string(),
            value: args.count.to_string(),
        });
    }
    if args.page_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "page_size".to_string(),
            value: args.page_size.to_string(),
        });
    }
    if !args.delay.is_finite() || args.delay < 0.0 {
        return Err(ConfigError::InvalidValue {
            field: "delay".to_string(),
            value: args.delay.to_string(),
        });
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "moltscrape=info,moltbook_client=info,harvester=info,storage=info".into()
            }),
        )
        .init();

    let args = Args::parse();
    validate(&args)?;

    tracing::info!(submolts = ?args.submolts, count = args.count, "Moltscrape starting");

    let mut client_config = ClientConfig::moltbook(args.api_key.clone());
    client_config.request_delay = Duration::from_secs_f64(args.delay);
    let client = MoltbookClient::new(client_config)?;

    let store = StateStore::new(&args.data_dir)?;
    let sink = PostSink::new(&args.data_dir)?;
    let harvest_config = HarvestConfig {
        page_size: args.page_size,
        ..Default::default()
    };

    let mut harvester = Harvester::new(client, store, sink, harvest_config)?;
    let summary = harvester.run(&args.submolts, args.count).await?;

    let api_metrics = harvester.fetcher().get_metrics().await;
    tracing::info!(
        total_requests = api_metrics.total_requests,
        failed_requests = api_metrics.failed_requests,
        timed_out = api_metrics.timed_out_requests,
        "API request totals"
    );

    println!("New posts collected: {}", summary.new_posts);
    println!("Total unique posts seen: {}", summary.total_seen);
    println!("Total unique authors tracked: {}", summary.total_authors);

    Ok(())
}
