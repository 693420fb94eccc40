//! teebridge - a transparent TCP bridge that journals all traffic

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use teebridge::app::Runtime;
use teebridge::config::Config;
use teebridge::error::Result;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging. Diagnostics go to stderr; stdout is reserved for
    // listener announcements.
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("teebridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::new(
        args.source_host,
        args.source_service,
        args.destination_host,
        args.destination_service,
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let runtime = Runtime::from_config(config).await?;
        runtime.run().await
    })?;

    info!("Goodbye!");
    Ok(())
}

/// Command line arguments
struct Args {
    source_host: String,
    source_service: String,
    destination_host: String,
    destination_service: String,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();

        if args.len() < 5 {
            print_usage(args.first().map(String::as_str).unwrap_or("teebridge"));
            std::process::exit(1);
        }

        Self {
            source_host: args[1].clone(),
            source_service: args[2].clone(),
            destination_host: args[3].clone(),
            destination_service: args[4].clone(),
        }
    }
}

fn print_usage(progname: &str) {
    eprintln!(
        "Usage: {} <source-host> <source-service> <destination-host> <destination-service>",
        progname
    );
}
