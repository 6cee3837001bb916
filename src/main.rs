use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use argus::{event_channel, AlertLog, AlertWriter, AppConfig, CameraSupervisor, QueryServer};

#[derive(Parser, Debug)]
#[command(name = "argus")]
#[command(about = "Local multi-camera video analytics engine")]
#[command(version)]
#[command(
    long_about = "A local multi-camera video analytics engine. Decodes up to four \
USB or RTSP/IP video sources concurrently, scores motion against a learned \
background, tracks detected objects for tripwire and loitering events, and \
serves the fused alert log over a read-only HTTP API."
)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "argus.toml",
        help = "Path to TOML configuration file"
    )]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(
        long,
        help = "Validate configuration file and exit without starting the engine"
    )]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - load configuration and build pipelines without starting
    #[arg(
        long,
        help = "Perform dry run - build components but don't start capture or serving"
    )]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(
        long,
        value_name = "FORMAT",
        help = "Log output format: json, pretty, or compact"
    )]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting argus v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match AppConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let (events, event_rx) = event_channel();

    let alerts = AlertLog::shared();
    let writer = AlertWriter::new(alerts.clone(), event_rx);
    let writer_handle = tokio::spawn(writer.run());

    let supervisor = CameraSupervisor::new(&config, events);

    if args.dry_run {
        info!("Dry run mode - components built but not started");
        println!("Dry run completed successfully");
        return Ok(());
    }

    supervisor.start_all();

    let server = QueryServer::new(config.http.clone(), alerts, supervisor.clone());
    let result = server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await;

    if let Err(e) = &result {
        error!("Query server error: {}", e);
    }

    // Stop capture threads, then let the writer drain the closed channel
    let stopping = supervisor.clone();
    tokio::task::spawn_blocking(move || stopping.stop_all()).await?;
    drop(supervisor);

    if tokio::time::timeout(std::time::Duration::from_secs(5), writer_handle)
        .await
        .is_err()
    {
        error!("Alert writer did not drain in time");
    }

    info!("argus stopped");
    result.map_err(Into::into)
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("argus={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# argus configuration file");
    println!("# These are the built-in defaults; override in TOML or ARGUS_* env vars");
    println!();

    let default_config = AppConfig::default();
    match toml::to_string_pretty(&default_config) {
        Ok(toml_str) => println!("{}", toml_str),
        Err(e) => eprintln!("Failed to render default config: {}", e),
    }
}
