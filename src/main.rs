use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use sentryd::app::NodeApp;
use sentryd::NodeConfig;

#[derive(Parser, Debug)]
#[command(name = "sentryd")]
#[command(about = "Edge surveillance node: motion-triggered capture, local/cloud routing, MJPEG streaming")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sentry.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug level logging
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable info level logging
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Errors only
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the node")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("starting sentryd v{}", env!("CARGO_PKG_VERSION"));
    info!(config = %args.config, "loading configuration");

    let config = match NodeConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return Err(e.into());
        }
    };

    if args.validate_config {
        return match config.validate() {
            Ok(()) => {
                println!("configuration is valid");
                Ok(())
            }
            Err(e) => {
                eprintln!("configuration validation failed: {}", e);
                std::process::exit(1);
            }
        };
    }

    let mut app = NodeApp::new(config).map_err(|e| {
        error!(error = %e, "failed to build node");
        e
    })?;

    app.start().map_err(|e| {
        error!(error = %e, "failed to start node");
        e
    })?;

    let exit_code = app.run().map_err(|e| {
        error!(error = %e, "node exited with error");
        e
    })?;

    info!(exit_code, "sentryd exited");
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("sentryd={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer().json().with_target(true).with_thread_ids(true).boxed(),
        Some("compact") => fmt::layer().compact().with_target(false).boxed(),
        Some("pretty") | None => fmt::layer().pretty().with_target(true).with_thread_ids(args.debug).boxed(),
        Some(other) => {
            eprintln!("unknown log format '{}', using default", other);
            fmt::layer().boxed()
        }
    };

    tracing_subscriber::registry().with(fmt_layer).with(env_filter).init();
    Ok(())
}

fn print_default_config() {
    println!("# sentryd configuration file");
    println!("# these are the built-in defaults; override in TOML or SENTRY_* env vars");
    println!();

    match toml::to_string_pretty(&NodeConfig::default()) {
        Ok(toml_str) => println!("{}", toml_str),
        Err(e) => eprintln!("failed to render default config: {}", e),
    }
}
