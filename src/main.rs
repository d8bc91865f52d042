use anyhow::Result;
use clap::Parser;
use leaky_threads::{
    log_events, DestroyReason, EventBus, EventFilter, HostController, HostEnvironment,
    LeakyConfig, Pattern, WorkerRegistry,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "leaky-threads")]
#[command(about = "Demonstrates leaking, detached and cancelable background workers")]
#[command(version)]
#[command(long_about = "Runs a host that starts one background worker per activation, \
recreates it a number of times and lists which workers are still executing. \
Captured workers leak the host and the thread, detached workers leak only the thread, \
cancelable workers are stopped when their host is torn down.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "leaky-threads.toml", help = "Path to TOML configuration file")]
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

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to a file in addition to stderr")]
    log_file: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting any worker")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Pattern for the first host (overrides host.default_pattern)
    #[arg(short, long, value_name = "PATTERN", help = "captured, detached or cancelable")]
    pattern: Option<Pattern>,

    /// Number of host recreations to simulate
    #[arg(short, long, default_value_t = 3, help = "How many times to recreate the host")]
    recreate: u32,

    /// Switch patterns once after the first activation
    #[arg(long, value_name = "PATTERN", help = "Select this pattern after the host is created")]
    switch_to: Option<Pattern>,

    /// Interrupt every listed worker before the final teardown
    #[arg(long, help = "Interrupt all workers before the host is destroyed")]
    reset: bool,

    /// Print worker listings as JSON
    #[arg(long, help = "Print worker listings as JSON instead of labels")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting leaky-threads v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match LeakyConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(pattern) = args.pattern {
        config.host.default_pattern = pattern;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    run(&args, config).await
}

async fn run(args: &Args, config: LeakyConfig) -> Result<()> {
    let events = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let logger = tokio::spawn(log_events(
        events.subscribe_filtered(EventFilter::All, "cli"),
    ));

    let env = HostEnvironment::from_config(&config).with_event_bus(Arc::clone(&events));
    let registry = Arc::clone(&env.registry);
    let filter = env.label_filter();

    let mut host = HostController::create(env, None)?;

    if let Some(pattern) = args.switch_to {
        if !host.select(pattern)? {
            warn!("Pattern {} already selected", pattern);
        }
    }

    for round in 1..=args.recreate {
        tokio::select! {
            _ = tokio::time::sleep(config.host.recreate_delay()) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, skipping remaining recreations");
                break;
            }
        }

        host = host.recreate()?;
        info!("Recreation {}/{} done", round, args.recreate);
    }

    println!("Workers after {} recreation(s) ({}):", args.recreate, host.pattern());
    print_workers(&registry, &filter, args.json)?;

    if args.reset {
        let interrupted = host.reset_workers();
        info!("Interrupted {} worker(s)", interrupted);
    }

    host.destroy(DestroyReason::Final);
    tokio::time::sleep(config.system.stop_timeout()).await;

    println!("Workers still running after final teardown:");
    print_workers(&registry, &filter, args.json)?;

    // Leaked workers keep the bus open, the logger would never see it close
    logger.abort();

    Ok(())
}

fn print_workers(registry: &WorkerRegistry, filter: &str, json: bool) -> Result<()> {
    let workers: Vec<_> = registry.list_active(filter).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&workers)?);
        return Ok(());
    }

    if workers.is_empty() {
        println!("  (none)");
    }
    for worker in &workers {
        println!("  {}", worker.label);
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("leaky_threads={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match args.log_file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# leaky-threads configuration file");
    println!("# This is the default configuration with all available options");
    println!("# Any value can be overridden with LEAKY_<SECTION>__<KEY>, e.g. LEAKY_WORKER__POLL_INTERVAL_MS=100");
    println!();
    println!("{}", LeakyConfig::default().to_toml_string()?);
    Ok(())
}
