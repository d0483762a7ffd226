//! hostpulse binary: one-shot and continuous collection, plus the HTTP API.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use hostpulse::format::{
    counter_rate, format_bytes, format_bytes_per_sec, format_percent, format_rpm,
    format_temperature, format_uptime, format_watts,
};
use hostpulse::{
    start_web_server, CollectionScope, ConfigLoader, Monitor, MonitorConfig, MetricsSnapshot,
    Tick,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "hostpulse")]
#[command(about = "Host metrics, sensors and alerts for macOS and Linux")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Samples CPU, memory, disk, network, process and sensor metrics, \
evaluates threshold alerts and serves the results over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect metrics and print them (default)
    Collect(CollectArgs),

    /// Poll continuously and serve the HTTP API
    Serve(ServeArgs),

    /// Print the resolved configuration
    ValidateConfig(ValidateArgs),
}

#[derive(Args, Default)]
struct CollectArgs {
    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Indent JSON output
    #[arg(long, requires = "json")]
    pretty: bool,

    /// Include network and process metrics
    #[arg(long)]
    full: bool,

    /// Keep collecting until interrupted
    #[arg(short, long)]
    watch: bool,

    /// Seconds between samples in watch mode (defaults to monitor.refresh_interval_sec)
    #[arg(short, long)]
    interval: Option<u64>,
}

#[derive(Args)]
struct ServeArgs {
    /// API port (overrides api.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Print a single value by dot path, e.g. alerts.cpu_percent
    #[arg(long)]
    get: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Collect(args)) => collect_command(&cli, args).await,
        Some(Commands::Serve(args)) => serve_command(&cli, args).await.map(|_| ExitCode::SUCCESS),
        Some(Commands::ValidateConfig(args)) => {
            validate_command(&cli, args).map(|_| ExitCode::SUCCESS)
        }
        None => collect_command(&cli, &CollectArgs::default()).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn config_loader(cli: &Cli) -> ConfigLoader {
    match &cli.config {
        Some(path) => ConfigLoader::new().with_config_path(path),
        None => ConfigLoader::new(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<MonitorConfig> {
    config_loader(cli).load().context("failed to load configuration")
}

async fn collect_command(cli: &Cli, args: &CollectArgs) -> anyhow::Result<ExitCode> {
    let config = load_config(cli)?;
    let scope = if args.full {
        CollectionScope::Full
    } else {
        CollectionScope::Basic
    };
    let monitor = Monitor::from_config(&config, scope);

    if !args.watch {
        let mut monitor = monitor;
        let tick = monitor.tick().await;
        print_tick(&tick, None, args)?;
        return Ok(exit_code(&tick.snapshot));
    }

    let interval = args
        .interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.monitor.refresh_interval());
    info!("Collecting every {:?}, Ctrl-C to stop", interval);

    let state = monitor.state();
    let mut ticks = monitor.into_stream(interval);
    let mut previous: Option<MetricsSnapshot> = None;
    let mut first = true;
    loop {
        tokio::select! {
            tick = ticks.next() => {
                let Some(tick) = tick else { break };
                print_tick(&tick, previous.as_ref(), args)?;
                // Only the first collection decides the exit status.
                if first && collection_failed(&tick.snapshot) {
                    return Ok(ExitCode::FAILURE);
                }
                first = false;
                if tick.snapshot.is_ok() {
                    previous = Some(tick.snapshot);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    state.save_history().await;

    Ok(ExitCode::SUCCESS)
}

fn collection_failed(snapshot: &MetricsSnapshot) -> bool {
    snapshot.error.is_some()
}

/// Exit status for a single collection: 1 when the snapshot carries an error.
fn exit_code(snapshot: &MetricsSnapshot) -> ExitCode {
    if collection_failed(snapshot) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    if let Some(port) = args.port {
        config.api.port = port;
    }
    hostpulse::config::validate(&config)?;

    let monitor = Monitor::from_config(&config, CollectionScope::Full);
    let state = monitor.state();
    let interval = config.monitor.refresh_interval();

    info!("Polling every {:?}", interval);
    let poller = tokio::spawn(async move {
        let mut ticks = monitor.into_stream(interval);
        while let Some(tick) = ticks.next().await {
            if let Some(err) = &tick.snapshot.error {
                warn!("collection failed: {}", err);
            }
            for event in &tick.events {
                warn!("[{}] {}: {}", event.severity, event.rule_name, event.message);
            }
        }
    });

    let served = start_web_server(&config.api, state.clone(), shutdown_signal()).await;
    poller.abort();
    state.save_history().await;
    served?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", err);
    }
    info!("Shutting down");
}

fn validate_command(cli: &Cli, args: &ValidateArgs) -> anyhow::Result<()> {
    let loader = config_loader(cli);
    if let Some(key) = &args.get {
        let value = loader
            .find_value(key)
            .with_context(|| format!("no config value at {}", key))?;
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    let config = loader.load().context("invalid configuration")?;
    match loader.config_file() {
        Some(path) => println!("# file: {}", path.display()),
        None => println!("# file: none (defaults and environment only)"),
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_tick(tick: &Tick, previous: Option<&MetricsSnapshot>, args: &CollectArgs) -> anyhow::Result<()> {
    if args.json {
        let json = if args.pretty {
            serde_json::to_string_pretty(&tick.snapshot)?
        } else {
            serde_json::to_string(&tick.snapshot)?
        };
        println!("{}", json);
    } else {
        print_pretty_snapshot(&tick.snapshot, previous);
        for event in &tick.events {
            println!("  ALERT [{}] {}: {}", event.severity, event.rule_name, event.message);
        }
        println!();
    }
    Ok(())
}

fn print_pretty_snapshot(snapshot: &MetricsSnapshot, previous: Option<&MetricsSnapshot>) {
    println!(
        "hostpulse snapshot ({})",
        chrono::DateTime::from_timestamp_millis((snapshot.timestamp * 1000.0) as i64)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("==========================================");

    if let Some(err) = &snapshot.error {
        println!("  Error: {}", err);
        return;
    }

    println!("CPU:");
    println!(
        "  Usage: {} of {} cores",
        format_percent(snapshot.cpu_percent, 1),
        snapshot.cpu_count
    );
    println!(
        "  Load: {:.2}, {:.2}, {:.2}",
        snapshot.load_average.load_1, snapshot.load_average.load_5, snapshot.load_average.load_15
    );

    println!("Memory:");
    println!(
        "  Used: {:.1} / {:.1} GB ({})",
        snapshot.memory_used_gb,
        snapshot.memory_total_gb,
        format_percent(snapshot.memory_percent, 1)
    );
    println!(
        "  Swap: {:.1} / {:.1} GB ({})",
        snapshot.swap_used_gb,
        snapshot.swap_total_gb,
        format_percent(snapshot.swap_percent, 1)
    );

    println!("Disk:");
    println!(
        "  /: {:.1} / {:.1} GB ({})",
        snapshot.disk_used_gb,
        snapshot.disk_total_gb,
        format_percent(snapshot.disk_percent, 1)
    );
    for mount in snapshot.disk_mounts.iter().filter(|m| m.mountpoint != "/") {
        println!(
            "  {}: {:.1} / {:.1} GB ({})",
            mount.mountpoint,
            mount.used_gb,
            mount.total_gb,
            format_percent(mount.percent, 1)
        );
    }
    if let Some(prev) = previous {
        let elapsed = snapshot.timestamp - prev.timestamp;
        println!(
            "  I/O: read {}, write {}",
            format_bytes_per_sec(counter_rate(prev.disk_read_bytes, snapshot.disk_read_bytes, elapsed)),
            format_bytes_per_sec(counter_rate(prev.disk_write_bytes, snapshot.disk_write_bytes, elapsed))
        );
    }

    if let Some(percent) = snapshot.battery_percent {
        let source = match snapshot.battery_plugged {
            Some(true) => "AC",
            Some(false) => "battery",
            None => "unknown",
        };
        println!("Battery: {} ({})", format_percent(percent, 0), source);
    }

    if snapshot.sensors_available {
        println!("Sensors:");
        if let Some(pressure) = snapshot.thermal_pressure {
            println!("  Thermal pressure: {}", pressure.as_str());
        }
        for (name, celsius) in &snapshot.temperatures {
            println!("  {}: {}", name, format_temperature(*celsius));
        }
        for (name, rpm) in &snapshot.fan_speeds {
            println!("  {}: {}", name, format_rpm(*rpm));
        }
        for (name, watts) in &snapshot.power_estimates {
            println!("  {}: {}", name, format_watts(*watts));
        }
    }

    let network = &snapshot.network;
    if network.bytes_sent > 0 || network.bytes_recv > 0 {
        println!("Network:");
        println!(
            "  Total: sent {}, received {}",
            format_bytes(network.bytes_sent as f64),
            format_bytes(network.bytes_recv as f64)
        );
        if let Some(prev) = previous {
            let elapsed = snapshot.timestamp - prev.timestamp;
            println!(
                "  Rate: up {}, down {}",
                format_bytes_per_sec(counter_rate(prev.network.bytes_sent, network.bytes_sent, elapsed)),
                format_bytes_per_sec(counter_rate(prev.network.bytes_recv, network.bytes_recv, elapsed))
            );
        }
    }

    if !snapshot.processes.is_empty() {
        println!("Top processes:");
        for process in snapshot.processes.iter().take(10) {
            println!(
                "  {:>7} {:<24} cpu {:>6} mem {:>6}",
                process.pid,
                process.name,
                format_percent(process.cpu_percent, 1),
                format_percent(process.memory_percent, 1)
            );
        }
    }

    println!("Uptime: {}", format_uptime(snapshot.uptime_sec));
}
