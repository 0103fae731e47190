//! dns-proxy: stateless UDP DNS forwarding proxy with adaptive failover
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration file
//! dns-proxy
//!
//! # Custom config, no PID file, logs to syslog
//! dns-proxy -c /etc/dns-proxy/config.yaml -p "" -l syslog
//! ```

use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};

use dns_proxy::config::load_config;
use dns_proxy::logging::{self, LogSink};
use dns_proxy::pidfile::PidFile;
use dns_proxy::proxy::Proxy;

/// Command-line arguments
struct Args {
    /// Configuration file path
    config_path: String,
    /// PID file path (empty disables)
    pid_path: String,
    /// Log sink
    log_sink: LogSink,
    /// Check configuration only
    check_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = "config.yaml".to_string();
        let mut pid_path = "/var/run/dns-proxy.pid".to_string();
        let mut log_flag = String::new();
        let mut check_config = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "-config" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = path;
                    }
                }
                "-p" | "-pid" | "--pid" => {
                    if let Some(path) = args.next() {
                        pid_path = path;
                    }
                }
                "-l" | "-log" | "--log" => {
                    if let Some(sink) = args.next() {
                        log_flag = sink;
                    }
                }
                "--check" => {
                    check_config = true;
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-V" | "--version" => {
                    println!("dns-proxy v{}", dns_proxy::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            pid_path,
            log_sink: LogSink::from_flag(&log_flag),
            check_config,
        }
    }
}

fn print_help() {
    println!(
        r#"dns-proxy v{}

Stateless UDP DNS forwarding proxy with adaptive upstream failover.

USAGE:
    dns-proxy [OPTIONS]

OPTIONS:
    -c, --config <PATH>    YAML configuration file [default: config.yaml]
    -p, --pid <PATH>       PID file, empty string disables [default: /var/run/dns-proxy.pid]
    -l, --log <SINK>       Log sink: empty for stderr, "syslog", or a file path
    --check                Validate the configuration and exit
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Log filter override (default: info)
"#,
        dns_proxy::VERSION
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(&args.log_sink) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Startup failures go to the configured sink; shutdown is
            // already clean by the time run() returns Ok.
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("dns-proxy v{}", dns_proxy::VERSION);

    let config = load_config(&args.config_path)
        .with_context(|| format!("failed to load configuration from {:?}", args.config_path))?;

    if args.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    let proxy = Proxy::new(&config).context("failed to resolve upstream addresses")?;
    let pid_file = PidFile::acquire(&args.pid_path).context("PID file conflict")?;

    let workers = num_cpus::get();
    let mut pool = proxy
        .start(workers)
        .context("failed to bind listening sockets")?;

    info!(
        listen = %pool.local_addr(),
        workers = pool.num_workers(),
        primary = %proxy.selector().primary_addr(),
        fallbacks = proxy.selector().fallback_addrs().len(),
        "dns-proxy ready"
    );

    shutdown_signal().await;

    info!("shutting down");
    pool.shutdown().await;
    pid_file.release();
    info!("shutdown complete");

    Ok(())
}

/// Wait for any of the termination signals.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint =
        signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to register SIGHUP handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to register SIGQUIT handler");

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sighup.recv() => info!("received SIGHUP"),
        _ = sigquit.recv() => info!("received SIGQUIT"),
    }
}
