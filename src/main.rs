//! Standin Mock Server - CLI Entry Point
//!
//! Validates expectation files and probes them with simulated requests.
//! Serving real traffic is left to the embedding transport.

use anyhow::{Context, Result};
use clap::Parser;
use standin::{DispatchResult, Method, MockServer, MockServerConfig, Request};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Status reported for probes no expectation matched.
const UNMATCHED_STATUS: u16 = 404;

#[derive(Parser, Debug)]
#[command(
    name = "standin",
    about = "HTTP mock server core - validate expectation files and probe them with requests",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-server.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Dispatch one request, e.g. "GET /users/1?verbose=true"
    #[arg(long, value_name = "REQUEST")]
    probe: Option<String>,

    /// Header for the probe request, as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Body for the probe request
    #[arg(long)]
    body: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../config/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate || args.probe.is_some() {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no expectations)");
        MockServerConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} expectations defined)",
            config.expectations.len()
        );
        return Ok(());
    }

    let server = MockServer::from_config(&config)?;

    let Some(probe) = args.probe else {
        println!(
            "Loaded {} expectations; pass --probe \"METHOD /path\" to dispatch a request",
            server.registry().len()
        );
        return Ok(());
    };

    let request = build_probe_request(&probe, &args.headers, args.body.as_deref())?;
    match server.dispatch(&request).await? {
        DispatchResult::Matched(matched) => {
            let response = matched.response;
            println!("HTTP {}", response.status);
            for (name, value) in &response.headers {
                println!("{}: {}", name, value);
            }
            for cookie in response.set_cookie_headers() {
                println!("Set-Cookie: {}", cookie);
            }
            println!();
            println!("{}", String::from_utf8_lossy(&response.body));
        }
        DispatchResult::Unmatched => {
            println!("HTTP {} (no matching expectation)", UNMATCHED_STATUS);
        }
    }

    Ok(())
}

fn build_probe_request(probe: &str, headers: &[String], body: Option<&str>) -> Result<Request> {
    let (method, target) = probe
        .trim()
        .split_once(' ')
        .context("Probe must look like \"METHOD /path\"")?;
    let method: Method = method.parse()?;

    let headers = headers
        .iter()
        .map(|h| {
            h.split_once(':')
                .map(|(name, value)| (name.trim(), value.trim()))
                .with_context(|| format!("Header must look like \"Name: value\": {}", h))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Request::from_parts(
        method,
        target.trim(),
        headers,
        body.unwrap_or_default().as_bytes().to_vec(),
    ))
}
