// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use firearm_status::app::{create_router, AppState, VERSION};
use firearm_status::config::AppConfig;
use firearm_status::models::status::StatusOutcome;
use firearm_status::services::cache::QueryCache;
use firearm_status::services::client::StatusClient;
use firearm_status::services::logging::{init_tracing, LogFormat};
use firearm_status::services::parser::parse_status_html;
use firearm_status::services::rate_limit::RateLimiter;
use firearm_status::services::upstream::UpstreamClient;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "firearm-status", version = VERSION, about = "SAPS firearm licence status lookup")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP proxy (default)
    Serve,
    /// Look up an application through a running proxy
    Query(QueryArgs),
    /// Parse a saved upstream status page and print the outcome as JSON
    Parse {
        file: PathBuf,
    },
    /// Inspect or clear the local result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
        #[arg(long, global = true, env = "FIREARM_STATUS_CACHE_FILE", default_value = DEFAULT_CACHE_FILE)]
        cache_file: PathBuf,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Application reference number
    #[arg(long)]
    reference: Option<String>,
    /// Firearm serial number
    #[arg(long)]
    serial: Option<String>,
    #[arg(long, env = "FIREARM_STATUS_API_URL", default_value = "http://localhost:3000")]
    api_url: String,
    #[arg(long, default_value_t = 20_000)]
    timeout_ms: u64,
    #[arg(long, env = "FIREARM_STATUS_CACHE_FILE", default_value = DEFAULT_CACHE_FILE)]
    cache_file: PathBuf,
    /// Neither read nor write the cache file
    #[arg(long)]
    no_cache: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum CacheAction {
    Stats,
    Clear,
}

const DEFAULT_CACHE_FILE: &str = ".firearm-status-cache.json";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Query(args) => {
            init_tracing(LogFormat::from_env());
            run_query(args).await
        }
        Command::Parse { file } => run_parse(&file),
        Command::Cache { action, cache_file } => run_cache(action, &cache_file),
    }
}

async fn serve() -> Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    init_tracing(config.log_format);

    info!(
        upstream = %config.upstream.url,
        timeout_ms = config.upstream.timeout.as_millis() as u64,
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window.as_millis() as u64,
        policy = %config.rate_limit.policy,
        "Configuration loaded"
    );

    let upstream = UpstreamClient::new(config.upstream.clone())
        .context("Failed to build upstream HTTP client")?;
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    // Drop idle client windows once per window length
    let purge_limiter = rate_limiter.clone();
    let purge_every = config.rate_limit.window;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            let removed = purge_limiter.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = purge_limiter.tracked_clients(), "Purged rate limit windows");
            }
        }
    });

    let state = AppState::new(upstream, rate_limiter, config.client_ip_header.clone());
    let app = create_router(state, &config.allowed_origin);

    // Bind to 0.0.0.0 to accept connections from any network interface (required for Docker)
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("firearm-status v{} listening on {}", VERSION, addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")
}

async fn run_query(args: QueryArgs) -> Result<()> {
    let mut cache = if args.no_cache {
        QueryCache::new()
    } else {
        QueryCache::load(&args.cache_file)?
    };

    // Fall back to the last lookup when no reference is given
    let (reference, serial) = match args.reference {
        Some(reference) => (reference, args.serial),
        None => {
            let last = cache
                .last_query()
                .context("--reference is required (no previous lookup to repeat)")?;
            (last.reference.clone(), args.serial.or_else(|| last.serial.clone()))
        }
    };

    let client = StatusClient::new(&args.api_url, Duration::from_millis(args.timeout_ms))?;
    let outcome = client
        .query(&reference, serial.as_deref(), &mut cache)
        .await;

    if !args.no_cache {
        cache.save(&args.cache_file)?;
    }

    print_outcome(&outcome);
    match outcome {
        StatusOutcome::Found { .. } => Ok(()),
        StatusOutcome::Failed(failure) => anyhow::bail!("lookup failed: {}", failure.code),
    }
}

fn print_outcome(outcome: &StatusOutcome) {
    match outcome {
        StatusOutcome::Found {
            records,
            fetched_at,
            cached,
        } => {
            let source = if *cached { " (cached)" } else { "" };
            println!("Fetched at {}{}", fetched_at, source);
            for record in records {
                println!();
                println!("Application type:   {}", record.application_type);
                println!("Application number: {}", record.application_number);
                println!("Calibre:            {}", record.calibre);
                println!("Make:               {}", record.make);
                println!("Serial number:      {}", record.serial_number);
                println!("Status date:        {}", record.status_date);
                println!("Status:             {}", record.status);
                println!("Description:        {}", record.status_description);
                println!("Next step:          {}", record.next_step);
            }
        }
        StatusOutcome::Failed(failure) => {
            eprintln!("{}", failure.message);
        }
    }
}

fn run_parse(file: &Path) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let outcome = parse_status_html(&html);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_cache(action: CacheAction, cache_file: &Path) -> Result<()> {
    let mut cache = QueryCache::load(cache_file)?;
    match action {
        CacheAction::Stats => {
            println!("{}", serde_json::to_string_pretty(&cache.stats())?);
        }
        CacheAction::Clear => {
            let removed = cache.stats().count;
            cache.clear();
            cache.save(cache_file)?;
            println!("Cleared {} cached result(s)", removed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["firearm-status"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_query_arguments() {
        let cli = Cli::try_parse_from([
            "firearm-status",
            "query",
            "--reference",
            "REF1",
            "--serial",
            "S1",
            "--no-cache",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Query(args)) => {
                assert_eq!(args.reference.as_deref(), Some("REF1"));
                assert_eq!(args.serial.as_deref(), Some("S1"));
                assert!(args.no_cache);
                assert_eq!(args.timeout_ms, 20_000);
            }
            _ => panic!("expected query subcommand"),
        }
    }

    #[test]
    fn test_cache_clear_arguments() {
        let cli = Cli::try_parse_from([
            "firearm-status",
            "cache",
            "clear",
            "--cache-file",
            "/tmp/cache.json",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Cache { action, cache_file }) => {
                assert!(matches!(action, CacheAction::Clear));
                assert_eq!(cache_file, PathBuf::from("/tmp/cache.json"));
            }
            _ => panic!("expected cache subcommand"),
        }
    }

    #[test]
    fn test_run_cache_clear_empties_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = QueryCache::new();
        let query = firearm_status::models::query::Query::new("REF1", None).unwrap();
        cache.put(&query, vec![], "t0".to_string());
        cache.save(&path).unwrap();

        run_cache(CacheAction::Clear, &path).unwrap();
        assert_eq!(QueryCache::load(&path).unwrap().stats().count, 0);
    }
}
