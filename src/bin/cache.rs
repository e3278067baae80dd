//! walkpin-cache: offline cache maintenance.
//!
//! Runs independently of the pin store and shares no state with it.
//!
//! ## Usage
//!
//! ```bash
//! walkpin-cache install                 # pre-cache the app shell for the configured version
//! walkpin-cache activate                # drop caches from earlier versions
//! walkpin-cache fetch <URL> --out FILE  # fetch through the cache
//! walkpin-cache status
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use walkpin::cache::{CacheRole, HttpFetcher, OfflineCache, Request, ResponseSource};
use walkpin::config::Config;
use walkpin::logging;

enum Command {
    Install,
    Activate,
    Fetch { url: String, out: Option<PathBuf> },
    Status,
}

struct CacheArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")), "walkpin-cache");

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let fetcher = HttpFetcher::new(Duration::from_secs(config.cache.fetch_timeout_secs));
    let cache = OfflineCache::new(&config.cache, fetcher)
        .with_context(|| format!("Failed to open cache storage at {:?}", config.cache.dir))?;

    match args.command {
        Command::Install => {
            let report = cache.install()?;
            println!("Installed {} ({} assets)", report.cache, report.assets);
        }
        Command::Activate => {
            let removed = cache.activate()?;
            if removed.is_empty() {
                println!("No outdated caches");
            }
            for name in removed {
                println!("Removed {}", name);
            }
        }
        Command::Fetch { url, out } => {
            let response = cache.handle(&Request::get(url.as_str()))?;
            let origin = match response.source {
                ResponseSource::Cache => "cache",
                ResponseSource::Network => "network",
            };
            info!(url = %url, status = response.status, origin, "Fetched");
            println!(
                "{} {} from {} ({} bytes)",
                response.status,
                response.content_type.as_deref().unwrap_or("-"),
                origin,
                response.body.len()
            );
            if let Some(path) = out {
                std::fs::write(&path, &response.body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
        Command::Status => {
            let status = cache.status()?;
            println!("Cache root: {}", cache.storage().root().display());
            println!(
                "Current shell cache: {} ({})",
                status.shell_cache,
                if status.installed { "installed" } else { "not installed" }
            );
            for summary in status.caches {
                let role = match summary.role {
                    CacheRole::Shell => "shell",
                    CacheRole::Tiles => "tiles",
                    CacheRole::Stale => "stale",
                };
                println!("  {:<32} {:<6} {} entries", summary.name, role, summary.entries);
            }
        }
    }

    Ok(())
}

fn parse_args() -> CacheArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut out = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(flag_value(&args, i)));
                i += 1;
            }
            "--out" | "-o" => {
                out = Some(PathBuf::from(flag_value(&args, i)));
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("walkpin-cache {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("install") => Command::Install,
        Some("activate") => Command::Activate,
        Some("status") => Command::Status,
        Some("fetch") => match positional.get(1) {
            Some(url) => Command::Fetch {
                url: url.clone(),
                out,
            },
            None => {
                eprintln!("Error: fetch requires a URL");
                std::process::exit(1);
            }
        },
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
        None => {
            print_help();
            std::process::exit(1);
        }
    };

    CacheArgs {
        config_path,
        command,
    }
}

fn flag_value(args: &[String], i: usize) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"walkpin-cache - offline cache for the app shell and map tiles

USAGE:
    walkpin-cache [OPTIONS] <COMMAND>

COMMANDS:
    install             Pre-cache every manifest asset for the configured version
    activate            Remove caches left over from earlier versions
    fetch <URL>         Fetch a URL through the cache
    status              Show caches and entry counts

OPTIONS:
    --out, -o FILE      Write the fetched body to FILE
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    WALKPIN_CONFIG      Path to config file (overrides default location)
    WALKPIN_LOG         Log level (trace, debug, info, warn, error)

The tile cache is never removed by `activate`; bump `cache.version` in the
config on every release so `install` builds a fresh app-shell cache."#
    );
}
