use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use walkpin::config::Config;
use walkpin::db::{NewPin, Pin, PinStore};
use walkpin::export;
use walkpin::location::{self, ExifPosition, FixedPosition, Position, PositionSource, LOCATION_TIMEOUT};
use walkpin::logging;

enum Command {
    Add {
        image: PathBuf,
        lat: Option<f64>,
        lng: Option<f64>,
    },
    List {
        by_date: bool,
    },
    Delete {
        id: i64,
    },
    Export {
        out: Option<PathBuf>,
    },
    Import {
        file: PathBuf,
    },
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut lat = None;
    let mut lng = None;
    let mut out = None;
    let mut by_date = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("walkpin {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(flag_value(&args, i)));
                i += 1;
            }
            "--lat" => {
                lat = Some(parse_number(&args, i));
                i += 1;
            }
            "--lng" => {
                lng = Some(parse_number(&args, i));
                i += 1;
            }
            "--out" | "-o" => {
                out = Some(PathBuf::from(flag_value(&args, i)));
                i += 1;
            }
            "--by-date" => {
                by_date = true;
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
        Some("add") => Command::Add {
            image: PathBuf::from(operand(&positional, "add", "an image path")),
            lat,
            lng,
        },
        Some("list") => Command::List { by_date },
        Some("delete") => {
            let raw = operand(&positional, "delete", "a pin id");
            match raw.parse() {
                Ok(id) => Command::Delete { id },
                Err(_) => {
                    eprintln!("Error: invalid pin id: {}", raw);
                    std::process::exit(1);
                }
            }
        }
        Some("export") => Command::Export { out },
        Some("import") => Command::Import {
            file: PathBuf::from(operand(&positional, "import", "a file path")),
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

    if lat.is_some() != lng.is_some() {
        eprintln!("Error: --lat and --lng must be given together");
        std::process::exit(1);
    }

    Args {
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

fn parse_number(args: &[String], i: usize) -> f64 {
    let raw = flag_value(args, i);
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            eprintln!("Error: {} expects a finite number, got {}", args[i], raw);
            std::process::exit(1);
        }
    }
}

fn operand(positional: &[String], command: &str, what: &str) -> String {
    match positional.get(1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires {}", command, what);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"walkpin - geotagged photo pins, stored locally

USAGE:
    walkpin [OPTIONS] <COMMAND>

COMMANDS:
    add <IMAGE>         Record a pin for a photo
    list                List stored pins
    delete <ID>         Delete a pin (no error if it does not exist)
    export              Write all pins to a timestamped JSON file
    import <FILE>       Append pins from an exported JSON file

OPTIONS:
    --lat X --lng Y     Position for `add` (default: photo GPS, then map centre)
    --by-date           Order `list` by capture time
    --out, -o DIR       Output directory for `export`
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    WALKPIN_CONFIG      Path to config file (overrides default location)
    WALKPIN_LOG         Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/walkpin/config.toml

See also: walkpin-cache --help"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Logging failures are not fatal
    let _ = logging::init(Some(Config::config_dir().join("logs")), "walkpin");

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let store = PinStore::open(config.db_path())
        .await
        .context("Pin storage is unavailable")?;

    match args.command {
        Command::Add { image, lat, lng } => add_pin(&store, &config, image, lat.zip(lng)).await,
        Command::List { by_date } => list_pins(&store, by_date).await,
        Command::Delete { id } => {
            store.delete_by_id(id).await?;
            println!("Deleted pin {}", id);
            Ok(())
        }
        Command::Export { out } => {
            let dir = out.unwrap_or_else(|| config.export.dir.clone());
            let summary = export::export_to_dir(&store, &dir).await?;
            println!("Exported {} pins to {}", summary.count, summary.path.display());
            Ok(())
        }
        Command::Import { file } => {
            let summary = export::import_file(&store, &file, print_pin).await?;
            println!(
                "Imported {} pins ({} skipped)",
                summary.imported, summary.skipped
            );
            Ok(())
        }
    }
}

async fn add_pin(store: &PinStore, config: &Config, image: PathBuf, given: Option<(f64, f64)>) -> Result<()> {
    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;

    let source: Arc<dyn PositionSource> = match given {
        Some((lat, lng)) => Arc::new(FixedPosition(Position::new(lat, lng))),
        None => Arc::new(ExifPosition::new(&image)),
    };
    let position = match location::current_position(source, LOCATION_TIMEOUT).await {
        Some(position) => position,
        None => {
            tracing::info!("No position available, using map centre");
            config.map.default_center()
        }
    };

    let pin = NewPin::new(position.lat, position.lng, bytes);
    let id = store.insert(pin.clone()).await?;
    println!("Added pin {} at {:.6}, {:.6} ({})", id, pin.lat, pin.lng, pin.created_at);
    Ok(())
}

async fn list_pins(store: &PinStore, by_date: bool) -> Result<()> {
    let pins = if by_date {
        store.list_by_created_at().await?
    } else {
        store.list_all().await?
    };

    if pins.is_empty() {
        println!("No pins stored");
    }
    for pin in &pins {
        print_pin(pin);
    }
    Ok(())
}

fn print_pin(pin: &Pin) {
    println!(
        "{:>6}  {:>11.6} {:>11.6}  {}  {}",
        pin.id,
        pin.lat,
        pin.lng,
        pin.created_at,
        format_size(pin.image.len() as u64)
    );
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if size >= MB {
        format!("{:.1} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
