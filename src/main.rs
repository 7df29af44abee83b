use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use reflog_watch::config::Config;
use reflog_watch::locate::{locate_git_dir, logs_dir};
use reflog_watch::output::{print_events, OutputFormat};
use reflog_watch::watcher::{Delivery, ParseErrorPolicy, Watcher};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reflog-watch")]
#[command(about = "Watch a git repository and print every reflog entry as it is written")]
struct Cli {
    /// Path inside the repository (default: current directory)
    path: Option<PathBuf>,
    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
    /// Skip malformed reflog lines instead of dropping the rest of the read
    #[arg(long)]
    skip_malformed: bool,
    /// Buffer up to N events and drop new ones while the buffer is full
    #[arg(long, value_name = "N")]
    drop_when_full: Option<usize>,
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool, configured: Option<&str>) {
    let mut builder = pretty_env_logger::formatted_builder();
    match env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) if verbose => builder.parse_filters("debug"),
        Err(_) => builder.parse_filters(configured.unwrap_or("warn")),
    };
    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load();
    let config = loaded.as_ref().ok();
    init_logging(cli.verbose, config.and_then(|c| c.log_level.as_deref()));
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!("{:#}, using defaults", e);
            Config::default()
        }
    };

    let cwd = env::current_dir().context("Failed to get current directory")?;
    let start = match cli.path {
        Some(path) => cwd.join(path),
        None => cwd,
    };
    let root = logs_dir(&locate_git_dir(&start)?);

    let mut options = config.watcher_options();
    if cli.skip_malformed {
        options.parse_errors = ParseErrorPolicy::Skip;
    }
    if let Some(capacity) = cli.drop_when_full {
        options.delivery = Delivery::DropWhenFull {
            capacity: capacity.max(1),
        };
    }
    let format = if cli.json {
        OutputFormat::Json
    } else {
        config.output_format()
    };

    let mut watcher = Watcher::new(&root, options)
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    let events = watcher.events().context("Event stream already taken")?;

    let mut printer = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        print_events(events, format, &mut stdout.lock())
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Interrupted, shutting down");
        }
        printed = &mut printer => {
            watcher.close()?;
            return printed.context("Printer task failed")?;
        }
    }

    watcher.close()?;
    printer.await.context("Printer task failed")?
}
