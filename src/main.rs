//! Screen Session Logger CLI
//!
//! Click-bracketed screen activity history with embedding-based labels.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use screen_session_logger::{
    collector::{check_permission, Collector},
    config::{Config, EmbedderBackend, SourceConfig},
    core::{labels::STARTER_LABELS, Classifier, LabelConfig, LabelTable, SessionRecorder},
    driver::{dispatch, drain_queue, read_events, DropTracker},
    queue::EventQueue,
    sensing::{CommandCapture, Embedder, FrontmostWindow, SketchEmbedder},
    store::{SqliteStore, StoredSessionInfo},
    transparency::create_shared_log_with_persistence,
    CAPTURE_NOTICE, VERSION,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "screen-logger")]
#[command(version = VERSION)]
#[command(about = "Click-bracketed screen session logger", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Jsonl,
}

#[derive(Subcommand)]
enum Commands {
    /// Start logging sessions
    Start {
        /// Input sources to capture (keyboard, mouse, or all)
        #[arg(long, default_value = "all")]
        sources: String,

        /// Label vocabulary file (overrides config)
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Session database (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run recorded events (JSON lines) through the logger
    Replay {
        /// Event file, one JSON event per line
        file: PathBuf,

        #[arg(long)]
        labels: Option<PathBuf>,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Pause logging
    Pause,

    /// Resume logging
    Resume,

    /// Show current status
    Status,

    /// List recent sessions
    Sessions {
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Export stored sessions
    Export {
        /// Output directory
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Also write each screenshot as <session_start_ts>.jpg
        #[arg(long)]
        with_screenshots: bool,
    },

    /// Validate a label file and show its vocabulary
    Labels {
        /// Label file (defaults to the configured one)
        path: Option<PathBuf>,

        /// Write a starter vocabulary if the file does not exist
        #[arg(long)]
        init: bool,
    },

    /// Show configuration
    Config,

    /// Display what the logger records
    Notice,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Start {
            sources,
            labels,
            db,
        } => cmd_start(&sources, labels, db),
        Commands::Replay { file, labels, db } => cmd_replay(&file, labels, db),
        Commands::Pause => cmd_set_paused(true),
        Commands::Resume => cmd_set_paused(false),
        Commands::Status => cmd_status(),
        Commands::Sessions { limit } => cmd_sessions(limit),
        Commands::Export {
            output,
            format,
            with_screenshots,
        } => cmd_export(output, format, with_screenshots),
        Commands::Labels { path, init } => cmd_labels(path, init),
        Commands::Config => cmd_config(),
        Commands::Notice => {
            println!("{CAPTURE_NOTICE}");
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(labels: Option<PathBuf>, db: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(path) = labels {
        config.labels_path = path;
    }
    if let Some(path) = db {
        config.db_path = path;
    }
    config
        .ensure_directories()
        .context("failed to create data directories")?;
    Ok(config)
}

/// Everything the recorder needs. Any failure here is fatal.
fn build_recorder(config: &Config) -> Result<SessionRecorder<SqliteStore>> {
    let labels = LabelConfig::load(&config.labels_path).with_context(|| {
        format!(
            "cannot load labels from {:?} (create one with `screen-logger labels --init`)",
            config.labels_path
        )
    })?;

    let embedder = build_embedder(config)?;
    let table = LabelTable::build(&labels, &*embedder).context("failed to build label table")?;
    let classifier = Classifier::new(table).with_top_k(config.top_k_apps, config.top_k_text);

    let store = SqliteStore::open(&config.db_path, config.duplicate_policy)
        .with_context(|| format!("cannot open session store {:?}", config.db_path))?;

    let scratch = config.capture_scratch_path();
    let capture = match &config.capture_command {
        Some(argv) => CommandCapture::with_command(argv.clone(), scratch, config.capture_timeout),
        None => CommandCapture::new(scratch, config.capture_timeout),
    };

    Ok(SessionRecorder::new(
        Box::new(capture),
        embedder,
        Box::new(FrontmostWindow::default()),
        classifier,
        store,
        config.recorder_settings(),
    ))
}

fn build_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    match config.embedder {
        EmbedderBackend::Sketch => Ok(Box::new(SketchEmbedder::new(config.embedding_dim))),
        #[cfg(feature = "clip")]
        EmbedderBackend::Clip => {
            let embedder = screen_session_logger::sensing::ClipEmbedder::new(
                config.model_cache_path.clone(),
                config.embed_scratch_path(),
            )
            .context("failed to load the CLIP encoders")?;
            Ok(Box::new(embedder))
        }
        #[cfg(not(feature = "clip"))]
        EmbedderBackend::Clip => {
            bail!("this build has no CLIP backend; rebuild with `--features clip`")
        }
    }
}

fn cmd_start(sources: &str, labels: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    println!("Screen Session Logger v{VERSION}");
    println!();

    if !check_permission() {
        eprintln!("Error: Input Monitoring permission not granted.");
        eprintln!();
        eprintln!("To grant permission:");
        eprintln!("1. Open System Settings > Privacy & Security");
        eprintln!("2. Select 'Input Monitoring' and 'Screen Recording'");
        eprintln!("3. Add this application to both lists");
        eprintln!("4. Restart the application");
        bail!("missing Input Monitoring permission");
    }

    let mut config = load_config(labels, db)?;
    config.sources = SourceConfig::from_csv(sources);
    if !config.sources.can_record() {
        bail!("the mouse source must be enabled: sessions are opened by clicks");
    }

    let mut recorder = build_recorder(&config)?;

    println!("Starting logger...");
    println!(
        "  Keyboard: {}",
        if config.sources.keyboard {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Labels: {:?}", config.labels_path);
    println!("  Database: {:?}", config.db_path);
    println!("  Change threshold: {}", config.distance_threshold);
    println!("  Run ID: {}", recorder.store().run_id());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let transparency_log = create_shared_log_with_persistence(config.transparency_path());
    let queue = EventQueue::new(config.queue_capacity);
    let mut collector = Collector::new(config.collector_config(), queue.sink());
    let mut drops = DropTracker::default();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    // `screen-logger pause/resume` edits the config file; poll it.
    let mut paused = config.paused;
    let mut last_config_check = Instant::now();

    if paused {
        println!("Logging is currently paused.");
        println!("Run `screen-logger resume` to start.");
        println!();
    } else {
        collector.start().context("failed to start collector")?;
    }

    while running.load(Ordering::SeqCst) {
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            match Config::load() {
                Ok(cfg) if cfg.paused != paused => {
                    paused = cfg.paused;
                    if paused {
                        println!("Pausing logger...");
                        collector.stop();
                        if let Some(ts) = recorder.reset() {
                            info!(ts, "open session dropped on pause");
                        }
                        queue.drain();
                    } else {
                        println!("Resuming logger...");
                        collector.start().context("failed to resume collector")?;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not reload configuration"),
            }
            drops.sync(&queue, &transparency_log);
            last_config_check = Instant::now();
        }

        if paused {
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        if let Some(event) = queue.pop(Duration::from_millis(100)) {
            dispatch(&mut recorder, &event, &transparency_log);
        }
    }

    println!();
    println!("Stopping logger...");
    collector.stop();
    drops.sync(&queue, &transparency_log);
    if let Some(ts) = recorder.reset() {
        info!(ts, "unfinalized session dropped at shutdown");
    }

    if let Err(e) = transparency_log.save() {
        warn!(error = %e, "could not save transparency log");
    }

    println!();
    println!("{}", transparency_log.summary());
    Ok(())
}

fn cmd_replay(file: &Path, labels: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    let config = load_config(labels, db)?;
    let mut recorder = build_recorder(&config)?;

    let reader = BufReader::new(
        File::open(file).with_context(|| format!("cannot open event file {file:?}"))?,
    );
    let events = read_events(reader)?;

    let transparency_log = create_shared_log_with_persistence(config.transparency_path());
    // Unbounded: a replay never drops events.
    let queue = EventQueue::new(None);
    for event in events {
        queue.push(event);
    }
    let handled = drain_queue(&queue, &mut recorder, &transparency_log);
    if let Some(ts) = recorder.reset() {
        println!("Session opened at {ts} was never closed and is not stored.");
    }

    if let Err(e) = transparency_log.save() {
        warn!(error = %e, "could not save transparency log");
    }
    println!("Replayed {handled} events.");
    println!("{}", transparency_log.summary());
    Ok(())
}

fn cmd_set_paused(paused: bool) -> Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    config.paused = paused;
    config.save().context("failed to save configuration")?;
    if paused {
        println!("Logging paused. Use 'screen-logger resume' to continue.");
    } else {
        println!("Logging resumed.");
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    println!("Screen Session Logger Status");
    println!("============================");
    println!();
    println!(
        "Input Monitoring Permission: {}",
        if check_permission() {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!();

    println!("Configuration:");
    println!(
        "  Keyboard capture: {}",
        if config.sources.keyboard {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Mouse capture: {}",
        if config.sources.mouse {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Paused: {}", config.paused);
    println!("  Labels: {:?}", config.labels_path);
    println!("  Database: {:?}", config.db_path);
    println!();

    if config.db_path.exists() {
        let store = SqliteStore::open(&config.db_path, config.duplicate_policy)?;
        println!("Stored sessions: {}", store.count()?);
        if let Some(last) = store.recent(1)?.first() {
            println!("Last session: {}", format_ts(last.session_start_ts));
        }
        println!();
    }

    let stats_path = config.transparency_path();
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)?;
        let stats: serde_json::Value = serde_json::from_str(&content)?;
        println!("Cumulative Statistics:");
        for (key, label) in [
            ("keyboard_events", "Keyboard events"),
            ("pointer_events", "Pointer clicks"),
            ("sessions_persisted", "Sessions persisted"),
            ("clicks_discarded", "Clicks discarded"),
            ("failures", "Failed events"),
            ("queue_drops", "Queue drops"),
        ] {
            if let Some(value) = stats.get(key) {
                println!("  {label}: {value}");
            }
        }
    } else {
        println!("No previous run data found.");
    }
    Ok(())
}

fn cmd_sessions(limit: usize) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    if !config.db_path.exists() {
        println!("No sessions yet. Run 'screen-logger start' to begin.");
        return Ok(());
    }

    let store = SqliteStore::open(&config.db_path, config.duplicate_policy)?;
    let sessions = store.recent(limit)?;
    for session in &sessions {
        print_session(session);
    }
    println!("{} of {} sessions shown", sessions.len(), store.count()?);
    Ok(())
}

fn print_session(session: &StoredSessionInfo) {
    let text: String = session
        .key_summary
        .plain_text
        .chars()
        .take(40)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let label = session
        .key_summary
        .best_label
        .as_ref()
        .map(|m| format!(" [{}/{}]", m.category, m.label))
        .unwrap_or_default();

    println!(
        "[{}] {:>6.1}s  {} / {} ({:.2})  {:?}  \"{}\"{}",
        format_ts(session.session_start_ts),
        (session.ended_ts - session.session_start_ts) as f64 / 1000.0,
        session.app_label,
        session.action_label,
        session.confidence.action_boost,
        session.window_title,
        text,
        label
    );
}

fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn cmd_export(output: Option<PathBuf>, format: ExportFormat, with_screenshots: bool) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let export_dir = output.unwrap_or(config.export_path.clone());

    if !config.db_path.exists() {
        println!("No session data found at {:?}", config.db_path);
        println!("Run 'screen-logger start' to begin logging.");
        return Ok(());
    }

    let store = SqliteStore::open(&config.db_path, config.duplicate_policy)?;
    let sessions = store.range(i64::MIN, i64::MAX)?;
    println!("Total sessions: {}", sessions.len());

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    std::fs::create_dir_all(&export_dir)
        .with_context(|| format!("cannot create {export_dir:?}"))?;

    let extension = match format {
        ExportFormat::Json => "json",
        ExportFormat::Jsonl => "jsonl",
    };
    let output_path = export_dir.join(format!("export_{stamp}.{extension}"));
    let mut writer = BufWriter::new(File::create(&output_path)?);
    match format {
        ExportFormat::Json => serde_json::to_writer_pretty(&mut writer, &sessions)?,
        ExportFormat::Jsonl => {
            for session in &sessions {
                serde_json::to_writer(&mut writer, session)?;
                writeln!(writer)?;
            }
        }
    }
    writer.flush()?;
    println!("Exported to {output_path:?}");

    if with_screenshots {
        let shots_dir = export_dir.join(format!("export_{stamp}_screenshots"));
        std::fs::create_dir_all(&shots_dir)?;
        let mut written = 0;
        for session in &sessions {
            if let Some(jpeg) = store.screenshot(session.session_start_ts)? {
                std::fs::write(
                    shots_dir.join(format!("{}.jpg", session.session_start_ts)),
                    jpeg,
                )?;
                written += 1;
            }
        }
        println!("Wrote {written} screenshots to {shots_dir:?}");
    }
    Ok(())
}

fn cmd_labels(path: Option<PathBuf>, init: bool) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let path = path.unwrap_or(config.labels_path);

    if init {
        if path.exists() {
            println!("{path:?} already exists, leaving it unchanged.");
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, STARTER_LABELS)?;
            println!("Wrote starter vocabulary to {path:?}");
        }
    }

    let labels =
        LabelConfig::load(&path).with_context(|| format!("invalid label file {path:?}"))?;
    println!("Label file: {path:?}");
    println!("  Apps: {}", labels.apps.len());
    println!("  Actions: {}", labels.actions.len());
    println!("  Apps with priors: {}", labels.action_priors.len());
    println!(
        "  Free-text labels: {} in {} categories",
        labels.flat_text_labels().len(),
        labels.text_labels.len()
    );
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl+C handler")
}
