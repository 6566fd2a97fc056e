//! OcrDeck - OCR coordination for a live camera stream and an image gallery
//!
//! Decides when the shared recognition engine runs, keeps it to one inference
//! at a time, and records what has already been processed.

mod app;
mod capture;
mod config;
mod error;
mod processing;
mod shared;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use crossbeam_channel::Receiver;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::app::OcrDeck;
use crate::capture::{Frame, FrameOutcome};
use crate::config::AppConfig;
use crate::shared::ProcessingState;
use crate::vision::{Accelerator, NullEngineFactory};

/// OcrDeck - OCR over a camera stream and a persistent gallery
#[derive(Parser, Debug)]
#[command(name = "ocrdeck")]
#[command(about = "Coordinates OCR over live frames and a persistent image gallery")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gallery directory, overriding the configuration
    #[arg(long, global = true)]
    gallery_dir: Option<PathBuf>,

    /// Accelerator to request from the engine
    #[arg(long, value_enum, global = true)]
    accelerator: Option<Accelerator>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy images into the gallery and recognize them
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Save a single frame as a new JPEG capture and recognize it
    Capture { image: PathBuf },
    /// List gallery images, newest first
    List,
    /// Show the cached OCR result of an image
    Show { id: String },
    /// Delete an image and its file
    Delete { id: String },
    /// Recognize every image that has no result yet
    Scan,
    /// Feed image files through the live pipeline as a frame stream
    Live {
        #[arg(required = true)]
        frames: Vec<PathBuf>,
        /// Save the last frame into the gallery afterwards
        #[arg(long)]
        capture: bool,
        /// Freeze the pipeline after this many frames
        #[arg(long, value_name = "N")]
        freeze_after: Option<usize>,
        /// Swap the engine to `--switch-to` after this many frames
        #[arg(long, value_name = "N")]
        switch_after: Option<usize>,
        /// Accelerator to swap to
        #[arg(long, value_enum, default_value = "cpu")]
        switch_to: Accelerator,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::get_config_dir()?.join("config.toml"),
    };
    let mut config = load_or_create_config(&config_path);
    if let Some(dir) = &args.gallery_dir {
        config.gallery.directory = Some(dir.clone());
    }
    if let Some(accelerator) = args.accelerator {
        config.engine.accelerator = accelerator;
    }
    let wait = Duration::from_secs(config.processing.wait_timeout_secs);

    let mut deck = OcrDeck::new(config, Box::new(NullEngineFactory))?;
    let states = deck.queue().subscribe_state();

    match args.command {
        Command::List => list(&deck),
        Command::Show { id } => show(&deck, &id),
        Command::Delete { id } => {
            if deck.store().delete(&id)? {
                println!("Deleted {}", id);
            } else {
                println!("No image with id {}", id);
            }
            Ok(())
        }
        command => {
            start(&mut deck, &config_path)?;
            match command {
                Command::Import { paths } => {
                    for path in &paths {
                        let image = deck
                            .store()
                            .import(path)
                            .with_context(|| format!("Failed to import {:?}", path))?;
                        println!("Imported {:?} as {}", path, image.id);
                    }
                    drain_queue(&deck, &states, wait);
                    Ok(())
                }
                Command::Capture { image } => {
                    let frame = Frame::open(&image)?;
                    let saved = deck.store().save_capture(&frame)?;
                    println!("Captured {}", saved.id);
                    drain_queue(&deck, &states, wait);
                    Ok(())
                }
                Command::Scan => {
                    let drained = drain_queue(&deck, &states, wait);
                    let remaining = deck.store().unprocessed_ids().len();
                    println!(
                        "Scan {}: {} images still unprocessed",
                        if drained { "finished" } else { "timed out" },
                        remaining
                    );
                    Ok(())
                }
                Command::Live {
                    frames,
                    capture,
                    freeze_after,
                    switch_after,
                    switch_to,
                } => {
                    let options = LiveOptions {
                        capture,
                        freeze_after,
                        switch_after: switch_after.map(|n| (n, switch_to)),
                    };
                    live(&deck, &config_path, &frames, &options, &states, wait)
                }
                Command::List | Command::Show { .. } | Command::Delete { .. } => Ok(()),
            }
        }
    }
}

/// Load configuration from file or create default
fn load_or_create_config(path: &Path) -> AppConfig {
    if path.exists() {
        match config::load_config(path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                return config;
            }
            Err(e) => warn!("Ignoring configuration: {:#}", e),
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

/// Start the services, remembering the accelerator the engine fell back to
fn start(deck: &mut OcrDeck, config_path: &Path) -> Result<()> {
    let requested = deck.config().engine.accelerator;
    let active = deck.start()?;
    info!("OCR engine running on {}", active);

    if active != requested {
        let mut config = deck.config().clone();
        config.engine.accelerator = active;
        if let Err(e) = config::save_config(&config, config_path) {
            warn!("Failed to persist accelerator fallback: {:#}", e);
        }
    }
    Ok(())
}

fn list(deck: &OcrDeck) -> Result<()> {
    let store = deck.store();
    if store.is_empty() {
        println!("Gallery at {:?} is empty", store.dir());
        return Ok(());
    }
    println!("Gallery at {:?}", store.dir());
    for image in store.list() {
        let created = chrono::DateTime::from_timestamp_millis(image.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| image.created_at.to_string());
        let status = match &image.ocr_result {
            Some(results) if image.ocr_processed => format!("{} regions", results.len()),
            _ => "pending".to_string(),
        };
        println!("{}  {}  {:>12}  {}", image.id, created, status, image.locator);
    }
    Ok(())
}

fn show(deck: &OcrDeck, id: &str) -> Result<()> {
    let image = deck
        .store()
        .get(id)
        .with_context(|| format!("No image with id {}", id))?;
    println!("{} ({})", image.id, image.locator);

    let Some(results) = deck.store().cached_ocr_result(id) else {
        println!("  not processed yet");
        return Ok(());
    };
    for result in results {
        let (x, y, width, height) = result.bounds();
        let corners = result
            .corners()
            .iter()
            .map(|(x, y)| format!("({:.0},{:.0})", x, y))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "  {:?}  conf={:.2}  box=({:.0},{:.0} {:.0}x{:.0})  {}",
            result.text, result.confidence, x, y, width, height, corners
        );
    }
    Ok(())
}

/// Wait for the queue, reporting each image it picked up
fn drain_queue(deck: &OcrDeck, states: &Receiver<ProcessingState>, wait: Duration) -> bool {
    let drained = deck.process_pending(wait);
    for state in states.try_iter() {
        if let ProcessingState::Processing(id) = state {
            println!("Processed {}", id);
        }
    }
    drained
}

struct LiveOptions {
    capture: bool,
    freeze_after: Option<usize>,
    /// Frame count after which the engine is swapped, and the target accelerator
    switch_after: Option<(usize, Accelerator)>,
}

fn live(
    deck: &OcrDeck,
    config_path: &Path,
    frames: &[PathBuf],
    options: &LiveOptions,
    states: &Receiver<ProcessingState>,
    wait: Duration,
) -> Result<()> {
    let pipeline = deck.live();
    let updates = pipeline.subscribe();

    for (index, path) in frames.iter().enumerate() {
        if options.freeze_after == Some(index) {
            pipeline.set_frozen(true);
            println!("Pipeline frozen");
        }
        if let Some((after, accelerator)) = options.switch_after {
            if after == index {
                let active = switch_accelerator(deck, config_path, accelerator)?;
                println!(
                    "Engine switched to {} (epoch {})",
                    active,
                    deck.engine().current_epoch()
                );
            }
        }

        let frame = Frame::open(path).with_context(|| format!("Failed to load {:?}", path))?;
        let outcome = pipeline.on_frame(frame);
        println!("{:?}: {:?}", path, outcome);
        if outcome == FrameOutcome::NotReady {
            break;
        }
    }

    let deadline = Instant::now() + wait;
    while pipeline.is_busy() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    for update in updates.try_iter() {
        println!(
            "epoch {}: {} regions in {:.1}ms ({:.1} fps)",
            update.epoch,
            update.results.len(),
            update.benchmark.total_ms,
            update.benchmark.fps
        );
    }
    match pipeline.latest() {
        Some(latest) => {
            for result in &latest.results {
                println!("  {:?}  conf={:.2}", result.text, result.confidence);
            }
        }
        None => println!("No live result"),
    }

    if options.capture {
        match pipeline.capture()? {
            Some(image) => {
                println!("Captured {}", image.id);
                drain_queue(deck, states, wait);
            }
            None => println!("No frame to capture"),
        }
    }
    Ok(())
}

/// Swap the running engine, remembering the accelerator it actually activated
fn switch_accelerator(
    deck: &OcrDeck,
    config_path: &Path,
    accelerator: Accelerator,
) -> Result<Accelerator> {
    let active = deck.switch_accelerator(accelerator)?;
    if active != deck.config().engine.accelerator {
        let mut config = deck.config().clone();
        config.engine.accelerator = active;
        if let Err(e) = config::save_config(&config, config_path) {
            warn!("Failed to persist accelerator: {:#}", e);
        }
    }
    Ok(active)
}
