use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wordcast::integration::{NarratorConfig, Orchestrator};
use wordcast::playback::{PlaybackEvent, PositionCursor};
use wordcast::speech::{NarrationBackend, RecordingBackend, SimulatedBackend};
use wordcast::sync::SharedStorage;
use wordcast::vocab::{InMemoryVocabulary, PlayableRecord};

/// Narrate a vocabulary list, translation first, then the foreign word
#[derive(Parser)]
#[command(name = "wordcast")]
#[command(about = "Sequential spoken playback of vocabulary entries")]
struct Args {
    /// TOML narrator configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON vocabulary; a small sample list is used when absent
    #[arg(long)]
    vocab: Option<PathBuf>,

    /// JSON file shared with sibling instances for playback state
    #[arg(long)]
    state: Option<PathBuf>,

    /// Stop after this many completed narration cycles
    #[arg(long, default_value_t = 3)]
    cycles: usize,

    /// Complete every utterance instantly instead of pacing it
    #[arg(long)]
    dry_run: bool,
}

fn sample_vocabulary() -> InMemoryVocabulary {
    InMemoryVocabulary::with_records(vec![
        PlayableRecord::new("der Hund", "the dog").with_tip("masculine"),
        PlayableRecord::new("die Katze", "the cat").with_tip("feminine"),
        PlayableRecord::new("das Haus", "the house"),
    ])
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordcast=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting wordcast narrator");

    let config = match &args.config {
        Some(path) => NarratorConfig::from_toml_file(path)?,
        None => NarratorConfig::default(),
    };

    let vocabulary = match &args.vocab {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading vocabulary {}", path.display()))?;
            InMemoryVocabulary::from_json_str(&json)?
        }
        None => sample_vocabulary(),
    };
    info!("Loaded {} records", vocabulary.len());

    let storage = match &args.state {
        Some(path) => SharedStorage::open(path)?,
        None => SharedStorage::new(),
    };

    let backend: Box<dyn NarrationBackend> = if args.dry_run {
        Box::new(RecordingBackend::auto_completing())
    } else {
        Box::new(SimulatedBackend::new())
    };

    let (orchestrator, handle) = Orchestrator::new(
        config,
        Arc::new(vocabulary),
        backend,
        Arc::new(storage.connect()),
        PositionCursor::default(),
    )?;
    let worker = orchestrator.start()?;

    handle.play_pause()?;

    let deadline = Instant::now() + Duration::from_secs(120);
    let mut cycles = 0;
    while cycles < args.cycles && Instant::now() < deadline {
        match handle.recv_event_timeout(Duration::from_millis(500)) {
            Some(PlaybackEvent::CycleComplete { index, repeat }) => {
                cycles += 1;
                info!("Finished record {} (repeat {})", index, repeat);
            }
            Some(PlaybackEvent::Error(e)) => {
                warn!("{}", e.user_message());
                break;
            }
            Some(PlaybackEvent::Stopped { index }) => {
                info!("Playback stopped at record {}", index);
                break;
            }
            _ => {}
        }
    }

    handle.shutdown()?;
    if worker.join().is_err() {
        warn!("Orchestrator thread panicked");
    }
    info!("Narrated {} cycles", cycles);

    Ok(())
}
