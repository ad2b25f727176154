//! Proctor Watch CLI
//!
//! Replays recorded detections through the proctoring trackers and inspects
//! stored events.

use clap::{Parser, Subcommand};
use proctor_watch::{
    config::{ClockPolicy, Config},
    transparency::create_shared_log_with_persistence,
    CoordinatorError, EventSink, EventSummary, JsonlSink, QueuedSink, RecordedSource,
    SessionCoordinator, MONITORING_NOTICE, VERSION,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gateway")]
use proctor_watch::{RemoteSink, RemoteSinkConfig};

#[derive(Parser)]
#[command(name = "proctor-watch")]
#[command(version = VERSION)]
#[command(about = "Webcam proctoring monitor for remote exams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded detections for one candidate
    Replay {
        /// Candidate identifier
        #[arg(long)]
        candidate: String,

        /// JSON-lines file of recorded frames
        #[arg(long, short)]
        input: PathBuf,

        /// Write events through a bounded background queue
        #[arg(long)]
        queue: bool,

        /// Clamp out-of-order frames instead of rejecting them
        #[arg(long)]
        clamp: bool,

        /// Send events to a remote event store (requires gateway feature)
        #[arg(long)]
        remote: bool,

        /// Remote event store port
        #[arg(long)]
        remote_port: Option<u16>,

        /// Remote event store token
        #[arg(long)]
        remote_token: Option<String>,
    },

    /// Print stored events for a candidate, newest first
    Events {
        /// Candidate identifier
        #[arg(long)]
        candidate: String,

        /// Maximum number of events
        #[arg(long, default_value = "1000")]
        limit: usize,

        /// Output format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Summarize stored events for a candidate
    Summary {
        /// Candidate identifier; omit to list every candidate
        #[arg(long)]
        candidate: Option<String>,
    },

    /// Show monitoring statistics
    Status,

    /// Show configuration
    Config,

    /// Display the candidate-facing monitoring notice
    Notice,

    /// Serve the HTTP API (requires server feature)
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            candidate,
            input,
            queue,
            clamp,
            remote,
            remote_port,
            remote_token,
        } => {
            cmd_replay(
                &candidate,
                &input,
                queue,
                clamp,
                remote,
                remote_port,
                remote_token,
            );
        }
        Commands::Events {
            candidate,
            limit,
            format,
        } => {
            cmd_events(&candidate, limit, &format);
        }
        Commands::Summary { candidate } => {
            cmd_summary(candidate.as_deref());
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Notice => {
            cmd_notice();
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    }
}

fn open_store(config: &Config) -> JsonlSink {
    match JsonlSink::open(config.events_path()) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Error opening event store: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_replay(
    candidate: &str,
    input: &Path,
    queue: bool,
    clamp: bool,
    remote: bool,
    remote_port: Option<u16>,
    remote_token: Option<String>,
) {
    println!("Proctor Watch v{VERSION}");
    println!();

    let mut config = load_config();
    if clamp {
        config.clock_policy = ClockPolicy::Clamp;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let file = match File::open(input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening {input:?}: {e}");
            std::process::exit(1);
        }
    };
    let source = RecordedSource::new(BufReader::new(file));

    let store: Arc<dyn EventSink> = if remote {
        create_remote_sink(remote_port, remote_token)
    } else {
        Arc::new(open_store(&config))
    };

    let queued = queue.then(|| Arc::new(QueuedSink::new(store.clone(), config.sink_queue_capacity)));
    let sink: Arc<dyn EventSink> = match &queued {
        Some(q) => Arc::clone(q) as Arc<dyn EventSink>,
        None => store,
    };

    let transparency =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));
    let coordinator = SessionCoordinator::with_transparency(config, sink, transparency.clone());

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    println!("Replaying {input:?} for candidate {candidate}");
    println!("Press Ctrl+C to stop.");
    println!();

    let mut frames = 0usize;
    let mut emitted = 0usize;
    for frame in source {
        if !running.load(Ordering::SeqCst) {
            println!("Replay interrupted.");
            break;
        }

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                eprintln!("Skipping frame: {e}");
                continue;
            }
        };
        frames += 1;

        let events = match coordinator.process_raw(candidate, frame.detection, frame.captured_at) {
            Ok(events) => events,
            Err(CoordinatorError::Sink { events, source, .. }) => {
                eprintln!("Warning: {source}");
                events
            }
            Err(e) => {
                eprintln!("Skipping frame: {e}");
                continue;
            }
        };

        for event in &events {
            emitted += 1;
            println!(
                "[{}] {} {}",
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.details
            );
        }
    }

    if let Some(q) = &queued {
        if let Err(e) = q.flush() {
            eprintln!("Warning: queued events not written: {e}");
        }
        if q.failed_writes() > 0 {
            eprintln!("Warning: {} event(s) failed to write", q.failed_writes());
        }
    }

    coordinator.close_session(candidate);
    if let Err(e) = transparency.save() {
        eprintln!("Warning: Could not save statistics: {e}");
    }

    println!();
    println!("Frames replayed: {frames}");
    println!("Events emitted: {emitted}");
}

fn cmd_events(candidate: &str, limit: usize, format: &str) {
    let config = load_config();
    let store = open_store(&config);

    let events = match store.query(candidate, limit) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error reading events: {e}");
            std::process::exit(1);
        }
    };

    if format == "jsonl" {
        for event in &events {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("Error serializing: {e}"),
            }
        }
    } else {
        match serde_json::to_string_pretty(&serde_json::json!({ "events": events })) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn cmd_summary(candidate: Option<&str>) {
    let config = load_config();
    let store = open_store(&config);

    let candidates = match candidate {
        Some(c) => vec![c.to_string()],
        None => match store.candidates() {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error listing candidates: {e}");
                std::process::exit(1);
            }
        },
    };

    if candidates.is_empty() {
        println!("No events recorded in {:?}", store.dir());
        println!("Run 'proctor-watch replay' to process a recording.");
        return;
    }

    for candidate in candidates {
        match store.query(&candidate, usize::MAX) {
            Ok(events) => {
                let summary = EventSummary::from_events(&candidate, &events);
                println!("{}", summary.report(&events));
            }
            Err(e) => eprintln!("Error reading events for {candidate}: {e}"),
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Proctor Watch Status");
    println!("====================");
    println!();

    let t = &config.thresholds;
    println!("Thresholds:");
    println!("  No face: {}s", t.no_face.as_secs_f64());
    println!("  Multiple faces cooldown: {}s", t.multi_face_cooldown.as_secs_f64());
    println!("  Focus away: {}s", t.focus_away.as_secs_f64());
    println!("  Center threshold: {}", t.center);
    println!("  Object cooldown: {}s", t.object_cooldown.as_secs_f64());
    println!(
        "  Suspicious labels: {}",
        config.suspicious_labels.keywords().join(", ")
    );
    println!();

    let stats_path = config.data_path.join("transparency.json");
    if stats_path.exists() {
        let log = create_shared_log_with_persistence(stats_path);
        println!("{}", log.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_notice() {
    println!("{MONITORING_NOTICE}");
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) {
    use proctor_watch::server::{run, ServerConfig};

    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    // Frames only enqueue; file writes happen on the queue's worker.
    let store: Arc<dyn EventSink> = Arc::new(open_store(&config));
    let queued = Arc::new(QueuedSink::new(store, config.sink_queue_capacity));
    let transparency =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));
    let coordinator = Arc::new(SessionCoordinator::with_transparency(
        config,
        queued.clone(),
        transparency.clone(),
    ));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let (addr, shutdown) = match run(ServerConfig::new(port, coordinator)).await {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop.");

        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Error waiting for Ctrl+C: {e}");
        }
        let _ = shutdown.send(());
    });

    if let Err(e) = queued.flush() {
        eprintln!("Warning: queued events not written: {e}");
    }
    if queued.failed_writes() > 0 {
        eprintln!("Warning: {} event(s) failed to write", queued.failed_writes());
    }
    if let Err(e) = transparency.save() {
        eprintln!("Warning: Could not save statistics: {e}");
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}

/// Create the remote event store sink from CLI args.
#[cfg(feature = "gateway")]
fn create_remote_sink(port: Option<u16>, token: Option<String>) -> Arc<dyn EventSink> {
    let (Some(port), Some(token)) = (port, token) else {
        eprintln!("Error: --remote requires --remote-port and --remote-token");
        std::process::exit(1);
    };

    let sink = match RemoteSink::new(RemoteSinkConfig::new("127.0.0.1", port, token)) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Error creating remote sink: {e}");
            std::process::exit(1);
        }
    };

    match sink.test_connection() {
        Ok(true) => println!("Remote event store connected (station {})", sink.station_id()),
        Ok(false) => eprintln!("Warning: Remote event store health check failed"),
        Err(e) => eprintln!("Warning: Could not reach remote event store: {e}"),
    }

    Arc::new(sink)
}

#[cfg(not(feature = "gateway"))]
fn create_remote_sink(_port: Option<u16>, _token: Option<String>) -> Arc<dyn EventSink> {
    eprintln!("Error: remote event store support requires the 'gateway' feature");
    std::process::exit(1);
}
