//! ewma-watch - run the adaptive EWMA detector over simulated energy streams
//!
//! Usage:
//!   ewma-watch --count 2000 --seed 42
//!   ewma-watch --streams 4 --format json-lines --metrics
//!   RUST_LOG=ewma_watch=debug ewma-watch --alpha 0.1 --threshold 2.5

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, Sender, bounded};
use ewma_watch::simulation::{EnergyStream, StreamConfig};
use ewma_watch::{Detector, DetectorConfig, Evaluation, Observation, Summary, Verdict};
use once_cell::sync::Lazy;
use prometheus::{Counter, Encoder, TextEncoder};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::process::ExitCode;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// --- Metrics ---

static OBSERVATIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("ewma_observations_total", "Total observations processed")
        .expect("valid metric definition");
    let _ = prometheus::register(Box::new(c.clone()));
    c
});

static ANOMALIES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("ewma_anomalies_total", "Total anomalies detected")
        .expect("valid metric definition");
    let _ = prometheus::register(Box::new(c.clone()));
    c
});

static TRUE_ANOMALIES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("ewma_true_anomalies_total", "Total labelled anomalies seen")
        .expect("valid metric definition");
    let _ = prometheus::register(Box::new(c.clone()));
    c
});

// --- CLI ---

#[derive(Parser)]
#[command(name = "ewma-watch")]
#[command(about = "Adaptive EWMA anomaly detection over a simulated energy-consumption stream")]
struct Cli {
    /// Smoothing factor in (0, 1]
    #[arg(short, long, default_value_t = 0.2)]
    alpha: f64,

    /// Standard deviations beyond which a point is flagged
    #[arg(short, long, default_value_t = 3.0)]
    threshold: f64,

    /// Warm-up length (seeding uses at most 10 points)
    #[arg(short, long, default_value_t = 30)]
    warmup: usize,

    /// RNG seed for reproducible streams (stream i uses seed + i)
    #[arg(long)]
    seed: Option<u64>,

    /// Observations per stream; 0 runs until interrupted
    #[arg(short, long, default_value_t = 1000)]
    count: usize,

    /// Independent streams, each with its own detector
    #[arg(long, default_value_t = 1)]
    streams: usize,

    /// Output format
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Dump Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Pretty,
    JsonLines,
}

// --- Data Types ---

#[derive(Serialize)]
struct Record {
    stream: usize,
    index: u64,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    verdict: Verdict,
}

#[derive(Serialize)]
struct StreamReport {
    stream: usize,
    #[serde(flatten)]
    summary: Summary,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// --- Producer ---

fn spawn_producer(
    id: usize,
    mut stream: EnergyStream,
    limit: usize,
    tx: Sender<Observation>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("ewma-source-{}", id))
        .spawn(move || {
            for obs in stream.by_ref().take(limit) {
                if tx.send(obs).is_err() {
                    break;
                }
            }
            info!(stream = id, produced = stream.time(), "source finished");
        })
}

// --- Stream Worker ---

struct StreamWorker {
    id: usize,
    detector: Detector,
    rx: Receiver<Observation>,
    out: Sender<Record>,
    start: DateTime<Utc>,
}

impl StreamWorker {
    fn spawn(self) -> std::io::Result<thread::JoinHandle<ewma_watch::Result<Evaluation>>> {
        thread::Builder::new()
            .name(format!("ewma-stream-{}", self.id))
            .spawn(move || self.run())
    }

    fn run(self) -> ewma_watch::Result<Evaluation> {
        let StreamWorker {
            id,
            detector,
            rx,
            out,
            start,
        } = self;
        let mut eval = Evaluation::new();

        for (index, result) in detector.process(rx).enumerate() {
            let verdict = result?;
            let index = index as u64;

            OBSERVATIONS_TOTAL.inc();
            if verdict.is_true_anomaly {
                TRUE_ANOMALIES_TOTAL.inc();
            }
            if verdict.is_anomaly {
                ANOMALIES_TOTAL.inc();
                warn!(
                    stream = id,
                    index,
                    value = verdict.value,
                    ewma = verdict.ewma,
                    labelled = verdict.is_true_anomaly,
                    "ANOMALY"
                );
            }
            eval.record(&verdict);

            let record = Record {
                stream: id,
                index,
                timestamp: start + Duration::hours(index as i64),
                verdict,
            };
            if out.send(record).is_err() {
                break;
            }
        }

        info!(stream = id, observations = eval.total(), "stream worker stopped");
        Ok(eval)
    }
}

// --- Output ---

fn write_record(w: &mut impl Write, format: OutputFormat, record: &Record) -> Result<(), BoxError> {
    match format {
        OutputFormat::JsonLines => {
            serde_json::to_writer(&mut *w, record)?;
            writeln!(w)?;
        }
        OutputFormat::Pretty => {
            let v = &record.verdict;
            writeln!(
                w,
                "[{}] {} #{:<6} value={:>8.2} ewma={:>8.2} std_dev={:>6.2} anomaly={:<5} true_anomaly={}",
                record.stream,
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.index,
                v.value,
                v.ewma,
                v.std_dev,
                v.is_anomaly,
                v.is_true_anomaly
            )?;
        }
    }
    Ok(())
}

fn write_report(w: &mut impl Write, format: OutputFormat, report: &StreamReport) -> Result<(), BoxError> {
    match format {
        OutputFormat::JsonLines => {
            serde_json::to_writer(&mut *w, report)?;
            writeln!(w)?;
        }
        OutputFormat::Pretty => {
            let s = &report.summary;
            writeln!(
                w,
                "stream {}: {} observations, {} detected, {} labelled | precision {:.2}, recall {:.2}, f1 {:.2}",
                report.stream, s.observations, s.detected, s.labelled, s.precision, s.recall, s.f1
            )?;
        }
    }
    Ok(())
}

// --- Main ---

fn run(cli: Cli) -> Result<(), BoxError> {
    let config = DetectorConfig::new(cli.alpha, cli.threshold, cli.warmup);
    let detector = Detector::new(config)?;
    let streams = cli.streams.max(1);
    let limit = if cli.count == 0 { usize::MAX } else { cli.count };

    info!(
        alpha = config.alpha,
        threshold = config.threshold,
        seed_window = config.seed_window(),
        streams,
        "starting detection"
    );

    // Touch metrics so they are registered even if nothing is observed.
    let _ = &*OBSERVATIONS_TOTAL;
    let _ = &*ANOMALIES_TOTAL;
    let _ = &*TRUE_ANOMALIES_TOTAL;

    let start = Utc::now();
    let (out_tx, out_rx) = bounded::<Record>(4096);
    let mut producers = Vec::with_capacity(streams);
    let mut workers = Vec::with_capacity(streams);

    for id in 0..streams {
        let source = match cli.seed {
            Some(seed) => EnergyStream::seeded(StreamConfig::default(), seed.wrapping_add(id as u64))?,
            None => EnergyStream::new(StreamConfig::default())?,
        };
        let (tx, rx) = bounded::<Observation>(1024);

        producers.push(spawn_producer(id, source, limit, tx)?);
        workers.push(
            StreamWorker {
                id,
                detector: detector.clone(),
                rx,
                out: out_tx.clone(),
                start,
            }
            .spawn()?,
        );
    }

    // Only workers hold senders now; the loop below ends when they all stop.
    drop(out_tx);

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in out_rx {
        write_record(&mut out, cli.format, &record)?;
    }

    for handle in producers {
        handle.join().map_err(|_| "source thread panicked")?;
    }

    let mut failure = None;
    for (stream, handle) in workers.into_iter().enumerate() {
        match handle.join().map_err(|_| "stream worker panicked")? {
            Ok(eval) => write_report(
                &mut out,
                cli.format,
                &StreamReport {
                    stream,
                    summary: eval.summary(),
                },
            )?,
            Err(e) => {
                error!(stream, error = %e, "stream failed");
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    if cli.metrics {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        out.write_all(&buffer)?;
    }
    out.flush()?;

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ewma-watch failed");
            ExitCode::FAILURE
        }
    }
}
