//! Command-line front end for the judgment pipeline and evolution engine.
//!
//! Usage:
//!   judgment-mind run "Should I take the offer?" [--sequential]
//!   judgment-mind judge "Should I take the offer?"
//!   judgment-mind trajectory [--window 1d]
//!   judgment-mind trends | meta | anomalies
//!   judgment-mind roadmap [--timeline 3m]

use anyhow::Result;
use clap::{Parser, Subcommand};
use prettytable::{Table, row};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use judgment_mind::config::RuntimeConfig;
use judgment_mind::evolution::{Analysis, Timeline, TimeWindow};
use judgment_mind::{Config, EvolutionTracker, PipelineRun, PipelineScheduler};

#[derive(Parser)]
#[command(name = "judgment-mind")]
#[command(about = "Eight-stage judgment pipeline with cognitive evolution tracking", long_about = None)]
struct Cli {
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Session id attached to the run
    #[arg(long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline without recording a snapshot
    Run {
        text: String,
        /// Run all eight stages on a single path
        #[arg(long)]
        sequential: bool,
    },
    /// Run the pipeline and record the resulting snapshot
    Judge { text: String },
    /// Trajectory over a window (1h, 1d, 1w, 1m) or all history
    Trajectory {
        #[arg(long)]
        window: Option<String>,
    },
    /// Latest per-metric trend table
    Trends,
    /// Meta-cognitive evolution over recent snapshots
    Meta,
    /// Anomalies in recent snapshots, most severe first
    Anomalies,
    /// Improvement roadmap from the latest snapshot
    Roadmap {
        #[arg(long, default_value = "3m")]
        timeline: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // subscriber first so config warnings are visible
    let runtime = RuntimeConfig::load_from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&runtime.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;

    let mut session = Map::new();
    if let Some(id) = &cli.session {
        session.insert("session_id".into(), Value::String(id.clone()));
    }

    match cli.command {
        Commands::Run { text, sequential } => {
            let scheduler = PipelineScheduler::new(config.pipeline.clone());
            let run = if sequential {
                scheduler.run_pipeline(&text, session).await
            } else {
                scheduler.run_pipeline_concurrent(&text, session).await
            };
            if cli.json {
                print_json(&run)?;
            } else {
                print_run(&run);
            }
        }
        Commands::Judge { text } => {
            let tracker = EvolutionTracker::open(&config).await;
            let judgment = tracker.judge(&text, session).await?;
            if cli.json {
                print_json(&judgment)?;
            } else {
                print_run(&judgment.run);
                match &judgment.snapshot {
                    Some(s) => println!(
                        "Recorded snapshot: overall={:.3} coherence={:.3} adaptive={:.3} meta={:.3}",
                        s.overall_intelligence,
                        s.cognitive_coherence,
                        s.adaptive_capacity,
                        s.meta_cognitive_level
                    ),
                    None => println!("Run failed; no snapshot recorded."),
                }
            }
            // flush anything recorded since the last batched save
            tracker.save().await?;
        }
        Commands::Trajectory { window } => {
            let window = window.map(|w| w.parse::<TimeWindow>()).transpose()?;
            let tracker = EvolutionTracker::open(&config).await;
            print_json(&tracker.get_trajectory(window).await)?;
        }
        Commands::Trends => {
            let tracker = EvolutionTracker::open(&config).await;
            let trends = tracker.latest_trends().await;
            if cli.json {
                print_json(&trends)?;
            } else if trends.is_empty() {
                println!("Not enough snapshots for any trend (need 3 in a window).");
            } else {
                let mut table = Table::new();
                table.add_row(row![
                    "Metric", "Window", "Direction", "Pattern", "Change", "Volatility", "Next"
                ]);
                for t in trends {
                    table.add_row(row![
                        t.metric_name,
                        t.time_window,
                        format!("{:?}", t.direction),
                        t.growth_pattern.as_str(),
                        format!("{:+.3}", t.change_rate),
                        format!("{:.3}", t.volatility),
                        format!("{:.3}", t.predicted_next_value),
                    ]);
                }
                table.printstd();
            }
        }
        Commands::Meta => {
            let tracker = EvolutionTracker::open(&config).await;
            print_json(&tracker.get_meta_cognitive_evolution().await)?;
        }
        Commands::Anomalies => {
            let tracker = EvolutionTracker::open(&config).await;
            let report = tracker.detect_anomalies().await;
            match (&report, cli.json) {
                (Analysis::Ready(r), false) => {
                    let mut table = Table::new();
                    table.add_row(row!["Severity", "Kind", "Metric", "When", "Description"]);
                    for a in &r.anomalies {
                        table.add_row(row![
                            format!("{:.2}", a.severity_score),
                            format!("{:?}", a.kind),
                            a.metric,
                            a.timestamp.to_rfc3339(),
                            a.description,
                        ]);
                    }
                    println!("{} anomalies ({} detector)", r.anomalies.len(), r.detector);
                    table.printstd();
                }
                _ => print_json(&report)?,
            }
        }
        Commands::Roadmap { timeline } => {
            let timeline = timeline.parse::<Timeline>()?;
            let tracker = EvolutionTracker::open(&config).await;
            print_json(&tracker.generate_roadmap(None, timeline).await?)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_run(run: &PipelineRun) {
    let mut table = Table::new();
    table.add_row(row!["Stage", "Status", "Confidence", "ms", "Insight"]);
    for r in &run.results {
        table.add_row(row![
            r.stage,
            format!("{:?}", r.status),
            format!("{:.2}", r.confidence),
            format!("{:.1}", r.duration_ms),
            r.insights.first().cloned().unwrap_or_default(),
        ]);
    }
    table.printstd();
    println!(
        "{:?} run {} ({:?}): overall confidence {:.3}",
        run.completion_status, run.run_id, run.execution_mode, run.overall_confidence
    );
    if let Some(rec) = &run.summary.final_recommendation {
        println!("Recommendation: {}", rec);
    }
}
