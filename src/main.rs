//! arbitrium CLI - Human-in-the-loop binary classification with a GPT arbiter.

use anyhow::{Context, Result};
use arbitrium::{
    Arbiter, Config, DummyArbiter, GptArbiter, Label, ReviewSession, SelectOutcome, StepOutcome,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "arbitrium")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Active-learning review of binary classifications judged by a GPT arbiter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background judging loop until every item is classified
    Judge {
        /// Use a cost-free random arbiter instead of the API
        #[arg(long)]
        dummy: bool,

        /// Ignore the configured throttle and go as fast as the API allows
        #[arg(long)]
        unthrottled: bool,
    },

    /// Show the item most worth reviewing right now
    Next,

    /// Record a human verdict for the current pick and grow the example pool
    Label {
        /// Item id (must be the current pick; see `next`)
        id: String,

        /// The verdict: 0 for No, 1 for Yes
        label: u8,

        /// Optional explanation, stored alongside the example
        #[arg(short, long)]
        explanation: Option<String>,
    },

    /// Stream the arbiter's rationale for both answers on the current pick
    Why {
        /// Use a cost-free random arbiter instead of the API
        #[arg(long)]
        dummy: bool,
    },

    /// Summarize annotation freshness across all items
    Status,

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# arbitrium configuration file

[openai]
# API key (can also use OPENAI_API_KEY env var)
# api_key = "sk-..."
base_url = "https://api.openai.com/v1"
timeout_secs = 180
max_retries = 3

[arbiter]
model = "gpt-5-nano"
judge_max_tokens = 1
interrogate_max_tokens = 60

[selection]
# Inverse probability that two random items are significantly related
lambda = 20.0

[throttle]
active = true
qps = 10.0

[paths]
items = "items.jsonl"            # {"id": ..., "text": ...} per line
annotations = "annotations.json" # created on first run
pool = "pool.json"               # {"prompt": ..., "examples": [...]}
"#;
    println!("{example}");
}

fn build_arbiter(config: &Config, dummy: bool) -> Result<Box<dyn Arbiter>> {
    if dummy {
        return Ok(Box::new(DummyArbiter));
    }
    let api_key = config.resolve_api_key().context("Failed to resolve API key")?;
    let arbiter = GptArbiter::new(
        api_key,
        config.openai.base_url.clone(),
        config.openai.timeout_secs,
        config.openai.max_retries,
    )
    .context("Failed to build API client")?;
    Ok(Box::new(arbiter))
}

fn load_config(path: &PathBuf) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn open_session(config: &Config, dummy: bool) -> Result<ReviewSession> {
    let arbiter = build_arbiter(config, dummy)?;
    let session = ReviewSession::open(config, arbiter)?;
    Ok(session)
}

/// Cancelled on Ctrl-C, so an in-flight judge call dies without writing.
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling in-flight work");
            trigger.cancel();
        }
    });
    cancel
}

fn print_pick(session: &ReviewSession, id: &str) -> Result<()> {
    let utility = session.utility_of(id)?;
    let annotation = session.store().get(id);
    println!("Pick:     {id}");
    println!("Text:     {}", session.catalog().text(id)?);
    if let Some(p) = annotation.gpt_verdict {
        println!("Arbiter:  P(yes) = {p:.3}");
    }
    println!("Utility:  {utility:.4}");
    Ok(())
}

async fn run_judge(config: Config, dummy: bool, unthrottled: bool) -> Result<()> {
    let mut session = open_session(&config, dummy)?;
    if unthrottled && session.judging_mut().throttle().is_active() {
        session.judging_mut().throttle_mut().toggle();
    }

    let bar = ProgressBar::new(session.catalog().len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("valid progress template"),
    );
    let already = session
        .status()
        .symbols
        .chars()
        .filter(|&c| c != '-')
        .count();
    bar.set_position(already as u64);

    let cancel = ctrl_c_token();
    let outcome = session
        .run_judging(&cancel, |id, verdict| {
            bar.inc(1);
            bar.set_message(format!("{id}: {verdict:.3}"));
        })
        .await;
    bar.finish_and_clear();

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            // Flush what was judged before the failure.
            session.close()?;
            return Err(e.into());
        }
    };

    match outcome {
        StepOutcome::AllFinished | StepOutcome::AlreadyFinished => {
            println!("All items classified.");
        }
        StepOutcome::Cancelled => println!("Interrupted; progress saved."),
        StepOutcome::Judged { .. } | StepOutcome::Paused => {}
    }
    println!("Cost:        ${:.4}", session.running_cost());
    println!("Per item:    ${:.6}", session.cost_per_item());

    match session.refresh_pick() {
        SelectOutcome::Picked(id) => {
            println!();
            print_pick(&session, &id)?;
        }
        SelectOutcome::NothingReady => println!("Nothing worth reviewing right now."),
        SelectOutcome::Busy => {}
    }

    session.close()?;
    Ok(())
}

async fn run_why(config: Config, dummy: bool) -> Result<()> {
    let mut session = open_session(&config, dummy)?;
    match session.refresh_pick() {
        SelectOutcome::Picked(id) => {
            print_pick(&session, &id)?;
            println!();
        }
        SelectOutcome::NothingReady => {
            println!("Nothing worth reviewing right now.");
            session.close()?;
            return Ok(());
        }
        SelectOutcome::Busy => unreachable!("single-threaded CLI cannot race itself"),
    }

    let mut last: Option<Label> = None;
    let mut sink = |label: Label, chunk: &str| {
        if last != Some(label) {
            if last.is_some() {
                println!();
            }
            print!("If {}: ", label.answer());
            last = Some(label);
        }
        print!("{chunk}");
    };
    session.interrogate_current(&mut sink).await?;
    println!();

    session.close()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;
            info!("Configuration is valid");
            info!("  Model:    {}", config.arbiter.model);
            info!("  Lambda:   {}", config.selection.lambda);
            info!(
                "  Throttle: {} at {} qps",
                if config.throttle.active { "on" } else { "off" },
                config.throttle.qps
            );
            return Ok(());
        }

        Commands::Judge { dummy, unthrottled } => {
            let config = load_config(&cli.config)?;
            run_judge(config, dummy, unthrottled).await?;
        }

        Commands::Next => {
            let config = load_config(&cli.config)?;
            // The selector is all that runs here; no arbiter call is made.
            let mut session = open_session(&config, true)?;
            match session.refresh_pick() {
                SelectOutcome::Picked(id) => print_pick(&session, &id)?,
                SelectOutcome::NothingReady => {
                    println!("Nothing worth reviewing right now; run `judge` first.")
                }
                SelectOutcome::Busy => {}
            }
            session.close()?;
        }

        Commands::Label {
            id,
            label,
            explanation,
        } => {
            let config = load_config(&cli.config)?;
            let label = Label::try_from(label)?;
            let mut session = open_session(&config, true)?;

            // Recompute the selection; `submit` holds items to the
            // active-pick precondition.
            session.refresh_pick();
            match session.submit(&id, label, explanation) {
                Ok(()) => {
                    println!("Recorded {} for {id}.", label.answer());
                    println!("Examples in pool: {}", session.pool().examples.len());
                    match session.refresh_pick() {
                        SelectOutcome::Picked(next) => {
                            println!();
                            print_pick(&session, &next)?;
                        }
                        SelectOutcome::NothingReady => {
                            println!("Nothing worth reviewing right now; run `judge` to re-score.")
                        }
                        SelectOutcome::Busy => {}
                    }
                }
                Err(e) if e.is_stale_selection() => {
                    println!("{e}");
                    println!("Run `next` to see the current pick.");
                }
                Err(e) => return Err(e.into()),
            }
            session.close()?;
        }

        Commands::Why { dummy } => {
            let config = load_config(&cli.config)?;
            run_why(config, dummy).await?;
        }

        Commands::Status => {
            let config = load_config(&cli.config)?;
            let session = open_session(&config, true)?;
            let summary = session.status();
            println!("{}", summary.symbols);
            println!(
                "{} items: {} unvisited, {} fresh, {} outdated, {} human-labeled",
                summary.total(),
                summary.unvisited,
                summary.classified,
                summary.outdated,
                summary.human_labeled
            );
            println!("Examples in pool: {}", session.pool().examples.len());
            session.close()?;
        }
    }

    Ok(())
}
