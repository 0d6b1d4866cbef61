//! CLI entry point for the reciprocal matching engine.
//!
//! Every command loads the snapshot at `state_path`, runs, and writes the
//! snapshot back when it changed something.

use anyhow::{Context, Result, anyhow, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use reciprocity::display::{batch_table, feedback_table, health_table, match_table};
use reciprocity::feedback::FeedbackTarget;
use reciprocity::{
    Answer, FeedbackSubmission, MatchEngine, MatchQuery, MatchType, Registration, Settings, UserId,
};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Reciprocal profile matching
#[derive(Parser)]
#[command(
    name = "reciprocity",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reciprocal profile matching engine",
    long_about = "Embed user profiles, rank reciprocal matches and announce new pairs.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up .reciprocity directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Register or update a user's answers
    #[command(
        after_help = "Examples:\n  reciprocity register alice -a 'What are you looking for?=a rust mentor' -a 'What can you offer?=design reviews'\n  reciprocity register --file alice.json --onboard"
    )]
    Register {
        /// User id (ignored with --file)
        user_id: Option<String>,

        /// Display name used in notifications
        #[arg(short, long)]
        label: Option<String>,

        /// Answer as PROMPT=ANSWER, repeatable
        #[arg(short, long = "answer", value_name = "PROMPT=ANSWER")]
        answers: Vec<String>,

        /// Registration JSON file
        #[arg(long, conflicts_with_all = ["user_id", "answers"])]
        file: Option<PathBuf>,

        /// Run the first-time onboarding right away
        #[arg(long)]
        onboard: bool,
    },

    /// Re-embed and re-match every dirty user
    Batch,

    /// Queue a user for the next batch without changing their answers
    Rematch { user_id: String },

    /// Show a user's stored matches
    Matches {
        user_id: String,

        /// requirements_to_offerings (r2o) or offerings_to_requirements (o2r)
        #[arg(short = 't', long = "type", default_value = "r2o")]
        match_type: MatchType,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(long)]
        min_threshold: Option<f64>,
    },

    /// Submit feedback about another user
    Feedback {
        user_id: String,

        subject_id: String,

        /// Free text, classified for sentiment
        text: String,

        /// match or chat
        #[arg(short = 't', long = "type", default_value = "match")]
        target: FeedbackTarget,
    },

    /// Show a user's recent feedback adjustments
    History { user_id: String },

    /// Counts, cache statistics and ledger audit
    Status,

    /// Serve the HTTP API
    Serve {
        /// Overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("reciprocity={default}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next phase boundary");
            trigger.cancel();
        }
    });
    token
}

fn parse_answer(raw: &str) -> Result<Answer> {
    let (prompt, answer) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("answer '{raw}' must look like PROMPT=ANSWER"))?;
    Ok(Answer::new(prompt.trim(), answer.trim()))
}

fn read_registration(
    user_id: Option<String>,
    label: Option<String>,
    answers: &[String],
    file: Option<PathBuf>,
) -> Result<Registration> {
    if let Some(path) = file {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut registration: Registration = serde_json::from_str(&json)
            .with_context(|| format!("{} is not a valid registration", path.display()))?;
        if label.is_some() {
            registration.label = label;
        }
        return Ok(registration);
    }

    let Some(user_id) = user_id else {
        bail!("a user id or --file is required");
    };
    Ok(Registration {
        user_id: UserId::from(user_id),
        label,
        answers: answers
            .iter()
            .map(|raw| parse_answer(raw))
            .collect::<Result<_>>()?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = &cli.command {
        let path = Settings::init_config_file(*force).map_err(|e| anyhow!("{e}"))?;
        println!("Created configuration file at: {}", path.display());
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    if cli.config.is_none() {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("configuration error in {}", path.display()))?,
        None => Settings::load().context("configuration error")?,
    };
    init_tracing(settings.debug);

    if let Commands::Config = cli.command {
        settings.validate()?;
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let engine = MatchEngine::open(settings).context("failed to open matching engine")?;

    match cli.command {
        Commands::Init { .. } | Commands::Config => {}

        Commands::Register {
            user_id,
            label,
            answers,
            file,
            onboard,
        } => {
            let registration = read_registration(user_id, label, &answers, file)?;
            let account = engine.register(registration)?;
            let report = if onboard {
                Some(engine.onboard_user(&account.user_id).await?)
            } else {
                None
            };
            engine.save_state()?;

            if cli.json {
                print_json(&serde_json::json!({ "account": account, "onboarding": report }))?;
            } else {
                println!(
                    "Registered {} (generation {}, {} answers)",
                    account.user_id,
                    account.generation,
                    account.answers.len()
                );
                if let Some(report) = report {
                    println!(
                        "Onboarded with {} matches, notification {}",
                        report.matches.len(),
                        if report.delivery.is_success() { "sent" } else { "failed" }
                    );
                }
            }
        }

        Commands::Batch => {
            let cancel = shutdown_token();
            let result = engine.run_batch(&cancel).await;
            // Failed runs commit nothing, but delivery failures are still worth keeping
            engine.save_state()?;
            let report = result?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{}", batch_table(&report));
                for skipped in &report.skipped {
                    println!(
                        "  skipped {} in {}: [{}] {}",
                        skipped.user_id, skipped.phase, skipped.code, skipped.reason
                    );
                }
            }
        }

        Commands::Rematch { user_id } => {
            let user = UserId::from(user_id);
            let generation = engine.mark_dirty(&user)?;
            engine.save_state()?;
            println!("{user} queued for the next batch (generation {generation})");
        }

        Commands::Matches {
            user_id,
            match_type,
            top_k,
            min_threshold,
        } => {
            let query = MatchQuery {
                user_id: UserId::from(user_id),
                match_type,
                top_k,
                min_threshold,
            };
            let matches = engine.matches(&query)?;
            if cli.json {
                print_json(&matches)?;
            } else if matches.is_empty() {
                println!("No matches for {} ({})", query.user_id, query.match_type);
            } else {
                println!("{}", match_table(&matches));
            }
        }

        Commands::Feedback {
            user_id,
            subject_id,
            text,
            target,
        } => {
            let submission = FeedbackSubmission {
                user_id: UserId::from(user_id),
                subject_id: UserId::from(subject_id),
                target,
                text,
            };
            let record = engine.submit_feedback(&submission)?;
            engine.save_state()?;
            if cli.json {
                print_json(&record)?;
            } else {
                println!("{}", feedback_table(std::slice::from_ref(&record)));
            }
        }

        Commands::History { user_id } => {
            let user = UserId::from(user_id);
            let history = engine.feedback_history(&user);
            let stats = engine.adjustment_stats(&user);
            if cli.json {
                print_json(&serde_json::json!({ "history": history, "stats": stats }))?;
            } else if history.is_empty() {
                println!("No feedback recorded for {user}");
            } else {
                println!("{}", feedback_table(&history));
                println!(
                    "{} total: {} positive, {} negative, {} neutral, average step {:.3}",
                    stats.total, stats.positive, stats.negative, stats.neutral, stats.average_step
                );
            }
        }

        Commands::Status => {
            let health = engine.health()?;
            if cli.json {
                print_json(&health)?;
            } else {
                println!("{}", health_table(&health));
                for failure in engine.failed_deliveries() {
                    println!(
                        "  undelivered {} after {} attempts: {}",
                        failure.key, failure.attempts, failure.reason
                    );
                }
            }
        }

        Commands::Serve { bind } => serve(engine, bind).await?,
    }

    Ok(())
}

#[cfg(feature = "http-server")]
async fn serve(engine: MatchEngine, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| engine.settings().server.bind.clone());
    tracing::info!(%bind, "starting http server");
    reciprocity::server::serve(std::sync::Arc::new(engine), &bind, shutdown_token()).await
}

#[cfg(not(feature = "http-server"))]
async fn serve(_engine: MatchEngine, _bind: Option<String>) -> Result<()> {
    bail!("this build has no HTTP server; rebuild with --features http-server")
}
