use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use livecheck_core::{ChallengeMode, LivenessAction, LivenessEvaluator, TimeoutPolicy};
use tracing_subscriber::EnvFilter;

mod config;
mod replay;

use config::Config;

#[derive(Parser)]
#[command(name = "livecheck", version, about = "Active face-liveness challenge evaluator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded sample stream (JSON lines, `-` for stdin)
    Replay {
        file: PathBuf,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Required actions, comma separated (e.g. blink,smile)
        #[arg(long, value_delimiter = ',', conflicts_with = "single")]
        actions: Vec<LivenessAction>,
        /// Ask for one randomly chosen action
        #[arg(long)]
        single: bool,
        /// Seed for the random challenge choice
        #[arg(long)]
        seed: Option<u64>,
        /// reset or warn-only
        #[arg(long)]
        timeout_policy: Option<TimeoutPolicy>,
        /// Print one JSON verdict per frame on stdout
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the supported actions
    Actions,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            file,
            config,
            actions,
            single,
            seed,
            timeout_policy,
            json,
        } => {
            let mut settings = Config::load(config.as_deref())?.settings;
            if single {
                settings.challenge.mode = ChallengeMode::Single;
            } else if !actions.is_empty() {
                settings.challenge.mode = ChallengeMode::Multi;
                settings.challenge.required = actions;
            }
            if let Some(policy) = timeout_policy {
                settings.challenge.timeout_policy = policy;
            }

            let mut evaluator =
                LivenessEvaluator::new(settings).context("invalid evaluator configuration")?;
            if let Some(seed) = seed {
                evaluator = evaluator.with_seed(seed);
            }

            let input: Box<dyn BufRead> = if file.as_os_str() == "-" {
                Box::new(io::stdin().lock())
            } else {
                let f = File::open(&file)
                    .with_context(|| format!("failed to open {}", file.display()))?;
                Box::new(BufReader::new(f))
            };

            let summary =
                replay::replay(&mut evaluator, input, &mut io::stdout().lock(), json)?;

            tracing::info!(
                frames = summary.frames,
                accepted = summary.accepted,
                occluded = summary.occluded,
                motion_suspected = summary.motion_suspected,
                timeouts = summary.timeouts,
                required = ?summary.required,
                completed = ?summary.completed,
                "replay finished"
            );

            match summary.verified_at {
                Some(t) => {
                    if !json {
                        println!("VERIFIED at t={t:.3}s after {} frame(s)", summary.frames);
                    }
                }
                None => {
                    if !json {
                        println!("NOT VERIFIED after {} frame(s)", summary.frames);
                    }
                    std::process::exit(1);
                }
            }
        }
        Command::Config { config } => {
            let loaded = Config::load(config.as_deref())?;
            loaded.settings.validate()?;
            if let Some(source) = &loaded.source {
                println!("# loaded from {}", source.display());
            }
            print!("{}", toml::to_string_pretty(&loaded.settings)?);
        }
        Command::Actions => {
            for action in LivenessAction::ALL {
                println!("{:<16} {}", action.as_str(), action.instruction());
            }
        }
    }

    Ok(())
}
