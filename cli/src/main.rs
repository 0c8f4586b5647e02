//! stakevote CLI - operator entry point for the governance engine.
//!
//! Every command opens its own [`GovernanceService`] on the shared database,
//! so several invocations may run side by side. Results are printed to stdout
//! as JSON; logs go to `~/.stakevote/logs/stakevote.log`.
//!
//! ```text
//! main() -> Cli::parse() -> run() -> GovernanceService -> JSON on stdout
//!                                         |
//!                                         +-- Registry (holdings, roles)
//! ```

mod registry;

use std::fs::{self, OpenOptions};
use std::io::{Write, stdout};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stakevote_engine::{
    Collaborators, GovernanceConfig, GovernanceError, GovernanceService, PropertyId, Proposal,
    ProposalDraft, ProposalFilter, ProposalId, ProposalStatus, ProposalView, Resolution,
    SystemClock, TallyReport, TracingNotifier, UserId, Vote, VoteChoice,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::registry::Registry;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout carries results; without a log file, stay silent.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.stakevote/logs/stakevote.log
    if let Some(config_path) = GovernanceConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("stakevote.log"));
    }

    // Fallback: ./.stakevote/logs/stakevote.log
    candidates.push(PathBuf::from(".stakevote").join("logs").join("stakevote.log"));

    candidates
}

#[derive(Parser)]
#[command(author, version, about = "Weighted governance for fractional property owners")]
struct Cli {
    /// Config file (default: ~/.stakevote/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file (overrides [storage] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Holdings and roles (default: ~/.stakevote/registry.toml)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a proposal for voting
    Create {
        #[arg(long)]
        property: String,
        #[arg(long)]
        proposer: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Length of the voting window in seconds
        #[arg(long)]
        window_secs: u64,
    },
    /// Cast a weighted vote (for|against)
    Vote {
        id: ProposalId,
        #[arg(long)]
        voter: String,
        #[arg(long)]
        choice: VoteChoice,
    },
    /// Show a proposal, resolving it if voting has closed
    Show {
        id: ProposalId,
        /// Include whether this user has voted
        #[arg(long)]
        viewer: Option<String>,
    },
    /// List proposals
    List {
        #[arg(long)]
        property: Option<String>,
        #[arg(long)]
        status: Option<ProposalStatus>,
    },
    /// List the vote ledger of a proposal
    Votes { id: ProposalId },
    /// Resolve a proposal whose voting has closed
    Finalize { id: ProposalId },
    /// Execute a passed proposal
    Execute {
        id: ProposalId,
        #[arg(long)]
        actor: String,
    },
    /// Cancel an active proposal
    Cancel {
        id: ProposalId,
        #[arg(long)]
        actor: String,
    },
    /// Resolve every proposal whose window has elapsed
    Sweep,
    /// Sweep periodically until interrupted
    Watch {
        #[arg(long, default_value_t = 60)]
        every: u64,
    },
    /// Compare the cached tally with the vote ledger
    Verify {
        id: ProposalId,
        /// Rebuild the cached tally from the ledger (active proposals only)
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum Output {
    Proposal(Box<Proposal>),
    View(Box<ProposalView>),
    Proposals(Vec<Proposal>),
    Vote(Vote),
    Votes(Vec<Vote>),
    Resolution(Box<Resolution>),
    Swept(Vec<Swept>),
    Tally(TallyCheck),
}

#[derive(Serialize)]
struct Swept {
    proposal_id: ProposalId,
    status: ProposalStatus,
}

#[derive(Serialize)]
struct TallyCheck {
    consistent: bool,
    report: TallyReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    repaired: Option<TallyReport>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: &'static str,
    message: String,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => GovernanceConfig::load(path)?,
        None => GovernanceConfig::load_default()?,
    };
    let db_path = match cli.db.clone().or_else(|| config.database_path()) {
        Some(path) => path,
        None => bail!("cannot determine a database path; pass --db"),
    };
    let registry = Arc::new(load_registry(cli.registry.as_deref())?);

    let collaborators = Collaborators {
        weights: registry.clone(),
        roles: registry,
        notifier: Arc::new(TracingNotifier),
        clock: Arc::new(SystemClock),
    };
    let mut service = GovernanceService::open(&db_path, collaborators, config)
        .with_context(|| format!("failed to open governance database {}", db_path.display()))?;

    if let Command::Watch { every } = cli.cmd {
        return watch(&mut service, every);
    }

    match dispatch(&mut service, cli.cmd) {
        Ok(output) => {
            print_json(&output)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::warn!(kind = err.kind().as_str(), "{err}");
            print_json(&ErrorOutput {
                error: err.kind().as_str(),
                message: err.to_string(),
            })?;
            Ok(ExitCode::from(2))
        }
    }
}

fn load_registry(explicit: Option<&Path>) -> Result<Registry> {
    if let Some(path) = explicit {
        return Registry::load(path);
    }
    let default = GovernanceConfig::path()
        .and_then(|config| config.parent().map(|dir| dir.join("registry.toml")));
    match default {
        Some(path) if path.exists() => Registry::load(&path),
        _ => {
            tracing::warn!("No registry file found; every holder has zero weight");
            Ok(Registry::default())
        }
    }
}

fn dispatch(service: &mut GovernanceService, cmd: Command) -> Result<Output, GovernanceError> {
    let output = match cmd {
        Command::Create {
            property,
            proposer,
            title,
            description,
            window_secs,
        } => Output::Proposal(Box::new(service.create_proposal(ProposalDraft {
            property_id: PropertyId::new(property),
            proposer_id: UserId::new(proposer),
            title,
            description,
            voting_window: Duration::from_secs(window_secs),
        })?)),
        Command::Vote { id, voter, choice } => {
            Output::Vote(service.cast_vote(id, &UserId::new(voter), choice)?)
        }
        Command::Show { id, viewer: None } => Output::Proposal(Box::new(service.proposal(id)?)),
        Command::Show {
            id,
            viewer: Some(viewer),
        } => Output::View(Box::new(service.get_proposal(id, &UserId::new(viewer))?)),
        Command::List { property, status } => {
            let filter = ProposalFilter {
                property_id: property.map(PropertyId::new),
                status,
            };
            Output::Proposals(service.list_proposals(&filter)?)
        }
        Command::Votes { id } => Output::Votes(service.votes(id)?),
        Command::Finalize { id } => Output::Resolution(Box::new(service.finalize(id)?)),
        Command::Execute { id, actor } => {
            Output::Proposal(Box::new(service.execute_proposal(id, &UserId::new(actor))?))
        }
        Command::Cancel { id, actor } => {
            Output::Proposal(Box::new(service.cancel_proposal(id, &UserId::new(actor))?))
        }
        Command::Sweep => Output::Swept(swept(service.sweep()?)),
        Command::Verify { id, repair } => {
            let report = service.verify_tally(id)?;
            let repaired = if repair && !report.is_consistent() {
                service.repair_tally(id)?;
                Some(service.verify_tally(id)?)
            } else {
                None
            };
            Output::Tally(TallyCheck {
                consistent: report.is_consistent(),
                report,
                repaired,
            })
        }
        Command::Watch { .. } => {
            return Err(GovernanceError::InvalidInput(
                "watch runs continuously and has no single result".to_string(),
            ));
        }
    };
    Ok(output)
}

fn swept(resolved: Vec<(ProposalId, ProposalStatus)>) -> Vec<Swept> {
    resolved
        .into_iter()
        .map(|(proposal_id, status)| Swept {
            proposal_id,
            status,
        })
        .collect()
}

/// Sweep every `every` seconds, printing one JSON line per resolution.
fn watch(service: &mut GovernanceService, every: u64) -> Result<ExitCode> {
    if every == 0 {
        bail!("--every must be at least 1 second");
    }
    tracing::info!(every_secs = every, "Watching for due proposals");
    loop {
        match service.sweep() {
            Ok(resolved) => {
                let mut out = stdout().lock();
                for entry in swept(resolved) {
                    serde_json::to_writer(&mut out, &entry)?;
                    writeln!(out)?;
                }
                out.flush()?;
            }
            Err(err) => tracing::warn!(kind = err.kind().as_str(), "Sweep failed: {err}"),
        }
        thread::sleep(Duration::from_secs(every));
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context("failed to write JSON output")?;
    writeln!(out)?;
    Ok(())
}
