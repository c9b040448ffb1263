//! Contrail: an append-only contract ledger for agent feedback loops.
//!
//! Three loosely-coupled agent subsystems (the idea pipeline, the outcome
//! analyst, the persona academy) plus a fleet of research agents exchange
//! typed contracts. Contrail records those contracts durably and exposes
//! them for querying and dashboarding.
//!
//! # Architecture
//!
//! ## Dual-write store
//!
//! - **JSONL logs** (one per contract kind): append-only, the source of
//!   truth. A record is never rewritten or deleted.
//! - **SQLite index** (`persona_metrics.db`): a derived, rebuildable
//!   projection carrying denormalized filter columns and the only
//!   mutable state (`status` / `consumed_by`). `contrail rebuild`
//!   re-derives it from the logs at any time.
//!
//! ## Contract kinds
//!
//! - `OutcomeRecord`: pipeline -> analyst, emitted at terminal states
//! - `ImprovementRecommendation`: analyst -> academy
//! - `PersonaUpgradePatch`: academy -> pipeline
//! - `ResearchSignal`: research agents -> analyst
//!
//! # Crate Structure
//!
//! - [`core`]: the store, connection bootstrap, schemas, errors
//! - [`contracts`]: the four contract types and their validation
//! - [`readers`]: read-only access to foreign databases

pub mod contracts;
pub mod core;
pub mod readers;

use crate::contracts::{
    ImprovementRecommendation, OutcomeRecord, PersonaUpgradePatch, ResearchSignal,
};
use crate::core::error::ContrailError;
use crate::core::store::{
    ContractStore, OutcomeFilter, PatchFilter, RecommendationFilter, SignalFilter,
};
use crate::core::time;
use crate::readers::PipelineReader;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "contrail",
    version = env!("CARGO_PKG_VERSION"),
    about = "Append-only contract ledger for the agent feedback loop"
)]
struct Cli {
    /// Data directory holding the JSONL logs and the index database.
    /// Defaults to $CONTRAIL_DATA_DIR, then ./data.
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ContractKind {
    Outcome,
    Recommendation,
    Patch,
    Signal,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directory and bootstrap the index schema
    Init,
    /// Validate and dual-write one contract record (JSON from --file or stdin)
    Write {
        kind: ContractKind,
        /// Read the record from this file instead of stdin
        #[clap(long)]
        file: Option<PathBuf>,
    },
    /// Replay a contract log (source of truth), one JSON object per line
    Read {
        kind: ContractKind,
        /// Most recent N log entries
        #[clap(long, default_value = "100")]
        limit: usize,
    },
    /// Status-aware queries against the index
    Query(QueryCli),
    /// Move a recommendation or patch to a new status (index only)
    SetStatus(SetStatusCli),
    /// Record the consumer of a research signal (index only)
    Consume {
        signal_id: String,
        consumer: String,
    },
    /// Rebuild the index from the logs; never writes to the logs
    Rebuild,
    /// Feedback loop dashboard: counts, backlogs, staleness
    Status {
        /// Output format: 'text' or 'json'
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Read-only view over the idea pipeline database
    Ideas(IdeasCli),
}

#[derive(clap::Args, Debug)]
struct QueryCli {
    #[clap(subcommand)]
    command: QueryCommand,
}

#[derive(Subcommand, Debug)]
enum QueryCommand {
    /// Outcome records (immutable, no status overlay)
    Outcomes {
        #[clap(long)]
        outcome: Option<String>,
        #[clap(long)]
        idea_id: Option<i64>,
        #[clap(long, default_value = "100")]
        limit: usize,
    },
    /// Improvement recommendations with current status overlaid
    Recommendations {
        #[clap(long)]
        target_system: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long, default_value = "100")]
        limit: usize,
    },
    /// Persona patches with current status overlaid
    Patches {
        #[clap(long)]
        persona_id: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long, default_value = "100")]
        limit: usize,
    },
    /// Research signals with current consumer overlaid
    Signals {
        #[clap(long)]
        source: Option<String>,
        #[clap(long)]
        relevance: Option<String>,
        #[clap(long)]
        domain: Option<String>,
        /// true = consumed only, false = unconsumed only
        #[clap(long)]
        consumed: Option<bool>,
        #[clap(long, default_value = "100")]
        limit: usize,
    },
}

#[derive(clap::Args, Debug)]
struct SetStatusCli {
    #[clap(subcommand)]
    command: SetStatusCommand,
}

#[derive(Subcommand, Debug)]
enum SetStatusCommand {
    /// Set a recommendation's status (pending -> applied/rejected by convention)
    Recommendation { id: String, status: String },
    /// Set a patch's status (proposed -> applied/rejected by convention)
    Patch { id: String, status: String },
}

#[derive(clap::Args, Debug)]
struct IdeasCli {
    /// Pipeline database path. Defaults to $CONTRAIL_IDEAS_DB, then
    /// <data_dir>/caught_ideas.db.
    #[clap(long)]
    db: Option<PathBuf>,
    #[clap(subcommand)]
    command: IdeasCommand,
}

#[derive(Subcommand, Debug)]
enum IdeasCommand {
    /// List ideas, optionally by stage/status
    List {
        #[clap(long)]
        stage: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long, default_value = "50")]
        limit: usize,
    },
    /// Show one idea with its stage results
    Show { id: i64 },
    /// Count ideas per pipeline stage
    Stages,
}

fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    match std::env::var("CONTRAIL_DATA_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("./data"),
    }
}

fn resolve_ideas_db(flag: Option<PathBuf>, data_dir: &std::path::Path) -> PathBuf {
    if let Some(db) = flag {
        return db;
    }
    match std::env::var("CONTRAIL_IDEAS_DB") {
        Ok(db) if !db.is_empty() => PathBuf::from(db),
        _ => data_dir.join("caught_ideas.db"),
    }
}

fn read_record_input(file: Option<&PathBuf>) -> Result<String, ContrailError> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn print_envelope(cmd: &str, extra: serde_json::Value) -> Result<(), ContrailError> {
    let envelope = time::command_envelope(cmd, "ok", extra);
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

pub fn run() -> Result<(), ContrailError> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);
    let mut store = ContractStore::open(&data_dir);

    match cli.command {
        Command::Init => {
            store.init()?;
            print_envelope(
                "init",
                serde_json::json!({
                    "data_dir": data_dir.to_string_lossy(),
                    "db": store.db_path().to_string_lossy(),
                }),
            )
        }
        Command::Write { kind, file } => {
            let input = read_record_input(file.as_ref())?;
            let written = match kind {
                ContractKind::Outcome => {
                    let record: OutcomeRecord = serde_json::from_str(&input)?;
                    store.write_outcome(&record)?;
                    serde_json::json!({"kind": "outcome", "idea_id": record.idea_id})
                }
                ContractKind::Recommendation => {
                    let rec: ImprovementRecommendation = serde_json::from_str(&input)?;
                    store.write_recommendation(&rec)?;
                    serde_json::json!({"kind": "recommendation", "id": rec.recommendation_id})
                }
                ContractKind::Patch => {
                    let patch: PersonaUpgradePatch = serde_json::from_str(&input)?;
                    store.write_patch(&patch)?;
                    serde_json::json!({"kind": "patch", "id": patch.patch_id})
                }
                ContractKind::Signal => {
                    let signal: ResearchSignal = serde_json::from_str(&input)?;
                    store.write_signal(&signal)?;
                    serde_json::json!({"kind": "signal", "id": signal.signal_id})
                }
            };
            print_envelope("write", written)
        }
        Command::Read { kind, limit } => {
            match kind {
                ContractKind::Outcome => print_jsonl(&store.read_outcomes(limit)?)?,
                ContractKind::Recommendation => print_jsonl(&store.read_recommendations(limit)?)?,
                ContractKind::Patch => print_jsonl(&store.read_patches(limit)?)?,
                ContractKind::Signal => print_jsonl(&store.read_signals(limit)?)?,
            }
            Ok(())
        }
        Command::Query(query) => run_query(&mut store, query.command),
        Command::SetStatus(set_status) => match set_status.command {
            SetStatusCommand::Recommendation { id, status } => {
                store.update_recommendation_status(&id, &status)?;
                print_envelope(
                    "set-status.recommendation",
                    serde_json::json!({"id": id, "new_status": status}),
                )
            }
            SetStatusCommand::Patch { id, status } => {
                store.update_patch_status(&id, &status)?;
                print_envelope(
                    "set-status.patch",
                    serde_json::json!({"id": id, "new_status": status}),
                )
            }
        },
        Command::Consume {
            signal_id,
            consumer,
        } => {
            store.update_signal_consumed_by(&signal_id, &consumer)?;
            print_envelope(
                "consume",
                serde_json::json!({"signal_id": signal_id, "consumer": consumer}),
            )
        }
        Command::Rebuild => {
            let report = store.rebuild()?;
            print_envelope("rebuild", serde_json::to_value(&report)?)
        }
        Command::Status { format } => run_status(&mut store, &format),
        Command::Ideas(ideas) => {
            let db_path = resolve_ideas_db(ideas.db, &data_dir);
            let reader = PipelineReader::open(db_path);
            match ideas.command {
                IdeasCommand::List {
                    stage,
                    status,
                    limit,
                } => {
                    let ideas =
                        reader.list_ideas(stage.as_deref(), status.as_deref(), limit)?;
                    print_envelope("ideas.list", serde_json::json!({"ideas": ideas}))
                }
                IdeasCommand::Show { id } => match reader.get_idea(id)? {
                    Some(idea) => print_envelope("ideas.show", serde_json::json!({"idea": idea})),
                    None => Err(ContrailError::NotFound(format!("idea {}", id))),
                },
                IdeasCommand::Stages => {
                    let counts = reader.count_by_stage()?;
                    print_envelope("ideas.stages", serde_json::json!({"stages": counts}))
                }
            }
        }
    }
}

fn print_jsonl<T: serde::Serialize>(records: &[T]) -> Result<(), ContrailError> {
    for record in records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

fn run_query(store: &mut ContractStore, command: QueryCommand) -> Result<(), ContrailError> {
    match command {
        QueryCommand::Outcomes {
            outcome,
            idea_id,
            limit,
        } => {
            let filter = OutcomeFilter { outcome, idea_id };
            print_jsonl(&store.query_outcomes(&filter, limit)?)
        }
        QueryCommand::Recommendations {
            target_system,
            status,
            limit,
        } => {
            let filter = RecommendationFilter {
                target_system,
                status,
            };
            print_jsonl(&store.query_recommendations(&filter, limit)?)
        }
        QueryCommand::Patches {
            persona_id,
            status,
            limit,
        } => {
            let filter = PatchFilter { persona_id, status };
            print_jsonl(&store.query_patches(&filter, limit)?)
        }
        QueryCommand::Signals {
            source,
            relevance,
            domain,
            consumed,
            limit,
        } => {
            let filter = SignalFilter {
                source,
                relevance,
                domain,
                consumed,
            };
            print_jsonl(&store.query_signals(&filter, limit)?)
        }
    }
}

const DASHBOARD_LIMIT: usize = 10_000;

fn run_status(store: &mut ContractStore, format: &str) -> Result<(), ContrailError> {
    let outcomes = store.read_outcomes(DASHBOARD_LIMIT)?;
    let recommendations =
        store.query_recommendations(&RecommendationFilter::default(), DASHBOARD_LIMIT)?;
    let patches = store.query_patches(&PatchFilter::default(), DASHBOARD_LIMIT)?;
    let signals = store.query_signals(&SignalFilter::default(), DASHBOARD_LIMIT)?;

    let mut outcome_counts = std::collections::BTreeMap::new();
    for o in &outcomes {
        *outcome_counts
            .entry(o.outcome.as_str().to_string())
            .or_insert(0i64) += 1;
    }

    let pending: Vec<_> = recommendations
        .iter()
        .filter(|r| r.status == "pending")
        .collect();
    let applied_recs = recommendations
        .iter()
        .filter(|r| r.status == "applied")
        .count();
    let pending_by_system = |system: &str| {
        pending
            .iter()
            .filter(|r| r.target_system == system)
            .count()
    };

    let proposed_patches: Vec<_> = patches.iter().filter(|p| p.status == "proposed").collect();
    let applied_patches: Vec<_> = patches.iter().filter(|p| p.status == "applied").collect();
    let rejected_patches = patches.iter().filter(|p| p.status == "rejected").count();

    let unconsumed_signals = signals.iter().filter(|s| s.consumed_by.is_none()).count();

    // A cycle closes when an applied patch traces back to a recommendation.
    let mut closed_rec_ids = std::collections::HashSet::new();
    for p in &applied_patches {
        for rec_id in &p.source_recommendation_ids {
            closed_rec_ids.insert(rec_id.clone());
        }
    }

    let oldest_pending_rec = pending.iter().map(|r| r.emitted_at).min();
    let oldest_proposed_patch = proposed_patches.iter().map(|p| p.emitted_at).min();

    if format == "json" {
        return print_envelope(
            "status",
            serde_json::json!({
                "outcome_records": outcomes.len(),
                "outcomes_by_terminal_state": outcome_counts,
                "recommendations": {
                    "total": recommendations.len(),
                    "pending_persona": pending_by_system("persona"),
                    "pending_claude_md": pending_by_system("claude_md"),
                    "pending_pipeline": pending_by_system("pipeline"),
                    "applied": applied_recs,
                },
                "patches": {
                    "total": patches.len(),
                    "proposed": proposed_patches.len(),
                    "applied": applied_patches.len(),
                    "rejected": rejected_patches,
                },
                "signals": {
                    "total": signals.len(),
                    "unconsumed": unconsumed_signals,
                },
                "completed_cycles": closed_rec_ids.len(),
                "oldest_pending_recommendation": oldest_pending_rec.map(|t| t.to_rfc3339()),
                "oldest_proposed_patch": oldest_proposed_patch.map(|t| t.to_rfc3339()),
            }),
        );
    }

    println!("{}", "Feedback Loop Status".bright_white().bold());
    println!("{}", "====================".bright_white());
    println!();
    println!(
        "  Outcome Records:             {}",
        outcomes.len().to_string().bright_cyan()
    );
    for (outcome, count) in &outcome_counts {
        println!("    - {}: {}", outcome, count);
    }
    println!();
    println!(
        "  Improvement Recommendations: {}",
        recommendations.len().to_string().bright_cyan()
    );
    println!("    - Pending (persona):     {}", pending_by_system("persona"));
    println!("    - Pending (claude_md):   {}", pending_by_system("claude_md"));
    println!("    - Pending (pipeline):    {}", pending_by_system("pipeline"));
    println!("    - Applied:               {}", applied_recs);
    println!();
    println!(
        "  Persona Patches:             {}",
        patches.len().to_string().bright_cyan()
    );
    println!("    - Proposed (review):     {}", proposed_patches.len());
    println!("    - Applied:               {}", applied_patches.len());
    println!("    - Rejected:              {}", rejected_patches);
    println!();
    println!(
        "  Research Signals:            {} ({} unconsumed)",
        signals.len().to_string().bright_cyan(),
        unconsumed_signals
    );
    println!();
    println!("  Completed Feedback Cycles:   {}", closed_rec_ids.len());
    if let Some(oldest) = oldest_pending_rec {
        println!("  Oldest Pending Rec:          {}", format_age(oldest));
    }
    if let Some(oldest) = oldest_proposed_patch {
        println!("  Oldest Proposed Patch:       {}", format_age(oldest));
    }
    println!();

    if outcomes.is_empty() {
        println!(
            "  {} No outcome records yet - run ideas through the pipeline",
            "[!]".bright_yellow()
        );
    } else if recommendations.is_empty() {
        println!(
            "  {} No recommendations yet - run the outcome analyzer",
            "[!]".bright_yellow()
        );
    } else if patches.is_empty() && pending_by_system("persona") > 0 {
        println!(
            "  {} Persona recommendations waiting - run the persona upgrader",
            "[!]".bright_yellow()
        );
    } else if !proposed_patches.is_empty() {
        println!(
            "  {} {} patches awaiting human review",
            "[!]".bright_yellow(),
            proposed_patches.len()
        );
    } else {
        println!("  {} Loop is flowing", "[OK]".bright_green());
    }
    Ok(())
}

fn format_age(since: chrono::DateTime<chrono::Utc>) -> String {
    let age = chrono::Utc::now().signed_duration_since(since);
    let days = age.num_days();
    let hours = age.num_hours() - days * 24;
    format!("{}d {}h ago", days.max(0), hours.max(0))
}
