// immune.rs — Immune subcommands: quarantine, release, status, terminate,
// checkpoint, checkpoints, rollback.

use std::path::PathBuf;

use apex_immune::ImmuneSystem;
use apex_kernel::ApexConfig;
use clap::Subcommand;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum ImmuneCommands {
    /// Quarantine an agent and forfeit its remaining budget.
    Quarantine {
        agent: String,
        #[arg(long)]
        reason: String,
    },
    /// Release an agent from quarantine. Its budget is not restored.
    Release {
        agent: String,
        /// Identity authorizing the release, e.g. "operator:alice".
        #[arg(long)]
        by: String,
    },
    /// Show an agent's quarantine status and history.
    Status { agent: String },
    /// Terminate an agent (permanent quarantine marker).
    Terminate {
        agent: String,
        #[arg(long)]
        reason: String,
    },
    /// Store a snapshot checkpoint from a JSON file.
    Checkpoint {
        name: String,
        /// Path to a JSON file holding the snapshot.
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// List stored checkpoints.
    Checkpoints,
    /// Retrieve a checkpoint's snapshot for rollback (printed as JSON).
    Rollback {
        checkpoint_id: Uuid,
        /// Identity authorizing the rollback.
        #[arg(long)]
        by: String,
    },
}

pub fn execute(cmd: &ImmuneCommands, config: &ApexConfig) -> anyhow::Result<()> {
    let immune = ImmuneSystem::new(config.open_store()?);

    match cmd {
        ImmuneCommands::Quarantine { agent, reason } => {
            let record = immune.quarantine_agent(agent, reason)?;
            println!("Quarantined {}: {}", agent, record.reason);
        }

        ImmuneCommands::Release { agent, by } => {
            let record = immune.release_agent(agent, by)?;
            println!("Released {} (was: {})", agent, record.reason);
        }

        ImmuneCommands::Status { agent } => {
            let history = immune.quarantine_history(agent)?;
            match history.iter().find(|r| r.is_open()) {
                Some(open) => println!(
                    "{} is QUARANTINED since {}: {}",
                    agent,
                    open.quarantined_at.format("%Y-%m-%d %H:%M:%S"),
                    open.reason
                ),
                None => println!("{} is not quarantined.", agent),
            }
            if !history.is_empty() {
                println!();
                println!("{:<20} {:<20} REASON", "QUARANTINED", "RELEASED");
                println!("{}", "-".repeat(80));
                for record in &history {
                    println!(
                        "{:<20} {:<20} {}",
                        record.quarantined_at.format("%Y-%m-%d %H:%M:%S"),
                        record
                            .released_at
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        record.reason,
                    );
                }
            }
        }

        ImmuneCommands::Terminate { agent, reason } => {
            immune.apoptosis(agent, reason)?;
            println!("Terminated {}: {}", agent, reason);
        }

        ImmuneCommands::Checkpoint { name, snapshot } => {
            let content = std::fs::read_to_string(snapshot)?;
            let value: serde_json::Value = serde_json::from_str(&content)?;
            let id = immune.create_checkpoint(name, value)?;
            println!("Checkpoint '{}' created: {}", name, id);
        }

        ImmuneCommands::Checkpoints => {
            let checkpoints = immune.list_checkpoints()?;
            if checkpoints.is_empty() {
                println!("No checkpoints.");
                return Ok(());
            }
            println!("{:<38} {:<20} NAME", "ID", "CREATED");
            println!("{}", "-".repeat(80));
            for cp in checkpoints {
                println!(
                    "{:<38} {:<20} {}",
                    cp.checkpoint_id,
                    cp.created_at.format("%Y-%m-%d %H:%M:%S"),
                    cp.name
                );
            }
        }

        ImmuneCommands::Rollback { checkpoint_id, by } => {
            let snapshot = immune.rollback_to_checkpoint(*checkpoint_id, by)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn quarantine_release_cycle() {
        let dir = tempdir().unwrap();
        let config = ApexConfig::for_project(dir.path());
        let run = |cmd: ImmuneCommands| execute(&cmd, &config);

        run(ImmuneCommands::Quarantine {
            agent: "A".into(),
            reason: "manual review".into(),
        })
        .unwrap();
        run(ImmuneCommands::Status { agent: "A".into() }).unwrap();
        run(ImmuneCommands::Release {
            agent: "A".into(),
            by: "operator:alice".into(),
        })
        .unwrap();
        // A second release has nothing to close.
        assert!(run(ImmuneCommands::Release {
            agent: "A".into(),
            by: "operator:alice".into(),
        })
        .is_err());

        let immune = ImmuneSystem::new(config.open_store().unwrap());
        assert!(!immune.is_quarantined("A").unwrap());
    }

    #[test]
    fn checkpoint_from_file_and_rollback() {
        let dir = tempdir().unwrap();
        let config = ApexConfig::for_project(dir.path());
        let snapshot = dir.path().join("snap.json");
        std::fs::write(&snapshot, r#"{"state": "observe", "agents": 3}"#).unwrap();

        execute(
            &ImmuneCommands::Checkpoint {
                name: "nightly".into(),
                snapshot,
            },
            &config,
        )
        .unwrap();
        execute(&ImmuneCommands::Checkpoints, &config).unwrap();

        let immune = ImmuneSystem::new(config.open_store().unwrap());
        let id = immune.list_checkpoints().unwrap()[0].checkpoint_id;
        execute(
            &ImmuneCommands::Rollback {
                checkpoint_id: id,
                by: "intent_architect:admin".into(),
            },
            &config,
        )
        .unwrap();
        assert!(execute(
            &ImmuneCommands::Rollback {
                checkpoint_id: Uuid::new_v4(),
                by: "intent_architect:admin".into(),
            },
            &config,
        )
        .is_err());
    }

    #[test]
    fn terminate_marks_record() {
        let dir = tempdir().unwrap();
        let config = ApexConfig::for_project(dir.path());
        execute(
            &ImmuneCommands::Terminate {
                agent: "Z".into(),
                reason: "runaway".into(),
            },
            &config,
        )
        .unwrap();

        let immune = ImmuneSystem::new(config.open_store().unwrap());
        let record = immune.quarantine_record("Z").unwrap().unwrap();
        assert!(record.reason.starts_with(apex_immune::TERMINATED_PREFIX));
    }
}
