// actions.rs — Actions subcommands: pending, show.

use apex_kernel::{ActuatorAction, ApexConfig, Kernel};
use clap::Subcommand;
use serde_json::Value;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum ActionsCommands {
    /// List actions stuck in `pending` (charged, outcome never recorded).
    Pending,
    /// Show one action.
    Show { action_id: Uuid },
}

/// Operators inspect actions; they never run them.
fn refuse(action_type: &str, _: &Value) -> anyhow::Result<Value> {
    anyhow::bail!("the operator CLI cannot execute '{action_type}' actions")
}

pub fn execute(cmd: &ActionsCommands, config: &ApexConfig) -> anyhow::Result<()> {
    let kernel = Kernel::new(config.open_store()?, refuse);

    match cmd {
        ActionsCommands::Pending => {
            let pending = kernel.pending_actions()?;
            if pending.is_empty() {
                println!("No pending actions.");
                return Ok(());
            }
            println!(
                "{:<38} {:<16} {:<16} {:>8} STARTED",
                "ID", "AGENT", "TYPE", "COST"
            );
            println!("{}", "-".repeat(100));
            for action in pending {
                println!(
                    "{:<38} {:<16} {:<16} {:>8} {}",
                    action.action_id,
                    action.agent_id,
                    action.action_type,
                    action.cost,
                    action.timestamp.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }

        ActionsCommands::Show { action_id } => match kernel.get_action(*action_id)? {
            Some(action) => print_action(&action)?,
            None => anyhow::bail!("action {} not found", action_id),
        },
    }

    Ok(())
}

fn print_action(action: &ActuatorAction) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(action)?);
    Ok(())
}
