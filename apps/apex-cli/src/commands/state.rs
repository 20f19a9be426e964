// state.rs — State subcommands: show, transition.

use apex_arbiter::{Arbiter, SystemState};
use apex_kernel::ApexConfig;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum StateCommands {
    /// Show the current system state and recent transitions.
    Show {
        /// Number of transitions to list.
        #[arg(short, default_value = "5")]
        n: usize,
    },
    /// Request a state transition (observe, alert, act, defend).
    Transition {
        /// Target state.
        to: String,
        /// What prompted the transition.
        #[arg(long)]
        trigger: String,
        /// Authorizing identity, e.g. "intent_architect:alice". Required for defend.
        #[arg(long)]
        authorized_by: Option<String>,
    },
}

pub fn execute(cmd: &StateCommands, config: &ApexConfig) -> anyhow::Result<()> {
    let arbiter = Arbiter::new(config.open_store()?).with_policy(config.defend_policy());

    match cmd {
        StateCommands::Show { n } => {
            println!("Current state: {}", arbiter.current_state()?);
            let history = arbiter.history(*n)?;
            if history.is_empty() {
                println!("No transitions recorded.");
                return Ok(());
            }
            println!();
            println!(
                "{:<20} {:<8} {:<8} {:<24} TRIGGER",
                "TIMESTAMP", "FROM", "TO", "AUTHORIZED BY"
            );
            println!("{}", "-".repeat(80));
            for t in history {
                println!(
                    "{:<20} {:<8} {:<8} {:<24} {}",
                    t.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    t.from_state,
                    t.to_state,
                    t.authorized_by.as_deref().unwrap_or("-"),
                    t.trigger,
                );
            }
        }

        StateCommands::Transition {
            to,
            trigger,
            authorized_by,
        } => {
            let to: SystemState = to.parse()?;
            let t = arbiter.request_transition(to, trigger, authorized_by.as_deref())?;
            println!("State changed: {} -> {}", t.from_state, t.to_state);
        }
    }

    Ok(())
}
