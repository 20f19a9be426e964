// budget.rs — Budget subcommands: allocate, show.

use apex_kernel::ApexConfig;
use apex_metabolism::Metabolism;
use chrono::Utc;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Give an agent a fresh budget window. Replaces any current allocation.
    Allocate {
        agent: String,
        /// Total budget for the window.
        amount: f64,
        /// Window length in hours (defaults to the configured window).
        #[arg(long)]
        window_hours: Option<u32>,
    },
    /// Show an agent's budget and spend.
    Show {
        agent: String,
        /// Also list individual ledger entries.
        #[arg(long)]
        ledger: bool,
    },
}

pub fn execute(cmd: &BudgetCommands, config: &ApexConfig) -> anyhow::Result<()> {
    let metabolism = Metabolism::new(config.open_store()?);

    match cmd {
        BudgetCommands::Allocate {
            agent,
            amount,
            window_hours,
        } => {
            let hours = window_hours.unwrap_or(config.default_window_hours);
            let budget = metabolism.allocate_budget(agent, *amount, hours)?;
            println!(
                "Allocated {} to {} until {}",
                budget.total_budget,
                agent,
                budget.window_end.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        BudgetCommands::Show { agent, ledger } => {
            let Some(budget) = metabolism.get_budget(agent)? else {
                println!("No budget allocated to {}.", agent);
                return Ok(());
            };
            let now = Utc::now();
            println!("Agent:     {}", agent);
            println!("Total:     {}", budget.total_budget);
            println!("Spent:     {}", budget.spent_budget);
            println!("Remaining: {}", budget.remaining_at(now));
            println!(
                "Window:    {} .. {}{}",
                budget.window_start.format("%Y-%m-%d %H:%M:%S"),
                budget.window_end.format("%Y-%m-%d %H:%M:%S"),
                if budget.is_active_at(now) { "" } else { " (expired)" }
            );
            println!("Charged:   {} (all windows)", metabolism.get_total_cost(agent, None)?);

            if *ledger {
                println!();
                println!("{:<20} {:<16} {:>10} ACTION", "TIMESTAMP", "TYPE", "AMOUNT");
                println!("{}", "-".repeat(80));
                for entry in metabolism.ledger_entries(agent)? {
                    println!(
                        "{:<20} {:<16} {:>10} {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.cost_type,
                        entry.cost_amount,
                        entry
                            .action_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    );
                }
            }
        }
    }

    Ok(())
}
