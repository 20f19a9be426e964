// events.rs — Events subcommands: tail, verify.

use apex_audit::{AuditError, EventFilter, EventLog};
use apex_kernel::ApexConfig;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum EventsCommands {
    /// Show recent events.
    Tail {
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
        /// Only events of this type, e.g. "agent_quarantined".
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Only events by this actor.
        #[arg(long)]
        actor: Option<String>,
    },
    /// Verify the event log hash chain.
    Verify,
}

pub fn execute(cmd: &EventsCommands, config: &ApexConfig) -> anyhow::Result<()> {
    let log = EventLog::new(config.open_store()?);

    match cmd {
        EventsCommands::Tail {
            n,
            event_type,
            actor,
        } => {
            let mut filter = EventFilter::new();
            if let Some(kind) = event_type {
                filter = filter.kind(kind.as_str());
            }
            if let Some(actor) = actor {
                filter = filter.actor(actor.as_str());
            }
            let mut events = log.find(&filter, *n)?;
            if events.is_empty() {
                println!("No events.");
                return Ok(());
            }
            events.reverse();

            println!(
                "{:<20} {:<24} {:<24} PAYLOAD",
                "TIMESTAMP", "TYPE", "ACTOR"
            );
            println!("{}", "-".repeat(100));
            for event in events {
                println!(
                    "{:<20} {:<24} {:<24} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type,
                    event.actor,
                    event.payload,
                );
            }
        }

        EventsCommands::Verify => match log.verify_chain() {
            Ok(count) => println!("Event log verified: {} event(s), hash chain intact.", count),
            Err(AuditError::IntegrityViolation {
                seq,
                expected,
                actual,
            }) => {
                println!("INTEGRITY VIOLATION at event #{}:", seq);
                println!("  Expected: {}", expected);
                println!("  Actual:   {}", actual);
                println!();
                println!("The event log may have been tampered with.");
                anyhow::bail!("Event log integrity check failed");
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}
