//! Queue inspection commands.

use anyhow::Result;

use super::open_broker;
use crate::cli::args::QueueAction;
use crate::cli::output::print_table;
use crate::config::Settings;

pub fn run(settings: &Settings, action: QueueAction) -> Result<()> {
    match action {
        QueueAction::Stats => {
            let broker = open_broker(settings)?;
            let stats = broker.stats()?;
            let rows = stats
                .into_iter()
                .map(|s| {
                    vec![
                        s.queue,
                        s.ready.to_string(),
                        s.leased.to_string(),
                        s.dead.to_string(),
                    ]
                })
                .collect();
            print_table(&["Queue", "Ready", "Leased", "Dead"], rows);
        }
    }
    Ok(())
}
