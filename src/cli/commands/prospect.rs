//! Prospect command: print the record one file would publish.

use std::path::Path;

use anyhow::{Context, Result};

use crate::prospect::Prospector;
use crate::transport::wire::WireRecord;
use crate::types::EventKind;

pub fn run(path: &Path) -> Result<()> {
    let record = Prospector::default()
        .prospect(path, EventKind::Created)
        .with_context(|| format!("Failed to prospect {}", path.display()))?;
    let json = serde_json::to_string_pretty(&WireRecord::from(&record))?;
    println!("{json}");
    Ok(())
}
