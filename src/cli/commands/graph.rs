//! Graph inspection commands.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Color};

use super::open_graph;
use crate::cli::args::GraphAction;
use crate::cli::output::{format_size, print_table, table};
use crate::config::Settings;
use crate::graph::{GraphNode, SqliteGraphStore};

pub fn run(settings: &Settings, action: GraphAction) -> Result<()> {
    let store = open_graph(settings)?;
    match action {
        GraphAction::Node { path } => show_node(&store, &node_key(&path)?),
        GraphAction::Neighbors { path } => {
            let key = node_key(&path)?;
            let neighbors = store.neighbors(&key)?;
            if neighbors.is_empty() {
                println!("No neighbors for {key}");
                return Ok(());
            }
            let rows = neighbors
                .into_iter()
                .map(|neighbor| {
                    let kind = match store.node(&neighbor) {
                        Ok(Some(node)) if !node.is_stub() => "file",
                        Ok(_) => "stub",
                        Err(_) => "?",
                    };
                    vec![neighbor, kind.to_string()]
                })
                .collect();
            print_table(&["Neighbor", "Node"], rows);
            Ok(())
        }
        GraphAction::Stats => {
            let stats = store.stats()?;
            print_table(
                &["Nodes", "Stubs", "Edges"],
                vec![vec![
                    stats.nodes.to_string(),
                    stats.stubs.to_string(),
                    stats.edges.to_string(),
                ]],
            );
            Ok(())
        }
    }
}

/// Nodes are keyed by absolute path.
fn node_key(path: &Path) -> Result<String> {
    Ok(std::path::absolute(path)?.to_string_lossy().into_owned())
}

fn show_node(store: &SqliteGraphStore, key: &str) -> Result<()> {
    let Some(GraphNode { path, fields }) = store.node(key)? else {
        println!("No node for {key}");
        return Ok(());
    };

    let mut table = table(&["Field", "Value"]);
    table.add_row(vec![Cell::new("path"), Cell::new(&path)]);
    match fields {
        None => {
            table.add_row(vec![
                Cell::new("node"),
                Cell::new("stub (known only as a neighbor)").fg(Color::Yellow),
            ]);
        }
        Some(fields) => {
            let optional = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
            let rows = [
                ("event", fields.event_kind.as_wire().to_string()),
                ("size", format_size(fields.size_bytes)),
                ("sha256", fields.sha256),
                ("xxh128", fields.xxh128),
                ("modified", optional(fields.modified_at)),
                ("accessed", optional(fields.accessed_at)),
                ("changed", optional(fields.changed_at)),
                ("detected", fields.detected_at),
            ];
            for (name, value) in rows {
                table.add_row(vec![Cell::new(name), Cell::new(value)]);
            }
        }
    }
    println!("{table}");

    let neighbors = store.neighbors(key)?;
    if !neighbors.is_empty() {
        println!("Neighbors: {}", neighbors.join(", "));
    }
    Ok(())
}
