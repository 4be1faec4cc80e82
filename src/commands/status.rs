//! `kubewright status` — resolve the topology and print it.

use anyhow::Result;
use colored::Colorize;

use crate::commands::{resolve_topology, CommandContext};
use crate::topology::{ClusterTopology, ControlPlane};

pub fn run(ctx: &CommandContext, format: &str) -> Result<()> {
    let topology = resolve_topology(&ctx.settings)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&topology)?);
        }
        _ => {
            print_table(&topology);
            match topology.select_control_plane() {
                Ok(ControlPlane {
                    endpoint,
                    session: Some(index),
                }) => {
                    println!(
                        "  {} {} (session node {})",
                        "control plane:".dimmed(),
                        endpoint,
                        index
                    );
                }
                Ok(ControlPlane {
                    endpoint,
                    session: None,
                }) => {
                    println!(
                        "  {} {} ({})",
                        "control plane:".dimmed(),
                        endpoint,
                        "no live session node".red()
                    );
                }
                Err(e) => {
                    println!("  {} {}", "control plane:".dimmed(), e.to_string().red());
                }
            }
        }
    }

    Ok(())
}

fn print_table(topology: &ClusterTopology) {
    println!("{}", "kubewright status".bold());
    if let Some(public) = &topology.public_address {
        println!("  {} {}", "public address:".dimmed(), public);
    }
    println!(
        "  {} {}  {} {}",
        "nodes:".dimmed(),
        topology.nodes.len(),
        "pod network:".dimmed(),
        topology.network_prefix
    );
    println!();

    let rows = node_rows(topology);

    let mut widths = [0usize; 8];
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    for (i, row) in rows.iter().enumerate() {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        if i == 0 {
            println!("  {}", line.bold());
        } else if row[2] == "running" {
            println!("  {}", line.green());
        } else {
            println!("  {}", line.yellow());
        }
    }
}

/// Header row plus one row per node, in index order.
fn node_rows(topology: &ClusterTopology) -> Vec<[String; 8]> {
    let mut rows: Vec<[String; 8]> = vec![[
        "idx".to_string(),
        "role".to_string(),
        "state".to_string(),
        "reachability".to_string(),
        "group".to_string(),
        "name".to_string(),
        "hostname".to_string(),
        "mac".to_string(),
    ]];
    for node in &topology.nodes {
        let role = if node.control_plane {
            match node.allow_workloads {
                Some(true) => "control-plane+workloads",
                _ => "control-plane",
            }
        } else {
            "worker"
        };
        rows.push([
            node.index.to_string(),
            role.to_string(),
            if node.running { "running" } else { "stopped" }.to_string(),
            node.reachability.to_string(),
            node.source_group.clone().unwrap_or_else(|| "-".to_string()),
            node.name.clone().unwrap_or_else(|| "-".to_string()),
            node.hostname_label.clone().unwrap_or_else(|| "-".to_string()),
            node.mac_address.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::test_support::{node, topology};
    use crate::topology::ControlPlaneTarget;

    #[test]
    fn table_rows_carry_identity_columns() {
        let mut record = node(0, true, true);
        record.name = Some("cp_1".to_string());
        record.hostname_label = Some("cp000001".to_string());
        record.mac_address = Some("00-0D-3A-00-00-01".to_string());
        let topo = topology(vec![record], ControlPlaneTarget::NodeIndex { index: 0 });

        let rows = node_rows(&topo);
        assert_eq!(rows[0][6], "hostname");
        assert_eq!(rows[0][7], "mac");
        assert_eq!(rows[1][5], "cp_1");
        assert_eq!(rows[1][6], "cp000001");
        assert_eq!(rows[1][7], "00-0D-3A-00-00-01");
    }

    #[test]
    fn missing_identity_fields_render_as_dashes() {
        let topo = topology(
            vec![node(0, false, false)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let rows = node_rows(&topo);
        assert_eq!(rows[1][2], "stopped");
        assert_eq!(rows[1][6], "-");
        assert_eq!(rows[1][7], "-");
    }
}
