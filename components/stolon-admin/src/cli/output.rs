//! Rendering of command results on stdout.

// Local crates
use crate::store::models::{ClusterStatus, NodeStatus};

// External crates
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::io::{self, Write};

/// Pretty JSON indented with tabs, followed by a newline.
pub fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> io::Result<()> {
    let mut serializer = Serializer::with_formatter(&mut *out, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    writeln!(out)
}

/// Status of a cluster, or only its master node when `master_only` is set.
///
/// With `master_only` and no master, JSON mode writes `[]` and text mode
/// writes nothing.
pub fn write_status(
    out: &mut impl Write,
    status: &ClusterStatus,
    master_only: bool,
    json: bool,
) -> io::Result<()> {
    match (master_only, json) {
        (true, true) => {
            let nodes: Vec<&NodeStatus> = status.master_node().into_iter().collect();
            write_json(out, &nodes)
        }
        (true, false) => match status.master_node() {
            Some(node) => write_node(out, node),
            None => Ok(()),
        },
        (false, true) => write_json(out, status),
        (false, false) => {
            writeln!(out, "=== Cluster {} ===", status.name)?;
            writeln!(out)?;
            writeln!(out, "Phase: {}", status.phase)?;
            writeln!(out, "Master: {}", status.master.as_deref().unwrap_or("<none>"))?;
            writeln!(out)?;
            writeln!(out, "=== Nodes ===")?;
            writeln!(out)?;
            writeln!(out, "UID\tKEEPER\tROLE\tHEALTHY\tADDRESS")?;
            for node in &status.nodes {
                write_node(out, node)?;
            }
            Ok(())
        }
    }
}

fn write_node(out: &mut impl Write, node: &NodeStatus) -> io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}",
        node.uid,
        node.keeper,
        node.role.as_str(),
        node.healthy,
        node.address
    )
}

/// One cluster name per line.
pub fn write_clusters(out: &mut impl Write, clusters: &[String]) -> io::Result<()> {
    for cluster in clusters {
        writeln!(out, "{cluster}")?;
    }
    Ok(())
}
