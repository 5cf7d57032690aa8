//! Plain-text rendering of trees, totals and schedules

use std::fmt;

use crate::models::{FlatBom, MaterialNode};
use crate::sequencer::Schedule;

/// Format a BOM tree as an indented listing
pub fn format_tree(node: &MaterialNode, indent: usize) -> String {
    let mut output = String::new();
    let prefix = "  ".repeat(indent);

    if node.is_raw_material {
        let label = if node.is_unresolved() { "UNRESOLVED" } else { "RAW" };
        output.push_str(&format!(
            "{}└── {} x{} ({})\n",
            prefix,
            node.item_name,
            format_quantity(node.quantity_required),
            label
        ));
    } else {
        let time_str = if node.production_time_seconds > 0.0 {
            format!(" ({})", format_duration(node.production_time_seconds))
        } else {
            String::new()
        };
        output.push_str(&format!(
            "{}└── {} x{} [{}]{}\n",
            prefix,
            node.item_name,
            format_quantity(node.quantity_required),
            node.source_kind,
            time_str
        ));
        for child in &node.children {
            output.push_str(&format_tree(child, indent + 1));
        }
    }

    output
}

/// Whole numbers print without decimals
pub fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 && quantity.abs() < 1e15 {
        format!("{:.0}", quantity)
    } else {
        format!("{:.2}", quantity)
    }
}

/// `3725` -> `1h 2m 5s`
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3600, rem % 3600);
    let (minutes, secs) = (rem / 60, rem % 60);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

impl fmt::Display for FlatBom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Raw Materials ===")?;
        for (name, quantity) in &self.raw_materials {
            let flag = if self.unresolved.contains(name) { "  (no recipe data)" } else { "" };
            writeln!(f, "  {:<40} {:>16}{}", name.as_str(), format_quantity(*quantity), flag)?;
        }

        if !self.intermediates.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Intermediate Components ===")?;
            for (name, quantity) in &self.intermediates {
                writeln!(f, "  {:<40} {:>16}", name.as_str(), format_quantity(*quantity))?;
            }
        }

        if !self.unresolved.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "Warning: {} item(s) had no recipe and were treated as raw",
                self.unresolved.len()
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Manufacturing Schedule ===")?;
        writeln!(
            f,
            "{:>3}  {:<36} {:>6} {:>14} {:>14}  {}",
            "#", "Item", "Runs", "Start", "Duration", "After"
        )?;
        writeln!(f, "{}", "-".repeat(90))?;
        for op in &self.operations {
            let after: Vec<String> = op.depends_on.iter().map(|id| id.to_string()).collect();
            writeln!(
                f,
                "{:>3}  {:<36} {:>6} {:>14} {:>14}  {}",
                op.id,
                op.item_name.as_str(),
                op.run_count,
                format_duration(op.earliest_start_seconds),
                format_duration(op.duration_seconds),
                after.join(",")
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Total time: {}", format_duration(self.makespan_seconds))?;

        for conflict in &self.conflicts {
            writeln!(
                f,
                "Warning: {} {} jobs running at {} with only {} slots",
                conflict.running,
                conflict.kind,
                format_duration(conflict.at_seconds),
                conflict.available
            )?;
        }
        Ok(())
    }
}
