//! Formatted output helpers for CLI commands.

use std::fmt::Write;

use burrow_runtime::state::InstanceStatus;

/// Renders instance statuses as an aligned table with a header row.
#[must_use]
pub fn status_table(statuses: &[InstanceStatus]) -> String {
    let width = statuses
        .iter()
        .map(|s| s.name.len())
        .chain(std::iter::once("NAME".len()))
        .max()
        .unwrap_or_default();

    let mut table = format!("{:<width$}  {:<8}  {}\n", "NAME", "PID", "STATE");
    for s in statuses {
        let _ = writeln!(table, "{:<width$}  {:<8}  {}", s.name, format_pid(s.pid), s.state);
    }
    table
}

/// Formats an optional PID, using `-` when there is none.
#[must_use]
pub fn format_pid(pid: Option<i32>) -> String {
    pid.map_or_else(|| "-".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use burrow_common::types::InstanceState;

    use super::*;

    #[test]
    fn format_pid_uses_dash_for_none() {
        assert_eq!(format_pid(None), "-");
        assert_eq!(format_pid(Some(42)), "42");
    }

    #[test]
    fn table_aligns_long_names() {
        let table = status_table(&[
            InstanceStatus {
                name: "a-rather-long-name".into(),
                pid: Some(7),
                state: InstanceState::Running,
            },
            InstanceStatus {
                name: "b".into(),
                pid: None,
                state: InstanceState::Stopped,
            },
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME                "));
        assert_eq!(lines[1], "a-rather-long-name  7         running");
        assert_eq!(lines[2], "b                   -         stopped");
    }
}
