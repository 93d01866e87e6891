use clap::{Parser, Subcommand};
use clinic_core::{
    ChangeBatch, Department, InMemoryStore, Notification, NotificationKind,
    NotificationReconciler, Query,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic notification tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply recorded change batches to a fresh view and print the result
    Replay {
        /// JSON file holding an array of change batches
        file: PathBuf,
        /// Only print unread notifications
        #[arg(long)]
        unread_only: bool,
        /// Only print notifications of this kind (e.g. new_appointment)
        #[arg(long)]
        kind: Option<String>,
    },
    /// List departments and their scope tags
    Departments,
}

/// Replays `batches` in order. Returns the reconciled view and how many new-unread alerts fired.
fn replay(batches: Vec<ChangeBatch>) -> (NotificationReconciler, usize) {
    let chimes = Arc::new(AtomicUsize::new(0));
    let counter = chimes.clone();
    // Replay never writes back, so the store only has to exist.
    let mut reconciler =
        NotificationReconciler::with_query(Arc::new(InMemoryStore::new()), Query::all())
            .on_new_unread(move |n| {
                counter.fetch_add(1, Ordering::Relaxed);
                println!("chime: {} ({})", n.message, n.kind.as_str());
            });

    for batch in batches {
        reconciler.apply_batch(batch);
    }
    let fired = chimes.load(Ordering::Relaxed);
    (reconciler, fired)
}

/// The notifications to print, newest first.
fn select(
    reconciler: &NotificationReconciler,
    unread_only: bool,
    kind: Option<NotificationKind>,
) -> Vec<&Notification> {
    match kind {
        Some(kind) => reconciler
            .filter_by_kind(kind)
            .filter(|n| !unread_only || !n.read)
            .collect(),
        None if unread_only => reconciler.unread().collect(),
        None => reconciler.materialized_list().iter().collect(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Replay {
            file,
            unread_only,
            kind,
        }) => {
            let kind = match kind {
                Some(k) => Some(
                    NotificationKind::parse(&k)
                        .ok_or_else(|| format!("Unknown notification kind: {}", k))?,
                ),
                None => None,
            };

            let raw = std::fs::read_to_string(&file)?;
            let batches: Vec<ChangeBatch> = serde_json::from_str(&raw)?;
            let batch_count = batches.len();
            let (reconciler, chimes) = replay(batches);

            let shown = select(&reconciler, unread_only, kind);

            if shown.is_empty() {
                println!("No notifications.");
            }
            for n in shown {
                let created = n
                    .created_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "pending".into());
                println!(
                    "{} [{}] {} {} - {} on {} {} (scope: {}, created: {})",
                    if n.read { " " } else { "*" },
                    n.kind.as_str(),
                    n.id,
                    n.subject_name,
                    n.message,
                    n.occurs_on,
                    n.slot_time,
                    n.department()
                        .map(|d| d.display_name())
                        .or(n.scope.as_deref())
                        .unwrap_or("-"),
                    created
                );
            }

            println!();
            println!(
                "Replayed {} batches: {} notifications, {} unread, {} alerts",
                batch_count,
                reconciler.len(),
                reconciler.unread_count(),
                chimes
            );
            for (scope, unread) in reconciler.unread_by_scope() {
                println!("  {}: {} unread", scope.as_deref().unwrap_or("unscoped"), unread);
            }
        }
        Some(Commands::Departments) => {
            for department in Department::ALL {
                println!("{:<20} {}", department.display_name(), department.scope_tag());
            }
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_counts_alerts_and_unread() {
        let batches: Vec<ChangeBatch> = serde_json::from_str(
            r#"[
                {"changes": [
                    {"change": "added", "id": "a", "fields": {"type": "info", "createdAt": 1000, "read": false}},
                    {"change": "added", "id": "b", "fields": {"type": "info", "createdAt": 2000, "read": true}}
                ]},
                {"changes": [
                    {"change": "removed", "id": "b"}
                ]}
            ]"#,
        )
        .unwrap();

        let (reconciler, chimes) = replay(batches);

        assert_eq!(chimes, 1);
        assert_eq!(reconciler.len(), 1);
        assert_eq!(reconciler.unread_count(), 1);
    }

    #[test]
    fn test_select_combines_unread_and_kind_filters() {
        let batches: Vec<ChangeBatch> = serde_json::from_str(
            r#"[
                {"changes": [
                    {"change": "added", "id": "a", "fields": {"type": "info", "createdAt": 1000, "read": false}},
                    {"change": "added", "id": "b", "fields": {"type": "info", "createdAt": 2000, "read": true}},
                    {"change": "added", "id": "c", "fields": {"type": "contact_message", "createdAt": 3000, "read": false}}
                ]}
            ]"#,
        )
        .unwrap();
        let (reconciler, _) = replay(batches);
        let ids = |shown: Vec<&Notification>| -> Vec<String> {
            shown.iter().map(|n| n.id.to_string()).collect()
        };

        assert_eq!(ids(select(&reconciler, false, None)), vec!["c", "b", "a"]);
        assert_eq!(ids(select(&reconciler, true, None)), vec!["c", "a"]);
        assert_eq!(
            ids(select(&reconciler, false, Some(NotificationKind::Info))),
            vec!["b", "a"]
        );
        assert_eq!(
            ids(select(&reconciler, true, Some(NotificationKind::Info))),
            vec!["a"]
        );
    }
}
