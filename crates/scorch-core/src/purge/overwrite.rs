//! Anti-recovery overwrite: synthetic records written after tombstoning.
//!
//! Fake records occupy the same identifier namespace as the destroyed
//! entities, so a stale replica's un-tombstoned copy is harder to tell apart
//! from noise. This is a probabilistic deterrent only. The deletion claim
//! rests on the tombstones issued by the earlier phases.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::{CollectionRoot, StorePath, StoreValue};

/// One synthetic record that was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeRecord {
    pub id: String,
    pub collection: CollectionRoot,
    pub created_at: DateTime<Utc>,
    pub paths: Vec<StorePath>,
}

/// Result of one `overwrite` call
#[derive(Debug, Clone, Default)]
pub struct OverwriteReport {
    pub created: Vec<FakeRecord>,
    pub failures: Vec<(StorePath, StoreError)>,
}

#[derive(Clone)]
pub struct AntiRecoveryOverwriter {
    store: Arc<dyn GraphStore>,
}

impl AntiRecoveryOverwriter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Write `count` fake records under `root`.
    ///
    /// Every record's `createdAt` is strictly later than `not_before` (the
    /// completion time of the collection's tombstone phase). User records are
    /// mirrored to the personal identity root.
    pub fn overwrite(
        &self,
        root: CollectionRoot,
        count: usize,
        not_before: Option<DateTime<Utc>>,
    ) -> OverwriteReport {
        let mut report = OverwriteReport::default();
        let epoch_ms = Utc::now().timestamp_millis();

        for index in 0..count {
            let id = fake_id(root, epoch_ms, index);
            let created_at = stamp_after(not_before);
            let value = StoreValue::node(fake_body(root, &id, index, created_at));

            let paths = match root {
                CollectionRoot::Users => vec![root.child(&id), StorePath::personal(&id)],
                _ => vec![root.child(&id)],
            };

            let mut written = Vec::with_capacity(paths.len());
            for path in paths {
                match self.store.write(&path, value.clone()) {
                    Ok(()) => written.push(path),
                    Err(err) => {
                        warn!(%path, error = %err, "Fake record write failed");
                        report.failures.push((path, err));
                    }
                }
            }

            if !written.is_empty() {
                debug!(collection = %root, %id, "Fake record written");
                report.created.push(FakeRecord {
                    id,
                    collection: root,
                    created_at,
                    paths: written,
                });
            }
        }
        report
    }
}

/// `fake_<noun>_<epoch ms>_<index>`
fn fake_id(root: CollectionRoot, epoch_ms: i64, index: usize) -> String {
    format!(
        "fake_{}_{}_{}",
        root.entity_noun().to_lowercase(),
        epoch_ms,
        index
    )
}

fn stamp_after(not_before: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match not_before {
        Some(floor) if now <= floor => floor + chrono::Duration::milliseconds(1),
        _ => now,
    }
}

fn fake_body(
    root: CollectionRoot,
    id: &str,
    index: usize,
    created_at: DateTime<Utc>,
) -> serde_json::Value {
    let created = created_at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
    match root {
        CollectionRoot::Users => json!({
            "id": id,
            "username": format!("deleted_user_{}", index),
            "fake": true,
            "overwritten": true,
            "createdAt": created,
        }),
        CollectionRoot::Conversations => json!({
            "id": id,
            "participants": [],
            "lastMessage": null,
            "fake": true,
            "overwritten": true,
            "createdAt": created,
        }),
        _ => json!({
            "id": id,
            "fake": true,
            "overwritten": true,
            "createdAt": created,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;

    #[test]
    fn test_creates_exact_count_with_tags() {
        let store = MemoryGraphStore::new();
        let overwriter = AntiRecoveryOverwriter::new(Arc::new(store.clone()));

        let report = overwriter.overwrite(CollectionRoot::Conversations, 3, None);

        assert_eq!(report.created.len(), 3);
        assert!(report.failures.is_empty());
        for record in &report.created {
            let value = store.get(&record.paths[0]).unwrap();
            let node = value.as_node().unwrap();
            assert_eq!(node["fake"], true);
            assert_eq!(node["overwritten"], true);
        }
    }

    #[test]
    fn test_user_records_are_mirrored_to_personal_root() {
        let store = MemoryGraphStore::new();
        let overwriter = AntiRecoveryOverwriter::new(Arc::new(store.clone()));

        let report = overwriter.overwrite(CollectionRoot::Users, 5, None);

        assert_eq!(report.created.len(), 5);
        assert_eq!(store.write_count(), 10);
        let first = &report.created[0];
        assert_eq!(first.paths[1], StorePath::personal(&first.id));
    }

    #[test]
    fn test_ids_are_unique() {
        let store = MemoryGraphStore::new();
        let overwriter = AntiRecoveryOverwriter::new(Arc::new(store));

        let report = overwriter.overwrite(CollectionRoot::Users, 20, None);
        let ids: std::collections::HashSet<_> =
            report.created.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 20);
        assert!(report.created[0].id.starts_with("fake_user_"));
    }

    #[test]
    fn test_timestamps_strictly_after_floor() {
        let store = MemoryGraphStore::new();
        let overwriter = AntiRecoveryOverwriter::new(Arc::new(store));
        let floor = Utc::now() + chrono::Duration::seconds(30);

        let report = overwriter.overwrite(CollectionRoot::Users, 2, Some(floor));
        for record in report.created {
            assert!(record.created_at > floor);
        }
    }

    #[test]
    fn test_zero_count_writes_nothing() {
        let store = MemoryGraphStore::new();
        let overwriter = AntiRecoveryOverwriter::new(Arc::new(store.clone()));
        let report = overwriter.overwrite(CollectionRoot::Users, 0, None);
        assert!(report.created.is_empty());
        assert_eq!(store.write_count(), 0);
    }
}
