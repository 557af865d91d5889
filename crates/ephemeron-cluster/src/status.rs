//! Status mutation with minimal diffs and conflict detection
//!
//! One strategy everywhere: mutate a private copy of the current status,
//! diff it against the last-known-persisted status, and issue a single
//! conditional patch. Retry policy belongs to the caller.

use chrono::Utc;
use kube::Resource;
use serde_json::Value;

use ephemeron_common::crd::ClusterStatus;
use ephemeron_common::{Error, Result};

use crate::client::RecordClient;
use crate::record::ClusterRecord;

/// Mutate and persist a record's status
///
/// Runs `mutate` on a private copy of the current status and persists the
/// minimal top-level-field diff with exactly one conditional patch call.
/// A mutation that changes nothing issues no API call. On success the
/// record's in-memory status and resourceVersion are updated to match the
/// store.
pub async fn update_status<K: ClusterRecord>(
    client: &dyn RecordClient<K>,
    record: &mut K,
    mutate: impl FnOnce(&mut ClusterStatus),
) -> Result<()> {
    let before = record.status().cloned().unwrap_or_default();
    let mut next = before.clone();
    mutate(&mut next);

    if next == before {
        return Ok(());
    }
    next.last_update_time = Some(Utc::now());

    let Some(patch) = status_diff(&before, &next)? else {
        return Ok(());
    };
    let resource_version = client.patch_status(record, patch).await?;

    *record.status_mut() = next;
    record.meta_mut().resource_version = Some(resource_version);
    Ok(())
}

/// Compute the minimal merge patch between two status values
///
/// Only top-level fields that changed are included; fields cleared by the
/// mutation become explicit nulls so the merge patch removes them.
/// Returns `None` when nothing changed.
pub fn status_diff(before: &ClusterStatus, after: &ClusterStatus) -> Result<Option<Value>> {
    let before = serde_json::to_value(before).map_err(|e| Error::serialization(e.to_string()))?;
    let after = serde_json::to_value(after).map_err(|e| Error::serialization(e.to_string()))?;
    let (Value::Object(before), Value::Object(after)) = (before, after) else {
        return Err(Error::serialization("status did not serialize to an object"));
    };

    let mut patch = serde_json::Map::new();
    for (key, value) in &after {
        if before.get(key) != Some(value) {
            patch.insert(key.clone(), value.clone());
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    if patch.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Value::Object(patch)))
    }
}
