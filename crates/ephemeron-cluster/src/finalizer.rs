//! Crash-safe deletion gating via finalizers
//!
//! The finalizer is a persisted marker: once present, the store will not
//! physically remove the record until this controller clears it after
//! teardown succeeds (or is explicitly skipped).

use kube::{Resource, ResourceExt};
use tracing::debug;

use ephemeron_common::Result;

use crate::client::RecordClient;
use crate::record::ClusterRecord;

/// Whether the record carries this controller's finalizer
pub fn has_finalizer<K: ClusterRecord>(record: &K) -> bool {
    record.finalizers().iter().any(|f| f == K::finalizer())
}

/// Add the finalizer and persist if absent
///
/// Idempotent: a record that already carries the finalizer is left
/// untouched. Returns true when the finalizer was actually added.
pub async fn ensure_finalizer<K: ClusterRecord>(
    client: &dyn RecordClient<K>,
    record: &mut K,
) -> Result<bool> {
    if has_finalizer(record) {
        debug!("finalizer already present");
        return Ok(false);
    }

    let mut finalizers = record.finalizers().to_vec();
    finalizers.push(K::finalizer().to_string());

    let resource_version = client.replace_finalizers(record, finalizers.clone()).await?;
    let meta = record.meta_mut();
    meta.finalizers = Some(finalizers);
    meta.resource_version = Some(resource_version);
    Ok(true)
}

/// Remove the finalizer and persist if present
pub async fn remove_finalizer<K: ClusterRecord>(
    client: &dyn RecordClient<K>,
    record: &mut K,
) -> Result<()> {
    if !has_finalizer(record) {
        return Ok(());
    }

    let finalizers: Vec<String> = record
        .finalizers()
        .iter()
        .filter(|f| *f != K::finalizer())
        .cloned()
        .collect();

    let resource_version = client.replace_finalizers(record, finalizers.clone()).await?;
    let meta = record.meta_mut();
    meta.finalizers = Some(finalizers);
    meta.resource_version = Some(resource_version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::KIND_CLUSTER_FINALIZER;
    use crate::testing::{kind_record, FakeRecordClient};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ensure_finalizer_is_idempotent() {
        let mut record = kind_record("dev");
        let fake = Arc::new(FakeRecordClient::new(record.clone()));

        assert!(ensure_finalizer(fake.as_ref(), &mut record).await.unwrap());
        assert!(!ensure_finalizer(fake.as_ref(), &mut record).await.unwrap());

        let stored = fake.stored();
        let finalizers = stored.metadata.finalizers.as_deref().unwrap_or_default();
        assert_eq!(finalizers, [KIND_CLUSTER_FINALIZER]);
    }

    #[tokio::test]
    async fn test_foreign_finalizers_are_preserved() {
        let mut record = kind_record("dev");
        record.metadata.finalizers = Some(vec!["other.dev/protect".to_string()]);
        let fake = Arc::new(FakeRecordClient::new(record.clone()));

        ensure_finalizer(fake.as_ref(), &mut record).await.unwrap();
        remove_finalizer(fake.as_ref(), &mut record).await.unwrap();

        let stored = fake.stored();
        assert_eq!(
            stored.metadata.finalizers.as_deref().unwrap(),
            ["other.dev/protect"]
        );
    }

    #[tokio::test]
    async fn test_remove_without_finalizer_is_noop() {
        let mut record = kind_record("dev");
        let fake = Arc::new(FakeRecordClient::new(record.clone()));
        remove_finalizer(fake.as_ref(), &mut record).await.unwrap();
        assert!(fake.stored().metadata.finalizers.is_none());
    }
}
