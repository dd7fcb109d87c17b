//! Offline consistency check between metadata rows and stored payloads.
//!
//! A *dangling row* is an artifact row whose payload is missing (payload write
//! failed after the row was inserted). An *orphaned payload* is an object no
//! row refers to (payload delete failed after the row was removed, or a
//! project cascade left it behind). Only orphans are ever removed.

use crate::services::{
    metadata_store::MetadataStore,
    object_store::ObjectStore,
    repository::{RepoResult, Repository},
};
use serde::Serialize;
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Storage keys with a metadata row but no payload.
    pub dangling_rows: Vec<String>,
    /// Storage keys with a payload but no metadata row.
    pub orphaned_payloads: Vec<String>,
    /// Orphans deleted by a sweep.
    pub removed_payloads: usize,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling_rows.is_empty() && self.orphaned_payloads.is_empty()
    }
}

pub struct Reconciler {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
}

impl Reconciler {
    pub fn new(repository: &Repository) -> Self {
        Self {
            metadata: repository.metadata().clone(),
            objects: repository.objects().clone(),
        }
    }

    /// Compare both stores without changing either.
    pub async fn scan(&self) -> RepoResult<ReconcileReport> {
        // Payloads are listed before rows: a create racing the scan inserts
        // its row before writing its payload, so it can never look orphaned.
        let payloads: BTreeSet<String> = self.objects.list_keys().await?.into_iter().collect();
        let rows: BTreeSet<String> = self
            .metadata
            .list_storage_keys()
            .await?
            .into_iter()
            .collect();

        let report = ReconcileReport {
            dangling_rows: rows.difference(&payloads).cloned().collect(),
            orphaned_payloads: payloads.difference(&rows).cloned().collect(),
            removed_payloads: 0,
        };

        for key in &report.dangling_rows {
            warn!(storage_key = %key, "artifact row has no payload");
        }
        for key in &report.orphaned_payloads {
            warn!(storage_key = %key, "payload has no artifact row");
        }
        info!(
            rows = rows.len(),
            payloads = payloads.len(),
            dangling = report.dangling_rows.len(),
            orphaned = report.orphaned_payloads.len(),
            "reconcile scan finished"
        );
        Ok(report)
    }

    /// Scan, then delete every orphaned payload. Dangling rows are reported
    /// only.
    pub async fn sweep(&self) -> RepoResult<ReconcileReport> {
        let mut report = self.scan().await?;
        for key in &report.orphaned_payloads {
            match self.objects.delete_payload(key).await {
                Ok(()) => report.removed_payloads += 1,
                Err(err) => warn!(storage_key = %key, error = %err, "failed to remove orphan"),
            }
        }
        info!(removed = report.removed_payloads, "reconcile sweep finished");
        Ok(report)
    }
}
