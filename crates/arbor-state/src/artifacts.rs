//! `ArtifactStore` over the embedded tables: metadata in `BLOBS`, content
//! in `BLOB_DATA`, both written and removed in one transaction.

use arbor_core::*;
use async_trait::async_trait;
use redb::TableHandle;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, encode, map_err};
use crate::tables::*;

/// Length of generated artifact UIDs (hex characters).
const UID_LEN: usize = 32;

impl StateStore {
    /// Content of an artifact, if present.
    pub fn read_artifact(&self, uid: &str) -> StateResult<Option<Vec<u8>>> {
        self.get_raw(BLOB_DATA, uid)
    }

    /// Metadata of every stored artifact.
    pub fn list_artifacts(&self) -> StateResult<Vec<BlobRecord>> {
        self.scan_json(BLOBS, "")
    }
}

impl StateStore {
    /// Write the metadata row and, when given, the content row together.
    fn insert_blob(&self, record: &BlobRecord, content: Option<&[u8]>) -> StateResult<()> {
        let meta = encode(record)?;
        self.write_with(|txn| {
            let mut blobs = txn.open_table(BLOBS).map_err(map_err!(Table))?;
            blobs
                .insert(record.uid.as_str(), meta.as_slice())
                .map_err(map_err!(Write))?;
            if let Some(content) = content {
                let mut data = txn.open_table(BLOB_DATA).map_err(map_err!(Table))?;
                data.insert(record.uid.as_str(), content)
                    .map_err(map_err!(Write))?;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ArtifactStore for StateStore {
    async fn put_artifact(&self, owner: &AppRef, content: &[u8]) -> StoreResult<BlobRecord> {
        let record = BlobRecord {
            uid: self.generate_id(&owner.table_key(), content, UID_LEN),
            owner: owner.clone(),
            size_bytes: content.len() as u64,
            created_at: epoch_secs(),
            source: BlobSource::Upload,
        };
        self.insert_blob(&record, Some(content))?;
        info!(uid = %record.uid, owner = %owner, size = record.size_bytes, "artifact stored");
        Ok(record)
    }

    async fn import_git(
        &self,
        owner: &AppRef,
        url: &str,
        revision: Option<&str>,
    ) -> StoreResult<BlobRecord> {
        let reference = format!("{url}#{}", revision.unwrap_or_default());
        let record = BlobRecord {
            uid: self.generate_id(&owner.table_key(), reference.as_bytes(), UID_LEN),
            owner: owner.clone(),
            size_bytes: 0,
            created_at: epoch_secs(),
            source: BlobSource::Git {
                url: url.to_string(),
                revision: revision.map(str::to_string),
            },
        };
        self.insert_blob(&record, None)?;
        info!(uid = %record.uid, owner = %owner, %url, revision = ?revision, "git artifact recorded");
        Ok(record)
    }

    async fn get_artifact_owner(&self, uid: &str) -> StoreResult<Option<AppRef>> {
        let record: Option<BlobRecord> = self.get_json(BLOBS, uid)?;
        Ok(record.map(|r| r.owner))
    }

    async fn artifact_exists(&self, uid: &str) -> StoreResult<bool> {
        let record: Option<BlobRecord> = self.get_json(BLOBS, uid)?;
        Ok(record.is_some())
    }

    async fn delete_artifact(&self, uid: &str) -> StoreResult<bool> {
        let existed = self.write_with(|txn| {
            let mut existed = false;
            for def in [BLOBS, BLOB_DATA] {
                let mut table = txn.open_table(def).map_err(map_err!(Table))?;
                let removed = table.remove(uid).map_err(map_err!(Write))?.is_some();
                debug!(table = def.name(), %uid, removed, "artifact entry removed");
                existed |= removed;
            }
            Ok::<_, StateError>(existed)
        })?;
        Ok(existed)
    }
}
