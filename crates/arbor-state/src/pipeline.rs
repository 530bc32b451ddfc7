//! `StagingPipeline` recorder. The embedded store does not build images;
//! it records each run and the image URL the build system will publish, so
//! deploys can resolve a stage id to its artifact and image.

use arbor_core::*;
use async_trait::async_trait;
use tracing::info;

use crate::store::StateStore;
use crate::tables::STAGES;

const STAGE_ID_LEN: usize = 16;

#[async_trait]
impl StagingPipeline for StateStore {
    async fn stage(&self, request: &StageRequest) -> StoreResult<StageRecord> {
        let seed = format!("{}:{}", request.app.table_key(), request.blob_uid);
        let id = self.generate_id(&seed, request.builder_image.as_bytes(), STAGE_ID_LEN);
        let record = StageRecord {
            image_url: format!(
                "{}/{}-{}:{id}",
                self.registry(),
                request.app.namespace,
                request.app.name
            ),
            id,
            app: request.app.clone(),
            blob_uid: request.blob_uid.clone(),
            builder_image: request.builder_image.clone(),
            created_at: epoch_secs(),
        };
        self.put_json(STAGES, &record.id, &record)?;
        info!(stage = %record.id, app = %record.app, blob = %record.blob_uid, "stage run recorded");
        Ok(record)
    }

    async fn get_stage(&self, id: &str) -> StoreResult<Option<StageRecord>> {
        Ok(self.get_json(STAGES, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_records_run_and_image() {
        let store = StateStore::open_in_memory()
            .unwrap()
            .with_registry("registry.local/apps");
        let request = StageRequest {
            app: AppRef::new("ns", "foo"),
            blob_uid: "abc".to_string(),
            builder_image: "paketobuildpacks/builder:full".to_string(),
        };

        let record = store.stage(&request).await.unwrap();
        assert_eq!(record.id.len(), STAGE_ID_LEN);
        assert_eq!(
            record.image_url,
            format!("registry.local/apps/ns-foo:{}", record.id)
        );
        assert_eq!(store.get_stage(&record.id).await.unwrap(), Some(record));
        assert!(store.get_stage("unknown").await.unwrap().is_none());
    }
}
