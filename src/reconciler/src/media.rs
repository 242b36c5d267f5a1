//! Removal of `media` and `image_chunks` rows whose parent image is gone.

use crate::error::ReconcileError;
use common::ContentDb;
use common::database::ImageRef;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSweepReport {
    pub orphan_media_ids: Vec<i64>,
    pub orphan_chunk_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct MediaSweeper {
    db: ContentDb,
}

impl MediaSweeper {
    pub fn new(db: ContentDb) -> Self {
        Self { db }
    }

    pub async fn sweep(&self) -> Result<MediaSweepReport, ReconcileError> {
        // Lookups are memoized since many chunks share one parent image.
        let mut exists: HashMap<i64, bool> = HashMap::new();

        let media = self.db.media_image_refs().await.map_err(sweep_error)?;
        let orphan_media = self.orphans(&media, &mut exists).await?;
        for row in &orphan_media {
            self.db.delete_media(row.id).await.map_err(sweep_error)?;
            tracing::info!(media_id = row.id, image_id = row.image_id, "Deleted orphan media row");
        }

        let chunks = self.db.image_chunk_refs().await.map_err(sweep_error)?;
        let orphan_chunks = self.orphans(&chunks, &mut exists).await?;
        for row in &orphan_chunks {
            self.db.delete_image_chunk(row.id).await.map_err(sweep_error)?;
            tracing::debug!(chunk_id = row.id, image_id = row.image_id, "Deleted orphan image chunk");
        }

        let report = MediaSweepReport {
            orphan_media_ids: orphan_media.iter().map(|row| row.id).collect(),
            orphan_chunk_ids: orphan_chunks.iter().map(|row| row.id).collect(),
        };

        tracing::info!(
            orphan_media = report.orphan_media_ids.len(),
            orphan_chunks = report.orphan_chunk_ids.len(),
            "Media sweep complete"
        );

        Ok(report)
    }

    async fn orphans(
        &self,
        rows: &[ImageRef],
        exists: &mut HashMap<i64, bool>,
    ) -> Result<Vec<ImageRef>, ReconcileError> {
        let mut orphans = Vec::new();
        for row in rows {
            let present = match exists.get(&row.image_id) {
                Some(present) => *present,
                None => {
                    let present = self
                        .db
                        .image_exists(row.image_id)
                        .await
                        .map_err(sweep_error)?;
                    exists.insert(row.image_id, present);
                    present
                }
            };
            if !present {
                orphans.push(*row);
            }
        }
        Ok(orphans)
    }
}

fn sweep_error(e: impl Into<anyhow::Error>) -> ReconcileError {
    ReconcileError::Sweep(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_removes_rows_of_missing_images() {
        let db = ContentDb::new_in_memory().await.unwrap();
        let live = db.insert_image(None, Some("live.png")).await.unwrap();
        let gone = db.insert_image(None, Some("gone.png")).await.unwrap();

        let kept_media = db.insert_media(Some(live), None, "image").await.unwrap();
        db.insert_media(None, None, "video").await.unwrap();
        let orphan_media = db.insert_media(Some(gone), None, "image").await.unwrap();
        db.insert_image_chunk(live, 0, b"ok").await.unwrap();
        let orphan_chunk_a = db.insert_image_chunk(gone, 0, b"a").await.unwrap();
        let orphan_chunk_b = db.insert_image_chunk(gone, 1, b"b").await.unwrap();

        db.delete_image(gone).await.unwrap();

        let report = MediaSweeper::new(db.clone()).sweep().await.unwrap();
        assert_eq!(report.orphan_media_ids, vec![orphan_media]);
        assert_eq!(report.orphan_chunk_ids, vec![orphan_chunk_a, orphan_chunk_b]);

        let media: Vec<i64> = db
            .media_image_refs()
            .await
            .unwrap()
            .iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(media, vec![kept_media]);
        assert_eq!(db.image_chunk_refs().await.unwrap().len(), 1);

        let again = MediaSweeper::new(db).sweep().await.unwrap();
        assert_eq!(again, MediaSweepReport::default());
    }
}
