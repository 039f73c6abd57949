//! Image storage for plan covers and exercise pictures.

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};

use crate::db::models::{Exercise, ExerciseId, PlanChanges, PlanId, UserId, WorkoutPlan};
use crate::error::{StoreError, StoreResult};
use crate::store::PlanStore;

pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at the relative `path` and returns a URL for it.
    fn upload(&self, bytes: Vec<u8>, path: &str)
    -> impl Future<Output = StoreResult<String>> + Send;

    /// Removes the object. Deleting a missing object succeeds.
    fn delete(&self, path: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Maps a URL returned by [`BlobStore::upload`] back to its path.
    fn path_for(&self, url: &str) -> Option<String>;
}

/// Keeps blobs as files below a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::Invalid(format!(
                "blob path {:?} must be relative and stay inside the store",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> StoreResult<String> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), target.display());
        Ok(format!("file://{}", target.display()))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, url: &str) -> Option<String> {
        let full = Path::new(url.strip_prefix("file://")?);
        let relative = full.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

fn image_extension(extension: &str) -> StoreResult<String> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StoreError::Invalid(format!(
            "unsupported image extension {:?}",
            extension
        )));
    }
    Ok(ext)
}

async fn forget_blob<B: BlobStore>(blobs: &B, url: &str) {
    let Some(path) = blobs.path_for(url) else {
        debug!("Not removing foreign image {}", url);
        return;
    };
    if let Err(e) = blobs.delete(&path).await {
        warn!("Failed to remove image {}: {}", path, e);
    }
}

/// Uploads a cover image and points the plan at it, dropping the old cover.
pub async fn attach_plan_image<P: PlanStore, B: BlobStore>(
    plans: &P,
    blobs: &B,
    owner: UserId,
    plan_id: PlanId,
    bytes: Vec<u8>,
    extension: &str,
) -> StoreResult<WorkoutPlan> {
    let ext = image_extension(extension)?;
    let current = plans.get_plan(owner, plan_id).await?.plan;
    let path = format!(
        "users/{}/plans/{}/cover-{}.{}",
        owner,
        plan_id,
        Utc::now().timestamp_millis(),
        ext
    );
    let url = blobs.upload(bytes, &path).await?;
    let updated = plans
        .update_plan(
            owner,
            plan_id,
            PlanChanges {
                image_url: Some(Some(url)),
                ..Default::default()
            },
        )
        .await?;
    if let Some(old) = current.image_url {
        forget_blob(blobs, &old).await;
    }
    Ok(updated)
}

/// Uploads an image and appends it to the exercise's image list.
pub async fn add_exercise_image<P: PlanStore, B: BlobStore>(
    plans: &P,
    blobs: &B,
    owner: UserId,
    exercise_id: ExerciseId,
    bytes: Vec<u8>,
    extension: &str,
) -> StoreResult<Exercise> {
    let ext = image_extension(extension)?;
    let exercise = plans.get_exercise(owner, exercise_id).await?;
    let mut images = exercise.images();
    let path = format!(
        "users/{}/exercises/{}/{}-{}.{}",
        owner,
        exercise_id,
        images.len(),
        Utc::now().timestamp_millis(),
        ext
    );
    images.push(blobs.upload(bytes, &path).await?);
    plans.set_exercise_images(owner, exercise_id, images).await
}

/// Detaches the image at `index` and deletes its blob.
pub async fn remove_exercise_image<P: PlanStore, B: BlobStore>(
    plans: &P,
    blobs: &B,
    owner: UserId,
    exercise_id: ExerciseId,
    index: usize,
) -> StoreResult<Exercise> {
    let exercise = plans.get_exercise(owner, exercise_id).await?;
    let mut images = exercise.images();
    if index >= images.len() {
        return Err(StoreError::Invalid(format!(
            "exercise {} has no image at index {}",
            exercise_id, index
        )));
    }
    let removed = images.remove(index);
    let updated = plans.set_exercise_images(owner, exercise_id, images).await?;
    forget_blob(blobs, &removed).await;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::store::{ExerciseDraft, PlanDraft};

    #[tokio::test]
    async fn upload_and_delete_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());

        let url = blobs.upload(b"png".to_vec(), "a/b/c.png").await.unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(blobs.path_for(&url).as_deref(), Some("a/b/c.png"));
        assert_eq!(std::fs::read(dir.path().join("a/b/c.png")).unwrap(), b"png");

        blobs.delete("a/b/c.png").await.unwrap();
        assert!(!dir.path().join("a/b/c.png").exists());
        blobs.delete("a/b/c.png").await.unwrap();
    }

    #[tokio::test]
    async fn paths_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        for bad in ["", "../x.png", "/etc/passwd", "a/../../x.png"] {
            let err = blobs.upload(vec![1], bad).await.unwrap_err();
            assert!(matches!(err, StoreError::Invalid(_)), "{}", bad);
        }
        assert_eq!(blobs.path_for("https://cdn.example.com/x.png"), None);
    }

    #[tokio::test]
    async fn plan_cover_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let store = SqliteStore::in_memory().unwrap();
        let owner = store.get_or_create_user("kai").await.unwrap().id;
        let plan = store
            .create_plan(
                owner,
                PlanDraft {
                    name: "Legs".into(),
                    description: None,
                },
            )
            .await
            .unwrap();

        let first = attach_plan_image(&store, &blobs, owner, plan.id, vec![1], "jpg")
            .await
            .unwrap();
        let first_path = blobs.path_for(first.image_url.as_deref().unwrap()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = attach_plan_image(&store, &blobs, owner, plan.id, vec![2], ".PNG")
            .await
            .unwrap();

        let second_url = second.image_url.unwrap();
        assert!(second_url.ends_with(".png"));
        assert!(!dir.path().join(&first_path).exists());
    }

    #[tokio::test]
    async fn exercise_images_keep_their_order() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let store = SqliteStore::in_memory().unwrap();
        let owner = store.get_or_create_user("kai").await.unwrap().id;
        let plan = store
            .create_plan(
                owner,
                PlanDraft {
                    name: "Arms".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let exercise = store
            .append_exercise(
                owner,
                plan.id,
                ExerciseDraft {
                    name: "Curl".into(),
                    target_sets: 3,
                    target_reps: 12,
                    rest_seconds: 60,
                    notes: None,
                },
            )
            .await
            .unwrap();

        add_exercise_image(&store, &blobs, owner, exercise.id, vec![1], "png")
            .await
            .unwrap();
        let two = add_exercise_image(&store, &blobs, owner, exercise.id, vec![2], "png")
            .await
            .unwrap();
        let images = two.images();
        assert_eq!(images.len(), 2);
        assert!(blobs.path_for(&images[0]).unwrap().contains("/0-"));
        assert!(blobs.path_for(&images[1]).unwrap().contains("/1-"));

        let one = remove_exercise_image(&store, &blobs, owner, exercise.id, 0)
            .await
            .unwrap();
        assert_eq!(one.images(), vec![images[1].clone()]);
        assert!(
            remove_exercise_image(&store, &blobs, owner, exercise.id, 5)
                .await
                .is_err()
        );

        let stranger = store.get_or_create_user("lee").await.unwrap().id;
        let err = add_exercise_image(&store, &blobs, stranger, exercise.id, vec![3], "png")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
    }
}
