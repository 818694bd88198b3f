//! Image upload events.
//!
//! The write path hands each stored image to a background worker after its
//! transaction commits. The worker writes the bytes to object storage; its
//! failures are logged and never reach the request that produced the event.

use bytes::Bytes;
use hobbyshare_common::{
    model::{Id, post::PostImageMarker},
    storage::ObjectStorage,
    store::PostStore,
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ImageUploadEvent {
    pub image_id: Id<PostImageMarker>,
    pub file_name: String,
    pub data: Bytes,
}

pub type ImageEventSender = mpsc::UnboundedSender<ImageUploadEvent>;
pub type ImageEventReceiver = mpsc::UnboundedReceiver<ImageUploadEvent>;

#[must_use]
pub fn image_event_channel() -> (ImageEventSender, ImageEventReceiver) {
    mpsc::unbounded_channel()
}

/// Publishes events without waiting for the worker.
pub fn publish_image_events(sender: &ImageEventSender, events: Vec<ImageUploadEvent>) {
    for event in events {
        let image_id = event.image_id;
        if sender.send(event).is_err() {
            warn!(%image_id, "Image upload worker is gone, dropping event");
        } else {
            debug!(%image_id, "Queued image upload");
        }
    }
}

/// Runs until every sender is dropped and the queue is drained.
pub fn spawn_image_upload_worker<S: PostStore>(
    store: Arc<S>,
    storage: Arc<dyn ObjectStorage>,
    mut receiver: ImageEventReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Image upload worker started");

        while let Some(event) = receiver.recv().await {
            store_image(store.as_ref(), storage.as_ref(), event).await;
        }

        info!("Image upload worker stopped");
    })
}

/// Writes the bytes of an image whose row still exists. A post deleted while
/// the write was in flight gets its object removed again.
async fn store_image<S: PostStore>(
    store: &S,
    storage: &dyn ObjectStorage,
    event: ImageUploadEvent,
) {
    let ImageUploadEvent {
        image_id,
        file_name,
        data,
    } = event;
    let bytes = data.len();

    match store.post_image_exists(image_id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(%image_id, %file_name, "Image was deleted before upload, skipping");
            return;
        }
        Err(err) => warn!(%image_id, error = %err, "Could not check image, storing anyway"),
    }

    if let Err(err) = storage.put_object(&file_name, data).await {
        error!(%image_id, %file_name, error = %err, "Storing uploaded image failed");
        return;
    }
    debug!(%image_id, %file_name, bytes, "Stored uploaded image");

    if let Ok(false) = store.post_image_exists(image_id).await {
        match storage.delete_object(&file_name).await {
            Ok(()) => debug!(%image_id, %file_name, "Removed image deleted during upload"),
            Err(err) => error!(%image_id, %file_name, error = %err, "Could not remove orphaned image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        events::{
            ImageUploadEvent, image_event_channel, publish_image_events,
            spawn_image_upload_worker,
        },
        service::testing::{MemoryObjectStorage, MemoryStore},
    };
    use bytes::Bytes;
    use hobbyshare_common::model::{Id, post::PostImageMarker};
    use std::sync::Arc;

    fn event(image_id: Id<PostImageMarker>, name: &str) -> ImageUploadEvent {
        ImageUploadEvent {
            image_id,
            file_name: name.to_owned(),
            data: Bytes::from_static(b"pixels"),
        }
    }

    fn store_with_images(names: &[&str]) -> (Arc<MemoryStore>, Vec<Id<PostImageMarker>>) {
        let store = Arc::new(MemoryStore::default());
        let author = store.add_user("alice");
        let post = store.add_post(author, "Pictures", &[]);
        let ids = names
            .iter()
            .map(|name| store.add_image(post, &format!("https://cdn.test/images/{name}")))
            .collect();
        (store, ids)
    }

    #[tokio::test]
    async fn worker_stores_every_event_then_stops() {
        let (store, ids) = store_with_images(&["a.png", "b.png"]);
        let storage = Arc::new(MemoryObjectStorage::default());
        let (sender, receiver) = image_event_channel();
        let worker = spawn_image_upload_worker(store, storage.clone(), receiver);

        publish_image_events(&sender, vec![event(ids[0], "a.png"), event(ids[1], "b.png")]);
        drop(sender);
        worker.await.unwrap();

        assert_eq!(storage.object_keys(), vec!["a.png", "b.png"]);
    }

    #[tokio::test]
    async fn worker_survives_storage_failures() {
        let (store, ids) = store_with_images(&["broken.png", "fine.png"]);
        let storage = Arc::new(MemoryObjectStorage::default());
        storage.fail_puts_for("broken.png");
        let (sender, receiver) = image_event_channel();
        let worker = spawn_image_upload_worker(store, storage.clone(), receiver);

        publish_image_events(
            &sender,
            vec![event(ids[0], "broken.png"), event(ids[1], "fine.png")],
        );
        drop(sender);
        worker.await.unwrap();

        assert_eq!(storage.object_keys(), vec!["fine.png"]);
    }

    #[tokio::test]
    async fn worker_skips_images_without_a_row() {
        let (store, ids) = store_with_images(&["kept.png"]);
        let storage = Arc::new(MemoryObjectStorage::default());
        let (sender, receiver) = image_event_channel();
        let worker = spawn_image_upload_worker(store, storage.clone(), receiver);

        publish_image_events(
            &sender,
            vec![event(Id::new(999), "gone.png"), event(ids[0], "kept.png")],
        );
        drop(sender);
        worker.await.unwrap();

        assert_eq!(storage.object_keys(), vec!["kept.png"]);
    }

    #[test]
    fn publishing_to_a_closed_channel_is_not_an_error() {
        let (sender, receiver) = image_event_channel();
        drop(receiver);

        publish_image_events(&sender, vec![event(Id::new(1), "a.png")]);
    }
}
