mod common;

use std::collections::HashSet;

use common::{command, files_in, harness};
use feeder_controller::DeviceEvent;

#[tokio::test]
async fn photo_uploads_three_files_then_cleans_up_and_announces() {
    let h = harness();

    let task = h
        .controller
        .handle_event(command(&h.config, "take-photo"))
        .await
        .unwrap();
    task.await.unwrap();

    let keys = h.store.keys();
    assert_eq!(keys.len(), 3, "{keys:?}");
    let original = keys[0].clone();
    assert!(original.starts_with("image_") && original.ends_with(".jpg"));
    assert_eq!(keys[1], format!("small_{original}"));
    assert_eq!(keys[2], format!("medium_{original}"));

    let small = h.store.get(&keys[1]).unwrap();
    assert_eq!(
        image::load_from_memory(&small).unwrap().into_rgb8().dimensions(),
        (100, 75)
    );
    let medium = h.store.get(&keys[2]).unwrap();
    assert_eq!(
        image::load_from_memory(&medium).unwrap().into_rgb8().dimensions(),
        (200, 150)
    );

    assert!(files_in(&h.config.media.photo_dir).is_empty());

    let published = h.transport.published_on(&h.config.topics.image_created);
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].payload_str(),
        format!(r#"{{"resource-created":"{original}"}}"#)
    );
}

#[tokio::test]
async fn failed_upload_keeps_its_file_and_skips_the_announcement() {
    let h = harness();
    h.store.fail_key_containing("small_");

    let task = h
        .controller
        .handle_event(command(&h.config, "take-photo"))
        .await
        .unwrap();
    task.await.unwrap();

    // the other two files were still attempted
    let keys = h.store.keys();
    assert_eq!(keys.len(), 2, "{keys:?}");
    assert!(keys.iter().all(|key| !key.starts_with("small_")));

    let left = files_in(&h.config.media.photo_dir);
    assert_eq!(left.len(), 1, "{left:?}");
    assert!(left[0].starts_with("small_image_"));

    let published = h.transport.published_on(&h.config.topics.image_created);
    assert_eq!(published.len(), 1);
    let body = published[0].payload_str();
    assert!(body.starts_with(r#"{"operation-failed":"take-photo: "#), "{body}");
    assert!(!body.contains("resource-created"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_captures_never_overlap() {
    let h = harness();

    let first = h
        .controller
        .handle_event(DeviceEvent::MotionDetected)
        .await
        .unwrap();
    let second = h
        .controller
        .handle_event(command(&h.config, "take-photo"))
        .await
        .unwrap();
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(h.camera.captures(), 2);
    assert!(!h.camera.overlapped());

    let keys: HashSet<_> = h.store.keys().into_iter().collect();
    assert_eq!(keys.len(), 6, "{keys:?}");

    let published = h.transport.published_on(&h.config.topics.image_created);
    assert_eq!(published.len(), 2);
    assert_ne!(published[0].payload, published[1].payload);
}

#[tokio::test(start_paused = true)]
async fn video_is_uploaded_and_announced() {
    let h = harness();

    let task = h
        .controller
        .handle_event(command(&h.config, "record-video"))
        .await
        .unwrap();
    task.await.unwrap();

    let keys = h.store.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("video_") && keys[0].ends_with(".h264"));
    assert!(files_in(&h.config.media.video_dir).is_empty());

    let published = h.transport.published_on(&h.config.topics.video_created);
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].payload_str(),
        format!(r#"{{"resource-created":"{}"}}"#, keys[0])
    );
}

#[tokio::test]
async fn photo_and_video_share_the_camera() {
    let h = harness();

    let video = h
        .controller
        .handle_event(command(&h.config, "record-video"))
        .await
        .unwrap();
    let photo = h
        .controller
        .handle_event(DeviceEvent::MotionDetected)
        .await
        .unwrap();
    video.await.unwrap();
    photo.await.unwrap();

    assert!(!h.camera.overlapped());
    assert_eq!(h.store.keys().len(), 4);
}
