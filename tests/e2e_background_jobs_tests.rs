//! End-to-end tests of the job engine over real SQLite databases.

mod common;

use common::{GatedCodec, TestGallery, PNG_HEADER};
use gallery_server::background_jobs::jobs::{
    ExtractMetadataArgs, ExtractMetadataJob, RegenerateThumbnailArgs, RegenerateThumbnailJob,
};
use gallery_server::background_jobs::{CodecFactory, JobOutcome};
use gallery_server::job_ledger::NewLedgerRow;
use gallery_server::media_codec::{CropRect, MediaCodec};
use gallery_server::{GalleryStore, JobLedger};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn gated_factory(codec: &GatedCodec) -> CodecFactory {
    let codec = codec.clone();
    Arc::new(move || Box::new(codec.clone()) as Box<dyn MediaCodec>)
}

#[tokio::test]
async fn test_interrupted_rebuild_is_recovered_by_next_process() {
    let gallery = TestGallery::new();
    let store = gallery.store();
    let a = store.create_folder("/a", "A").unwrap();
    let b = store.create_folder("/a/b", "B").unwrap();
    let tag_1 = store.create_tag("one").unwrap();
    let tag_2 = store.create_tag("two").unwrap();
    store.add_folder_tag(a, tag_1).unwrap();
    store.add_folder_tag(b, tag_2).unwrap();
    let media = store.create_media(b, "a/b/m.jpg").unwrap();

    // A previous process started the rebuild and died before finishing it
    let ledger = gallery.ledger();
    let crashed = ledger
        .create_row(&NewLedgerRow::now(
            "rebuild_inherited_tags",
            Some("rebuild_inherited_tags_args"),
            Some("{}".to_string()),
        ))
        .unwrap();

    let runner = gallery.runner();
    let report = runner.recover_on_startup().await.unwrap();
    assert_eq!(report.scheduled.len(), 1);
    assert_eq!(report.scheduled[0].ledger_id, crashed.id);
    assert_eq!(
        report.scheduled[0].resource_key.as_deref(),
        Some("inherited-tags")
    );
    for handle in report.scheduled {
        assert_eq!(handle.outcome().await, JobOutcome::Succeeded);
    }

    let mut tags = store.get_inherited_tags(media).unwrap();
    tags.sort();
    assert_eq!(tags, vec![tag_1, tag_2]);

    let row = ledger.get_row(crashed.id).unwrap().unwrap();
    assert!(row.finish_time.is_some());
    assert_eq!(row.success, Some(true));
    assert!(row.start_time <= row.finish_time.unwrap());

    // Next process has nothing left to do
    let report = gallery.runner().recover_on_startup().await.unwrap();
    assert!(report.scheduled.is_empty());
}

#[tokio::test]
async fn test_thumbnail_cancellation_is_per_media() {
    let gallery = TestGallery::new();
    let store = gallery.store();
    let folder = store.create_folder("/", "root").unwrap();
    let mut last = 0;
    for i in 1..=43 {
        last = store.create_media(folder, &format!("{}.jpg", i)).unwrap();
    }
    assert_eq!(last, 43);

    let codec = GatedCodec::default();
    let runner = gallery.runner_with_codec(gated_factory(&codec));

    let job_42 = runner
        .spawn::<RegenerateThumbnailJob>(RegenerateThumbnailArgs {
            media_id: 42,
            crop: None,
        })
        .await
        .unwrap();
    let job_43 = runner
        .spawn::<RegenerateThumbnailJob>(RegenerateThumbnailArgs {
            media_id: 43,
            crop: None,
        })
        .await
        .unwrap();

    assert_eq!(runner.cancel("media-42").await, 1);
    codec.open();

    let (id_42, id_43) = (job_42.ledger_id, job_43.ledger_id);
    assert_eq!(job_42.outcome().await, JobOutcome::Cancelled);
    assert_eq!(job_43.outcome().await, JobOutcome::Succeeded);

    let ledger = gallery.ledger();
    let row_42 = ledger.get_row(id_42).unwrap().unwrap();
    let row_43 = ledger.get_row(id_43).unwrap().unwrap();
    assert!(row_42.finish_time.is_some());
    assert_eq!(row_42.success, Some(false));
    assert_eq!(row_43.success, Some(true));

    assert!(store.get_media(42).unwrap().unwrap().thumbnail_path.is_none());
    assert!(store.get_media(43).unwrap().unwrap().thumbnail_path.is_some());
}

#[tokio::test]
async fn test_metadata_extraction_end_to_end() {
    let gallery = TestGallery::with_batch_size(2);
    let store = gallery.store();
    let folder = store.create_folder("/2024", "2024").unwrap();

    let png = gallery.write_media_file("2024/sunset.png", PNG_HEADER);
    let notes = gallery.write_media_file("2024/notes.txt", b"just some text");
    let png_id = store.create_media(folder, &png).unwrap();
    let notes_id = store.create_media(folder, &notes).unwrap();
    let missing_id = store.create_media(folder, "2024/gone.jpg").unwrap();

    let outcome = gallery
        .runner()
        .submit::<ExtractMetadataJob>(ExtractMetadataArgs::default())
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Succeeded);
    assert_eq!(store.count_media_needing_metadata().unwrap(), 0);

    let png_media = store.get_media(png_id).unwrap().unwrap();
    assert_eq!(png_media.mime_type.as_deref(), Some("image/png"));
    assert_eq!(png_media.byte_size, Some(PNG_HEADER.len() as u64));

    for id in [notes_id, missing_id] {
        let media = store.get_media(id).unwrap().unwrap();
        assert!(media.metadata_extracted_at.is_some());
        assert!(media.mime_type.is_none());
    }

    let rows = gallery.ledger().get_recent_rows(10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].job_type_name, "extract_media_metadata");
    assert_eq!(rows[0].success, Some(true));
}

#[tokio::test]
async fn test_submit_by_name_regenerates_thumbnail() {
    let gallery = TestGallery::new();
    let store = gallery.store();
    let folder = store.create_folder("/", "root").unwrap();
    let file = gallery.write_media_file("cat.png", PNG_HEADER);
    let media = store.create_media(folder, &file).unwrap();

    let args = format!(
        r#"{{"media_id":{},"crop":{{"x":1,"y":2,"width":30,"height":40}}}}"#,
        media
    );
    let outcome = gallery
        .runner()
        .submit_by_name("regenerate_thumbnail", &args)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Succeeded);

    let stored = store.get_media(media).unwrap().unwrap();
    let expected = gallery
        .config
        .thumbnails_dir
        .join(format!("{}.png", media));
    assert_eq!(
        stored.thumbnail_path.as_deref(),
        Some(expected.to_string_lossy().as_ref())
    );
    assert!(expected.exists());
    assert_eq!(
        stored.crop,
        Some(CropRect {
            x: 1,
            y: 2,
            width: 30,
            height: 40
        })
    );

    let row = &gallery.ledger().get_recent_rows(1).unwrap()[0];
    assert_eq!(row.serialized_arguments.as_deref(), Some(args.as_str()));
}

#[tokio::test]
async fn test_unknown_rows_survive_restarts() {
    let gallery = TestGallery::new();
    let ledger = gallery.ledger();
    let legacy = ledger
        .create_row(&NewLedgerRow::now(
            "legacy_video_transcode",
            Some("legacy_args"),
            None,
        ))
        .unwrap();
    ledger
        .create_row(&NewLedgerRow::now(
            "extract_media_metadata",
            Some("extract_media_metadata_args"),
            Some(r#"{"batch_size":10}"#.to_string()),
        ))
        .unwrap();

    for _ in 0..2 {
        let report = gallery.runner().recover_on_startup().await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].ledger_id, legacy.id);
        for handle in report.scheduled {
            assert_eq!(handle.outcome().await, JobOutcome::Succeeded);
        }
    }

    let pending = ledger.get_pending_rows().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, legacy.id);
}

#[tokio::test]
async fn test_shutdown_with_grace_period() {
    let gallery = TestGallery::new();
    let store = gallery.store();
    let folder = store.create_folder("/", "root").unwrap();
    let media = store.create_media(folder, "slow.jpg").unwrap();

    let codec = GatedCodec::default();
    let runner = gallery.runner_with_codec(gated_factory(&codec));
    let handle = runner
        .spawn::<RegenerateThumbnailJob>(RegenerateThumbnailArgs {
            media_id: media,
            crop: None,
        })
        .await
        .unwrap();
    let ledger_id = handle.ledger_id;
    codec.wait_entered(1).await;

    assert_eq!(runner.shutdown().await, 1);
    assert!(!runner.wait_idle(Duration::from_millis(50)).await);

    codec.open();
    assert!(runner.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(handle.outcome().await, JobOutcome::Cancelled);
    assert!(runner.running_jobs().await.is_empty());
    assert_eq!(codec.renders.load(Ordering::SeqCst), 1);

    let row = gallery.ledger().get_row(ledger_id).unwrap().unwrap();
    assert_eq!(row.success, Some(false));
}
