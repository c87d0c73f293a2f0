//! Dispatcher Integration Tests
//!
//! Routing of completed uploads to the image and voice pipelines.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use autotag::agent::PhotoAgent;
use autotag::core::{
    Dispatched, Dispatcher, ImagePipeline, PipelineError, SafetyLimits, VoicePipeline,
};
use autotag::domain::{MediaKind, TransferEvent, UploadCompleted, UploadIncomplete};

use common::{OverlapSite, PanickingSite, RecordingSite, ScriptedProvider, StubTranscriber};

fn dispatcher(
    site: Arc<dyn autotag::adapters::SiteGenerator>,
    transcriber: Arc<StubTranscriber>,
) -> Dispatcher {
    let agent = PhotoAgent::new(ScriptedProvider::new(Vec::new()), SafetyLimits::default());
    let voice = VoicePipeline::new(transcriber, Arc::new(agent), "https://photos.example.com");
    Dispatcher::new(ImagePipeline::new(site), voice)
}

#[test]
fn test_classification() {
    let cases = [
        ("IMG_1.JPG", Some(MediaKind::Image)),
        ("img_1.jpg", Some(MediaKind::Image)),
        ("note.WAV", Some(MediaKind::Voice)),
        ("note.wav", None),
        ("note.mp3", None),
        ("README", None),
    ];

    for (name, expected) in cases {
        assert_eq!(MediaKind::classify(Path::new(name)), expected, "{name}");
    }
}

#[tokio::test]
async fn test_image_upload_rebuilds_site() {
    let site = RecordingSite::new();
    let transcriber = StubTranscriber::new("unused");
    let dispatcher = dispatcher(site.clone(), transcriber.clone());

    let result = dispatcher
        .dispatch(UploadCompleted::new("/srv/galleries/2024-03-05/IMG_1.JPG"))
        .await
        .unwrap();

    assert_eq!(result, Dispatched::Rebuilt);
    assert_eq!(site.runs(), 1);
    assert_eq!(transcriber.calls(), 0);
}

#[tokio::test]
async fn test_unknown_media_is_skipped() {
    let site = RecordingSite::new();
    let transcriber = StubTranscriber::new("unused");
    let dispatcher = dispatcher(site.clone(), transcriber.clone());

    for name in ["note.mp3", "note.wav", "notes.txt"] {
        let result = dispatcher
            .dispatch(UploadCompleted::new(PathBuf::from("/srv/galleries").join(name)))
            .await
            .unwrap();
        assert_eq!(result, Dispatched::Skipped, "{name}");
    }

    assert_eq!(site.runs(), 0);
    assert_eq!(transcriber.calls(), 0);
}

#[tokio::test]
async fn test_incomplete_transfer_is_not_dispatched() {
    let site = RecordingSite::new();
    let dispatcher = Arc::new(dispatcher(site.clone(), StubTranscriber::new("unused")));

    dispatcher
        .clone()
        .handle(TransferEvent::Incomplete(UploadIncomplete {
            path: PathBuf::from("/srv/galleries/2024-03-05/IMG_2.JPG"),
            bytes: 512,
            reason: "connection reset".to_string(),
        }))
        .await;
    assert_eq!(site.runs(), 0);

    dispatcher
        .handle(TransferEvent::Completed(UploadCompleted::new(
            "/srv/galleries/2024-03-05/IMG_2.JPG",
        )))
        .await;
    assert_eq!(site.runs(), 1);
}

#[tokio::test]
async fn test_panicking_pipeline_is_contained() {
    let dispatcher = Arc::new(dispatcher(
        Arc::new(PanickingSite),
        StubTranscriber::new("unused"),
    ));

    let result = dispatcher
        .clone()
        .dispatch_isolated(UploadCompleted::new("/srv/galleries/IMG_1.JPG"))
        .await;
    assert!(matches!(result, Err(PipelineError::Aborted(_))));

    // The dispatcher keeps serving later uploads
    let result = dispatcher
        .dispatch_isolated(UploadCompleted::new("/srv/galleries/note.mp3"))
        .await;
    assert!(matches!(result, Ok(Dispatched::Skipped)));
}

#[tokio::test]
async fn test_hung_pipeline_times_out() {
    let site = RecordingSite::slow(Duration::from_secs(30));
    let dispatcher = Arc::new(
        dispatcher(site.clone(), StubTranscriber::new("unused"))
            .with_dispatch_timeout(Duration::from_millis(50)),
    );

    let result = dispatcher
        .dispatch_isolated(UploadCompleted::new("/srv/galleries/IMG_1.JPG"))
        .await;

    assert!(matches!(result, Err(PipelineError::Timeout(d)) if d == Duration::from_millis(50)));
    assert_eq!(site.runs(), 1);
}

#[tokio::test]
async fn test_concurrent_image_uploads_rebuild_one_at_a_time() {
    let site = OverlapSite::new();
    let dispatcher = Arc::new(dispatcher(site.clone(), StubTranscriber::new("unused")));

    let (first, second) = tokio::join!(
        dispatcher
            .clone()
            .dispatch_isolated(UploadCompleted::new("/srv/galleries/IMG_1.JPG")),
        dispatcher
            .clone()
            .dispatch_isolated(UploadCompleted::new("/srv/galleries/IMG_2.JPG")),
    );

    assert!(matches!(first, Ok(Dispatched::Rebuilt)));
    assert!(matches!(second, Ok(Dispatched::Rebuilt)));
    assert_eq!(site.runs(), 2);
    assert_eq!(site.max_active(), 1);
}
