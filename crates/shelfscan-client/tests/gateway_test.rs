//! Integration tests against a loopback gateway.

use axum::body::Bytes as AxumBytes;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use shelfscan_client::pipeline::{ScanHooks, ScanPipeline};
use shelfscan_client::steps::{StepKey, StepStatus};
use shelfscan_client::upload::noop_progress;
use shelfscan_client::GatewayClient;
use shelfscan_core::{
    ErrorPresentation, GatewayConfig, ImageAsset, ScanError, ScanOutcome, UploadProgress,
    UploadStage,
};
use shelfscan_processing::DownscaleService;

async fn spawn_gateway(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_for(base: &str) -> GatewayClient {
    GatewayClient::new(GatewayConfig::new(base).unwrap()).unwrap()
}

fn books_json() -> serde_json::Value {
    serde_json::json!({
        "books": [
            {"title": "The Dispossessed", "author": "Ursula K. Le Guin"},
            {"title": "Dune", "author": "Frank Herbert", "isbn": "9780441172719"}
        ],
        "model_used": "vision-test"
    })
}

fn shelf_photo() -> ImageAsset {
    let mut img = image::RgbaImage::from_pixel(100, 80, image::Rgba([200, 40, 40, 255]));
    for y in 20..60 {
        for x in 20..80 {
            img.put_pixel(x, y, image::Rgba([30, 30, 180, 255]));
        }
    }
    let mut buffer = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut buffer),
        image::ImageFormat::Png,
    )
    .unwrap();
    ImageAsset::new(buffer, "image/png", "shelf.png")
}

#[tokio::test]
async fn upload_success_reports_monotonic_progress() {
    let app = Router::new().route(
        "/api/scan",
        post(|_body: AxumBytes| async { Json(books_json()) }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let reports: Arc<Mutex<Vec<UploadProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let on_progress: shelfscan_client::upload::ProgressCallback =
        Arc::new(move |p| sink.lock().unwrap().push(p));

    let blob = Bytes::from(vec![7u8; 300 * 1024]);
    let outcome = client.upload(blob, on_progress).await.unwrap();

    match outcome {
        ScanOutcome::Books(result) => {
            assert_eq!(result.books.len(), 2);
            assert_eq!(result.model_used, "vision-test");
        }
        ScanOutcome::Raw(raw) => panic!("expected parsed books, got raw: {}", raw),
    }

    let reports = reports.lock().unwrap();
    let uploading: Vec<u8> = reports
        .iter()
        .filter(|p| p.stage == UploadStage::Uploading)
        .map(|p| p.progress)
        .collect();
    assert!(!uploading.is_empty());
    assert!(
        uploading.windows(2).all(|w| w[0] <= w[1]),
        "progress must be non-decreasing: {:?}",
        uploading
    );
    assert_eq!(*uploading.last().unwrap(), 100);
    assert_eq!(reports.last().unwrap().stage, UploadStage::Complete);

    assert!(!client.has_inflight());
}

#[tokio::test]
async fn unparseable_success_body_is_kept_raw() {
    let app = Router::new().route(
        "/api/scan",
        post(|_body: AxumBytes| async { "plain ok" }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let outcome = client
        .upload(Bytes::from_static(b"fake jpeg"), noop_progress())
        .await
        .unwrap();
    match outcome {
        ScanOutcome::Raw(text) => assert_eq!(text, "plain ok"),
        ScanOutcome::Books(_) => panic!("should not parse"),
    }
}

#[tokio::test]
async fn payload_too_large_maps_to_http_413() {
    let app = Router::new().route(
        "/api/scan",
        post(|_body: AxumBytes| async {
            (StatusCode::PAYLOAD_TOO_LARGE, "Max upload is 20 MB").into_response()
        }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let err = client
        .upload(Bytes::from_static(b"x"), noop_progress())
        .await
        .unwrap_err();
    match &err {
        ScanError::Http { status, .. } => assert_eq!(*status, 413),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.user_message().contains("too large"));
}

#[tokio::test]
async fn abort_mid_upload_stops_progress_and_clears_handle() {
    let app = Router::new().route(
        "/api/scan",
        post(|_body: AxumBytes| async {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Json(books_json())
        }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    let on_progress: shelfscan_client::upload::ProgressCallback =
        Arc::new(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

    let session = client.start_upload(Bytes::from(vec![1u8; 1024 * 1024]), on_progress);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    session.cancel();
    let err = session.finish().await.unwrap_err();
    assert!(matches!(err, ScanError::Aborted));
    assert!(!client.has_inflight());

    let at_abort = count.load(Ordering::SeqCst);
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_eq!(count.load(Ordering::SeqCst), at_abort, "no progress after abort");
}

#[tokio::test]
async fn client_abort_cancels_inflight_transfer() {
    let app = Router::new().route(
        "/api/scan",
        post(|_body: AxumBytes| async {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Json(books_json())
        }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let session = client.start_upload(Bytes::from(vec![1u8; 512 * 1024]), noop_progress());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(client.has_inflight());

    client.abort();
    assert!(!client.has_inflight());
    assert!(matches!(session.finish().await, Err(ScanError::Aborted)));
}

#[tokio::test]
async fn network_failure_without_response() {
    // Nothing is listening on this port
    let client = client_for("http://127.0.0.1:1");
    let err = client
        .upload(Bytes::from_static(b"x"), noop_progress())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Network(_)));
}

#[tokio::test]
async fn pipeline_retries_once_after_rate_limit() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let app = Router::new().route(
        "/api/scan",
        post(move |_body: AxumBytes| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        [(header::RETRY_AFTER, "1")],
                        "slow down",
                    )
                        .into_response()
                } else {
                    Json(books_json()).into_response()
                }
            }
        }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let countdowns = Arc::new(AtomicUsize::new(0));
    let countdown_sink = Arc::clone(&countdowns);
    let hooks = ScanHooks {
        on_retry: Some(Arc::new(move |_rx| {
            countdown_sink.fetch_add(1, Ordering::SeqCst);
        })),
        ..Default::default()
    };

    let pipeline = ScanPipeline::new(client, DownscaleService::new()).with_color_extraction(false);
    let report = pipeline
        .scan(shelf_photo(), CancellationToken::new(), &hooks)
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2, "exactly one retry");
    assert_eq!(countdowns.load(Ordering::SeqCst), 1, "one countdown session");
    assert_eq!(report.outcome.books().len(), 2);
    assert!(pipeline
        .steps_snapshot()
        .iter()
        .all(|(_, status)| *status == StepStatus::Done));
}

#[tokio::test]
async fn pipeline_full_scan_narrates_steps_in_order() {
    let app = Router::new().route(
        "/api/scan",
        post(|_body: AxumBytes| async { Json(books_json()) }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let events: Arc<Mutex<Vec<(StepKey, StepStatus)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let hooks = ScanHooks {
        on_step: Some(Arc::new(move |key, status| {
            sink.lock().unwrap().push((key, status));
        })),
        ..Default::default()
    };

    let pipeline = ScanPipeline::new(client, DownscaleService::new());
    let report = pipeline
        .scan(shelf_photo(), CancellationToken::new(), &hooks)
        .await
        .unwrap();

    assert!(!pipeline.is_uploading());
    assert_eq!(report.identities.len(), 2);
    assert_eq!(report.identities[0].title, "The Dispossessed");
    // The photo border is solid red
    let color = report.dominant_color.expect("dominant color");
    assert!(color.r > 0.6, "r = {}", color.r);
    assert!(color.b < 0.4, "b = {}", color.b);

    let events = events.lock().unwrap();
    let activations: Vec<StepKey> = events
        .iter()
        .filter(|(_, status)| *status == StepStatus::Active)
        .map(|(key, _)| *key)
        .collect();
    assert_eq!(activations, StepKey::ALL.to_vec());
    // Every step finished
    for key in StepKey::ALL {
        assert!(events.contains(&(key, StepStatus::Done)));
    }
}

#[tokio::test]
async fn pipeline_rejects_unsupported_files_before_upload() {
    // Gateway that would fail the test if reached
    let app = Router::new().route(
        "/api/scan",
        post(|_body: AxumBytes| async { (StatusCode::INTERNAL_SERVER_ERROR, "must not be called") }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let pipeline = ScanPipeline::new(client, DownscaleService::new());
    let asset = ImageAsset::new(b"hello".to_vec(), "text/plain", "notes.txt");
    let err = pipeline
        .scan(asset, CancellationToken::new(), &ScanHooks::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::Format(_)));
    // Failure resets narration to pending
    assert!(pipeline
        .steps_snapshot()
        .iter()
        .all(|(_, status)| *status == StepStatus::Pending));
}

#[tokio::test]
async fn enrich_forwards_identities() {
    let app = Router::new().route(
        "/api/books/enrich",
        post(|Json(books): Json<Vec<serde_json::Value>>| async move {
            let enriched: Vec<serde_json::Value> = books
                .into_iter()
                .map(|mut book| {
                    book["publisher"] = serde_json::json!("Test House");
                    book
                })
                .collect();
            Json(enriched)
        }),
    );
    let base = spawn_gateway(app).await;
    let client = client_for(&base);

    let identities = vec![shelfscan_core::BookIdentity {
        title: "Dune".to_string(),
        author: Some("Frank Herbert".to_string()),
        isbn: None,
    }];
    let enriched = client.enrich(&identities).await.unwrap();
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].publisher.as_deref(), Some("Test House"));
}
