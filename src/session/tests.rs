use super::*;
use crate::barcode::{BarcodeFormat, LensFacing, RawDetection, Resolution};
use crate::camera::PermissionState;
use crate::error::{CameraError, ScanError};
use crate::events::{EventBus, EventFilter, EventReceiver, ScannerEvent};
use crate::geometry::{FixedScreen, Point, Size};
use crate::mock::{MockCameraProvider, MockDetector, MockDetectorProvider, MockHostSurface};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

struct Harness {
    controller: SessionController,
    camera: Arc<MockCameraProvider>,
    detector: Arc<MockDetector>,
    host: Arc<MockHostSurface>,
    event_bus: EventBus,
}

fn harness_with(camera: MockCameraProvider, detector: MockDetector) -> Harness {
    let camera = Arc::new(camera);
    let detector = Arc::new(detector);
    let host = Arc::new(MockHostSurface::default());
    let event_bus = EventBus::new(256);

    let controller = SessionController::builder()
        .camera_provider(camera.clone())
        .detector_provider(Arc::new(MockDetectorProvider::new(detector.clone())))
        .host_surface(host.clone())
        .screen_metrics(Arc::new(FixedScreen(Some(Size::new(1080, 2400)))))
        .event_bus(event_bus.clone())
        .build()
        .unwrap();

    Harness {
        controller,
        camera,
        detector,
        host,
        event_bus,
    }
}

fn harness(detector: MockDetector) -> Harness {
    harness_with(MockCameraProvider::new(), detector)
}

fn back_camera() -> ScanSettings {
    ScanSettings {
        formats: Vec::new(),
        lens_facing: LensFacing::Back,
        resolution: Resolution::Hd720,
    }
}

/// Push frames until an event passing `receiver` shows up
async fn feed_until_event(harness: &Harness, receiver: &mut EventReceiver) -> ScannerEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            if let Some(event) = receiver.try_recv().unwrap() {
                return event;
            }
            harness.camera.push_frame();
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_stop_scan_is_idempotent() {
    let h = harness(MockDetector::returning(Vec::new()));

    h.controller.stop_scan().await.unwrap();
    h.controller.stop_scan().await.unwrap();

    assert_eq!(h.controller.state().await.unwrap(), SessionState::Idle);
    assert!(!h.host.is_background_hidden());
}

#[tokio::test]
async fn test_start_then_stop_releases_everything() {
    let h = harness(MockDetector::returning(vec![
        RawDetection::new(BarcodeFormat::QrCode).with_text("votes"),
    ]));

    h.controller.start_scan(back_camera()).await.unwrap();

    let snapshot = h.controller.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Active);
    assert!(snapshot.has_camera);
    assert_eq!(snapshot.analysis_size, Some(Size::new(1280, 720)));
    assert_eq!(snapshot.settings, Some(back_camera()));
    assert!(h.host.is_background_hidden());
    assert!(h.camera.inspect(|state| state.bound));

    // Let a few votes accumulate
    let mut accepted = 0;
    timeout(Duration::from_secs(2), async {
        while accepted < 3 {
            if h.camera.push_frame() {
                accepted += 1;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    h.controller.stop_scan().await.unwrap();

    let snapshot = h.controller.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.has_camera);
    assert!(snapshot.analysis_size.is_none());
    assert_eq!(snapshot.tracked_values, 0);
    assert!(snapshot.settings.is_none());
    assert!(!h.host.is_background_hidden());
    assert_eq!(h.camera.inspect(|state| state.unbinds), 1);
}

#[tokio::test]
async fn test_tenth_vote_emits_normalized_barcode() {
    let h = harness(MockDetector::returning(vec![RawDetection::new(
        BarcodeFormat::QrCode,
    )
    .with_text("STABLE")
    .with_corner_points([Point::new(360, 640); 4])]));
    let mut scanned = h
        .event_bus
        .receiver(EventFilter::EventTypes(vec!["barcodeScanned"]), "test");
    let mut batches = h
        .event_bus
        .receiver(EventFilter::EventTypes(vec!["barcodesScanned"]), "test");

    h.controller.start_scan(back_camera()).await.unwrap();

    let event = feed_until_event(&h, &mut scanned).await;
    assert_eq!(h.detector.calls(), 10);

    let barcode = match event {
        ScannerEvent::BarcodeScanned { barcode } => barcode,
        other => panic!("Unexpected event: {:?}", other),
    };
    assert_eq!(barcode.raw_value.as_deref(), Some("STABLE"));
    let corners = barcode.corner_points.unwrap();
    for [x, y] in corners {
        assert!((x - 540).abs() <= 1, "x was {}", x);
        assert!((y - 1200).abs() <= 1, "y was {}", y);
    }

    match batches.try_recv().unwrap() {
        Some(ScannerEvent::BarcodesScanned { barcodes }) => assert_eq!(barcodes.len(), 1),
        other => panic!("Unexpected event: {:?}", other),
    }

    // Past the threshold every analysed frame emits again
    let event = feed_until_event(&h, &mut scanned).await;
    assert!(matches!(event, ScannerEvent::BarcodeScanned { .. }));
    assert_eq!(h.detector.calls(), 11);
}

#[tokio::test]
async fn test_valueless_detection_emits_every_frame() {
    let h = harness(MockDetector::returning(vec![RawDetection::new(
        BarcodeFormat::Pdf417,
    )]));
    let mut scanned = h
        .event_bus
        .receiver(EventFilter::EventTypes(vec!["barcodeScanned"]), "test");

    h.controller.start_scan(back_camera()).await.unwrap();

    feed_until_event(&h, &mut scanned).await;
    assert_eq!(h.detector.calls(), 1);
    feed_until_event(&h, &mut scanned).await;
    assert_eq!(h.detector.calls(), 2);
    assert_eq!(h.controller.snapshot().await.unwrap().tracked_values, 0);
}

#[tokio::test]
async fn test_detector_failure_reports_and_keeps_running() {
    let h = harness(MockDetector::failing("Failed to decode frame"));
    let mut errors = h
        .event_bus
        .receiver(EventFilter::EventTypes(vec!["scanError"]), "test");

    h.controller.start_scan(back_camera()).await.unwrap();

    let event = feed_until_event(&h, &mut errors).await;
    assert_eq!(
        event,
        ScannerEvent::ScanError {
            message: "Failed to decode frame".to_string()
        }
    );

    feed_until_event(&h, &mut errors).await;
    assert_eq!(h.controller.state().await.unwrap(), SessionState::Active);
}

#[tokio::test]
async fn test_completion_after_stop_is_ignored() {
    let h = harness(MockDetector::pending());
    let mut events = h.event_bus.receiver(
        EventFilter::EventTypes(vec!["barcodeScanned", "barcodesScanned", "scanError"]),
        "test",
    );

    h.controller.start_scan(back_camera()).await.unwrap();
    assert!(h.camera.push_frame());
    assert!(!h.camera.push_frame());

    h.controller.stop_scan().await.unwrap();
    assert!(!h.camera.push_frame());

    // Give the canceled analysis a chance to come back through the actor
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.controller.state().await.unwrap(), SessionState::Idle);
    assert!(events.try_recv().unwrap().is_none());
}

#[tokio::test]
async fn test_toggle_torch_twice_restores_state() {
    let h = harness(MockDetector::returning(Vec::new()));
    h.controller.start_scan(back_camera()).await.unwrap();

    assert!(!h.controller.is_torch_enabled().await.unwrap());
    h.controller.toggle_torch().await.unwrap();
    assert!(h.controller.is_torch_enabled().await.unwrap());
    assert!(h.camera.inspect(|state| state.torch_enabled));
    h.controller.toggle_torch().await.unwrap();
    assert!(!h.controller.is_torch_enabled().await.unwrap());
    assert!(!h.camera.inspect(|state| state.torch_enabled));
}

#[tokio::test]
async fn test_torch_off_after_stop() {
    let h = harness(MockDetector::returning(Vec::new()));
    h.controller.start_scan(back_camera()).await.unwrap();

    h.controller.enable_torch().await.unwrap();
    assert!(h.camera.inspect(|state| state.torch_enabled));

    h.controller.stop_scan().await.unwrap();
    assert!(!h.controller.is_torch_enabled().await.unwrap());
    assert!(!h.camera.inspect(|state| state.torch_enabled));
}

#[tokio::test]
async fn test_torch_without_camera_is_noop() {
    let h = harness(MockDetector::returning(Vec::new()));

    h.controller.enable_torch().await.unwrap();
    h.controller.toggle_torch().await.unwrap();
    h.controller.disable_torch().await.unwrap();
    assert!(!h.controller.is_torch_enabled().await.unwrap());
}

#[tokio::test]
async fn test_enable_torch_without_flash_unit_fails() {
    let h = harness(MockDetector::returning(Vec::new()));
    h.camera.update(|state| state.torch_available = false);
    h.controller.start_scan(back_camera()).await.unwrap();

    let err = h.controller.enable_torch().await.unwrap_err();
    assert!(matches!(
        err,
        ScanError::Camera(CameraError::TorchUnavailable)
    ));
    assert!(!h.controller.is_torch_enabled().await.unwrap());

    h.controller.disable_torch().await.unwrap();
    assert!(h.controller.toggle_torch().await.is_err());
}

#[tokio::test]
async fn test_camera_control_failure_is_reported() {
    let h = harness(MockDetector::returning(Vec::new()));
    h.controller.start_scan(back_camera()).await.unwrap();
    h.camera.update(|state| state.fail_control = true);

    assert!(matches!(
        h.controller.enable_torch().await,
        Err(ScanError::Camera(CameraError::Control { .. }))
    ));
    assert!(!h.controller.is_torch_enabled().await.unwrap());
    assert!(matches!(
        h.controller.set_zoom_ratio(2.0).await,
        Err(ScanError::Camera(CameraError::Control { .. }))
    ));
    assert_eq!(h.controller.state().await.unwrap(), SessionState::Active);
}

#[tokio::test]
async fn test_zoom_with_unreported_range() {
    let h = harness(MockDetector::returning(Vec::new()));
    h.camera.update(|state| {
        state.min_zoom_ratio = f32::NAN;
        state.max_zoom_ratio = f32::NAN;
    });
    h.controller.start_scan(back_camera()).await.unwrap();

    h.controller.set_zoom_ratio(3.0).await.unwrap();
    assert_eq!(h.controller.zoom_ratio().await.unwrap(), 3.0);

    h.camera.update(|state| state.max_zoom_ratio = 4.0);
    h.controller.set_zoom_ratio(6.0).await.unwrap();
    assert_eq!(h.controller.zoom_ratio().await.unwrap(), 4.0);
}

#[tokio::test]
async fn test_zoom_requires_session() {
    let h = harness(MockDetector::returning(Vec::new()));

    h.controller.set_zoom_ratio(2.0).await.unwrap();
    assert!(matches!(
        h.controller.zoom_ratio().await,
        Err(ScanError::NoActiveScanSession)
    ));
    assert!(matches!(
        h.controller.min_zoom_ratio().await,
        Err(ScanError::NoActiveScanSession)
    ));
    assert!(matches!(
        h.controller.max_zoom_ratio().await,
        Err(ScanError::NoActiveScanSession)
    ));

    h.controller.start_scan(back_camera()).await.unwrap();
    h.controller.set_zoom_ratio(2.5).await.unwrap();
    assert_eq!(h.controller.zoom_ratio().await.unwrap(), 2.5);
    assert_eq!(h.controller.min_zoom_ratio().await.unwrap(), 1.0);
    assert_eq!(h.controller.max_zoom_ratio().await.unwrap(), 8.0);

    h.controller.set_zoom_ratio(100.0).await.unwrap();
    assert_eq!(h.controller.zoom_ratio().await.unwrap(), 8.0);
}

#[tokio::test]
async fn test_permission_denied() {
    let h = harness_with(
        MockCameraProvider::with_permission(PermissionState::Denied, PermissionState::Denied),
        MockDetector::returning(Vec::new()),
    );

    let err = h.controller.start_scan(back_camera()).await.unwrap_err();
    assert_eq!(err.to_string(), "User denied access to camera.");
    assert_eq!(h.controller.state().await.unwrap(), SessionState::Idle);
    assert_eq!(h.camera.inspect(|state| state.binds), 0);
    assert_eq!(h.host.hides(), 0);
}

#[tokio::test]
async fn test_permission_prompt() {
    let h = harness_with(
        MockCameraProvider::with_permission(PermissionState::Prompt, PermissionState::Granted),
        MockDetector::returning(Vec::new()),
    );
    h.controller.start_scan(back_camera()).await.unwrap();
    assert_eq!(h.camera.inspect(|state| state.permission_requests), 1);

    let h = harness_with(
        MockCameraProvider::with_permission(PermissionState::Prompt, PermissionState::Denied),
        MockDetector::returning(Vec::new()),
    );
    assert!(matches!(
        h.controller.start_scan(back_camera()).await,
        Err(ScanError::PermissionDenied)
    ));
}

#[tokio::test]
async fn test_bind_failure_returns_to_idle() {
    let h = harness(MockDetector::returning(Vec::new()));
    h.camera.set_fail_bind(true);

    let err = h.controller.start_scan(back_camera()).await.unwrap_err();
    assert!(matches!(err, ScanError::Camera(_)));

    let snapshot = h.controller.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.has_camera);
    assert_eq!(h.host.hides(), 1);
    assert!(!h.host.is_background_hidden());
}

#[tokio::test]
async fn test_start_supersedes_running_session() {
    let h = harness(MockDetector::returning(Vec::new()));
    let mut states = h
        .event_bus
        .receiver(EventFilter::EventTypes(vec!["sessionStateChanged"]), "test");

    h.controller.start_scan(back_camera()).await.unwrap();
    let first = h.controller.snapshot().await.unwrap().session_id;

    let front = ScanSettings {
        formats: vec![BarcodeFormat::QrCode],
        lens_facing: LensFacing::Front,
        resolution: Resolution::Hd1080,
    };
    h.controller.start_scan(front.clone()).await.unwrap();

    let snapshot = h.controller.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Active);
    assert_ne!(snapshot.session_id, first);
    assert_eq!(snapshot.settings, Some(front));
    assert_eq!(h.camera.inspect(|state| (state.binds, state.unbinds)), (2, 1));

    let mut seen = Vec::new();
    while let Some(ScannerEvent::SessionStateChanged { state }) = states.try_recv().unwrap() {
        seen.push(state);
    }
    assert_eq!(
        seen,
        vec![
            SessionState::Starting,
            SessionState::Active,
            SessionState::Stopping,
            SessionState::Idle,
            SessionState::Starting,
            SessionState::Active,
        ]
    );
}

#[tokio::test]
async fn test_dropping_controller_releases_camera() {
    let h = harness(MockDetector::returning(Vec::new()));
    h.controller.start_scan(back_camera()).await.unwrap();

    let camera = h.camera.clone();
    drop(h);

    timeout(Duration::from_secs(1), async {
        while camera.inspect(|state| state.bound) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}
