//! In-process stand-ins for the platform collaborators, for tests and headless runs.

use crate::analysis::FrameSink;
use crate::barcode::RawDetection;
use crate::camera::{CameraBindRequest, CameraHandle, CameraProvider, HostSurface, PermissionState};
use crate::detector::{CodeScanner, CodeScannerOptions, Detector, DetectorOptions, DetectorProvider};
use crate::error::{CameraError, DetectorError, ModuleInstallError};
use crate::frame::{Frame, FrameFormat, Rotation};
use crate::geometry::Size;
use crate::module_install::{
    InstallResponse, InstallStatusListener, InstallStatusUpdate, ModuleInstallClient,
    OptionalModule,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

enum DetectorBehavior {
    Returning(Vec<RawDetection>),
    Failing(String),
    /// Never completes
    Pending,
}

/// Detector with a fixed behaviour that counts its calls
pub struct MockDetector {
    behavior: DetectorBehavior,
    calls: AtomicU64,
}

impl MockDetector {
    pub fn returning(detections: Vec<RawDetection>) -> Self {
        Self::with_behavior(DetectorBehavior::Returning(detections))
    }

    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::with_behavior(DetectorBehavior::Failing(message.into()))
    }

    pub fn pending() -> Self {
        Self::with_behavior(DetectorBehavior::Pending)
    }

    fn with_behavior(behavior: DetectorBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for MockDetector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn process(&self, _frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            DetectorBehavior::Returning(detections) => Ok(detections.clone()),
            DetectorBehavior::Failing(message) => Err(DetectorError::failed(message.clone())),
            DetectorBehavior::Pending => std::future::pending().await,
        }
    }
}

/// Provider that hands out one shared detector and records the options used
pub struct MockDetectorProvider {
    detector: Arc<MockDetector>,
    last_options: Mutex<Option<DetectorOptions>>,
}

impl MockDetectorProvider {
    pub fn new(detector: Arc<MockDetector>) -> Self {
        Self {
            detector,
            last_options: Mutex::new(None),
        }
    }

    pub fn last_options(&self) -> Option<DetectorOptions> {
        self.last_options.lock().clone()
    }
}

impl DetectorProvider for MockDetectorProvider {
    fn create(&self, options: &DetectorOptions) -> Result<Arc<dyn Detector>, DetectorError> {
        *self.last_options.lock() = Some(options.clone());
        Ok(self.detector.clone())
    }
}

/// Observable state shared between a mock camera provider and its handles
#[derive(Debug)]
pub struct MockCameraState {
    pub permission: PermissionState,
    pub permission_after_request: PermissionState,
    pub permission_requests: usize,
    pub fail_bind: bool,
    /// Torch and zoom calls fail with a control error
    pub fail_control: bool,
    pub torch_available: bool,
    pub torch_enabled: bool,
    pub zoom_ratio: f32,
    pub min_zoom_ratio: f32,
    pub max_zoom_ratio: f32,
    pub binds: usize,
    pub unbinds: usize,
    pub bound: bool,
    pub last_request: Option<CameraBindRequest>,
}

impl Default for MockCameraState {
    fn default() -> Self {
        Self {
            permission: PermissionState::Granted,
            permission_after_request: PermissionState::Granted,
            permission_requests: 0,
            fail_bind: false,
            fail_control: false,
            torch_available: true,
            torch_enabled: false,
            zoom_ratio: 1.0,
            min_zoom_ratio: 1.0,
            max_zoom_ratio: 8.0,
            binds: 0,
            unbinds: 0,
            bound: false,
            last_request: None,
        }
    }
}

/// Camera provider that never touches hardware.
///
/// Frames are pushed by the test through [`MockCameraProvider::push_frame`].
#[derive(Default)]
pub struct MockCameraProvider {
    state: Arc<Mutex<MockCameraState>>,
    sink: Mutex<Option<FrameSink>>,
    sequence: AtomicU64,
}

impl MockCameraProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permission(permission: PermissionState, after_request: PermissionState) -> Self {
        let provider = Self::default();
        {
            let mut state = provider.state.lock();
            state.permission = permission;
            state.permission_after_request = after_request;
        }
        provider
    }

    pub fn set_fail_bind(&self, fail: bool) {
        self.state.lock().fail_bind = fail;
    }

    /// Change the shared camera state, e.g. the zoom range or torch unit
    pub fn update(&self, f: impl FnOnce(&mut MockCameraState)) {
        f(&mut self.state.lock())
    }

    /// Run a closure against the shared camera state
    pub fn inspect<T>(&self, f: impl FnOnce(&MockCameraState) -> T) -> T {
        f(&self.state.lock())
    }

    /// Deliver a luma frame of the requested size to the bound sink.
    /// Returns whether the analysis loop accepted it.
    pub fn push_frame(&self) -> bool {
        let size = self
            .state
            .lock()
            .last_request
            .map(|request| request.target_size())
            .unwrap_or(Size::new(4, 4));
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let frame = Frame::new(
            sequence,
            vec![0u8; FrameFormat::Luma8.buffer_len(size.width, size.height)],
            size.width,
            size.height,
            FrameFormat::Luma8,
            Rotation::Rotate90,
        );
        self.push(frame)
    }

    pub fn push(&self, frame: Frame) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => sink.submit(frame),
            None => false,
        }
    }
}

#[async_trait]
impl CameraProvider for MockCameraProvider {
    async fn is_supported(&self) -> bool {
        true
    }

    async fn is_torch_available(&self) -> bool {
        self.state.lock().torch_available
    }

    async fn permission_state(&self) -> PermissionState {
        self.state.lock().permission
    }

    async fn request_permission(&self) -> PermissionState {
        let mut state = self.state.lock();
        state.permission_requests += 1;
        state.permission = state.permission_after_request;
        state.permission
    }

    async fn bind(
        &self,
        request: CameraBindRequest,
        sink: FrameSink,
    ) -> Result<Box<dyn CameraHandle>, CameraError> {
        let mut state = self.state.lock();
        if state.fail_bind {
            return Err(CameraError::BindFailed {
                details: "camera in use".to_string(),
            });
        }
        state.binds += 1;
        state.bound = true;
        state.last_request = Some(request);
        drop(state);

        *self.sink.lock() = Some(sink);
        debug!("Mock camera bound with {:?}", request);

        Ok(Box::new(MockCameraHandle {
            state: Arc::clone(&self.state),
            size: request.target_size(),
        }))
    }
}

pub struct MockCameraHandle {
    state: Arc<Mutex<MockCameraState>>,
    size: Size,
}

#[async_trait]
impl CameraHandle for MockCameraHandle {
    fn has_torch(&self) -> bool {
        self.state.lock().torch_available
    }

    async fn enable_torch(&mut self, enabled: bool) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.fail_control {
            return Err(CameraError::Control {
                details: "torch control rejected".to_string(),
            });
        }
        state.torch_enabled = enabled;
        Ok(())
    }

    fn zoom_ratio(&self) -> f32 {
        self.state.lock().zoom_ratio
    }

    fn min_zoom_ratio(&self) -> f32 {
        self.state.lock().min_zoom_ratio
    }

    fn max_zoom_ratio(&self) -> f32 {
        self.state.lock().max_zoom_ratio
    }

    async fn set_zoom_ratio(&mut self, ratio: f32) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.fail_control {
            return Err(CameraError::Control {
                details: "zoom control rejected".to_string(),
            });
        }
        state.zoom_ratio = ratio;
        Ok(())
    }

    fn analysis_size(&self) -> Size {
        self.size
    }

    async fn unbind(&mut self) {
        let mut state = self.state.lock();
        state.unbinds += 1;
        state.bound = false;
    }
}

/// Host surface that records background changes
#[derive(Debug, Default)]
pub struct MockHostSurface {
    hidden: AtomicBool,
    hides: AtomicUsize,
    shows: AtomicUsize,
}

impl MockHostSurface {
    pub fn is_background_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn hides(&self) -> usize {
        self.hides.load(Ordering::SeqCst)
    }

    pub fn shows(&self) -> usize {
        self.shows.load(Ordering::SeqCst)
    }
}

impl HostSurface for MockHostSurface {
    fn hide_background(&self) {
        self.hidden.store(true, Ordering::SeqCst);
        self.hides.fetch_add(1, Ordering::SeqCst);
    }

    fn show_background(&self) {
        self.hidden.store(false, Ordering::SeqCst);
        self.shows.fetch_add(1, Ordering::SeqCst);
    }
}

/// Module installer that replays a scripted sequence of status updates
pub struct MockModuleInstallClient {
    available: AtomicBool,
    already_installed: bool,
    script: Mutex<Vec<InstallStatusUpdate>>,
    submission_error: Mutex<Option<String>>,
    unregister_calls: AtomicUsize,
}

impl MockModuleInstallClient {
    pub fn new(already_installed: bool) -> Self {
        Self {
            available: AtomicBool::new(already_installed),
            already_installed,
            script: Mutex::new(Vec::new()),
            submission_error: Mutex::new(None),
            unregister_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn script(&self, updates: Vec<InstallStatusUpdate>) {
        *self.script.lock() = updates;
    }

    pub fn fail_submission<S: Into<String>>(&self, details: S) {
        *self.submission_error.lock() = Some(details.into());
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleInstallClient for MockModuleInstallClient {
    async fn are_modules_available(
        &self,
        _module: OptionalModule,
    ) -> Result<bool, ModuleInstallError> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn install_modules(
        &self,
        module: OptionalModule,
        listener: Arc<dyn InstallStatusListener>,
    ) -> Result<InstallResponse, ModuleInstallError> {
        if let Some(details) = self.submission_error.lock().clone() {
            return Err(ModuleInstallError::Request { details });
        }

        if self.already_installed {
            return Ok(InstallResponse {
                already_installed: true,
            });
        }

        let updates = std::mem::take(&mut *self.script.lock());
        debug!("Replaying {} install updates for {}", updates.len(), module);
        tokio::spawn(async move {
            for update in updates {
                tokio::task::yield_now().await;
                listener.on_status_update(update);
            }
        });

        Ok(InstallResponse {
            already_installed: false,
        })
    }

    fn unregister_listener(&self, _listener_id: Uuid) {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// One-shot scanner UI returning a fixed outcome
pub struct MockCodeScanner {
    outcome: Result<RawDetection, DetectorError>,
    last_options: Mutex<Option<CodeScannerOptions>>,
}

impl MockCodeScanner {
    pub fn new(outcome: Result<RawDetection, DetectorError>) -> Self {
        Self {
            outcome,
            last_options: Mutex::new(None),
        }
    }

    pub fn last_options(&self) -> Option<CodeScannerOptions> {
        self.last_options.lock().clone()
    }
}

#[async_trait]
impl CodeScanner for MockCodeScanner {
    async fn scan(&self, options: &CodeScannerOptions) -> Result<RawDetection, DetectorError> {
        *self.last_options.lock() = Some(options.clone());
        self.outcome.clone()
    }
}
