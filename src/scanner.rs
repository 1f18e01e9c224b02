//! Command surface exposed to the host bridge.
//!
//! Option structs mirror what the host sends, with every field optional.
//! Required fields are checked here, before any asynchronous work starts.

use crate::barcode::{BarcodeFormat, BarcodeResult, LensFacing, Resolution};
use crate::camera::{CameraProvider, HostSurface, NoopHostSurface, PermissionState};
use crate::config::ScannerConfig;
use crate::detector::{CodeScanner, CodeScannerOptions, DetectorOptions, DetectorProvider};
use crate::error::{DetectorError, Result, ScanError};
use crate::events::{EventBus, EventFilter, EventReceiver};
use crate::frame::Frame;
use crate::geometry::{FixedScreen, ScreenMetrics};
use crate::module_install::{ModuleInstallClient, ModuleInstallController, OptionalModule};
use crate::session::{ScanSettings, SessionController, SessionSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanOptions {
    #[serde(default)]
    pub formats: Vec<String>,
    pub lens_facing: Option<String>,
    /// Resolution preset: 0 = 640x480, 1 = 1280x720, 2 = 1920x1080
    pub resolution: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadBarcodesFromImageOptions {
    pub path: Option<String>,
    #[serde(default)]
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub auto_zoom: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetZoomRatioOptions {
    pub zoom_ratio: Option<f32>,
}

fn map_detector_error(error: DetectorError) -> ScanError {
    match error {
        DetectorError::Canceled => ScanError::ScanCanceled,
        other => ScanError::Detector(other),
    }
}

/// Decode the image at `path` with a detector from `provider`
pub async fn read_barcodes_from_path(
    provider: &dyn DetectorProvider,
    path: &str,
    formats: Vec<BarcodeFormat>,
) -> Result<Vec<BarcodeResult>> {
    let frame = Frame::from_image_path(path)?;
    let detector = provider
        .create(&DetectorOptions::new(formats))
        .map_err(map_detector_error)?;

    let detections = detector.process(&frame).await.map_err(map_detector_error)?;
    debug!("{} barcodes read from {}", detections.len(), path);

    Ok(detections
        .into_iter()
        .map(|detection| {
            let corners = detection.corner_points;
            BarcodeResult::from_detection(detection, corners)
        })
        .collect())
}

pub struct Scanner {
    session: SessionController,
    camera_provider: Arc<dyn CameraProvider>,
    detector_provider: Arc<dyn DetectorProvider>,
    code_scanner: Option<Arc<dyn CodeScanner>>,
    /// Installers per optional module; empty when the decoders are bundled
    modules: HashMap<OptionalModule, ModuleInstallController>,
    event_bus: EventBus,
    defaults: ScanSettings,
}

impl Scanner {
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::new()
    }

    fn settings_from(&self, options: StartScanOptions) -> ScanSettings {
        let formats = if options.formats.is_empty() {
            self.defaults.formats.clone()
        } else {
            BarcodeFormat::parse_list(&options.formats)
        };
        let lens_facing = match options.lens_facing.as_deref() {
            Some("FRONT") => LensFacing::Front,
            Some(_) => LensFacing::Back,
            None => self.defaults.lens_facing,
        };
        let resolution = options
            .resolution
            .map(Resolution::from_preset)
            .unwrap_or(self.defaults.resolution);

        ScanSettings {
            formats,
            lens_facing,
            resolution,
        }
    }

    pub async fn start_scan(&self, options: StartScanOptions) -> Result<()> {
        let settings = self.settings_from(options);
        self.session.start_scan(settings).await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.session.stop_scan().await
    }

    /// Decode a still image without a session. Corner points stay in image
    /// pixel space.
    pub async fn read_barcodes_from_image(
        &self,
        options: ReadBarcodesFromImageOptions,
    ) -> Result<Vec<BarcodeResult>> {
        let path = match options.path.as_deref() {
            Some(path) if !path.is_empty() => path,
            _ => return Err(ScanError::PathMissing),
        };
        let formats = BarcodeFormat::parse_list(&options.formats);

        read_barcodes_from_path(self.detector_provider.as_ref(), path, formats).await
    }

    /// Run the platform scanner UI for a single code
    pub async fn scan(&self, options: ScanOptions) -> Result<BarcodeResult> {
        let module = OptionalModule::BarcodeScanner;
        if !self.is_module_available(module).await? {
            return Err(module.not_available_error().into());
        }

        let scanner = self
            .code_scanner
            .as_ref()
            .ok_or_else(|| ScanError::component("scanner", "no scanner UI available"))?;

        let detection = scanner
            .scan(&CodeScannerOptions {
                formats: BarcodeFormat::parse_list(&options.formats),
                auto_zoom: options.auto_zoom,
            })
            .await
            .map_err(map_detector_error)?;

        let corners = detection.corner_points;
        Ok(BarcodeResult::from_detection(detection, corners))
    }

    pub async fn is_supported(&self) -> bool {
        self.camera_provider.is_supported().await
    }

    pub async fn check_permissions(&self) -> PermissionState {
        self.camera_provider.permission_state().await
    }

    pub async fn request_permissions(&self) -> PermissionState {
        self.camera_provider.request_permission().await
    }

    pub async fn enable_torch(&self) -> Result<()> {
        self.session.enable_torch().await
    }

    pub async fn disable_torch(&self) -> Result<()> {
        self.session.disable_torch().await
    }

    pub async fn toggle_torch(&self) -> Result<()> {
        self.session.toggle_torch().await
    }

    pub async fn is_torch_enabled(&self) -> Result<bool> {
        self.session.is_torch_enabled().await
    }

    pub async fn is_torch_available(&self) -> bool {
        self.camera_provider.is_torch_available().await
    }

    pub async fn set_zoom_ratio(&self, options: SetZoomRatioOptions) -> Result<()> {
        let ratio = options.zoom_ratio.ok_or(ScanError::ZoomRatioMissing)?;
        self.session.set_zoom_ratio(ratio).await
    }

    pub async fn get_zoom_ratio(&self) -> Result<f32> {
        self.session.zoom_ratio().await
    }

    pub async fn get_min_zoom_ratio(&self) -> Result<f32> {
        self.session.min_zoom_ratio().await
    }

    pub async fn get_max_zoom_ratio(&self) -> Result<f32> {
        self.session.max_zoom_ratio().await
    }

    /// Whether `module` can be used. Without an installer every module
    /// counts as bundled.
    pub async fn is_module_available(&self, module: OptionalModule) -> Result<bool> {
        match self.modules.get(&module) {
            Some(controller) => Ok(controller.check_availability().await?),
            None => Ok(true),
        }
    }

    /// Install `module`, publishing progress events until it finishes
    pub async fn install_module(&self, module: OptionalModule) -> Result<()> {
        match self.modules.get(&module) {
            Some(controller) => Ok(controller.install().await?),
            None => {
                debug!("No installer for the {} module; reporting it installed", module);
                Err(module.already_installed_error().into())
            }
        }
    }

    pub async fn is_google_module_available(&self) -> Result<bool> {
        self.is_module_available(OptionalModule::BarcodeScanner).await
    }

    pub async fn install_google_module(&self) -> Result<()> {
        self.install_module(OptionalModule::BarcodeScanner).await
    }

    pub async fn is_document_scanner_module_available(&self) -> Result<bool> {
        self.is_module_available(OptionalModule::DocumentScanner).await
    }

    pub async fn install_document_scanner_module(&self) -> Result<()> {
        self.install_module(OptionalModule::DocumentScanner).await
    }

    pub async fn is_subject_segmentation_module_available(&self) -> Result<bool> {
        self.is_module_available(OptionalModule::SubjectSegmentation).await
    }

    pub async fn install_subject_segmentation_module(&self) -> Result<()> {
        self.install_module(OptionalModule::SubjectSegmentation).await
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventReceiver {
        self.event_bus.receiver(filter, "bridge")
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub async fn session_snapshot(&self) -> Result<SessionSnapshot> {
        self.session.snapshot().await
    }
}

pub struct ScannerBuilder {
    config: ScannerConfig,
    camera_provider: Option<Arc<dyn CameraProvider>>,
    detector_provider: Option<Arc<dyn DetectorProvider>>,
    code_scanner: Option<Arc<dyn CodeScanner>>,
    module_client: Option<Arc<dyn ModuleInstallClient>>,
    host: Arc<dyn HostSurface>,
    screen: Option<Arc<dyn ScreenMetrics>>,
    event_bus: Option<EventBus>,
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self {
            config: ScannerConfig::default(),
            camera_provider: None,
            detector_provider: None,
            code_scanner: None,
            module_client: None,
            host: Arc::new(NoopHostSurface),
            screen: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn camera_provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.camera_provider = Some(provider);
        self
    }

    pub fn detector_provider(mut self, provider: Arc<dyn DetectorProvider>) -> Self {
        self.detector_provider = Some(provider);
        self
    }

    pub fn code_scanner(mut self, scanner: Arc<dyn CodeScanner>) -> Self {
        self.code_scanner = Some(scanner);
        self
    }

    /// Installer for unbundled decoder modules; without one every module
    /// counts as always available
    pub fn module_client(mut self, client: Arc<dyn ModuleInstallClient>) -> Self {
        self.module_client = Some(client);
        self
    }

    pub fn host_surface(mut self, host: Arc<dyn HostSurface>) -> Self {
        self.host = host;
        self
    }

    /// Defaults to the configured screen size
    pub fn screen_metrics(mut self, screen: Arc<dyn ScreenMetrics>) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<Scanner> {
        self.config.validate()?;

        let camera_provider = self
            .camera_provider
            .ok_or_else(|| ScanError::component("scanner", "camera provider is required"))?;
        let detector_provider = self
            .detector_provider
            .ok_or_else(|| ScanError::component("scanner", "detector provider is required"))?;

        let event_bus = self.event_bus.unwrap_or_else(|| {
            if self.config.system.debug_events {
                EventBus::with_debug_logging(self.config.system.event_bus_capacity)
            } else {
                EventBus::new(self.config.system.event_bus_capacity)
            }
        });
        let screen = self
            .screen
            .unwrap_or_else(|| Arc::new(FixedScreen(self.config.screen_size())));

        let session = SessionController::builder()
            .camera_provider(Arc::clone(&camera_provider))
            .detector_provider(Arc::clone(&detector_provider))
            .host_surface(self.host)
            .screen_metrics(screen)
            .event_bus(event_bus.clone())
            .vote_threshold(self.config.stabilizer.vote_threshold)
            .emit_policy(self.config.stabilizer.emit_policy)
            .command_capacity(self.config.system.command_capacity)
            .build()?;

        let modules = match self.module_client {
            Some(client) => OptionalModule::ALL
                .into_iter()
                .map(|module| {
                    let controller =
                        ModuleInstallController::new(module, Arc::clone(&client), event_bus.clone());
                    (module, controller)
                })
                .collect(),
            None => HashMap::new(),
        };

        info!("Scanner ready");

        Ok(Scanner {
            session,
            camera_provider,
            detector_provider,
            code_scanner: self.code_scanner,
            modules,
            event_bus,
            defaults: ScanSettings {
                formats: self.config.scan.formats,
                lens_facing: self.config.scan.lens_facing,
                resolution: self.config.scan.resolution,
            },
        })
    }
}

impl Default for ScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
