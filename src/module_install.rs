//! Availability checks and installs for optional on-device decoder modules.
//!
//! Each install request gets its own progress listener. The listener forwards
//! every status update to the event bus and unregisters itself exactly once
//! when the request reaches a terminal state.

use crate::error::ModuleInstallError;
use crate::events::{EventBus, ScannerEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Decoder features shipped as separately installable modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionalModule {
    BarcodeScanner,
    DocumentScanner,
    SubjectSegmentation,
}

impl OptionalModule {
    pub const ALL: [OptionalModule; 3] = [
        OptionalModule::BarcodeScanner,
        OptionalModule::DocumentScanner,
        OptionalModule::SubjectSegmentation,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            OptionalModule::BarcodeScanner => "Barcode Scanner",
            OptionalModule::DocumentScanner => "Document Scanner",
            OptionalModule::SubjectSegmentation => "Subject Segmentation",
        }
    }

    /// Host command that installs this module
    pub fn install_method(&self) -> &'static str {
        match self {
            OptionalModule::BarcodeScanner => "installGoogleBarcodeScannerModule",
            OptionalModule::DocumentScanner => "installGoogleDocumentScannerModule",
            OptionalModule::SubjectSegmentation => "installSubjectSegmentationScannerModule",
        }
    }

    pub fn not_available_error(&self) -> ModuleInstallError {
        ModuleInstallError::NotAvailable {
            module: self.display_name().to_string(),
            install_method: self.install_method().to_string(),
        }
    }

    pub fn already_installed_error(&self) -> ModuleInstallError {
        ModuleInstallError::AlreadyInstalled {
            module: self.display_name().to_string(),
        }
    }
}

impl fmt::Display for OptionalModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Platform install status, carried on progress events by its numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallStatus {
    Unknown,
    Pending,
    Downloading,
    Canceled,
    Completed,
    Failed,
    Installing,
    DownloadPaused,
}

impl InstallStatus {
    pub fn code(&self) -> i32 {
        match self {
            InstallStatus::Unknown => 0,
            InstallStatus::Pending => 1,
            InstallStatus::Downloading => 2,
            InstallStatus::Canceled => 3,
            InstallStatus::Completed => 4,
            InstallStatus::Failed => 5,
            InstallStatus::Installing => 6,
            InstallStatus::DownloadPaused => 7,
        }
    }

    /// Unrecognised codes map to `Unknown`
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => InstallStatus::Pending,
            2 => InstallStatus::Downloading,
            3 => InstallStatus::Canceled,
            4 => InstallStatus::Completed,
            5 => InstallStatus::Failed,
            6 => InstallStatus::Installing,
            7 => InstallStatus::DownloadPaused,
            _ => InstallStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstallStatus::Canceled | InstallStatus::Completed | InstallStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Completed,
    Canceled,
    Failed,
}

/// Lifecycle of one install request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallState {
    #[default]
    NotRequested,
    /// Progress in percent when the platform reports download sizes
    Installing(Option<u8>),
    Terminal(InstallOutcome),
}

/// One status update from the platform installer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallStatusUpdate {
    pub status: InstallStatus,
    pub bytes_downloaded: Option<u64>,
    pub total_bytes_to_download: Option<u64>,
}

impl InstallStatusUpdate {
    pub fn new(status: InstallStatus) -> Self {
        Self {
            status,
            bytes_downloaded: None,
            total_bytes_to_download: None,
        }
    }

    pub fn with_progress(mut self, bytes_downloaded: u64, total_bytes_to_download: u64) -> Self {
        self.bytes_downloaded = Some(bytes_downloaded);
        self.total_bytes_to_download = Some(total_bytes_to_download);
        self
    }

    /// Whole-percent download progress, when progress info is present
    pub fn progress(&self) -> Option<u8> {
        match (self.bytes_downloaded, self.total_bytes_to_download) {
            (Some(done), Some(total)) if total > 0 => {
                let percent = (done.min(total) as u128 * 100) / total as u128;
                Some(percent as u8)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallResponse {
    pub already_installed: bool,
}

/// Receives status updates for one install request
pub trait InstallStatusListener: Send + Sync {
    fn id(&self) -> Uuid;

    fn on_status_update(&self, update: InstallStatusUpdate);
}

/// Platform module installer
#[async_trait]
pub trait ModuleInstallClient: Send + Sync {
    async fn are_modules_available(&self, module: OptionalModule)
        -> Result<bool, ModuleInstallError>;

    /// Submit an install request. Errors here mean the request was never
    /// accepted and no status updates will follow.
    async fn install_modules(
        &self,
        module: OptionalModule,
        listener: Arc<dyn InstallStatusListener>,
    ) -> Result<InstallResponse, ModuleInstallError>;

    fn unregister_listener(&self, listener_id: Uuid);
}

/// Listener that publishes progress and resolves the request on a terminal status
pub struct ModuleInstallProgressListener {
    id: Uuid,
    module: OptionalModule,
    client: Arc<dyn ModuleInstallClient>,
    event_bus: EventBus,
    state: Arc<Mutex<InstallState>>,
    finished: AtomicBool,
    outcome: Mutex<Option<oneshot::Sender<InstallOutcome>>>,
}

impl ModuleInstallProgressListener {
    fn new(
        module: OptionalModule,
        client: Arc<dyn ModuleInstallClient>,
        event_bus: EventBus,
        state: Arc<Mutex<InstallState>>,
        outcome: oneshot::Sender<InstallOutcome>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            module,
            client,
            event_bus,
            state,
            finished: AtomicBool::new(false),
            outcome: Mutex::new(Some(outcome)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Unregister from the client; only the first call has any effect
    fn unregister_once(&self) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!("Unregistering {} install listener {}", self.module, self.id);
        self.client.unregister_listener(self.id);
        true
    }
}

impl InstallStatusListener for ModuleInstallProgressListener {
    fn id(&self) -> Uuid {
        self.id
    }

    fn on_status_update(&self, update: InstallStatusUpdate) {
        if self.is_finished() {
            warn!(
                "Ignoring {:?} for {} install after terminal state",
                update.status, self.module
            );
            return;
        }

        let progress = update.progress();
        if let Err(e) = self.event_bus.publish(ScannerEvent::ModuleInstallProgress {
            module: self.module,
            state: update.status,
            progress,
        }) {
            debug!("Failed to publish install progress: {}", e);
        }

        let outcome = match update.status {
            InstallStatus::Completed => InstallOutcome::Completed,
            InstallStatus::Canceled => InstallOutcome::Canceled,
            InstallStatus::Failed => InstallOutcome::Failed,
            _ => {
                *self.state.lock() = InstallState::Installing(progress);
                return;
            }
        };

        if !self.unregister_once() {
            return;
        }

        *self.state.lock() = InstallState::Terminal(outcome);
        if let Some(sender) = self.outcome.lock().take() {
            let _ = sender.send(outcome);
        }
    }
}

/// Availability and install state machine for one optional module
pub struct ModuleInstallController {
    module: OptionalModule,
    client: Arc<dyn ModuleInstallClient>,
    event_bus: EventBus,
    state: Arc<Mutex<InstallState>>,
}

impl ModuleInstallController {
    pub fn new(
        module: OptionalModule,
        client: Arc<dyn ModuleInstallClient>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            module,
            client,
            event_bus,
            state: Arc::new(Mutex::new(InstallState::NotRequested)),
        }
    }

    pub fn module(&self) -> OptionalModule {
        self.module
    }

    /// State of the most recent install request
    pub fn state(&self) -> InstallState {
        *self.state.lock()
    }

    pub async fn check_availability(&self) -> Result<bool, ModuleInstallError> {
        let available = self.client.are_modules_available(self.module).await?;
        debug!("{} module available: {}", self.module, available);
        Ok(available)
    }

    /// Install the module and wait for the request to finish.
    ///
    /// A module that turns out to be installed already is reported as
    /// [`ModuleInstallError::AlreadyInstalled`].
    pub async fn install(&self) -> Result<(), ModuleInstallError> {
        info!("Requesting install of the {} module", self.module);

        let (sender, receiver) = oneshot::channel();
        let listener = Arc::new(ModuleInstallProgressListener::new(
            self.module,
            Arc::clone(&self.client),
            self.event_bus.clone(),
            Arc::clone(&self.state),
            sender,
        ));
        *self.state.lock() = InstallState::Installing(None);

        let response = match self
            .client
            .install_modules(self.module, listener.clone())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("{} module install request failed: {}", self.module, e);
                listener.unregister_once();
                *self.state.lock() = InstallState::Terminal(InstallOutcome::Failed);
                return Err(e);
            }
        };

        if response.already_installed {
            info!("{} module already installed", self.module);
            listener.unregister_once();
            *self.state.lock() = InstallState::Terminal(InstallOutcome::Completed);
            return Err(self.module.already_installed_error());
        }

        let outcome = receiver.await.map_err(|_| ModuleInstallError::Request {
            details: format!("{} install listener dropped before completion", self.module),
        })?;

        match outcome {
            InstallOutcome::Completed => {
                info!("{} module installed", self.module);
                Ok(())
            }
            InstallOutcome::Canceled => Err(ModuleInstallError::Canceled {
                module: self.module.display_name().to_string(),
            }),
            InstallOutcome::Failed => Err(ModuleInstallError::Failed {
                module: self.module.display_name().to_string(),
            }),
        }
    }
}
