use super::actor::{SessionActor, SessionCommand};
use super::types::{ScanSettings, SessionSnapshot, SessionState};
use crate::camera::{CameraProvider, HostSurface, NoopHostSurface};
use crate::detector::DetectorProvider;
use crate::error::{Result, ScanError};
use crate::events::EventBus;
use crate::geometry::{FixedScreen, ScreenMetrics};
use crate::stabilizer::{EmitPolicy, StabilizationFilter, DEFAULT_VOTE_THRESHOLD};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Handle to the session actor.
///
/// All session mutation runs on the actor task, one command at a time, with
/// analysis completions interleaved between commands. Cloning the handle is
/// cheap; the actor stops and releases the camera once the last handle drops.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionController {
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::new()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| ScanError::component("session", "controller task has stopped"))?;
        response
            .await
            .map_err(|_| ScanError::component("session", "controller dropped the request"))
    }

    /// Start a scan session, superseding any running one
    pub async fn start_scan(&self, settings: ScanSettings) -> Result<()> {
        self.request(|reply| SessionCommand::StartScan { settings, reply })
            .await?
    }

    /// Stop the session. Safe to call in any state.
    pub async fn stop_scan(&self) -> Result<()> {
        self.request(|reply| SessionCommand::StopScan { reply }).await
    }

    pub async fn enable_torch(&self) -> Result<()> {
        self.request(|reply| SessionCommand::SetTorch {
            enabled: true,
            reply,
        })
        .await?
    }

    pub async fn disable_torch(&self) -> Result<()> {
        self.request(|reply| SessionCommand::SetTorch {
            enabled: false,
            reply,
        })
        .await?
    }

    pub async fn toggle_torch(&self) -> Result<()> {
        self.request(|reply| SessionCommand::ToggleTorch { reply })
            .await?
    }

    pub async fn is_torch_enabled(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::IsTorchEnabled { reply })
            .await
    }

    pub async fn set_zoom_ratio(&self, ratio: f32) -> Result<()> {
        self.request(|reply| SessionCommand::SetZoomRatio { ratio, reply })
            .await?
    }

    pub async fn zoom_ratio(&self) -> Result<f32> {
        self.request(|reply| SessionCommand::GetZoomRatio { reply })
            .await?
    }

    pub async fn min_zoom_ratio(&self) -> Result<f32> {
        self.request(|reply| SessionCommand::GetMinZoomRatio { reply })
            .await?
    }

    pub async fn max_zoom_ratio(&self) -> Result<f32> {
        self.request(|reply| SessionCommand::GetMaxZoomRatio { reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    pub async fn state(&self) -> Result<SessionState> {
        Ok(self.snapshot().await?.state)
    }
}

/// Builder for the session controller
pub struct SessionControllerBuilder {
    camera_provider: Option<Arc<dyn CameraProvider>>,
    detector_provider: Option<Arc<dyn DetectorProvider>>,
    host: Arc<dyn HostSurface>,
    screen: Arc<dyn ScreenMetrics>,
    event_bus: Option<EventBus>,
    vote_threshold: u32,
    emit_policy: EmitPolicy,
    command_capacity: usize,
}

impl SessionControllerBuilder {
    pub fn new() -> Self {
        Self {
            camera_provider: None,
            detector_provider: None,
            host: Arc::new(NoopHostSurface),
            screen: Arc::new(FixedScreen(None)),
            event_bus: None,
            vote_threshold: DEFAULT_VOTE_THRESHOLD,
            emit_policy: EmitPolicy::default(),
            command_capacity: 32,
        }
    }

    pub fn camera_provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.camera_provider = Some(provider);
        self
    }

    pub fn detector_provider(mut self, provider: Arc<dyn DetectorProvider>) -> Self {
        self.detector_provider = Some(provider);
        self
    }

    pub fn host_surface(mut self, host: Arc<dyn HostSurface>) -> Self {
        self.host = host;
        self
    }

    pub fn screen_metrics(mut self, screen: Arc<dyn ScreenMetrics>) -> Self {
        self.screen = screen;
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn vote_threshold(mut self, threshold: u32) -> Self {
        self.vote_threshold = threshold;
        self
    }

    pub fn emit_policy(mut self, policy: EmitPolicy) -> Self {
        self.emit_policy = policy;
        self
    }

    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    /// Spawn the session actor on the current tokio runtime
    pub fn build(self) -> Result<SessionController> {
        let camera_provider = self
            .camera_provider
            .ok_or_else(|| ScanError::component("session", "camera provider is required"))?;
        let detector_provider = self
            .detector_provider
            .ok_or_else(|| ScanError::component("session", "detector provider is required"))?;
        let event_bus = self.event_bus.unwrap_or_else(|| EventBus::new(64));

        let (commands_tx, commands_rx) = mpsc::channel(self.command_capacity);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            camera_provider,
            detector_provider,
            host: self.host,
            screen: self.screen,
            event_bus,
            state: SessionState::Idle,
            active: None,
            settings: None,
            filter: StabilizationFilter::new(self.vote_threshold, self.emit_policy),
            torch_enabled: false,
            completions: completions_tx,
        };

        info!(
            "Starting session controller (vote threshold {}, {:?})",
            self.vote_threshold, self.emit_policy
        );
        tokio::spawn(actor.run(commands_rx, completions_rx));

        Ok(SessionController {
            commands: commands_tx,
        })
    }
}

impl Default for SessionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
