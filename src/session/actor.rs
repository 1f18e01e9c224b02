use super::types::{ScanSettings, SessionSnapshot, SessionState};
use crate::analysis::{AnalysisCompletion, AnalysisLoop, CompletionReceiver, CompletionSender};
use crate::barcode::BarcodeResult;
use crate::camera::{CameraBindRequest, CameraHandle, CameraProvider, HostSurface, PermissionState};
use crate::detector::{DetectorOptions, DetectorProvider};
use crate::error::{DetectorError, Result, ScanError};
use crate::events::{EventBus, ScannerEvent};
use crate::geometry::{normalize_corner_points, ScreenMetrics};
use crate::stabilizer::StabilizationFilter;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Requests serialized through the session actor
pub(super) enum SessionCommand {
    StartScan {
        settings: ScanSettings,
        reply: oneshot::Sender<Result<()>>,
    },
    StopScan {
        reply: oneshot::Sender<()>,
    },
    SetTorch {
        enabled: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    ToggleTorch {
        reply: oneshot::Sender<Result<()>>,
    },
    IsTorchEnabled {
        reply: oneshot::Sender<bool>,
    },
    SetZoomRatio {
        ratio: f32,
        reply: oneshot::Sender<Result<()>>,
    },
    GetZoomRatio {
        reply: oneshot::Sender<Result<f32>>,
    },
    GetMinZoomRatio {
        reply: oneshot::Sender<Result<f32>>,
    },
    GetMaxZoomRatio {
        reply: oneshot::Sender<Result<f32>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Resources owned by the one running session
pub(super) struct ActiveSession {
    pub id: Uuid,
    pub camera: Box<dyn CameraHandle>,
    pub analysis: Arc<AnalysisLoop>,
    pub cancel: CancellationToken,
}

/// Single owner of all session-scoped state
pub(super) struct SessionActor {
    pub camera_provider: Arc<dyn CameraProvider>,
    pub detector_provider: Arc<dyn DetectorProvider>,
    pub host: Arc<dyn HostSurface>,
    pub screen: Arc<dyn ScreenMetrics>,
    pub event_bus: EventBus,
    pub state: SessionState,
    pub active: Option<ActiveSession>,
    pub settings: Option<ScanSettings>,
    pub filter: StabilizationFilter,
    pub torch_enabled: bool,
    pub completions: CompletionSender,
}

impl SessionActor {
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut completions: CompletionReceiver,
    ) {
        debug!("Session actor started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
        }

        // Every controller handle is gone; release the camera if still held
        self.stop().await;
        debug!("Session actor stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartScan { settings, reply } => {
                let _ = reply.send(self.start(settings).await);
            }
            SessionCommand::StopScan { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            SessionCommand::SetTorch { enabled, reply } => {
                let _ = reply.send(self.set_torch(enabled).await);
            }
            SessionCommand::ToggleTorch { reply } => {
                let _ = reply.send(self.toggle_torch().await);
            }
            SessionCommand::IsTorchEnabled { reply } => {
                let _ = reply.send(self.torch_enabled);
            }
            SessionCommand::SetZoomRatio { ratio, reply } => {
                let _ = reply.send(self.set_zoom_ratio(ratio).await);
            }
            SessionCommand::GetZoomRatio { reply } => {
                let _ = reply.send(self.zoom_ratio());
            }
            SessionCommand::GetMinZoomRatio { reply } => {
                let _ = reply.send(self.min_zoom_ratio());
            }
            SessionCommand::GetMaxZoomRatio { reply } => {
                let _ = reply.send(self.max_zoom_ratio());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!("Session state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.emit(ScannerEvent::SessionStateChanged { state });
    }

    fn emit(&self, event: ScannerEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            debug!("Failed to publish scanner event: {}", e);
        }
    }

    async fn ensure_permission(&self) -> Result<()> {
        let state = match self.camera_provider.permission_state().await {
            PermissionState::Prompt => {
                debug!("Camera permission undecided, requesting");
                self.camera_provider.request_permission().await
            }
            state => state,
        };

        match state {
            PermissionState::Granted => Ok(()),
            _ => {
                warn!("Camera permission denied");
                Err(ScanError::PermissionDenied)
            }
        }
    }

    pub async fn start(&mut self, settings: ScanSettings) -> Result<()> {
        if self.state != SessionState::Idle {
            info!("Superseding running scan session");
            self.stop().await;
        }

        self.ensure_permission().await?;

        self.host.hide_background();
        self.set_state(SessionState::Starting);

        let detector = match self
            .detector_provider
            .create(&DetectorOptions::new(settings.formats.clone()))
        {
            Ok(detector) => detector,
            Err(e) => {
                error!("Failed to create detector: {}", e);
                self.abort_start();
                return Err(e.into());
            }
        };

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let analysis = Arc::new(AnalysisLoop::new(
            session_id,
            detector,
            cancel.clone(),
            self.completions.clone(),
        ));

        let request = CameraBindRequest {
            lens_facing: settings.lens_facing,
            resolution: settings.resolution,
        };

        match self.camera_provider.bind(request, analysis.sink()).await {
            Ok(camera) => {
                let delivered = camera.analysis_size();
                info!(
                    "Scan session {} active ({} camera, {}x{}, {} formats)",
                    session_id,
                    settings.lens_facing,
                    delivered.width,
                    delivered.height,
                    if settings.formats.is_empty() {
                        "all".to_string()
                    } else {
                        settings.formats.len().to_string()
                    }
                );
                self.filter.reset();
                self.active = Some(ActiveSession {
                    id: session_id,
                    camera,
                    analysis,
                    cancel,
                });
                self.settings = Some(settings);
                self.set_state(SessionState::Active);
                Ok(())
            }
            Err(e) => {
                error!("Failed to acquire camera: {}", e);
                cancel.cancel();
                self.abort_start();
                Err(e.into())
            }
        }
    }

    fn abort_start(&mut self) {
        self.host.show_background();
        self.set_state(SessionState::Idle);
    }

    /// Tear down whatever is running and return to `Idle`
    pub async fn stop(&mut self) {
        if self.state != SessionState::Idle {
            self.set_state(SessionState::Stopping);
        }

        if let Some(mut active) = self.active.take() {
            active.cancel.cancel();

            if self.torch_enabled {
                if let Err(e) = active.camera.enable_torch(false).await {
                    warn!("Failed to switch torch off: {}", e);
                }
            }

            active.camera.unbind().await;
            info!(
                "Scan session {} stopped ({:?})",
                active.id,
                active.analysis.stats()
            );
        }

        self.torch_enabled = false;
        self.filter.reset();
        self.settings = None;
        self.host.show_background();
        self.set_state(SessionState::Idle);
    }

    fn handle_completion(&mut self, completion: AnalysisCompletion) {
        let current = self
            .active
            .as_ref()
            .filter(|active| !active.cancel.is_cancelled())
            .map(|active| active.id);

        if current != Some(completion.session_id) {
            debug!(
                "Discarding result for frame {} of inactive session {}",
                completion.frame.sequence, completion.session_id
            );
            return;
        }

        match completion.result {
            Ok(detections) => {
                let confirmed = self.filter.filter(detections);
                if confirmed.is_empty() {
                    return;
                }

                let image_size = Some(completion.frame.size());
                let screen_size = self.screen.screen_size();
                let barcodes: Vec<BarcodeResult> = confirmed
                    .into_iter()
                    .map(|detection| {
                        let corners = detection
                            .corner_points
                            .map(|points| normalize_corner_points(points, image_size, screen_size));
                        BarcodeResult::from_detection(detection, corners)
                    })
                    .collect();

                for barcode in &barcodes {
                    self.emit(ScannerEvent::BarcodeScanned {
                        barcode: barcode.clone(),
                    });
                }
                self.emit(ScannerEvent::BarcodesScanned { barcodes });
            }
            Err(DetectorError::Canceled) => {
                debug!("Analysis of frame {} canceled", completion.frame.sequence);
            }
            Err(e) => {
                self.emit(ScannerEvent::ScanError {
                    message: e.to_string(),
                });
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.active.as_ref().map(|active| active.id),
            has_camera: self.active.is_some(),
            analysis_size: self.active.as_ref().map(|active| active.camera.analysis_size()),
            torch_enabled: self.torch_enabled,
            tracked_values: self.filter.table().len(),
            settings: self.settings.clone(),
            analysis: self.active.as_ref().map(|active| active.analysis.stats()),
        }
    }
}
