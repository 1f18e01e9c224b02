use super::actor::SessionActor;
use crate::error::{CameraError, Result};
use tracing::{debug, info, warn};

impl SessionActor {
    /// No-op without a bound camera. Enabling fails on a camera without a
    /// flash unit.
    pub async fn set_torch(&mut self, enabled: bool) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            debug!("No camera bound, ignoring torch request");
            return Ok(());
        };

        if !active.camera.has_torch() {
            if enabled {
                warn!("Torch requested on a camera without one");
                return Err(CameraError::TorchUnavailable.into());
            }
            return Ok(());
        }

        active.camera.enable_torch(enabled).await?;
        self.torch_enabled = enabled;
        info!("Torch {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    pub async fn toggle_torch(&mut self) -> Result<()> {
        let enabled = !self.torch_enabled;
        self.set_torch(enabled).await
    }
}
