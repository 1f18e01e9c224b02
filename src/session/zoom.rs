use super::actor::SessionActor;
use crate::camera::CameraHandle;
use crate::error::{Result, ScanError};
use tracing::debug;

impl SessionActor {
    fn camera(&self) -> Result<&dyn CameraHandle> {
        self.active
            .as_ref()
            .map(|active| active.camera.as_ref())
            .ok_or(ScanError::NoActiveScanSession)
    }

    /// Set the zoom ratio, clamped to the camera's range. No-op without a
    /// bound camera.
    pub async fn set_zoom_ratio(&mut self, ratio: f32) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            debug!("No camera bound, ignoring zoom request");
            return Ok(());
        };

        let (min, max) = (active.camera.min_zoom_ratio(), active.camera.max_zoom_ratio());
        // f32::max/min skip NaN operands, so a bad range never panics
        let clamped = ratio.max(min).min(max.max(min));
        if clamped != ratio {
            debug!("Zoom ratio {} clamped to {}", ratio, clamped);
        }

        active.camera.set_zoom_ratio(clamped).await?;
        Ok(())
    }

    pub fn zoom_ratio(&self) -> Result<f32> {
        Ok(self.camera()?.zoom_ratio())
    }

    pub fn min_zoom_ratio(&self) -> Result<f32> {
        Ok(self.camera()?.min_zoom_ratio())
    }

    pub fn max_zoom_ratio(&self) -> Result<f32> {
        Ok(self.camera()?.max_zoom_ratio())
    }
}
