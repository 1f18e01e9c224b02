use crate::analysis::FrameSink;
use crate::barcode::{LensFacing, Resolution};
use crate::error::CameraError;
use crate::geometry::Size;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Camera permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// The user has not decided yet and may be asked
    Prompt,
}

/// Parameters for acquiring a camera for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraBindRequest {
    pub lens_facing: LensFacing,
    pub resolution: Resolution,
}

impl CameraBindRequest {
    pub fn target_size(&self) -> Size {
        Size::from(self.resolution.dimensions())
    }
}

/// Platform camera subsystem.
///
/// `bind` attaches the sink as the frame consumer and a preview surface, and
/// returns the handle that owns the camera until it is unbound.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Whether the device has any camera at all
    async fn is_supported(&self) -> bool;

    /// Whether the device has a flash unit usable as a torch
    async fn is_torch_available(&self) -> bool;

    async fn permission_state(&self) -> PermissionState;

    /// Ask the user for camera access and return the resulting state
    async fn request_permission(&self) -> PermissionState;

    async fn bind(
        &self,
        request: CameraBindRequest,
        sink: FrameSink,
    ) -> Result<Box<dyn CameraHandle>, CameraError>;
}

/// Exclusive handle to a bound camera
#[async_trait]
pub trait CameraHandle: Send + Sync {
    fn has_torch(&self) -> bool;

    async fn enable_torch(&mut self, enabled: bool) -> Result<(), CameraError>;

    fn zoom_ratio(&self) -> f32;

    fn min_zoom_ratio(&self) -> f32;

    fn max_zoom_ratio(&self) -> f32;

    async fn set_zoom_ratio(&mut self, ratio: f32) -> Result<(), CameraError>;

    /// Frame size the camera actually delivers for analysis
    fn analysis_size(&self) -> Size;

    /// Release camera, preview and frame consumer
    async fn unbind(&mut self);
}

/// Host view hosting the preview behind its own content
pub trait HostSurface: Send + Sync {
    /// Make the host background transparent so the preview shows through
    fn hide_background(&self);

    fn show_background(&self);
}

/// Host surface for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostSurface;

impl HostSurface for NoopHostSurface {
    fn hide_background(&self) {}

    fn show_background(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_request_target_size() {
        let request = CameraBindRequest {
            lens_facing: LensFacing::Back,
            resolution: Resolution::from_preset(0),
        };
        assert_eq!(request.target_size(), Size::new(640, 480));
    }

    #[test]
    fn test_permission_state_names() {
        assert_eq!(
            serde_json::to_string(&PermissionState::Prompt).unwrap(),
            "\"prompt\""
        );
    }
}
