use thiserror::Error;

/// Messages surfaced verbatim to the command surface.
pub mod messages {
    pub const SCAN_CANCELED: &str = "scan canceled.";
    pub const PATH_MISSING: &str = "path must be provided.";
    pub const LOAD_IMAGE_FAILED: &str = "The image could not be loaded.";
    pub const ZOOM_RATIO_MISSING: &str = "zoomRatio must be provided.";
    pub const NO_ACTIVE_SCAN_SESSION: &str = "There is no active scan session.";
    pub const PERMISSION_DENIED: &str = "User denied access to camera.";
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    ModuleInstall(#[from] ModuleInstallError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),

    #[error("{}", messages::SCAN_CANCELED)]
    ScanCanceled,

    #[error("{}", messages::PATH_MISSING)]
    PathMissing,

    #[error("{}", messages::LOAD_IMAGE_FAILED)]
    ImageLoadFailed,

    #[error("{}", messages::ZOOM_RATIO_MISSING)]
    ZoomRatioMissing,

    #[error("{}", messages::NO_ACTIVE_SCAN_SESSION)]
    NoActiveScanSession,

    #[error("{}", messages::PERMISSION_DENIED)]
    PermissionDenied,

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ScanError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Frame-level detector failures are recovered locally by the analysis
    /// loop. Everything else needs the caller to re-invoke the command.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::Detector(DetectorError::Failed { .. })
                | ScanError::Detector(DetectorError::Canceled)
        )
    }
}

/// Camera acquisition and hardware control failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Failed to bind camera: {details}")]
    BindFailed { details: String },

    #[error("Camera control failed: {details}")]
    Control { details: String },

    #[error("The bound camera has no torch")]
    TorchUnavailable,
}

/// Three-way detector outcome: success is `Ok`, the rest lands here
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("{}", messages::SCAN_CANCELED)]
    Canceled,

    #[error("{message}")]
    Failed { message: String },

    #[error("Detector does not support format {format}")]
    Unsupported { format: String },
}

impl DetectorError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Optional module availability and install failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleInstallError {
    #[error("The Google {module} Module is not available. You must install it first using the {install_method} method.")]
    NotAvailable {
        module: String,
        install_method: String,
    },

    #[error("The Google {module} Module is already installed.")]
    AlreadyInstalled { module: String },

    #[error("The Google {module} Module installation was canceled.")]
    Canceled { module: String },

    #[error("The Google {module} Module installation failed.")]
    Failed { module: String },

    #[error("Module install request failed: {details}")]
    Request { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_messages_are_verbatim() {
        assert_eq!(ScanError::ScanCanceled.to_string(), "scan canceled.");
        assert_eq!(ScanError::PathMissing.to_string(), "path must be provided.");
        assert_eq!(
            ScanError::ImageLoadFailed.to_string(),
            "The image could not be loaded."
        );
        assert_eq!(
            ScanError::ZoomRatioMissing.to_string(),
            "zoomRatio must be provided."
        );
        assert_eq!(
            ScanError::NoActiveScanSession.to_string(),
            "There is no active scan session."
        );
        assert_eq!(
            ScanError::PermissionDenied.to_string(),
            "User denied access to camera."
        );
    }

    #[test]
    fn test_module_messages() {
        let err = ModuleInstallError::AlreadyInstalled {
            module: "Barcode Scanner".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The Google Barcode Scanner Module is already installed."
        );

        let err = ModuleInstallError::NotAvailable {
            module: "Barcode Scanner".to_string(),
            install_method: "installGoogleBarcodeScannerModule".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The Google Barcode Scanner Module is not available. You must install it first using the installGoogleBarcodeScannerModule method."
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ScanError::from(DetectorError::failed("blurry")).is_recoverable());
        assert!(!ScanError::PermissionDenied.is_recoverable());
        assert!(!ScanError::from(CameraError::BindFailed {
            details: "busy".to_string()
        })
        .is_recoverable());
    }
}
