pub mod analysis;
pub mod barcode;
pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod mock;
pub mod module_install;
pub mod scanner;
pub mod session;
pub mod stabilizer;

pub use analysis::{AnalysisLoop, AnalysisStats, FrameSink};
pub use barcode::{BarcodeFormat, BarcodeResult, BarcodeValueType, LensFacing, RawDetection, Resolution};
pub use camera::{CameraBindRequest, CameraHandle, CameraProvider, HostSurface, PermissionState};
pub use config::ScannerConfig;
pub use detector::{CodeScanner, Detector, DetectorOptions, DetectorProvider};
#[cfg(feature = "qr")]
pub use detector::{QrDetector, QrDetectorProvider};
pub use error::{Result, ScanError};
pub use events::{EventBus, EventFilter, EventReceiver, ScannerEvent};
pub use frame::{Frame, FrameFormat, Rotation};
pub use geometry::{normalize_corner_points, Point, ScreenMetrics, Size};
pub use module_install::{InstallState, InstallStatus, ModuleInstallController, OptionalModule};
pub use scanner::{
    ReadBarcodesFromImageOptions, ScanOptions, Scanner, ScannerBuilder, SetZoomRatioOptions,
    StartScanOptions,
};
pub use session::{ScanSettings, SessionController, SessionState};
pub use stabilizer::{EmitPolicy, StabilizationFilter, VoteTable};
