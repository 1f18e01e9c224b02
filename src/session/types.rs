use crate::analysis::AnalysisStats;
use crate::barcode::{BarcodeFormat, LensFacing, Resolution};
use crate::geometry::Size;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scan session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Settings a scan session is started with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Formats to detect; empty means all formats
    pub formats: Vec<BarcodeFormat>,
    pub lens_facing: LensFacing,
    pub resolution: Resolution,
}

/// Point-in-time view of the session, for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub has_camera: bool,
    /// Frame size the bound camera delivers for analysis
    pub analysis_size: Option<Size>,
    pub torch_enabled: bool,
    /// Distinct raw values currently holding votes
    pub tracked_values: usize,
    pub settings: Option<ScanSettings>,
    pub analysis: Option<AnalysisStats>,
}
