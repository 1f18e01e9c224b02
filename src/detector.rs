use crate::barcode::{BarcodeFormat, RawDetection};
use crate::error::DetectorError;
use crate::frame::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options a detector is created with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorOptions {
    /// Formats to look for; empty means all formats
    #[serde(default)]
    pub formats: Vec<BarcodeFormat>,
}

impl DetectorOptions {
    pub fn new(formats: Vec<BarcodeFormat>) -> Self {
        Self { formats }
    }

    pub fn accepts(&self, format: BarcodeFormat) -> bool {
        self.formats.is_empty() || self.formats.contains(&format)
    }

    pub fn effective_formats(&self) -> Vec<BarcodeFormat> {
        if self.formats.is_empty() {
            BarcodeFormat::ALL.to_vec()
        } else {
            self.formats.clone()
        }
    }
}

/// Decoder for one frame at a time.
///
/// Returns the frame's detections, [`DetectorError::Canceled`] when the call
/// was abandoned, or [`DetectorError::Failed`] with a message for the host.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError>;
}

/// Creates detectors bound to a set of options
pub trait DetectorProvider: Send + Sync {
    fn create(&self, options: &DetectorOptions) -> Result<Arc<dyn Detector>, DetectorError>;
}

/// Options for the one-shot UI scanner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeScannerOptions {
    pub formats: Vec<BarcodeFormat>,
    pub auto_zoom: bool,
}

/// Platform-provided scanner UI that returns a single detection
#[async_trait]
pub trait CodeScanner: Send + Sync {
    async fn scan(&self, options: &CodeScannerOptions) -> Result<RawDetection, DetectorError>;
}

#[cfg(feature = "qr")]
pub use qr::{QrDetector, QrDetectorProvider};

#[cfg(feature = "qr")]
mod qr {
    use super::*;
    use crate::barcode::{
        BarcodeValueType, Email, EmailFormatType, GeoPoint, Phone, Sms, StructuredValue,
        UrlBookmark, Wifi, WifiEncryptionType,
    };
    use crate::geometry::Point;
    use tracing::{debug, trace};

    /// QR code detector over the frame's greyscale plane
    pub struct QrDetector {
        options: DetectorOptions,
    }

    impl QrDetector {
        pub fn new(options: DetectorOptions) -> Result<Self, DetectorError> {
            if !options.accepts(BarcodeFormat::QrCode) {
                let requested: Vec<&str> = options.formats.iter().map(|f| f.as_str()).collect();
                return Err(DetectorError::Unsupported {
                    format: requested.join(","),
                });
            }
            Ok(Self { options })
        }

        pub fn options(&self) -> &DetectorOptions {
            &self.options
        }
    }

    #[async_trait]
    impl Detector for QrDetector {
        fn name(&self) -> &str {
            "rqrr"
        }

        async fn process(&self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
            if !frame.validate_size() {
                return Err(DetectorError::failed(format!(
                    "Frame buffer too small for {}x{} {:?}",
                    frame.width, frame.height, frame.format
                )));
            }

            let plane = frame.luma_plane();
            let (width, height) = (frame.width as usize, frame.height as usize);
            let sequence = frame.sequence;

            let detections = tokio::task::spawn_blocking(move || {
                decode_plane(&plane, width, height)
            })
            .await
            .map_err(|e| DetectorError::failed(format!("QR decode task failed: {}", e)))?;

            trace!("Frame {}: {} QR detections", sequence, detections.len());
            Ok(detections)
        }
    }

    fn decode_plane(plane: &[u8], width: usize, height: usize) -> Vec<RawDetection> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            plane.get(y * width + x).copied().unwrap_or(0)
        });

        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| {
                let corners = [0, 1, 2, 3].map(|i| Point::new(grid.bounds[i].x, grid.bounds[i].y));
                match grid.decode() {
                    Ok((_, content)) => Some(classify(content).with_corner_points(corners)),
                    Err(e) => {
                        debug!("Skipping undecodable QR grid: {}", e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Derive value type and structured payload from well-known QR prefixes
    pub(super) fn classify(content: String) -> RawDetection {
        let detection = RawDetection::new(BarcodeFormat::QrCode).with_text(content.clone());
        let upper = content.to_ascii_uppercase();

        if upper.starts_with("HTTP://") || upper.starts_with("HTTPS://") {
            return detection
                .with_value_type(BarcodeValueType::Url)
                .with_structured(StructuredValue::Url(UrlBookmark {
                    url: Some(content),
                    title: None,
                }));
        }

        if upper.starts_with("WIFI:") {
            return detection
                .with_value_type(BarcodeValueType::Wifi)
                .with_structured(StructuredValue::Wifi(parse_wifi(&content[5..])));
        }

        if upper.starts_with("MAILTO:") {
            let (address, query) = split_query(&content[7..]);
            return detection
                .with_value_type(BarcodeValueType::Email)
                .with_structured(StructuredValue::Email(Email {
                    address: non_empty(address),
                    body: query_param(query, "body"),
                    subject: query_param(query, "subject"),
                    r#type: EmailFormatType::Unknown,
                }));
        }

        if upper.starts_with("TEL:") {
            return detection
                .with_value_type(BarcodeValueType::Phone)
                .with_structured(StructuredValue::Phone(Phone {
                    number: non_empty(&content[4..]),
                    r#type: None,
                }));
        }

        if upper.starts_with("SMSTO:") {
            let mut parts = content[6..].splitn(2, ':');
            let phone_number = parts.next().and_then(non_empty);
            let message = parts.next().and_then(non_empty);
            return detection
                .with_value_type(BarcodeValueType::Sms)
                .with_structured(StructuredValue::Sms(Sms {
                    phone_number,
                    message,
                }));
        }

        if upper.starts_with("GEO:") {
            let (coords, _) = split_query(&content[4..]);
            let mut parts = coords.split(',');
            let latitude = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
            let longitude = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
            if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
                return detection
                    .with_value_type(BarcodeValueType::Geo)
                    .with_structured(StructuredValue::Geo(GeoPoint {
                        latitude,
                        longitude,
                    }));
            }
        }

        detection
    }

    fn parse_wifi(body: &str) -> Wifi {
        let mut wifi = Wifi {
            encryption_type: WifiEncryptionType::Open,
            password: None,
            ssid: None,
        };

        for field in body.split(';') {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key {
                "S" => wifi.ssid = non_empty(value),
                "P" => wifi.password = non_empty(value),
                "T" => {
                    wifi.encryption_type = match value.to_ascii_uppercase().as_str() {
                        "WEP" => WifiEncryptionType::Wep,
                        "WPA" | "WPA2" | "WPA3" => WifiEncryptionType::Wpa,
                        _ => WifiEncryptionType::Open,
                    }
                }
                _ => {}
            }
        }

        wifi
    }

    fn split_query(value: &str) -> (&str, &str) {
        value.split_once('?').unwrap_or((value, ""))
    }

    fn query_param(query: &str, name: &str) -> Option<String> {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| non_empty(value))
    }

    fn non_empty(value: &str) -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// Provider handing out QR detectors
    #[derive(Debug, Default, Clone)]
    pub struct QrDetectorProvider;

    impl DetectorProvider for QrDetectorProvider {
        fn create(&self, options: &DetectorOptions) -> Result<Arc<dyn Detector>, DetectorError> {
            Ok(Arc::new(QrDetector::new(options.clone())?))
        }
    }
}
