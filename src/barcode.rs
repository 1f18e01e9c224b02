use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Barcode symbologies understood by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarcodeFormat {
    Aztec,
    Codabar,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[serde(rename = "CODE_128")]
    Code128,
    DataMatrix,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "EAN_13")]
    Ean13,
    Itf,
    #[serde(rename = "PDF_417")]
    Pdf417,
    QrCode,
    #[serde(rename = "UPC_A")]
    UpcA,
    #[serde(rename = "UPC_E")]
    UpcE,
}

impl BarcodeFormat {
    pub const ALL: [BarcodeFormat; 13] = [
        BarcodeFormat::Aztec,
        BarcodeFormat::Codabar,
        BarcodeFormat::Code39,
        BarcodeFormat::Code93,
        BarcodeFormat::Code128,
        BarcodeFormat::DataMatrix,
        BarcodeFormat::Ean8,
        BarcodeFormat::Ean13,
        BarcodeFormat::Itf,
        BarcodeFormat::Pdf417,
        BarcodeFormat::QrCode,
        BarcodeFormat::UpcA,
        BarcodeFormat::UpcE,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::Aztec => "AZTEC",
            BarcodeFormat::Codabar => "CODABAR",
            BarcodeFormat::Code39 => "CODE_39",
            BarcodeFormat::Code93 => "CODE_93",
            BarcodeFormat::Code128 => "CODE_128",
            BarcodeFormat::DataMatrix => "DATA_MATRIX",
            BarcodeFormat::Ean8 => "EAN_8",
            BarcodeFormat::Ean13 => "EAN_13",
            BarcodeFormat::Itf => "ITF",
            BarcodeFormat::Pdf417 => "PDF_417",
            BarcodeFormat::QrCode => "QR_CODE",
            BarcodeFormat::UpcA => "UPC_A",
            BarcodeFormat::UpcE => "UPC_E",
        }
    }

    /// Parse host-supplied format names, skipping anything unknown.
    pub fn parse_list<S: AsRef<str>>(values: &[S]) -> Vec<BarcodeFormat> {
        values
            .iter()
            .filter_map(|value| value.as_ref().parse().ok())
            .collect()
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarcodeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BarcodeFormat::ALL
            .iter()
            .copied()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| format!("Unknown barcode format: {}", s))
    }
}

/// Semantic type of the decoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarcodeValueType {
    CalendarEvent,
    ContactInfo,
    #[serde(rename = "DRIVERS_LICENSE")]
    DriversLicense,
    Email,
    Geo,
    Isbn,
    Phone,
    Product,
    Sms,
    Text,
    Url,
    Wifi,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LensFacing {
    Front,
    #[default]
    Back,
}

impl fmt::Display for LensFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LensFacing::Front => f.write_str("FRONT"),
            LensFacing::Back => f.write_str("BACK"),
        }
    }
}

/// Analysis resolution presets offered to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "640x480")]
    Sd480,
    #[default]
    #[serde(rename = "1280x720")]
    Hd720,
    #[serde(rename = "1920x1080")]
    Hd1080,
}

impl Resolution {
    /// Map the host's integer preset; unknown values fall back to 1280x720.
    pub fn from_preset(value: i64) -> Self {
        match value {
            0 => Resolution::Sd480,
            2 => Resolution::Hd1080,
            _ => Resolution::Hd720,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Sd480 => (640, 480),
            Resolution::Hd720 => (1280, 720),
            Resolution::Hd1080 => (1920, 1080),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressType {
    Home,
    Unknown,
    Work,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailFormatType {
    Home,
    Unknown,
    Work,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhoneFormatType {
    Fax,
    Home,
    Mobile,
    Unknown,
    Work,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WifiEncryptionType {
    Open,
    Wep,
    Wpa,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address_lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<AddressType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub r#type: EmailFormatType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phone {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<PhoneFormatType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<Email>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_name: Option<PersonName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phones: Vec<Phone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLicense {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuing_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sms {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlBookmark {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wifi {
    pub encryption_type: WifiEncryptionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
}

/// Structured payload attached to a detection, keyed by its value type
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    CalendarEvent(CalendarEvent),
    ContactInfo(ContactInfo),
    DriverLicense(DriverLicense),
    Email(Email),
    Geo(GeoPoint),
    Phone(Phone),
    Sms(Sms),
    Url(UrlBookmark),
    Wifi(Wifi),
}

/// One detection reported by the detector for a single frame.
///
/// Corner points are in frame-pixel space. `raw_value` may legitimately be
/// absent, e.g. when the payload bytes are not valid text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub format: BarcodeFormat,
    pub value_type: BarcodeValueType,
    pub raw_bytes: Option<Vec<u8>>,
    pub raw_value: Option<String>,
    pub display_value: Option<String>,
    pub corner_points: Option<[Point; 4]>,
    pub structured: Option<StructuredValue>,
}

impl RawDetection {
    pub fn new(format: BarcodeFormat) -> Self {
        Self {
            format,
            value_type: BarcodeValueType::Unknown,
            raw_bytes: None,
            raw_value: None,
            display_value: None,
            corner_points: None,
            structured: None,
        }
    }

    /// Text payload with bytes and display value derived from it
    pub fn with_text<S: Into<String>>(mut self, value: S) -> Self {
        let value = value.into();
        self.raw_bytes = Some(value.as_bytes().to_vec());
        self.display_value = Some(value.clone());
        self.raw_value = Some(value);
        self.value_type = BarcodeValueType::Text;
        self
    }

    pub fn with_value_type(mut self, value_type: BarcodeValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_corner_points(mut self, points: [Point; 4]) -> Self {
        self.corner_points = Some(points);
        self
    }

    pub fn with_structured(mut self, value: StructuredValue) -> Self {
        self.structured = Some(value);
        self
    }
}

/// Result shape handed to the bridge for one detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_points: Option<[[i32; 2]; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    pub format: BarcodeFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<String>,
    pub value_type: BarcodeValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_event: Option<CalendarEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<ContactInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_license: Option<DriverLicense>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_point: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Phone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms: Option<Sms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_bookmark: Option<UrlBookmark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi: Option<Wifi>,
}

impl BarcodeResult {
    /// Build the result for a detection whose corner points have already
    /// been mapped into the output space.
    pub fn from_detection(detection: RawDetection, corner_points: Option<[Point; 4]>) -> Self {
        let mut result = Self {
            bytes: detection.raw_bytes,
            corner_points: corner_points.map(|points| points.map(|p| [p.x, p.y])),
            display_value: detection.display_value,
            format: detection.format,
            raw_value: detection.raw_value,
            value_type: detection.value_type,
            calendar_event: None,
            contact_info: None,
            driver_license: None,
            email: None,
            geo_point: None,
            phone: None,
            sms: None,
            url_bookmark: None,
            wifi: None,
        };

        match detection.structured {
            Some(StructuredValue::CalendarEvent(v)) => result.calendar_event = Some(v),
            Some(StructuredValue::ContactInfo(v)) => result.contact_info = Some(v),
            Some(StructuredValue::DriverLicense(v)) => result.driver_license = Some(v),
            Some(StructuredValue::Email(v)) => result.email = Some(v),
            Some(StructuredValue::Geo(v)) => result.geo_point = Some(v),
            Some(StructuredValue::Phone(v)) => result.phone = Some(v),
            Some(StructuredValue::Sms(v)) => result.sms = Some(v),
            Some(StructuredValue::Url(v)) => result.url_bookmark = Some(v),
            Some(StructuredValue::Wifi(v)) => result.wifi = Some(v),
            None => {}
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_list_skips_unknown() {
        let formats = BarcodeFormat::parse_list(&["QR_CODE", "NOT_A_FORMAT", "EAN_13"]);
        assert_eq!(formats, vec![BarcodeFormat::QrCode, BarcodeFormat::Ean13]);
    }

    #[test]
    fn test_format_serde_names_match_display() {
        for format in BarcodeFormat::ALL {
            let json = serde_json::to_string(&format).unwrap();
            assert_eq!(json, format!("\"{}\"", format.as_str()));
        }
    }

    #[test]
    fn test_resolution_presets() {
        assert_eq!(Resolution::from_preset(0).dimensions(), (640, 480));
        assert_eq!(Resolution::from_preset(1).dimensions(), (1280, 720));
        assert_eq!(Resolution::from_preset(2).dimensions(), (1920, 1080));
        assert_eq!(Resolution::from_preset(42), Resolution::Hd720);
    }

    #[test]
    fn test_result_shape() {
        let detection = RawDetection::new(BarcodeFormat::QrCode)
            .with_text("WIFI:S:home;T:WPA;P:secret;;")
            .with_value_type(BarcodeValueType::Wifi)
            .with_structured(StructuredValue::Wifi(Wifi {
                encryption_type: WifiEncryptionType::Wpa,
                password: Some("secret".to_string()),
                ssid: Some("home".to_string()),
            }));
        let points = [
            Point::new(1, 2),
            Point::new(3, 4),
            Point::new(5, 6),
            Point::new(7, 8),
        ];

        let result = BarcodeResult::from_detection(detection, Some(points));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["format"], "QR_CODE");
        assert_eq!(json["valueType"], "WIFI");
        assert_eq!(json["rawValue"], "WIFI:S:home;T:WPA;P:secret;;");
        assert_eq!(json["cornerPoints"][3][1], 8);
        assert_eq!(json["wifi"]["encryptionType"], "WPA");
        assert!(json.get("contactInfo").is_none());
    }

    #[test]
    fn test_result_without_corner_points_omits_field() {
        let result = BarcodeResult::from_detection(RawDetection::new(BarcodeFormat::Ean8), None);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("cornerPoints").is_none());
        assert!(json.get("rawValue").is_none());
        assert_eq!(json["valueType"], "UNKNOWN");
    }
}
