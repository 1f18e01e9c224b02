use crate::barcode::BarcodeResult;
use crate::error::EventBusError;
use crate::module_install::{InstallStatus, OptionalModule};
use crate::session::SessionState;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Events emitted from the scanning core to the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum ScannerEvent {
    /// One confirmed detection from the live session
    BarcodeScanned { barcode: BarcodeResult },
    /// All confirmed detections of one analysed frame
    BarcodesScanned { barcodes: Vec<BarcodeResult> },
    /// A single frame failed to decode; the session keeps running
    ScanError { message: String },
    /// Progress update for an optional module install
    ModuleInstallProgress {
        module: OptionalModule,
        state: InstallStatus,
        progress: Option<u8>,
    },
    /// The scan session moved to a new lifecycle state
    SessionStateChanged { state: SessionState },
}

impl ScannerEvent {
    /// Event name as seen by bridge listeners
    pub fn event_name(&self) -> &'static str {
        match self {
            ScannerEvent::BarcodeScanned { .. } => "barcodeScanned",
            ScannerEvent::BarcodesScanned { .. } => "barcodesScanned",
            ScannerEvent::ScanError { .. } => "scanError",
            ScannerEvent::ModuleInstallProgress { .. } => "moduleInstallProgress",
            ScannerEvent::SessionStateChanged { .. } => "sessionStateChanged",
        }
    }

    /// JSON payload handed to bridge listeners
    pub fn payload(&self) -> Value {
        match self {
            ScannerEvent::BarcodeScanned { barcode } => json!({ "barcode": barcode }),
            ScannerEvent::BarcodesScanned { barcodes } => json!({ "barcodes": barcodes }),
            ScannerEvent::ScanError { message } => json!({ "message": message }),
            ScannerEvent::ModuleInstallProgress {
                module,
                state,
                progress,
            } => {
                let mut payload = json!({
                    "module": module,
                    "state": state.code(),
                });
                if let Some(progress) = progress {
                    payload["progress"] = json!(progress);
                }
                payload
            }
            ScannerEvent::SessionStateChanged { state } => json!({ "state": state }),
        }
    }

    pub fn description(&self) -> String {
        match self {
            ScannerEvent::BarcodeScanned { barcode } => format!(
                "Barcode scanned: {} {:?}",
                barcode.format, barcode.raw_value
            ),
            ScannerEvent::BarcodesScanned { barcodes } => {
                format!("{} barcodes scanned", barcodes.len())
            }
            ScannerEvent::ScanError { message } => format!("Scan error: {}", message),
            ScannerEvent::ModuleInstallProgress {
                module,
                state,
                progress,
            } => match progress {
                Some(progress) => format!("{} install {:?} ({}%)", module, state, progress),
                None => format!("{} install {:?}", module, state),
            },
            ScannerEvent::SessionStateChanged { state } => {
                format!("Scan session {:?}", state)
            }
        }
    }
}

/// Broadcast bus carrying scanner events to the bridge
pub struct EventBus {
    sender: broadcast::Sender<ScannerEvent>,
    debug_logging: bool,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter; the name shows up in logs
    pub fn receiver<S: Into<String>>(&self, filter: EventFilter, name: S) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing with nobody listening is not an error; it returns `Ok(0)`.
    pub fn publish(&self, event: ScannerEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            ScannerEvent::ScanError { message } => {
                warn!("Scan error: {}", message);
            }
            ScannerEvent::ModuleInstallProgress { state, .. } if state.is_terminal() => {
                info!("{}", event.description());
            }
            _ => {}
        }

        if self.sender.receiver_count() == 0 {
            trace!("No subscribers for {}", event.event_name());
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    /// Accept only the listed event names
    EventTypes(Vec<&'static str>),
    Custom(fn(&ScannerEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &ScannerEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_name()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScannerEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<ScannerEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next event that passes the filter
    pub async fn recv(&mut self) -> Result<ScannerEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        trace!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive a matching event without blocking
    pub fn try_recv(&mut self) -> Result<Option<ScannerEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::{BarcodeFormat, RawDetection};
    use tokio::time::{timeout, Duration};

    fn scanned(value: &str) -> ScannerEvent {
        ScannerEvent::BarcodeScanned {
            barcode: BarcodeResult::from_detection(
                RawDetection::new(BarcodeFormat::QrCode).with_text(value),
                None,
            ),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus.publish(scanned("hello")).unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            ScannerEvent::BarcodeScanned { barcode } => {
                assert_eq!(barcode.raw_value.as_deref(), Some("hello"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let event_bus = EventBus::new(4);
        assert!(!event_bus.has_subscribers());
        assert_eq!(event_bus.publish(scanned("nobody")).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.receiver(EventFilter::EventTypes(vec!["scanError"]), "test");

        event_bus.publish(scanned("ignored")).unwrap();
        event_bus
            .publish(ScannerEvent::ScanError {
                message: "decode failed".to_string(),
            })
            .unwrap();

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ScannerEvent::ScanError {
                message: "decode failed".to_string()
            }
        );
        assert!(receiver.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_payloads() {
        let event = ScannerEvent::ModuleInstallProgress {
            module: OptionalModule::BarcodeScanner,
            state: InstallStatus::Downloading,
            progress: Some(42),
        };
        assert_eq!(event.event_name(), "moduleInstallProgress");
        let payload = event.payload();
        assert_eq!(payload["state"], 2);
        assert_eq!(payload["progress"], 42);

        let event = ScannerEvent::ModuleInstallProgress {
            module: OptionalModule::BarcodeScanner,
            state: InstallStatus::Pending,
            progress: None,
        };
        assert!(event.payload().get("progress").is_none());

        let payload = scanned("abc").payload();
        assert_eq!(payload["barcode"]["rawValue"], "abc");
    }
}
