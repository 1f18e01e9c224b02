//! Analysis loop feeding camera frames to the detector.
//!
//! At most one detector call is outstanding per session. Frames arriving
//! while a call is in flight are dropped on the spot (keep-only-latest), so a
//! slow detector never builds a backlog behind a fast camera.

use crate::barcode::RawDetection;
use crate::detector::Detector;
use crate::error::DetectorError;
use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

/// Outcome of one analysis cycle, delivered to the session owner.
///
/// Dropping the completion releases the frame and then reopens the loop for
/// the next frame, whichever path the completion takes.
pub struct AnalysisCompletion {
    pub session_id: Uuid,
    pub frame: Frame,
    pub result: Result<Vec<RawDetection>, DetectorError>,
    _slot: InFlightSlot,
}

impl std::fmt::Debug for AnalysisCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCompletion")
            .field("session_id", &self.session_id)
            .field("frame", &self.frame)
            .field("result", &self.result)
            .finish()
    }
}

pub type CompletionSender = mpsc::UnboundedSender<AnalysisCompletion>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<AnalysisCompletion>;

/// Holds the single in-flight slot until dropped
struct InFlightSlot {
    in_flight: Arc<AtomicBool>,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct AnalysisCounters {
    received: AtomicU64,
    submitted: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the loop's frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub frames_received: u64,
    pub frames_submitted: u64,
    pub frames_dropped: u64,
}

pub struct AnalysisLoop {
    session_id: Uuid,
    detector: Arc<dyn Detector>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
    completions: CompletionSender,
    runtime: Handle,
    counters: AnalysisCounters,
}

impl AnalysisLoop {
    /// Create a loop for one session. Must be called from within a tokio
    /// runtime; frames may later arrive from any thread.
    pub fn new(
        session_id: Uuid,
        detector: Arc<dyn Detector>,
        cancel: CancellationToken,
        completions: CompletionSender,
    ) -> Self {
        Self {
            session_id,
            detector,
            in_flight: Arc::new(AtomicBool::new(false)),
            cancel,
            completions,
            runtime: Handle::current(),
            counters: AnalysisCounters::default(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn sink(self: &Arc<Self>) -> FrameSink {
        FrameSink {
            analysis: Arc::clone(self),
        }
    }

    /// Whether a detector call is currently outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> AnalysisStats {
        AnalysisStats {
            frames_received: self.counters.received.load(Ordering::Relaxed),
            frames_submitted: self.counters.submitted.load(Ordering::Relaxed),
            frames_dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Accept a frame from the camera. Returns `true` if it was handed to
    /// the detector and `false` if it was dropped.
    pub fn on_frame(&self, frame: Frame) -> bool {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if self.cancel.is_cancelled() {
            trace!("Session {} stopped, dropping frame {}", self.session_id, frame.sequence);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Detector busy, dropping frame {}", frame.sequence);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let slot = InFlightSlot {
            in_flight: Arc::clone(&self.in_flight),
        };
        let session_id = self.session_id;
        let detector = Arc::clone(&self.detector);
        let cancel = self.cancel.clone();
        let completions = self.completions.clone();

        self.runtime.spawn(async move {
            trace!("Analysing frame {} with {}", frame.sequence, detector.name());

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DetectorError::Canceled),
                result = detector.process(&frame) => result,
            };

            let completion = AnalysisCompletion {
                session_id,
                frame,
                result,
                _slot: slot,
            };

            if completions.send(completion).is_err() {
                debug!("Session {} owner gone, discarding analysis result", session_id);
            }
        });

        true
    }
}

/// Frame consumer handed to the camera on bind
#[derive(Clone)]
pub struct FrameSink {
    analysis: Arc<AnalysisLoop>,
}

impl FrameSink {
    pub fn submit(&self, frame: Frame) -> bool {
        self.analysis.on_frame(frame)
    }

    pub fn session_id(&self) -> Uuid {
        self.analysis.session_id()
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("session_id", &self.analysis.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::BarcodeFormat;
    use crate::frame::{FrameFormat, Rotation};
    use crate::mock::MockDetector;
    use tokio::time::{timeout, Duration};

    fn tracked_frame(sequence: u64, released: &Arc<AtomicU64>) -> Frame {
        let released = Arc::clone(released);
        Frame::new(sequence, vec![0u8; 16], 4, 4, FrameFormat::Luma8, Rotation::Rotate0)
            .with_release_hook(Box::new(move |_| {
                released.fetch_add(1, Ordering::SeqCst);
            }))
    }

    #[tokio::test]
    async fn test_single_flight_drops_frames_while_busy() {
        let detector = Arc::new(MockDetector::pending());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let analysis = Arc::new(AnalysisLoop::new(
            Uuid::new_v4(),
            detector.clone(),
            cancel.clone(),
            tx,
        ));
        let sink = analysis.sink();
        let released = Arc::new(AtomicU64::new(0));

        let n = 20;
        let accepted = (0..n)
            .filter(|i| sink.submit(tracked_frame(*i, &released)))
            .count();

        assert_eq!(accepted, 1);
        timeout(Duration::from_secs(1), async {
            while detector.calls() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(detector.calls(), 1);
        assert_eq!(released.load(Ordering::SeqCst), n - 1);
        assert!(analysis.is_busy());
        assert_eq!(
            analysis.stats(),
            AnalysisStats {
                frames_received: n,
                frames_submitted: 1,
                frames_dropped: n - 1,
            }
        );

        // Stopping releases the outstanding frame too
        cancel.cancel();
        let completion = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion.result, Err(DetectorError::Canceled));
        drop(completion);
        assert_eq!(released.load(Ordering::SeqCst), n);
        assert!(!analysis.is_busy());
    }

    #[tokio::test]
    async fn test_completion_reopens_loop() {
        let detector = Arc::new(MockDetector::returning(vec![
            RawDetection::new(BarcodeFormat::QrCode).with_text("abc"),
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let analysis = Arc::new(AnalysisLoop::new(
            Uuid::new_v4(),
            detector.clone(),
            CancellationToken::new(),
            tx,
        ));
        let released = Arc::new(AtomicU64::new(0));

        assert!(analysis.on_frame(tracked_frame(1, &released)));
        let completion = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion.frame.sequence, 1);
        assert_eq!(completion.result.as_ref().map(|d| d.len()), Ok(1));

        // Still busy until the completion has been handled
        assert!(!analysis.on_frame(tracked_frame(2, &released)));
        drop(completion);

        assert!(analysis.on_frame(tracked_frame(3, &released)));
        let completion = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion.frame.sequence, 3);
        drop(completion);

        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert_eq!(detector.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_delivered_and_frame_released() {
        let detector = Arc::new(MockDetector::failing("blurry"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let analysis = Arc::new(AnalysisLoop::new(
            Uuid::new_v4(),
            detector,
            CancellationToken::new(),
            tx,
        ));
        let released = Arc::new(AtomicU64::new(0));

        analysis.on_frame(tracked_frame(1, &released));
        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.result, Err(DetectorError::failed("blurry")));
        drop(completion);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_owner_still_releases_frame() {
        let detector = Arc::new(MockDetector::returning(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let analysis = Arc::new(AnalysisLoop::new(
            Uuid::new_v4(),
            detector,
            CancellationToken::new(),
            tx,
        ));
        let released = Arc::new(AtomicU64::new(0));

        analysis.on_frame(tracked_frame(1, &released));
        timeout(Duration::from_secs(1), async {
            while released.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!analysis.is_busy());
    }

    #[tokio::test]
    async fn test_cancelled_loop_refuses_frames() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let analysis = AnalysisLoop::new(
            Uuid::new_v4(),
            Arc::new(MockDetector::returning(Vec::new())),
            cancel.clone(),
            tx,
        );
        let released = Arc::new(AtomicU64::new(0));

        cancel.cancel();
        assert!(!analysis.on_frame(tracked_frame(1, &released)));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
