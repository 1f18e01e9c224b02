//! Mapping of detector corner points into screen-pixel overlay coordinates.
//!
//! The live preview is rendered center-cropped ("fill"), so the frame is
//! scaled until it covers the whole screen and the overflow on one axis is
//! cut evenly from both sides. Corner points follow the same transform.

use serde::{Deserialize, Serialize};

/// Integer pixel position as reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Source of the current screen size in device pixels.
///
/// Queried per emission so that device rotation between frames is honoured.
pub trait ScreenMetrics: Send + Sync {
    fn screen_size(&self) -> Option<Size>;
}

/// Screen metrics with a fixed size (configuration or tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedScreen(pub Option<Size>);

impl ScreenMetrics for FixedScreen {
    fn screen_size(&self) -> Option<Size> {
        self.0
    }
}

/// Cover-fit transform between a frame and the screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f64,
    pub invisible_width: f64,
    pub invisible_height: f64,
}

impl CoverFit {
    /// Compute the transform, or `None` when either size is degenerate.
    ///
    /// The frame is treated as portrait-native: its width runs along the
    /// screen's vertical axis unless the screen is landscape, in which case
    /// the frame axes are swapped first. `rotation_degrees` on the frame is
    /// deliberately not consulted here.
    pub fn new(image: Size, screen: Size) -> Option<Self> {
        if image.is_empty() || screen.is_empty() {
            return None;
        }

        let (mut iw, mut ih) = (image.width as f64, image.height as f64);
        if screen.is_landscape() {
            std::mem::swap(&mut iw, &mut ih);
        }
        let (sw, sh) = (screen.width as f64, screen.height as f64);

        let scale = (sh / iw).max(sw / ih);

        Some(Self {
            scale,
            invisible_width: ih * scale - sw,
            invisible_height: iw * scale - sh,
        })
    }

    pub fn apply(&self, point: Point) -> Point {
        let x = point.x as f64 * self.scale - self.invisible_width / 2.0;
        let y = point.y as f64 * self.scale - self.invisible_height / 2.0;
        Point::new(x.round() as i32, y.round() as i32)
    }
}

/// Map corner points from frame space into screen space.
///
/// Without both sizes (e.g. a static-image decode) the points are returned
/// unchanged.
pub fn normalize_corner_points(
    points: [Point; 4],
    image_size: Option<Size>,
    screen_size: Option<Size>,
) -> [Point; 4] {
    match (image_size, screen_size) {
        (Some(image), Some(screen)) => match CoverFit::new(image, screen) {
            Some(fit) => points.map(|point| fit.apply(point)),
            None => points,
        },
        _ => points,
    }
}
