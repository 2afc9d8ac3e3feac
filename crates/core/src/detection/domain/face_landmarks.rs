//! 5-point face landmarks as reported by pose-capable face detectors.
//!
//! Points the detector was not confident about are stored as `None` rather
//! than as a sentinel coordinate.

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// [left_eye, right_eye, nose, left_mouth, right_mouth]
    points: [Option<(f64, f64)>; 5],
}

impl FaceLandmarks {
    pub fn new(points: [Option<(f64, f64)>; 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Option<(f64, f64)>; 5] {
        &self.points
    }

    pub fn visible_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn nose(&self) -> Option<(f64, f64)> {
        self.points[NOSE]
    }

    /// Midpoint between the eyes, when both are visible.
    pub fn eye_midpoint(&self) -> Option<(f64, f64)> {
        let (lx, ly) = self.points[LEFT_EYE]?;
        let (rx, ry) = self.points[RIGHT_EYE]?;
        Some(((lx + rx) / 2.0, (ly + ry) / 2.0))
    }

    /// Shifts every visible point, used when mapping detector coordinates
    /// back into frame space.
    pub fn map(&self, f: impl Fn((f64, f64)) -> (f64, f64)) -> Self {
        let mut points = self.points;
        for p in points.iter_mut() {
            *p = p.map(&f);
        }
        Self { points }
    }
}
