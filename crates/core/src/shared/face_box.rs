use crate::detection::domain::face_landmarks::FaceLandmarks;

/// A detected face in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: Option<f64>,
    pub landmarks: Option<FaceLandmarks>,
}

impl FaceBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: None,
            landmarks: None,
        }
    }

    /// Builds a box from corner coordinates `(x1, y1, x2, y2)`.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_landmarks(mut self, landmarks: FaceLandmarks) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_center() {
        let b = FaceBox::new(10.0, 20.0, 40.0, 60.0);
        let (cx, cy) = b.center();
        assert_relative_eq!(cx, 30.0);
        assert_relative_eq!(cy, 50.0);
    }

    #[test]
    fn test_from_corners() {
        let b = FaceBox::from_corners(5.0, 5.0, 25.0, 45.0);
        assert_relative_eq!(b.width, 20.0);
        assert_relative_eq!(b.height, 40.0);
    }
}
