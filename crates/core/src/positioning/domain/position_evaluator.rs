//! Face-position readiness: is there exactly one face, roughly centered and
//! at a usable distance from the camera?
//!
//! All measurements are normalized by the frame size so the same thresholds
//! apply to any camera resolution.

use serde::{Deserialize, Serialize};

use crate::shared::constants::{MSG_ADJUST, MSG_MULTIPLE_FACES, MSG_NO_FACE, MSG_PERFECT};
use crate::shared::face_box::FaceBox;

pub const DEFAULT_CENTER_TOLERANCE: f64 = 0.15;
pub const DEFAULT_MIN_FACE_WIDTH: f64 = 0.25;
pub const DEFAULT_MAX_FACE_WIDTH: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionThresholds {
    /// Max normalized distance between face center and frame center, per axis.
    pub center_tolerance: f64,
    /// Face width / frame width below this is too far away.
    pub min_face_width: f64,
    /// Face width / frame width above this is too close.
    pub max_face_width: f64,
}

impl Default for PositionThresholds {
    fn default() -> Self {
        Self {
            center_tolerance: DEFAULT_CENTER_TOLERANCE,
            min_face_width: DEFAULT_MIN_FACE_WIDTH,
            max_face_width: DEFAULT_MAX_FACE_WIDTH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeStatus {
    TooSmall,
    Good,
    TooLarge,
    /// More than one face: size is meaningless, capture is refused.
    Multiple,
}

/// Normalized geometry of the single evaluated face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceOffsets {
    pub dx: f64,
    pub dy: f64,
    pub size: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PositionVerdict {
    pub detected: bool,
    pub centered: bool,
    /// `None` when no face was detected.
    pub size_status: Option<SizeStatus>,
    pub ready_for_capture: bool,
    pub message: String,
    pub offsets: Option<FaceOffsets>,
}

impl PositionVerdict {
    fn no_face() -> Self {
        Self {
            detected: false,
            centered: false,
            size_status: None,
            ready_for_capture: false,
            message: MSG_NO_FACE.to_string(),
            offsets: None,
        }
    }

    fn multiple_faces() -> Self {
        Self {
            detected: true,
            centered: false,
            size_status: Some(SizeStatus::Multiple),
            ready_for_capture: false,
            message: MSG_MULTIPLE_FACES.to_string(),
            offsets: None,
        }
    }
}

/// Stateless evaluator; one instance can serve any number of sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct PositionEvaluator {
    thresholds: PositionThresholds,
}

impl PositionEvaluator {
    pub fn new(thresholds: PositionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PositionThresholds {
        &self.thresholds
    }

    /// Maps the detections of one frame to a readiness verdict.
    ///
    /// `mirrored` states that the user sees a horizontally flipped preview;
    /// horizontal guidance is then phrased for what they see.
    pub fn evaluate(
        &self,
        faces: &[FaceBox],
        frame_width: u32,
        frame_height: u32,
        mirrored: bool,
    ) -> PositionVerdict {
        if frame_width == 0 || frame_height == 0 {
            return PositionVerdict::no_face();
        }
        let face = match faces {
            [] => return PositionVerdict::no_face(),
            [face] => face,
            _ => return PositionVerdict::multiple_faces(),
        };

        let fw = frame_width as f64;
        let fh = frame_height as f64;
        let (fx, fy) = face.center();
        let (cx, cy) = (fw / 2.0, fh / 2.0);

        let offsets = FaceOffsets {
            dx: (fx - cx).abs() / fw,
            dy: (fy - cy).abs() / fh,
            size: face.width / fw,
        };
        let tol = self.thresholds.center_tolerance;
        let centered = offsets.dx < tol && offsets.dy < tol;
        let size_status = self.size_status(offsets.size);
        let ready_for_capture = centered && size_status == SizeStatus::Good;

        let message = if ready_for_capture {
            MSG_PERFECT.to_string()
        } else {
            let mut hints: Vec<&str> = Vec::with_capacity(3);
            match size_status {
                SizeStatus::TooSmall => hints.push("Move closer"),
                SizeStatus::TooLarge => hints.push("Move back"),
                _ => {}
            }
            if offsets.dx >= tol {
                // Face right of center in raw coordinates appears on the left
                // of a mirrored preview.
                let face_right = fx > cx;
                hints.push(if face_right != mirrored {
                    "Move left"
                } else {
                    "Move right"
                });
            }
            if offsets.dy >= tol {
                hints.push(if fy > cy { "Move up" } else { "Move down" });
            }
            if hints.is_empty() {
                MSG_ADJUST.to_string()
            } else {
                hints.join(", ")
            }
        };

        PositionVerdict {
            detected: true,
            centered,
            size_status: Some(size_status),
            ready_for_capture,
            message,
            offsets: Some(offsets),
        }
    }

    fn size_status(&self, size: f64) -> SizeStatus {
        if size < self.thresholds.min_face_width {
            SizeStatus::TooSmall
        } else if size > self.thresholds.max_face_width {
            SizeStatus::TooLarge
        } else {
            SizeStatus::Good
        }
    }
}
