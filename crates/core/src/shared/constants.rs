use std::time::Duration;

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";

/// Where [`YOLO_MODEL_NAME`] is fetched from when neither the cache nor a
/// bundled copy has it. The file is a YOLO11n-pose network trained on WIDER
/// FACE, published as a release asset of the FaceGuard project; override
/// with the `model_base_url` setting or `--model-url` to mirror it.
pub const DEFAULT_MODEL_BASE_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0";

/// Both the poll ticker and the countdown ticker run at this period.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Seconds the face must stay aligned before the automatic capture fires.
pub const COUNTDOWN_SECS: u32 = 3;

/// Attempts made to initialize the face detector before degrading.
pub const MODEL_LOAD_ATTEMPTS: u32 = 3;
pub const MODEL_LOAD_BACKOFF: Duration = Duration::from_secs(1);

pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const MSG_PERFECT: &str = "Perfect!";
pub const MSG_NO_FACE: &str = "No face detected";
pub const MSG_MULTIPLE_FACES: &str = "Multiple faces detected";
pub const MSG_ADJUST: &str = "Adjust position";
pub const MSG_DETECTION_UNAVAILABLE: &str = "Face detection unavailable";
pub const MSG_CAMERA_UNAVAILABLE: &str = "Camera unavailable";
pub const MSG_CAPTURE_FAILED: &str = "Could not capture a photo - use Capture Photo to retry";
pub const MSG_UPLOAD_FAILED: &str = "Photo saved locally but upload failed - you may continue";
