pub mod image_sequence_camera;
pub mod jpeg_snapshot_encoder;
pub mod logging_capture_observer;
pub mod timed_capture_runner;
