use crate::shared::frame::Frame;

/// Live frame source for the capture screen.
pub trait Camera: Send {
    /// Acquires the device (permission prompt, stream start, ...).
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Latest frame, or `None` while the stream has nothing to offer yet.
    fn grab_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the device. Default: no-op.
    fn close(&mut self) {}
}
