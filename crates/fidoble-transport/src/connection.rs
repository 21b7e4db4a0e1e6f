use bytes::Bytes;

/// Completion for a control point write; `true` when the write succeeded.
pub type WriteCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Write half of a connected FIDO BLE authenticator.
///
/// At most one write is outstanding per transaction: the caller waits for
/// `on_written` before issuing the next one. Implementations may run the
/// callback from inside `write_control_point` (for instance when the link is
/// already down) or at any later point, but must run it exactly once.
pub trait BleConnection: Send {
    /// Write one fragment to the control point characteristic.
    fn write_control_point(&mut self, data: Bytes, on_written: WriteCallback);
}

impl<T: BleConnection + ?Sized> BleConnection for Box<T> {
    fn write_control_point(&mut self, data: Bytes, on_written: WriteCallback) {
        (**self).write_control_point(data, on_written);
    }
}
