//! Progress reporting for long-running decryptions.

/// Receives the cumulative plaintext byte count.
///
/// The symmetric decryptor calls this every [`crate::PROGRESS_INTERVAL`]
/// bytes. It is a cadence, not a completion signal: a file whose size is not
/// an exact multiple of the interval gets no final call.
pub trait ProgressSink {
    fn on_progress(&mut self, bytes_processed: u64);
}

impl<F: FnMut(u64)> ProgressSink for F {
    fn on_progress(&mut self, bytes_processed: u64) {
        self(bytes_processed)
    }
}
