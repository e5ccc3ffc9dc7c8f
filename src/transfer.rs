//! Transfer progress events shared by the storage and publish clients.

/// Size of one resumable-upload chunk. Must stay a multiple of 256 KiB per
/// the upload protocol.
pub const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// One observation of a running transfer, emitted after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes confirmed transferred so far.
    pub bytes_transferred: u64,
    /// Expected total, when the peer announced one.
    pub total_bytes: Option<u64>,
    /// Set on the final event of a successful transfer.
    pub complete: bool,
}

impl TransferProgress {
    /// Percentage complete, when the total is known and non-zero.
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some(self.bytes_transferred as f64 * 100.0 / total as f64)
            }
            _ => None,
        }
    }
}
