//! Shared protocol constants for the folan wire format

// Per-file layout on the stream:
// NAME_LEN (4, LE) | NAME (NAME_LEN bytes, UTF-8) | SIZE (4, LE) | BODY (SIZE bytes)
// followed by ACK (13 bytes) from receiver to sender.
pub const NAME_LEN_FIELD: usize = 4;
pub const SIZE_FIELD: usize = 4;

// Legacy 32-bit size field caps a single file at 4 GiB - 1
pub const MAX_FILE_SIZE: u64 = u32::MAX as u64;

// Body chunk size for every read/write on the socket
pub const CHUNK_SIZE: usize = 4096;

// Confirmation literal written by the receiver once a body is stored
pub const ACK: &[u8; 13] = b"FILE_RECEIVED";

// Progress bar width in cells
pub const BAR_WIDTH: usize = 30;

// Centralized timeout constants; all retries are fixed-interval, no backoff
pub mod timeouts {
    // Bounded connect attempt (ms)
    pub const CONNECT_MS: u64 = 500;

    // Listener poll interval while waiting for a peer (ms)
    pub const ACCEPT_POLL_MS: u64 = 100;

    // Poll interval while an open session waits for the next header (ms)
    pub const IDLE_POLL_MS: u64 = 200;

    // Progress tick interval for UI updates (ms)
    pub const PROGRESS_TICK_MS: u64 = 100;

    // Directory rescan interval in stay-alive mode (ms)
    pub const SCAN_POLL_MS: u64 = 500;
}
