//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Connection
// =============================================================================

/// Command that asks the device for its hardware-element inventory
pub const INVENTORY_QUERY: &str = "hwstatus";

/// Maximum wait for the inventory response after opening a transport (milliseconds)
pub const DEFAULT_INVENTORY_TIMEOUT_MS: u64 = 5000;

/// Number of colours flashed during an identity check
pub const DEFAULT_IDENTITY_COLOUR_COUNT: usize = 3;

/// Path appended to the target address for the network transport
pub const NETWORK_WS_PATH: &str = "/ws";

/// Maximum wait for the network transport handshake (seconds)
pub const NETWORK_CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Timing - Reconnection
// =============================================================================

/// Delay between reconnection attempts (seconds)
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 10;

/// Reconnection attempts before giving up on a network transport
pub const DEFAULT_NETWORK_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Minimum interval between rate updates (seconds)
pub const RATE_UPDATE_MIN_INTERVAL_SECS: f64 = 0.1;

/// Interval of the idle wake-up that checks the shutdown flag (milliseconds)
pub const SHUTDOWN_POLL_MS: u64 = 100;

// =============================================================================
// Firmware update
// =============================================================================

/// Firmware bytes per transfer chunk
pub const DEFAULT_OTA_CHUNK_SIZE: usize = 500;

/// Delay between firmware chunks (milliseconds)
pub const DEFAULT_OTA_CHUNK_INTERVAL_MS: u64 = 20;

/// Maximum wait for the device to confirm the new image (seconds)
pub const DEFAULT_OTA_APPLY_TIMEOUT_SECS: u64 = 60;

/// HTTP timeout for manifest and image downloads (seconds)
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Placeholder replaced by the hardware revision in firmware URLs
pub const HW_REV_PLACEHOLDER: &str = "{hw_rev}";

// =============================================================================
// Buffers
// =============================================================================

/// Channel capacity for async message passing
pub const CHANNEL_CAPACITY: usize = 256;

/// Capacity of the operator command queue
pub const COMMAND_CAPACITY: usize = 32;
