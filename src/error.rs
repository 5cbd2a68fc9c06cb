//! Dimmer error types.

use std::time::Duration;

/// Errors that can occur while talking to the dimmer.
#[derive(Debug, thiserror::Error)]
pub enum DimmerError {
    /// No HID device matched the vendor/product ID pair.
    #[error("Device not found (VID: 0x{vendor_id:04x}, PID: 0x{product_id:04x})")]
    DeviceNotFound {
        /// Vendor ID searched for.
        vendor_id: u16,
        /// Product ID searched for.
        product_id: u16,
    },

    /// Session is closed, or a write/read on it failed.
    #[error("Dimmer not connected: {0}")]
    NotConnected(String),

    /// Exclusive device access could not be acquired in time.
    #[error("Timed out after {0:?} waiting for device access")]
    LockTimeout(Duration),

    /// Brightness outside of `0..=1023`.
    #[error("Invalid brightness {0} (expected 0-1023)")]
    InvalidValue(i64),

    /// The HID layer failed while opening the session.
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
}

impl DimmerError {
    pub(crate) fn not_connected(reason: impl Into<String>) -> Self {
        Self::NotConnected(reason.into())
    }
}
