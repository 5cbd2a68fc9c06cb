//! HID transport abstraction.

use std::time::Duration;

use hidapi::HidResult;

/// One HID device session.
pub trait HidTransport: Send {
    /// Open the session.
    fn open(&mut self) -> HidResult<()>;

    /// Close the session, if open.
    fn close(&mut self);

    /// Whether the session is currently open.
    fn is_open(&self) -> bool;

    /// Write one report, returning the number of bytes written.
    fn write(&mut self, report: &[u8]) -> HidResult<usize>;

    /// Read one report into `buf`.
    ///
    /// Returns `Ok(0)` if nothing arrived within `timeout`.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> HidResult<usize>;
}

/// HID device enumeration.
pub trait DeviceDiscovery {
    type Device: HidTransport;

    /// All attached devices matching the vendor/product pair, in enumeration order.
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Vec<Self::Device>;
}
