//! Transport backed by `hidapi`.

use std::convert::TryFrom;
use std::ffi::CString;
use std::sync::Arc;
use std::time::Duration;

use hidapi::{HidApi, HidDevice, HidError, HidResult};
use log::debug;
use parking_lot::Mutex;

use crate::error::DimmerError;
use crate::protocol::FRAME_SIZE;
use crate::transport::{DeviceDiscovery, HidTransport};

/// The device uses unnumbered reports.
const REPORT_ID: u8 = 0x00;

/// System HID bus.
pub struct HidBus {
    api: Arc<Mutex<HidApi>>,
}

impl HidBus {
    pub fn new() -> Result<Self, DimmerError> {
        Ok(Self { api: Arc::new(Mutex::new(HidApi::new()?)) })
    }
}

impl DeviceDiscovery for HidBus {
    type Device = HidDimmer;

    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Vec<HidDimmer> {
        let mut api = self.api.lock();

        // Pick up devices plugged in after the API was created.
        if let Err(err) = api.refresh_devices() {
            debug!("Unable to refresh HID device list: {}", err);
        }

        api.device_list()
            .filter(|info| info.vendor_id() == vendor_id && info.product_id() == product_id)
            .map(|info| {
                debug!(
                    "Found {} (serial: {})",
                    info.product_string().unwrap_or("unknown device"),
                    info.serial_number().unwrap_or("none")
                );

                HidDimmer { api: self.api.clone(), path: info.path().to_owned(), device: None }
            })
            .collect()
    }
}

/// A dimmer on the system HID bus.
pub struct HidDimmer {
    api: Arc<Mutex<HidApi>>,
    path: CString,
    device: Option<HidDevice>,
}

impl HidDimmer {
    fn device(&self) -> HidResult<&HidDevice> {
        self.device
            .as_ref()
            .ok_or_else(|| HidError::HidApiError { message: "device not open".into() })
    }
}

impl HidTransport for HidDimmer {
    fn open(&mut self) -> HidResult<()> {
        let device = self.api.lock().open_path(&self.path)?;
        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the handle closes it.
        self.device = None;
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn write(&mut self, report: &[u8]) -> HidResult<usize> {
        let mut buf = Vec::with_capacity(FRAME_SIZE + 1);
        buf.push(REPORT_ID);
        buf.extend_from_slice(report);

        let written = self.device()?.write(&buf)?;

        // Don't count the report ID.
        Ok(written.saturating_sub(1))
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> HidResult<usize> {
        let timeout = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.device()?.read_timeout(buf, timeout)
    }
}
