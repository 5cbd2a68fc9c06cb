//! Dimmer controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::error::DimmerError;
use crate::protocol::{self, Brightness, Opcode, FRAME_SIZE, PRODUCT_ID, STATE_COMMIT, VENDOR_ID};
use crate::transport::{DeviceDiscovery, HidTransport};

/// Default bound on waiting for exclusive device access.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on waiting for a single reply.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Controller configuration.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct DimmerOptions {
    /// Force brightness to 0 before closing the session.
    pub turn_off_on_disconnect: bool,
    /// Bound on waiting for exclusive device access.
    pub lock_timeout: Duration,
    /// Bound on waiting for a single reply.
    pub read_timeout: Duration,
}

impl DimmerOptions {
    /// Switch the lamp off before closing the session.
    pub fn turn_off_on_disconnect(mut self, turn_off: bool) -> Self {
        self.turn_off_on_disconnect = turn_off;
        self
    }

    /// Set the device access timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the reply timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for DimmerOptions {
    fn default() -> Self {
        Self {
            turn_off_on_disconnect: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Spike-a-Flat dimmer.
///
/// Owns a single HID session. All device traffic is serialized through one
/// lock, which is held for the complete command/reply exchange. Setting the
/// brightness holds it across both the intensity and the commit exchange.
///
/// The device status is never cached, use [`DimmerController::get_state`] to
/// query it.
pub struct DimmerController<T: HidTransport> {
    session: Option<Mutex<T>>,
    connected: AtomicBool,
    options: DimmerOptions,
}

impl<T: HidTransport> DimmerController<T> {
    /// Find the first attached dimmer.
    ///
    /// The session is not opened, see [`DimmerController::connect`].
    pub fn discover<D>(bus: &D, options: DimmerOptions) -> Result<Self, DimmerError>
    where
        D: DeviceDiscovery<Device = T>,
    {
        let mut devices = bus.enumerate(VENDOR_ID, PRODUCT_ID).into_iter();

        let device = devices
            .next()
            .ok_or(DimmerError::DeviceNotFound { vendor_id: VENDOR_ID, product_id: PRODUCT_ID })?;

        // No way to tell multiple dimmers apart, so the first one wins.
        let ignored = devices.count();
        if ignored > 0 {
            warn!("Found {} additional dimmers, using the first one", ignored);
        }

        info!("Found dimmer (VID: 0x{:04x}, PID: 0x{:04x})", VENDOR_ID, PRODUCT_ID);

        Ok(Self::new(device, options))
    }

    /// Wrap an already discovered device.
    pub fn new(device: T, options: DimmerOptions) -> Self {
        Self { session: Some(Mutex::new(device)), connected: AtomicBool::new(false), options }
    }

    /// Active configuration.
    pub fn options(&self) -> &DimmerOptions {
        &self.options
    }

    /// Whether the session is open.
    pub fn is_connected(&self) -> bool {
        self.session.is_some() && self.connected.load(Ordering::SeqCst)
    }

    /// Open the HID session.
    pub fn connect(&self) -> Result<(), DimmerError> {
        let mut transport = self.acquire()?;
        transport.open()?;
        self.connected.store(true, Ordering::SeqCst);

        info!("Connected to dimmer");

        Ok(())
    }

    /// Close the HID session.
    ///
    /// With [`DimmerOptions::turn_off_on_disconnect`] the lamp is switched off
    /// first. A failure to switch it off is logged, the session is closed
    /// regardless.
    ///
    /// Turn-off and close happen under one lock, so no other caller can
    /// switch the lamp back on in between.
    pub fn disconnect(&self) -> Result<(), DimmerError> {
        // Replies are bounded by the read timeout, so this can't block forever.
        let mut transport = self.session()?.lock();

        if self.options.turn_off_on_disconnect {
            let result = if self.is_connected() && transport.is_open() {
                self.write_brightness(&mut *transport, Brightness::default())
            } else {
                Err(DimmerError::not_connected("Spike-a-Flat not connected"))
            };

            if let Err(err) = result {
                warn!("Unable to turn off dimmer before disconnecting: {}", err);
            }
        }

        transport.close();
        self.connected.store(false, Ordering::SeqCst);
        drop(transport);

        info!("Disconnected from dimmer");

        Ok(())
    }

    /// Current intensity, `0..=1023`.
    pub fn get_brightness(&self) -> Result<u16, DimmerError> {
        let mut transport = self.acquire_connected()?;
        let reply = self.exchange(&mut *transport, &protocol::query(Opcode::GetIntensity))?;
        protocol::decode_intensity(&reply)
    }

    /// Set and apply a new intensity.
    ///
    /// Values outside of `0..=1023` are rejected without touching the device.
    ///
    /// If this fails after the intensity was sent, the device may hold a
    /// pending intensity which was never applied. The brightness must then be
    /// considered unknown rather than unchanged.
    pub fn set_brightness(&self, value: i64) -> Result<(), DimmerError> {
        let brightness = Brightness::new(value)?;

        let mut transport = self.acquire_connected()?;
        self.write_brightness(&mut *transport, brightness)
    }

    /// Non-blocking entry point for [`DimmerController::set_brightness`].
    ///
    /// The work still happens inline when the future is first polled.
    pub async fn set_brightness_async(&self, value: i64) -> Result<(), DimmerError> {
        self.set_brightness(value)
    }

    /// Raw status byte reported by the device.
    pub fn get_state(&self) -> Result<u8, DimmerError> {
        let mut transport = self.acquire_connected()?;
        let reply = self.exchange(&mut *transport, &protocol::query(Opcode::GetState))?;
        protocol::decode_state(&reply)
    }

    /// Disconnect and release the session.
    ///
    /// Calling this again after the session was released does nothing.
    pub fn dispose(&mut self) {
        if self.session.is_none() {
            return;
        }

        if self.is_connected() {
            if let Err(err) = self.disconnect() {
                warn!("Unable to disconnect dimmer: {}", err);
            }
        }

        self.session = None;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn session(&self) -> Result<&Mutex<T>, DimmerError> {
        self.session.as_ref().ok_or_else(|| DimmerError::not_connected("session released"))
    }

    /// Wait for exclusive access to the session.
    fn acquire(&self) -> Result<MutexGuard<'_, T>, DimmerError> {
        let timeout = self.options.lock_timeout;
        self.session()?.try_lock_for(timeout).ok_or(DimmerError::LockTimeout(timeout))
    }

    fn acquire_connected(&self) -> Result<MutexGuard<'_, T>, DimmerError> {
        if !self.is_connected() {
            return Err(DimmerError::not_connected("Spike-a-Flat not connected"));
        }

        let transport = self.acquire()?;

        if !transport.is_open() {
            return Err(DimmerError::not_connected("session closed"));
        }

        Ok(transport)
    }

    /// Send a new intensity and commit it.
    fn write_brightness(&self, transport: &mut T, brightness: Brightness) -> Result<(), DimmerError> {
        self.exchange(transport, &protocol::set_intensity(brightness))?;
        self.exchange(transport, &protocol::set_state(STATE_COMMIT))?;

        debug!("Brightness set to {}", brightness.get());

        Ok(())
    }

    /// Write one report and wait for its reply.
    fn exchange(&self, transport: &mut T, report: &[u8]) -> Result<Bytes, DimmerError> {
        debug!("Writing {:02x?}", report);

        if let Err(err) = transport.write(report) {
            return Err(DimmerError::not_connected(format!("error writing: {}", err)));
        }

        let mut buf = [0; FRAME_SIZE];
        let len = match transport.read_timeout(&mut buf, self.options.read_timeout) {
            Ok(0) => return Err(DimmerError::not_connected("timeout reading")),
            Ok(len) => len,
            Err(err) => return Err(DimmerError::not_connected(format!("error reading: {}", err))),
        };

        debug!("Read {:02x?}", &buf[..len]);

        Ok(Bytes::copy_from_slice(&buf[..len]))
    }
}

impl<T: HidTransport> Drop for DimmerController<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
