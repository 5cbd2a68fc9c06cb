//! Spike-a-Flat flat-field calibrator control.
//!
//! The dimmer is a USB HID device driven through fixed size command reports,
//! see [`protocol`] for the wire format. [`DimmerController`] owns the device
//! session and serializes all traffic to it.
//!
//! ```no_run
//! use spikeaflat::hid::HidBus;
//! use spikeaflat::{DimmerController, DimmerOptions};
//!
//! let bus = HidBus::new()?;
//! let options = DimmerOptions::default().turn_off_on_disconnect(true);
//!
//! let controller = DimmerController::discover(&bus, options)?;
//! controller.connect()?;
//! controller.set_brightness(512)?;
//! println!("Brightness: {}", controller.get_brightness()?);
//! # Ok::<(), spikeaflat::DimmerError>(())
//! ```

pub mod controller;
pub mod error;
pub mod hid;
pub mod mock;
pub mod protocol;
pub mod transport;

pub use crate::controller::{DimmerController, DimmerOptions};
pub use crate::error::DimmerError;
pub use crate::protocol::{Brightness, MAX_BRIGHTNESS};
pub use crate::transport::{DeviceDiscovery, HidTransport};
