//! Spike-a-Flat HID command protocol.
//!
//! Every command is a fixed 8 byte report. Byte 0 holds the opcode, the
//! following bytes hold either a little-endian intensity or a state value.
//! Replies echo the opcode in byte 0 and carry their payload from byte 1 on.

use std::convert::TryFrom;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DimmerError;

/// HID vendor ID.
pub const VENDOR_ID: u16 = 0x04d8;

/// HID product ID.
pub const PRODUCT_ID: u16 = 0xf5d1;

/// Size of command and response reports.
pub const FRAME_SIZE: usize = 8;

/// Highest intensity the device accepts.
pub const MAX_BRIGHTNESS: u16 = 1023;

/// State value which applies the pending intensity.
pub const STATE_COMMIT: u8 = 3;

/// Minimum reply length carrying a 16-bit intensity.
const INTENSITY_REPLY_LEN: usize = 3;

/// Command opcodes.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum Opcode {
    SetState = 0x10,
    GetState = 0x11,
    SetIntensity = 0x20,
    GetIntensity = 0x21,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        match byte {
            0x10 => Ok(Self::SetState),
            0x11 => Ok(Self::GetState),
            0x20 => Ok(Self::SetIntensity),
            0x21 => Ok(Self::GetIntensity),
            byte => Err(byte),
        }
    }
}

/// Validated lamp intensity.
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone)]
pub struct Brightness(u16);

impl Brightness {
    /// Full intensity.
    pub const fn max_value() -> Self {
        Self(MAX_BRIGHTNESS)
    }

    /// Check that `value` is within `0..=1023`.
    pub fn new(value: i64) -> Result<Self, DimmerError> {
        if (0..=i64::from(MAX_BRIGHTNESS)).contains(&value) {
            Ok(Self(value as u16))
        } else {
            Err(DimmerError::InvalidValue(value))
        }
    }

    /// Raw intensity value.
    pub fn get(self) -> u16 {
        self.0
    }
}

/// Build the report to set a new pending intensity.
pub fn set_intensity(brightness: Brightness) -> Bytes {
    let mut buf = frame(Opcode::SetIntensity);

    // Low byte first.
    buf.put_u16_le(brightness.0);

    pad(buf)
}

/// Build the report for a state transition.
pub fn set_state(state: u8) -> Bytes {
    let mut buf = frame(Opcode::SetState);
    buf.put_u8(state);
    pad(buf)
}

/// Build a report for a command without payload.
pub fn query(opcode: Opcode) -> Bytes {
    pad(frame(opcode))
}

/// Extract the intensity from a `GET_INTENSITY` reply.
pub fn decode_intensity(reply: &[u8]) -> Result<u16, DimmerError> {
    if reply.len() < INTENSITY_REPLY_LEN {
        return Err(DimmerError::not_connected(format!(
            "short intensity reply ({} bytes)",
            reply.len()
        )));
    }

    Ok(u16::from_le_bytes([reply[1], reply[2]]))
}

/// Extract the raw state byte from a `GET_STATE` reply.
pub fn decode_state(reply: &[u8]) -> Result<u8, DimmerError> {
    match reply.get(1) {
        Some(state) => Ok(*state),
        None => {
            Err(DimmerError::not_connected(format!("short state reply ({} bytes)", reply.len())))
        },
    }
}

fn frame(opcode: Opcode) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_SIZE);
    buf.put_u8(opcode as u8);
    buf
}

/// Zero-fill up to the report size.
fn pad(mut buf: BytesMut) -> Bytes {
    let padding = FRAME_SIZE - buf.len();
    buf.put_bytes(0, padding);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_is_little_endian() {
        let frame = set_intensity(Brightness::new(0x3a7).unwrap());
        assert_eq!(&frame[..], &[0x20, 0xa7, 0x03, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn commit_frame() {
        assert_eq!(&set_state(STATE_COMMIT)[..], &[0x10, 3, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn queries_have_no_payload() {
        assert_eq!(&query(Opcode::GetIntensity)[..], &[0x21, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&query(Opcode::GetState)[..], &[0x11, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn brightness_bounds() {
        assert_eq!(Brightness::new(0).unwrap().get(), 0);
        assert_eq!(Brightness::new(1023).unwrap(), Brightness::max_value());
        assert!(matches!(Brightness::new(-1), Err(DimmerError::InvalidValue(-1))));
        assert!(matches!(Brightness::new(1024), Err(DimmerError::InvalidValue(1024))));
    }

    #[test]
    fn short_intensity_reply() {
        assert!(matches!(decode_intensity(&[0x21, 0xff]), Err(DimmerError::NotConnected(_))));
        assert_eq!(decode_intensity(&[0x21, 0xff, 0x03]).unwrap(), 1023);
    }

    #[test]
    fn state_reply() {
        assert_eq!(decode_state(&[0x11, 2]).unwrap(), 2);
        assert!(decode_state(&[0x11]).is_err());
    }

    #[test]
    fn opcode_from_byte() {
        assert_eq!(Opcode::try_from(0x20), Ok(Opcode::SetIntensity));
        assert_eq!(Opcode::try_from(0x42), Err(0x42));
    }
}
