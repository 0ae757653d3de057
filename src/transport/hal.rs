//! TWI transport on top of an `embedded-hal` I2C controller.
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use super::{BusPins, Transport};
use crate::error::{Error, Result};

/// Wraps any `embedded_hal::i2c::I2c` implementation, e.g. `linux_embedded_hal::I2cdev`.
///
/// Bytes of a write transaction are collected and put on the wire as one
/// I2C write when the transaction ends, so a NACK shows up there.
pub struct HalTransport<I> {
    i2c: I,
    pending: Option<(u8, Vec<u8>)>,
}

impl<I: I2c> HalTransport<I> {
    pub fn new(i2c: I) -> Self {
        HalTransport { i2c, pending: None }
    }

    pub fn into_inner(self) -> I {
        self.i2c
    }
}

impl<I: I2c> Transport for HalTransport<I> {
    fn init(&mut self, pins: Option<BusPins>) -> Result<()> {
        match pins {
            Some(pins) => log::debug!(
                "I2C controller owns its lines (SDA {}, SCL {}), nothing to configure",
                pins.sda,
                pins.scl
            ),
            None => log::debug!("Reusing the I2C controller as configured"),
        }
        self.pending = None;
        Ok(())
    }

    fn begin_transmission(&mut self, address: u8) {
        if let Some((stale, _)) = self.pending.replace((address, Vec::new())) {
            log::warn!("Dropping unfinished transaction to address {}", stale);
        }
    }

    fn write(&mut self, byte: u8) -> Result<()> {
        let (_, buf) = self.pending.as_mut().ok_or(Error::NoTransaction)?;
        buf.push(byte);
        Ok(())
    }

    fn end_transmission(&mut self) -> Result<()> {
        let (address, buf) = self.pending.take().ok_or(Error::NoTransaction)?;
        self.i2c
            .write(address, &buf)
            .map_err(|e| bus_error(address, e.kind()))
    }

    fn request_from(&mut self, address: u8, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        if len > 0 {
            self.i2c
                .read(address, &mut buf)
                .map_err(|e| bus_error(address, e.kind()))?;
        }
        Ok(buf)
    }
}

fn bus_error(address: u8, kind: ErrorKind) -> Error {
    match kind {
        ErrorKind::NoAcknowledge(_) => Error::Nack(address),
        kind => Error::Bus {
            address,
            message: format!("{:?}", kind),
        },
    }
}
