//! Abstract TWI bus interface.
use serde::Deserialize;

use crate::error::{Error, Result};

pub use self::hal::HalTransport;

mod hal;

/// Dedicated bus lines for a transport that has to be brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BusPins {
    pub sda: u8,
    pub scl: u8,
}

/// Abstraction of the TWI controller on the host.
///
/// Mirrors a byte-oriented master: a write transaction is opened for a peer,
/// filled byte by byte and closed; a read asks a peer for up to `len` bytes.
pub trait Transport {
    /// Bring up the bus. `None` means the lines were set up by someone else.
    fn init(&mut self, pins: Option<BusPins>) -> Result<()>;

    fn begin_transmission(&mut self, address: u8);
    fn write(&mut self, byte: u8) -> Result<()>;
    /// Close the transaction. Reports [`Error::Nack`] when the peer did not acknowledge.
    fn end_transmission(&mut self) -> Result<()>;

    /// Read up to `len` bytes, returning what was actually received.
    fn request_from(&mut self, address: u8, len: usize) -> Result<Vec<u8>>;

    /// Zero-length write, true if somebody acknowledged `address`.
    fn probe(&mut self, address: u8) -> Result<bool> {
        self.begin_transmission(address);
        match self.end_transmission() {
            Ok(()) => Ok(true),
            Err(Error::Nack(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// One write transaction carrying `bytes`.
    fn send(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
        self.begin_transmission(address);
        for &byte in bytes {
            self.write(byte)?;
        }
        self.end_transmission()
    }
}
