//! Timonel TWI bootloader protocol implementation.
//!
//! Host side, behind the `host` feature: address bookkeeping, command/reply
//! exchange, firmware upload and bus scanning over any `Transport`. Device
//! side, behind the `slave` feature: the interrupt driven TWI slave driver,
//! which builds without `std`.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod constants;
#[cfg(feature = "slave")]
pub mod slave;

#[cfg(feature = "host")]
pub mod config;
#[cfg(feature = "host")]
pub mod connection;
#[cfg(feature = "host")]
pub mod device;
#[cfg(feature = "host")]
pub mod error;
#[cfg(feature = "host")]
pub mod flashing;
#[cfg(feature = "host")]
pub mod format;
#[cfg(feature = "host")]
pub mod protocol;
#[cfg(feature = "host")]
pub mod registry;
#[cfg(feature = "host")]
pub mod scan;
#[cfg(feature = "host")]
pub mod transport;

#[cfg(feature = "host")]
pub use self::{
    connection::Connection,
    device::{DeviceInfo, Firmware, Mode, Status},
    error::{Error, Result},
    flashing::Flashing,
    protocol::Command,
    registry::AddressRegistry,
    scan::BusScanner,
    transport::{BusPins, HalTransport, Transport},
};
