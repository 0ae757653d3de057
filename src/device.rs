//! What the host knows about a peer: address classification and bootloader status.
use std::fmt;

use bitfield::bitfield;
use scroll::{Pread, Pwrite, BE};
use serde::Serialize;

use crate::constants::{
    commands, APP_ADDR_OFFSET, MAX_TWI_ADDR, MIN_APP_ADDR, MIN_TWI_ADDR, STATUS_REPLY_SIZE,
    TIMONEL_SIGNATURE,
};
use crate::error::Result;

/// Which firmware is expected to answer at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Bootloader,
    Application,
}

impl Mode {
    /// Classify by address half alone. `None` outside of the protocol range.
    pub const fn of(address: u8) -> Option<Mode> {
        if address < MIN_TWI_ADDR || address > MAX_TWI_ADDR {
            None
        } else if address < MIN_APP_ADDR {
            Some(Mode::Bootloader)
        } else {
            Some(Mode::Application)
        }
    }

    pub const fn is_application(self) -> bool {
        matches!(self, Mode::Application)
    }
}

pub const fn is_valid_address(address: u8) -> bool {
    Mode::of(address).is_some()
}

/// Application address paired with a bootloader address.
pub const fn application_address(bootloader: u8) -> Option<u8> {
    match Mode::of(bootloader) {
        Some(Mode::Bootloader) => Some(bootloader + APP_ADDR_OFFSET),
        _ => None,
    }
}

/// Bootloader address paired with an application address.
pub const fn bootloader_address(application: u8) -> Option<u8> {
    match Mode::of(application) {
        Some(Mode::Application) => Some(application - APP_ADDR_OFFSET),
        _ => None,
    }
}

bitfield! {
    /// Compile-time options reported by the bootloader.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct Features(u8);
    impl Debug;
    pub led_ui, _: 0;
    pub auto_trampoline, _: 1;
    pub app_uses_trampoline_page, _: 2;
    pub set_page_address, _: 3;
    pub two_step_init, _: 4;
    pub watchdog_reset, _: 5;
    pub check_blank_flash, _: 6;
    pub read_flash, _: 7;
}

impl From<u8> for Features {
    fn from(code: u8) -> Self {
        Features(code)
    }
}

impl From<Features> for u8 {
    fn from(features: Features) -> Self {
        features.0
    }
}

/// Reply to GET_STATUS. All-zero until a status query succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    pub signature: u8,
    pub version_major: u8,
    pub version_minor: u8,
    pub features: Features,
    pub bootloader_start: u16,
    pub application_start: u16,
    pub trampoline_addr: u16,
}

impl Status {
    /// Parse a full reply, echo byte included.
    pub fn from_reply(raw: &[u8]) -> Result<Self> {
        Ok(Status {
            signature: raw.pread(1)?,
            version_major: raw.pread(2)?,
            version_minor: raw.pread(3)?,
            features: Features(raw.pread(4)?),
            bootloader_start: raw.pread_with(5, BE)?,
            application_start: raw.pread_with(7, BE)?,
            trampoline_addr: raw.pread_with(9, BE)?,
        })
    }

    /// Reply bytes as the bootloader puts them on the wire.
    pub fn to_reply(&self) -> Result<[u8; STATUS_REPLY_SIZE]> {
        let mut raw = [0u8; STATUS_REPLY_SIZE];
        raw[0] = commands::ACK_STATUS;
        raw[1] = self.signature;
        raw[2] = self.version_major;
        raw[3] = self.version_minor;
        raw[4] = self.features.0;
        raw.pwrite_with(self.bootloader_start, 5, BE)?;
        raw.pwrite_with(self.application_start, 7, BE)?;
        raw.pwrite_with(self.trampoline_addr, 9, BE)?;
        Ok(raw)
    }

    pub fn is_timonel(&self) -> bool {
        self.signature == TIMONEL_SIGNATURE
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signature {} v{}.{} features 0x{:02x} bootloader 0x{:04x} application 0x{:04x} trampoline 0x{:04x}",
            self.signature,
            self.version_major,
            self.version_minor,
            self.features.0,
            self.bootloader_start,
            self.application_start,
            self.trampoline_addr
        )
    }
}

/// Firmware family found by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Firmware {
    Timonel,
    Application,
    Unknown,
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Firmware::Timonel => "Timonel",
            Firmware::Application => "Application",
            Firmware::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One row of a bus scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub address: u8,
    pub firmware: Firmware,
    pub version_major: u8,
    pub version_minor: u8,
}

impl DeviceInfo {
    pub fn application(address: u8) -> Self {
        DeviceInfo {
            address,
            firmware: Firmware::Application,
            version_major: 0,
            version_minor: 0,
        }
    }

    pub fn from_status(address: u8, status: &Status) -> Self {
        DeviceInfo {
            address,
            firmware: if status.is_timonel() {
                Firmware::Timonel
            } else {
                Firmware::Unknown
            },
            version_major: status.version_major,
            version_minor: status.version_minor,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>3} (0x{:02x}) {} v{}.{}",
            self.address, self.address, self.firmware, self.version_major, self.version_minor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_halves() {
        for address in 8..=35 {
            assert_eq!(Mode::of(address), Some(Mode::Bootloader));
            assert_eq!(application_address(address), Some(address + 28));
        }
        for address in 36..=63 {
            assert_eq!(Mode::of(address), Some(Mode::Application));
            assert_eq!(bootloader_address(address), Some(address - 28));
        }
        assert_eq!(Mode::of(7), None);
        assert_eq!(Mode::of(64), None);
        assert_eq!(application_address(40), None);
    }

    #[test]
    fn status_fields_are_big_endian() {
        let raw = [
            commands::ACK_STATUS,
            84,
            1,
            3,
            0b1001_0000,
            0x1a,
            0x00,
            0x00,
            0x00,
            0x19,
            0xfe,
        ];
        let status = Status::from_reply(&raw).unwrap();
        assert!(status.is_timonel());
        assert_eq!((status.version_major, status.version_minor), (1, 3));
        assert!(status.features.two_step_init());
        assert!(status.features.read_flash());
        assert!(!status.features.led_ui());
        assert_eq!(status.bootloader_start, 0x1a00);
        assert_eq!(status.trampoline_addr, 0x19fe);
        assert_eq!(status.to_reply().unwrap(), raw);
    }

    #[test]
    fn short_status_reply_is_an_error() {
        assert!(Status::from_reply(&[commands::ACK_STATUS, 84, 1]).is_err());
    }

    #[test]
    fn unknown_signature_keeps_versions() {
        let status = Status {
            signature: 0x55,
            version_major: 2,
            version_minor: 7,
            ..Default::default()
        };
        let info = DeviceInfo::from_status(20, &status);
        assert_eq!(info.firmware, Firmware::Unknown);
        assert_eq!((info.version_major, info.version_minor), (2, 7));
    }
}
