//! Error type of the host side engines.
use std::fmt;

use thiserror::Error;

/// Where an upload stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Init,
    Status,
    /// Zero-based index of the page whose write failed.
    /// Every page before it was acknowledged.
    Page(usize),
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadPhase::Init => f.write_str("init"),
            UploadPhase::Status => f.write_str("status query"),
            UploadPhase::Page(page) => write!(f, "write of page {}", page),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("TWI address {0} is already in use")]
    AddressInUse(u8),
    #[error("TWI address {0} is outside of {min}..={max}", min = crate::constants::MIN_TWI_ADDR, max = crate::constants::MAX_TWI_ADDR)]
    InvalidAddress(u8),
    /// Single byte reply differs from the expected echo.
    #[error("command 0x{command:02x} replied 0x{reply:02x}, expected 0x{expected:02x}")]
    ReplyMismatch { command: u8, expected: u8, reply: u8 },
    /// Multibyte reply has the right length but a wrong echo byte.
    #[error("multibyte command 0x{command:02x} replied 0x{reply:02x}, expected 0x{expected:02x}")]
    MultiReplyMismatch { command: u8, expected: u8, reply: u8 },
    /// The peer returned fewer bytes than requested.
    #[error("command 0x{command:02x} got {received} reply bytes, expected {requested}")]
    ReplyLength {
        command: u8,
        requested: usize,
        received: usize,
    },
    #[error("no acknowledge from TWI address {0}")]
    Nack(u8),
    #[error("bus error talking to TWI address {address}: {message}")]
    Bus { address: u8, message: String },
    #[error("byte written outside of a transaction")]
    NoTransaction,
    #[error("a command needs at least one byte")]
    EmptyCommand,
    #[error("no device found on the TWI bus")]
    NoDeviceFound,
    #[error("page size {0} is not supported")]
    InvalidPageSize(usize),
    #[error("firmware image is empty")]
    EmptyFirmware,
    #[error("firmware of {size} bytes does not fit below the bootloader at 0x{limit:04x}")]
    FirmwareTooLarge { size: usize, limit: u16 },
    #[error("upload aborted during {phase}")]
    Upload {
        phase: UploadPhase,
        #[source]
        source: Box<Error>,
    },
    #[error(transparent)]
    Parse(#[from] scroll::Error),
}

impl Error {
    pub(crate) fn upload(phase: UploadPhase, source: Error) -> Self {
        Error::Upload {
            phase,
            source: Box::new(source),
        }
    }

    /// Index of the page that failed, for upload errors raised by a page write.
    pub fn failing_page(&self) -> Option<usize> {
        match self {
            Error::Upload {
                phase: UploadPhase::Page(page),
                ..
            } => Some(*page),
            _ => None,
        }
    }

    /// True for a missing acknowledge, the usual sign of an absent peer.
    pub fn is_nack(&self) -> bool {
        matches!(self, Error::Nack(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
