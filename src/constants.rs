/// Lowest TWI address used by the protocol.
pub const MIN_TWI_ADDR: u8 = 8;
/// Highest TWI address used by the protocol.
pub const MAX_TWI_ADDR: u8 = 63;

/// Distance between a bootloader address and its paired application address.
///
/// T: |08|09|10|..|34|35|
/// A: |36|37|38|..|62|63|
pub const APP_ADDR_OFFSET: u8 = (MAX_TWI_ADDR + 1 - MIN_TWI_ADDR) / 2;
/// First application-mode address, the midpoint of the address space.
pub const MIN_APP_ADDR: u8 = MIN_TWI_ADDR + APP_ADDR_OFFSET;

/// Signature byte of the Timonel bootloader family ('T').
pub const TIMONEL_SIGNATURE: u8 = 84;

/// GET_STATUS reply: echo, signature, major, minor, features, 3 x u16.
pub const STATUS_REPLY_SIZE: usize = 11;

/// SPM page size of the ATtiny85.
pub const DEFAULT_PAGE_SIZE: usize = 64;
pub const MAX_PAGE_SIZE: usize = 256;

/// Value of an erased flash cell, used to pad the last page.
pub const ERASED_BYTE: u8 = 0xff;

/// Pause after each probe while scanning, for slow peers.
pub const SCAN_SETTLE_MS: u64 = 5;

pub mod commands {
    pub const INIT: u8 = 0x81;
    pub const ACK_INIT: u8 = !INIT;
    pub const GET_STATUS: u8 = 0x82;
    pub const ACK_STATUS: u8 = !GET_STATUS;
    pub const WRITE_PAGE: u8 = 0x86;
    pub const ACK_WRITE_PAGE: u8 = !WRITE_PAGE;
}
