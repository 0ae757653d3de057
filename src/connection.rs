//! A peer bound to a TWI address, and the command/reply exchange with it.
use std::sync::Arc;

use crate::{
    device::is_valid_address,
    error::{Error, Result},
    registry::{AddressLease, AddressRegistry},
    transport::{BusPins, Transport},
    Command,
};

/// Exclusive handle to the peer at one address.
///
/// The address stays reserved in the [`AddressRegistry`] until the
/// connection is closed or dropped.
pub struct Connection<'b, T: Transport> {
    bus: &'b mut T,
    lease: AddressLease,
    reusing_bus: bool,
}

impl<'b, T: Transport> Connection<'b, T> {
    /// Claim `address` and bind it to `bus`.
    ///
    /// With `pins` the transport is brought up by this connection, without
    /// it the transport is assumed to be initialized already.
    pub fn open(
        bus: &'b mut T,
        registry: &Arc<AddressRegistry>,
        address: u8,
        pins: Option<BusPins>,
    ) -> Result<Self> {
        if !is_valid_address(address) {
            return Err(Error::InvalidAddress(address));
        }
        let lease = registry.lease(address).inspect_err(|_| {
            log::error!(
                "TWI address {:02} already in use, unable to open a connection",
                address
            );
        })?;
        let reusing_bus = pins.is_none();
        if reusing_bus {
            log::debug!("Reusing the TWI connection with address {:02}", address);
        } else {
            log::debug!("Creating a new TWI connection with address {:02}", address);
            bus.init(pins)?;
        }
        Ok(Connection {
            bus,
            lease,
            reusing_bus,
        })
    }

    pub fn address(&self) -> u8 {
        self.lease.address()
    }

    /// True when the transport was initialized by someone else.
    pub fn is_reusing_bus(&self) -> bool {
        self.reusing_bus
    }

    /// Send `cmd` and expect the single byte `ack` back.
    pub fn command(&mut self, cmd: &[u8], ack: u8) -> Result<()> {
        self.exchange(cmd, ack, &mut [])
    }

    /// Send `cmd` and read `reply.len()` bytes, the first one being `ack`.
    pub fn query(&mut self, cmd: &[u8], ack: u8, reply: &mut [u8]) -> Result<()> {
        if reply.is_empty() {
            return self.command(cmd, ack);
        }
        self.exchange(cmd, ack, reply)
    }

    /// Transfer a typed command, returning the raw reply.
    pub fn transfer(&mut self, cmd: Command) -> Result<Vec<u8>> {
        let ack = cmd.ack();
        let mut reply = vec![0u8; cmd.reply_len().max(1)];
        let raw = cmd.into_raw();
        if reply.len() == 1 {
            self.command(&raw, ack)?;
            reply[0] = ack;
        } else {
            self.query(&raw, ack, &mut reply)?;
        }
        Ok(reply)
    }

    /// Write `cmd` and read back one byte without checking it.
    pub(crate) fn command_unchecked(&mut self, cmd: &[u8]) -> Result<Option<u8>> {
        self.send_bytes(cmd)?;
        let reply = self.bus.request_from(self.address(), 1)?;
        log::debug!("<= {}", hex::encode(&reply));
        Ok(reply.first().copied())
    }

    /// Give the address back to the registry.
    pub fn close(self) {
        log::debug!("Closing TWI connection with address {:02}", self.address());
    }

    fn send_bytes(&mut self, cmd: &[u8]) -> Result<()> {
        if cmd.is_empty() {
            return Err(Error::EmptyCommand);
        }
        let address = self.address();
        log::debug!("=> [{:02}] {}", address, hex::encode(cmd));
        for &byte in cmd {
            self.bus.send(address, &[byte])?;
        }
        Ok(())
    }

    /// An empty `reply` selects single byte mode.
    fn exchange(&mut self, cmd: &[u8], ack: u8, reply: &mut [u8]) -> Result<()> {
        self.send_bytes(cmd)?;
        let address = self.address();
        let command = cmd[0];

        if reply.is_empty() {
            let received = self.bus.request_from(address, 1)?;
            log::debug!("<= {}", hex::encode(&received));
            let Some(&byte) = received.first() else {
                log::warn!("Command 0x{:02x} got no reply", command);
                return Err(Error::ReplyLength {
                    command,
                    requested: 1,
                    received: 0,
                });
            };
            if byte != ack {
                log::warn!("Error parsing command 0x{:02x} <<< 0x{:02x}", command, byte);
                return Err(Error::ReplyMismatch {
                    command,
                    expected: ack,
                    reply: byte,
                });
            }
            log::debug!("Command 0x{:02x} parsed OK <<< 0x{:02x}", command, byte);
            return Ok(());
        }

        let received = self.bus.request_from(address, reply.len())?;
        log::debug!("<= {}", hex::encode(&received));
        let n = received.len().min(reply.len());
        reply[..n].copy_from_slice(&received[..n]);
        if received.len() != reply.len() {
            log::warn!(
                "Multibyte command 0x{:02x} got {} of {} bytes",
                command,
                received.len(),
                reply.len()
            );
            return Err(Error::ReplyLength {
                command,
                requested: reply.len(),
                received: received.len(),
            });
        }
        if reply[0] != ack {
            log::warn!(
                "Error parsing multibyte command 0x{:02x} <<< 0x{:02x}",
                command,
                reply[0]
            );
            return Err(Error::MultiReplyMismatch {
                command,
                expected: ack,
                reply: reply[0],
            });
        }
        log::debug!("Multibyte command 0x{:02x} parsed OK", command);
        Ok(())
    }
}
