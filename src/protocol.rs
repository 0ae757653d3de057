//! Command vocabulary of the Timonel bootloader.

use crate::constants::{commands, STATUS_REPLY_SIZE};

/// Timonel TWI command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Put the bootloader in command mode.
    ///
    /// The single byte acknowledgement is read and thrown away.
    Init,
    /// Ask for signature, version, features and flash layout.
    GetStatus,
    /// Stage one page of firmware in the device page buffer.
    ///
    /// Payload length is the page size negotiated for the transfer.
    WritePage { data: Vec<u8> },
}

impl Command {
    pub fn write_page(data: impl Into<Vec<u8>>) -> Self {
        Command::WritePage { data: data.into() }
    }

    pub const fn code(&self) -> u8 {
        match self {
            Command::Init => commands::INIT,
            Command::GetStatus => commands::GET_STATUS,
            Command::WritePage { .. } => commands::WRITE_PAGE,
        }
    }

    /// Echo byte that starts a valid reply.
    pub const fn ack(&self) -> u8 {
        match self {
            Command::Init => commands::ACK_INIT,
            Command::GetStatus => commands::ACK_STATUS,
            Command::WritePage { .. } => commands::ACK_WRITE_PAGE,
        }
    }

    /// Reply size in multibyte mode, 0 for a single acknowledgement byte.
    pub const fn reply_len(&self) -> usize {
        match self {
            Command::GetStatus => STATUS_REPLY_SIZE,
            _ => 0,
        }
    }

    /// Bytes on the wire, each one sent as its own transaction.
    pub fn into_raw(self) -> Vec<u8> {
        match self {
            Command::WritePage { data } => {
                let mut buf = Vec::with_capacity(1 + data.len());
                buf.push(commands::WRITE_PAGE);
                buf.extend(data);
                buf
            }
            cmd => vec![cmd.code()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acks_are_complements() {
        for cmd in [Command::Init, Command::GetStatus, Command::write_page(vec![])] {
            assert_eq!(cmd.ack(), !cmd.code());
        }
    }

    #[test]
    fn write_page_carries_payload() {
        let raw = Command::write_page([1u8, 2, 3]).into_raw();
        assert_eq!(raw, vec![commands::WRITE_PAGE, 1, 2, 3]);
        assert_eq!(Command::GetStatus.into_raw(), vec![commands::GET_STATUS]);
        assert_eq!(Command::GetStatus.reply_len(), 11);
    }
}
