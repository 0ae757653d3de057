//! Simulated TWI bus with scripted peers.
#![allow(dead_code)]

use std::collections::BTreeMap;

use timonel::{
    constants::{commands, TIMONEL_SIGNATURE},
    device::Features,
    error::{Error, Result},
    BusPins, Status, Transport,
};

/// A bootloader that stages pages in memory.
pub struct FakeTimonel {
    pub status: Status,
    pub page_size: usize,
    /// Page index whose write gets a wrong acknowledgement.
    pub fail_page: Option<usize>,
    pub pages: Vec<Vec<u8>>,
    pub page_writes: usize,
    pub inits: usize,
    /// Every command byte received, payloads excluded.
    pub commands: Vec<u8>,
    pending_page: Option<Vec<u8>>,
    reply: Vec<u8>,
}

impl FakeTimonel {
    pub fn new(major: u8, minor: u8) -> Self {
        FakeTimonel {
            status: Status {
                signature: TIMONEL_SIGNATURE,
                version_major: major,
                version_minor: minor,
                features: Features::from(0b0001_0010u8),
                bootloader_start: 0x1a40,
                application_start: 0xc001,
                trampoline_addr: 0x19fe,
            },
            page_size: 64,
            fail_page: None,
            pages: vec![],
            page_writes: 0,
            inits: 0,
            commands: vec![],
            pending_page: None,
            reply: vec![],
        }
    }

    fn feed(&mut self, byte: u8) {
        if let Some(mut page) = self.pending_page.take() {
            page.push(byte);
            if page.len() < self.page_size {
                self.pending_page = Some(page);
                return;
            }
            let index = self.page_writes;
            self.page_writes += 1;
            if self.fail_page == Some(index) {
                self.reply = vec![0x00];
            } else {
                self.pages.push(page);
                self.reply = vec![commands::ACK_WRITE_PAGE];
            }
            return;
        }

        self.commands.push(byte);
        self.reply = match byte {
            commands::INIT => {
                self.inits += 1;
                vec![commands::ACK_INIT]
            }
            commands::GET_STATUS => self.status.to_reply().unwrap().to_vec(),
            commands::WRITE_PAGE => {
                self.pending_page = Some(Vec::with_capacity(self.page_size));
                vec![]
            }
            _ => vec![0xff],
        };
    }
}

pub enum Peer {
    Timonel(FakeTimonel),
    /// Acknowledges its address, never answers reads.
    Application,
    /// Holds the bus, every transaction fails with a bus fault.
    Jammed,
}

#[derive(Default)]
pub struct SimBus {
    pub peers: BTreeMap<u8, Peer>,
    pub inits: usize,
    /// Addresses of every transaction, in bus order.
    pub traffic: Vec<u8>,
    current: Option<(u8, Vec<u8>)>,
}

impl SimBus {
    pub fn with(mut self, address: u8, peer: Peer) -> Self {
        self.peers.insert(address, peer);
        self
    }

    pub fn timonel(&self, address: u8) -> &FakeTimonel {
        match self.peers.get(&address) {
            Some(Peer::Timonel(fake)) => fake,
            _ => panic!("no bootloader at {}", address),
        }
    }

    pub fn timonel_mut(&mut self, address: u8) -> &mut FakeTimonel {
        match self.peers.get_mut(&address) {
            Some(Peer::Timonel(fake)) => fake,
            _ => panic!("no bootloader at {}", address),
        }
    }
}

impl Transport for SimBus {
    fn init(&mut self, _pins: Option<BusPins>) -> Result<()> {
        self.inits += 1;
        Ok(())
    }

    fn begin_transmission(&mut self, address: u8) {
        self.current = Some((address, vec![]));
    }

    fn write(&mut self, byte: u8) -> Result<()> {
        self.current
            .as_mut()
            .ok_or(Error::NoTransaction)?
            .1
            .push(byte);
        Ok(())
    }

    fn end_transmission(&mut self) -> Result<()> {
        let (address, bytes) = self.current.take().ok_or(Error::NoTransaction)?;
        self.traffic.push(address);
        match self.peers.get_mut(&address) {
            Some(Peer::Timonel(fake)) => {
                bytes.into_iter().for_each(|b| fake.feed(b));
                Ok(())
            }
            Some(Peer::Application) => Ok(()),
            Some(Peer::Jammed) => Err(jammed(address)),
            None => Err(Error::Nack(address)),
        }
    }

    fn request_from(&mut self, address: u8, len: usize) -> Result<Vec<u8>> {
        self.traffic.push(address);
        match self.peers.get_mut(&address) {
            Some(Peer::Timonel(fake)) => {
                let mut reply = std::mem::take(&mut fake.reply);
                reply.truncate(len);
                Ok(reply)
            }
            Some(Peer::Application) => Ok(vec![]),
            Some(Peer::Jammed) => Err(jammed(address)),
            None => Err(Error::Nack(address)),
        }
    }
}

fn jammed(address: u8) -> Error {
    Error::Bus {
        address,
        message: "arbitration lost".to_string(),
    }
}
