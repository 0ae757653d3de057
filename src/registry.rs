//! Bookkeeping of TWI addresses bound to a live connection.
use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Set of addresses currently owned by a [`Connection`](crate::Connection).
///
/// Share one registry (through an `Arc`) between everything that opens
/// connections on the same bus; the first caller to acquire an address wins.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    in_use: Mutex<BTreeSet<u8>>,
}

impl AddressRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquire(&self, address: u8) -> Result<()> {
        if self.in_use.lock().insert(address) {
            Ok(())
        } else {
            Err(Error::AddressInUse(address))
        }
    }

    /// Returns false if the address was not held.
    pub fn release(&self, address: u8) -> bool {
        self.in_use.lock().remove(&address)
    }

    pub fn is_in_use(&self, address: u8) -> bool {
        self.in_use.lock().contains(&address)
    }

    pub fn in_use(&self) -> Vec<u8> {
        self.in_use.lock().iter().copied().collect()
    }

    /// Acquire `address` for as long as the returned lease lives.
    pub fn lease(self: &Arc<Self>, address: u8) -> Result<AddressLease> {
        self.acquire(address)?;
        Ok(AddressLease {
            registry: Arc::clone(self),
            address,
        })
    }
}

/// Ownership of one address, given back to the registry on drop.
#[derive(Debug)]
pub struct AddressLease {
    registry: Arc<AddressRegistry>,
    address: u8,
}

impl AddressLease {
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl Drop for AddressLease {
    fn drop(&mut self) {
        log::debug!("Freeing TWI address {}", self.address);
        self.registry.release(self.address);
    }
}
