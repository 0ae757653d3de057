//! Bus discovery.
use std::{sync::Arc, thread::sleep, time::Duration};

use crate::{
    constants::{DEFAULT_PAGE_SIZE, MAX_TWI_ADDR, MIN_APP_ADDR, MIN_TWI_ADDR, SCAN_SETTLE_MS},
    device::{DeviceInfo, Firmware, Mode},
    error::{Error, Result},
    registry::AddressRegistry,
    transport::{BusPins, Transport},
    Connection, Flashing,
};

/// Walks the TWI address space looking for bootloaders and applications.
pub struct BusScanner<'b, T: Transport> {
    bus: &'b mut T,
    registry: Arc<AddressRegistry>,
    settle: Duration,
    reusing_bus: bool,
}

impl<'b, T: Transport> BusScanner<'b, T> {
    /// With `pins` the transport is initialized here, otherwise it is reused as is.
    pub fn new(
        bus: &'b mut T,
        registry: Arc<AddressRegistry>,
        pins: Option<BusPins>,
    ) -> Result<Self> {
        let reusing_bus = pins.is_none();
        if reusing_bus {
            log::debug!("Reusing the TWI connection");
        } else {
            log::debug!("Creating a new TWI connection");
            bus.init(pins)?;
        }
        Ok(BusScanner {
            bus,
            registry,
            settle: Duration::from_millis(SCAN_SETTLE_MS),
            reusing_bus,
        })
    }

    /// Pause after every probe, 5 ms by default.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn is_reusing_bus(&self) -> bool {
        self.reusing_bus
    }

    /// Lowest address that answers, and the mode implied by its half of the range.
    ///
    /// The top address is not probed.
    pub fn find_first(&mut self) -> Result<(u8, Mode)> {
        log::info!("Scanning TWI bus, looking for the first device (lowest address)");
        for address in MIN_TWI_ADDR..MAX_TWI_ADDR {
            if self.bus.probe(address)? {
                let mode = if address < MIN_APP_ADDR {
                    Mode::Bootloader
                } else {
                    Mode::Application
                };
                log::info!("{:?} found at address {} (0x{:02x})", mode, address, address);
                return Ok((address, mode));
            }
            sleep(self.settle);
        }
        Err(Error::NoDeviceFound)
    }

    /// Every device that acknowledges, in address order.
    ///
    /// Bootloader-half peers are asked for their status; application-half
    /// peers are only listed.
    pub fn scan(&mut self) -> Result<Vec<DeviceInfo>> {
        log::info!("Scanning TWI bus, searching all the connected devices");
        let mut devices = Vec::new();
        for address in MIN_TWI_ADDR..=MAX_TWI_ADDR {
            if self.bus.probe(address)? {
                let info = match Mode::of(address) {
                    Some(Mode::Bootloader) => self.identify(address),
                    _ => DeviceInfo::application(address),
                };
                log::info!("Found {}", info);
                devices.push(info);
            }
            sleep(self.settle);
        }
        Ok(devices)
    }

    fn identify(&mut self, address: u8) -> DeviceInfo {
        let status = Connection::open(&mut *self.bus, &self.registry, address, None)
            .and_then(|conn| Flashing::new(conn, DEFAULT_PAGE_SIZE))
            .and_then(|mut flashing| flashing.query_status());
        match status {
            Ok(status) => DeviceInfo::from_status(address, &status),
            Err(e) => {
                log::warn!("No status from {}: {}", address, e);
                DeviceInfo {
                    address,
                    firmware: Firmware::Unknown,
                    version_major: 0,
                    version_minor: 0,
                }
            }
        }
    }
}
