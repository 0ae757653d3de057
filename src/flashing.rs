//! Firmware upload through the Timonel bootloader.

use std::{borrow::Cow, thread::sleep, time::Duration};

use crate::{
    constants::{commands, ERASED_BYTE, MAX_PAGE_SIZE},
    device::Status,
    error::{Error, Result, UploadPhase},
    Command, Connection, Transport,
};

/// Upload progress, reported after every acknowledged page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub pages_sent: usize,
    pub pages_total: usize,
    pub bytes_sent: usize,
    pub bytes_total: usize,
}

/// Bootloader session on one connection.
pub struct Flashing<'b, T: Transport> {
    conn: Connection<'b, T>,
    page_size: usize,
    init_settle: Option<Duration>,
    status: Status,
}

impl<'b, T: Transport> Flashing<'b, T> {
    /// `page_size` stays fixed for every transfer of this session.
    pub fn new(conn: Connection<'b, T>, page_size: usize) -> Result<Self> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidPageSize(page_size));
        }
        Ok(Flashing {
            conn,
            page_size,
            init_settle: None,
            status: Status::default(),
        })
    }

    /// Use the two-step init, pausing `settle` between the steps.
    pub fn with_two_step_init(mut self, settle: Duration) -> Self {
        self.init_settle = Some(settle);
        self
    }

    pub fn address(&self) -> u8 {
        self.conn.address()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Last status read from the device, all-zero if never queried.
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn init(&mut self) -> Result<()> {
        let reply = self.conn.command_unchecked(&Command::Init.into_raw())?;
        if reply != Some(commands::ACK_INIT) {
            log::debug!("INIT acknowledged with {:02x?}, ignored", reply);
        }
        Ok(())
    }

    /// For devices that need time before they accept commands.
    pub fn two_step_init(&mut self, settle: Duration) -> Result<()> {
        self.init()?;
        sleep(settle);
        self.init()
    }

    pub fn query_status(&mut self) -> Result<Status> {
        let reply = self.conn.transfer(Command::GetStatus)?;
        let status = Status::from_reply(&reply)?;
        if !status.is_timonel() {
            log::warn!(
                "Device at {} reports signature {}, not a Timonel bootloader",
                self.address(),
                status.signature
            );
        }
        self.status = status;
        Ok(status)
    }

    pub fn dump_info(&self) {
        log::info!("Address: {} (0x{:02x})", self.address(), self.address());
        log::info!("Status: {}", self.status);
        log::info!("Features: {:?}", self.status.features);
        log::info!("Page size: {}", self.page_size);
    }

    /// Send one full page and check its acknowledgement.
    pub fn write_page(&mut self, page: &[u8]) -> Result<()> {
        if page.len() != self.page_size {
            return Err(Error::InvalidPageSize(page.len()));
        }
        self.conn.transfer(Command::write_page(page))?;
        Ok(())
    }

    pub fn upload(&mut self, image: &[u8]) -> Result<usize> {
        self.upload_with_progress(image, |_| {})
    }

    /// Init, query status, then write `image` page by page.
    ///
    /// Stops at the first failure; the error tells the phase and, for page
    /// writes, the index of the page that was not acknowledged. Returns the
    /// number of pages sent.
    pub fn upload_with_progress(
        &mut self,
        image: &[u8],
        mut progress: impl FnMut(Progress),
    ) -> Result<usize> {
        if image.is_empty() {
            return Err(Error::EmptyFirmware);
        }

        match self.init_settle {
            Some(settle) => self.two_step_init(settle),
            None => self.init(),
        }
        .map_err(|e| Error::upload(UploadPhase::Init, e))?;

        let status = self
            .query_status()
            .map_err(|e| Error::upload(UploadPhase::Status, e))?;
        let limit = status.bootloader_start;
        if limit != 0 && image.len() > usize::from(limit) {
            return Err(Error::FirmwareTooLarge {
                size: image.len(),
                limit,
            });
        }

        let pages_total = image.len().div_ceil(self.page_size);
        log::info!(
            "Uploading {} bytes to {} in {} pages of {}",
            image.len(),
            self.address(),
            pages_total,
            self.page_size
        );
        for (index, page) in pages(image, self.page_size).enumerate() {
            trace_page(index, &page);
            self.write_page(&page)
                .map_err(|e| Error::upload(UploadPhase::Page(index), e))?;
            progress(Progress {
                pages_sent: index + 1,
                pages_total,
                bytes_sent: ((index + 1) * self.page_size).min(image.len()),
                bytes_total: image.len(),
            });
        }
        log::info!("Firmware staged, {} pages acknowledged", pages_total);
        Ok(pages_total)
    }

    pub fn into_connection(self) -> Connection<'b, T> {
        self.conn
    }
}

/// Split `image` into pages of exactly `page_size`, padding the last one
/// with erased flash.
pub fn pages(image: &[u8], page_size: usize) -> impl Iterator<Item = Cow<'_, [u8]>> {
    image.chunks(page_size).map(move |chunk| {
        if chunk.len() == page_size {
            Cow::Borrowed(chunk)
        } else {
            let mut padded = chunk.to_vec();
            padded.resize(page_size, ERASED_BYTE);
            Cow::Owned(padded)
        }
    })
}

fn trace_page(index: usize, page: &[u8]) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    let mut dump = Vec::new();
    if hxdmp::hexdump(page, &mut dump).is_ok() {
        log::trace!("page {}:\n{}", index, String::from_utf8_lossy(&dump));
    }
}
