//! Firmware file formats
use std::str;
use std::{borrow::Cow, path::Path};

use anyhow::Result;

use crate::constants::ERASED_BYTE;

/// 16-bit flash address space of the AVR targets.
pub const MAX_IMAGE_SIZE: usize = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareFormat {
    PlainHex,
    IntelHex,
    Binary,
}

pub fn read_firmware_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    let format = guess_format(p, &raw);
    log::info!("Read {} as {:?} format", p.display(), format);
    match format {
        FirmwareFormat::PlainHex => read_hex(str::from_utf8(&raw)?),
        FirmwareFormat::IntelHex => read_ihex(str::from_utf8(&raw)?),
        FirmwareFormat::Binary => Ok(raw),
    }
}

pub fn guess_format(path: &Path, raw: &[u8]) -> FirmwareFormat {
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .to_lowercase();
    if ["ihex", "ihe", "h86", "hex", "a43", "a90"].contains(&&*ext) {
        return FirmwareFormat::IntelHex;
    }
    if ext == "bin" || raw.is_empty() {
        return FirmwareFormat::Binary;
    }

    let is_text = |c: u8| c.is_ascii_hexdigit() || c.is_ascii_whitespace();
    if raw[0] == b':' && raw.iter().all(|&c| is_text(c) || c == b':') {
        FirmwareFormat::IntelHex
    } else if raw.iter().copied().all(is_text) {
        FirmwareFormat::PlainHex
    } else {
        FirmwareFormat::Binary
    }
}

/// Hex digits, whitespace and line breaks ignored.
pub fn read_hex(data: &str) -> Result<Vec<u8>> {
    let digits: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(hex::decode(digits)?)
}

/// Flat image from flash address 0, gaps filled with erased flash.
pub fn read_ihex(data: &str) -> Result<Vec<u8>> {
    use ihex::Record;

    let mut base_address = 0;

    let mut records = vec![];
    for record in ihex::Reader::new(data) {
        let record = record?;
        use Record::*;
        match record {
            Data { offset, value } => {
                let offset = base_address + offset as u32;

                records.push((offset, value.into()));
            }
            EndOfFile => (),
            ExtendedSegmentAddress(address) => {
                base_address = (address as u32) * 16;
            }
            StartSegmentAddress { .. } => (),
            ExtendedLinearAddress(address) => {
                base_address = (address as u32) << 16;
            }
            StartLinearAddress(_) => (),
        };
    }
    merge_sections(records)
}

fn merge_sections(mut sections: Vec<(u32, Cow<[u8]>)>) -> Result<Vec<u8>> {
    sections.sort(); // order by start address

    let Some(end_address) = sections
        .iter()
        .map(|(addr, sect)| *addr as usize + sect.len())
        .max()
    else {
        anyhow::bail!("no data records in firmware file");
    };
    if end_address > MAX_IMAGE_SIZE {
        anyhow::bail!(
            "firmware ends at 0x{:x}, beyond the 0x{:x} byte flash space",
            end_address,
            MAX_IMAGE_SIZE
        );
    }
    if let Some((first, _)) = sections.first() {
        if *first != 0 {
            log::warn!("Firmware starts at 0x{:04x}, padding from 0", first);
        }
    }

    let mut binary = vec![ERASED_BYTE; end_address];
    let mut covered = 0;
    for (addr, sect) in sections {
        let sect_start = addr as usize;
        if sect_start < covered {
            anyhow::bail!("overlapping data records at 0x{:04x}", addr);
        }
        let sect_end = sect_start + sect.len();
        binary[sect_start..sect_end].copy_from_slice(&sect);
        covered = sect_end;
    }
    Ok(binary)
}
