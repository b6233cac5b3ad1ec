//! Cartridge image parsing.
//!
//! A cartridge is an immutable blob of 32 KiB × 2ⁿ. The header at
//! 0x0100-0x014F carries the title, the mapper type code, ROM/RAM size
//! codes, the color-model compatibility flag and two checksums. Parsing
//! happens once at load; everything afterwards reads through the mapper.

use serde::Serialize;
use thiserror::Error;

/// Minimum image size that can hold a complete header
const MIN_IMAGE_SIZE: usize = 0x0150;

const TITLE_RANGE: std::ops::Range<usize> = 0x0134..0x0144;
const COLOR_FLAG: usize = 0x0143;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE_CODE: usize = 0x0148;
const RAM_SIZE_CODE: usize = 0x0149;
const DESTINATION: usize = 0x014A;
const HEADER_CHECKSUM: usize = 0x014D;
const GLOBAL_CHECKSUM: usize = 0x014E;

/// First and last byte covered by the header checksum
const CHECKSUM_RANGE: std::ops::RangeInclusive<usize> = 0x0134..=0x014C;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("image too small for a cartridge header ({0} bytes)")]
    TooSmall(usize),
    #[error("header checksum mismatch (stored {stored:#04x}, computed {computed:#04x})")]
    HeaderChecksum { stored: u8, computed: u8 },
}

/// Color-model compatibility declared by the header flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorSupport {
    /// Original monochrome model only
    DmgOnly,
    /// Runs on both models (flag 0x80)
    ColorCompatible,
    /// Requires the color model (flag 0xC0)
    ColorOnly,
}

impl ColorSupport {
    pub fn is_color(self) -> bool {
        !matches!(self, ColorSupport::DmgOnly)
    }
}

/// Parsed cartridge: the ROM image plus its decoded header fields.
#[derive(Debug, Clone)]
pub struct Cartridge {
    rom: Vec<u8>,
    title: String,
    cart_type: u8,
    declared_rom_size: usize,
    ram_size: usize,
    color: ColorSupport,
    destination: u8,
    header_checksum: u8,
    global_checksum: u16,
}

impl Cartridge {
    /// Parse and validate a cartridge image. Fails on images too small to
    /// hold a header or with a header checksum mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < MIN_IMAGE_SIZE {
            return Err(CartridgeError::TooSmall(data.len()));
        }

        let stored = data[HEADER_CHECKSUM];
        let computed = Self::compute_header_checksum(data);
        if stored != computed {
            return Err(CartridgeError::HeaderChecksum { stored, computed });
        }

        let title = data[TITLE_RANGE]
            .iter()
            .take_while(|&&b| b != 0 && b.is_ascii())
            .map(|&b| b as char)
            .collect::<String>()
            .trim_end()
            .to_string();

        let color = match data[COLOR_FLAG] {
            0x80 => ColorSupport::ColorCompatible,
            0xC0 => ColorSupport::ColorOnly,
            _ => ColorSupport::DmgOnly,
        };

        let ram_size = match data[RAM_SIZE_CODE] {
            0x01 => 0, // listed but unused in practice
            0x02 => 8 * 1024,
            0x03 => 32 * 1024,
            0x04 => 128 * 1024,
            0x05 => 64 * 1024,
            _ => 0,
        };

        Ok(Self {
            rom: data.to_vec(),
            title,
            cart_type: data[CART_TYPE],
            declared_rom_size: 0x8000 << data[ROM_SIZE_CODE].min(8),
            ram_size,
            color,
            destination: data[DESTINATION],
            header_checksum: stored,
            global_checksum: u16::from_be_bytes([
                data[GLOBAL_CHECKSUM],
                data[GLOBAL_CHECKSUM + 1],
            ]),
        })
    }

    /// Header checksum: `sum = (sum - byte - 1) mod 256` over 0x0134-0x014C
    pub fn compute_header_checksum(data: &[u8]) -> u8 {
        CHECKSUM_RANGE.fold(0u8, |sum, i| sum.wrapping_sub(data[i]).wrapping_sub(1))
    }

    /// Global checksum: 16-bit sum of every byte except the checksum field
    pub fn compute_global_checksum(&self) -> u16 {
        self.rom
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != GLOBAL_CHECKSUM && *i != GLOBAL_CHECKSUM + 1)
            .fold(0u16, |sum, (_, &b)| sum.wrapping_add(b as u16))
    }

    /// Whether the stored global checksum matches the image. Unlike the
    /// header checksum this is informational only; real hardware ignores
    /// it too.
    pub fn global_checksum_valid(&self) -> bool {
        self.compute_global_checksum() == self.global_checksum
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn into_rom(self) -> Vec<u8> {
        self.rom
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cart_type(&self) -> u8 {
        self.cart_type
    }

    /// ROM size declared by the header code (the image itself may be
    /// smaller for odd dumps; the mappers clamp reads)
    pub fn declared_rom_size(&self) -> usize {
        self.declared_rom_size
    }

    pub fn ram_size(&self) -> usize {
        self.ram_size
    }

    pub fn color_support(&self) -> ColorSupport {
        self.color
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    pub fn header_checksum(&self) -> u8 {
        self.header_checksum
    }

    pub fn global_checksum(&self) -> u16 {
        self.global_checksum
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Build a minimal valid 32 KiB image: given type/size codes, fill in
    /// the header checksum so `Cartridge::from_bytes` accepts it.
    pub fn build_rom(cart_type: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000usize << rom_size_code];
        rom[super::CART_TYPE] = cart_type;
        rom[super::ROM_SIZE_CODE] = rom_size_code;
        rom[super::RAM_SIZE_CODE] = ram_size_code;
        patch_header_checksum(&mut rom);
        rom
    }

    pub fn patch_header_checksum(rom: &mut [u8]) {
        rom[super::HEADER_CHECKSUM] = super::Cartridge::compute_header_checksum(rom);
    }
}
