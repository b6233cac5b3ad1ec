//! Cartridge memory bank controllers (MBCs).
//!
//! Every mapper speaks the same four-operation interface: ROM reads,
//! ROM-range register writes, and external-RAM reads/writes. The variants
//! are a closed set dispatched through an enum; the dispatch point sits on
//! every cartridge access, so no dynamic dispatch.

mod mbc0;
mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;

pub use mbc0::Mbc0;
pub use mbc1::Mbc1;
pub use mbc2::Mbc2;
pub use mbc3::{Mbc3, RtcClock, SystemClock};
pub use mbc5::Mbc5;

use crate::cartridge::Cartridge;
use log::warn;

/// ROM bank size in bytes
pub(crate) const ROM_BANK_SIZE: usize = 0x4000;
/// External RAM bank size in bytes
pub(crate) const RAM_BANK_SIZE: usize = 0x2000;

/// Unified mapper enum that dispatches to specific implementations
#[derive(Debug)]
pub enum Mapper {
    Mbc0(Mbc0),
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Mapper {
    /// Build the mapper selected by the cartridge-type code. Unrecognized
    /// codes fall back to the plain 32 KiB mapping with a warning.
    pub fn from_cartridge(cart: Cartridge) -> Self {
        let cart_type = cart.cart_type();
        let ram = vec![0; cart.ram_size()];
        let rom = cart.into_rom();

        match cart_type {
            0x00 => Mapper::Mbc0(Mbc0::new(rom)),
            0x01..=0x03 => Mapper::Mbc1(Mbc1::new(rom, ram)),
            0x05..=0x06 => Mapper::Mbc2(Mbc2::new(rom)),
            // 0x0F and 0x10 carry the real-time clock
            0x0F..=0x10 => Mapper::Mbc3(Mbc3::new(rom, ram, true, Box::new(SystemClock))),
            0x11..=0x13 => Mapper::Mbc3(Mbc3::new(rom, ram, false, Box::new(SystemClock))),
            0x19..=0x1B => Mapper::Mbc5(Mbc5::new(rom, ram, false)),
            0x1C..=0x1E => Mapper::Mbc5(Mbc5::new(rom, ram, true)),
            _ => {
                warn!("unsupported cartridge type {cart_type:#04x}, falling back to plain mapping");
                Mapper::Mbc0(Mbc0::new(rom))
            }
        }
    }

    /// Read from ROM address space (0x0000-0x7FFF)
    pub fn read_rom(&self, addr: u16) -> u8 {
        match self {
            Mapper::Mbc0(m) => m.read_rom(addr),
            Mapper::Mbc1(m) => m.read_rom(addr),
            Mapper::Mbc2(m) => m.read_rom(addr),
            Mapper::Mbc3(m) => m.read_rom(addr),
            Mapper::Mbc5(m) => m.read_rom(addr),
        }
    }

    /// Write to ROM address space: stored as mapper register state, never
    /// into the image itself
    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Mbc0(m) => m.write_rom(addr, val),
            Mapper::Mbc1(m) => m.write_rom(addr, val),
            Mapper::Mbc2(m) => m.write_rom(addr, val),
            Mapper::Mbc3(m) => m.write_rom(addr, val),
            Mapper::Mbc5(m) => m.write_rom(addr, val),
        }
    }

    /// Read from external RAM address space (0xA000-0xBFFF)
    pub fn read_ram(&self, addr: u16) -> u8 {
        match self {
            Mapper::Mbc0(m) => m.read_ram(addr),
            Mapper::Mbc1(m) => m.read_ram(addr),
            Mapper::Mbc2(m) => m.read_ram(addr),
            Mapper::Mbc3(m) => m.read_ram(addr),
            Mapper::Mbc5(m) => m.read_ram(addr),
        }
    }

    /// Write to external RAM address space
    pub fn write_ram(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Mbc0(m) => m.write_ram(addr, val),
            Mapper::Mbc1(m) => m.write_ram(addr, val),
            Mapper::Mbc2(m) => m.write_ram(addr, val),
            Mapper::Mbc3(m) => m.write_ram(addr, val),
            Mapper::Mbc5(m) => m.write_ram(addr, val),
        }
    }

    /// Rumble motor state (always false outside MBC5 rumble carts)
    pub fn rumble_active(&self) -> bool {
        match self {
            Mapper::Mbc5(m) => m.rumble_active(),
            _ => false,
        }
    }

    /// Get the mapper name for display/debugging
    pub fn name(&self) -> &'static str {
        match self {
            Mapper::Mbc0(_) => "ROM only",
            Mapper::Mbc1(_) => "MBC1",
            Mapper::Mbc2(_) => "MBC2",
            Mapper::Mbc3(_) => "MBC3",
            Mapper::Mbc5(_) => "MBC5",
        }
    }
}

/// Clamped ROM read shared by the mappers: a bank offset past the end of
/// the image reads as open bus.
pub(crate) fn read_rom_offset(rom: &[u8], offset: usize) -> u8 {
    match rom.get(offset) {
        Some(&b) => b,
        None => {
            warn!("ROM read past image end (offset {offset:#x} of {:#x})", rom.len());
            0xFF
        }
    }
}
