//! Memory bus: the 16-bit address-space router.
//!
//! Routes CPU accesses to the cartridge mapper, banked work and video
//! RAM, OAM, the I/O register file and high RAM, and owns the two DMA
//! engines (the 160-byte OAM transfer and the general-purpose /
//! horizontal-blank VRAM block transfer) plus the double-speed switch
//! latch. Peripheral interrupt lines are collected into the IF register
//! as the peripherals advance.

use brick_core::cpu_lr35902::{Interrupt, MemoryLr35902};
use log::warn;

use crate::apu::GbApu;
use crate::joypad::Joypad;
use crate::mappers::Mapper;
use crate::ppu::Ppu;
use crate::timer::Timer;

/// Work RAM: eight 4 KiB banks (banks 2-7 reachable on the color model)
const WRAM_SIZE: usize = 0x8000;
const WRAM_BANK_SIZE: usize = 0x1000;

pub struct GbBus {
    mapper: Option<Mapper>,

    pub ppu: Ppu,
    pub apu: GbApu,
    pub timer: Timer,
    pub joypad: Joypad,

    wram: Vec<u8>,
    /// Switchable bank at 0xD000 (1-7; zero selects one)
    wram_bank: u8,
    hram: [u8; 0x7F],

    /// Interrupt enable (0xFFFF) and request (0xFF0F) registers
    ie: u8,
    if_reg: u8,

    serial_data: u8,
    serial_control: u8,
    /// Last value written to the OAM DMA trigger register
    dma_reg: u8,

    /// Color-model features unlocked
    cgb: bool,
    /// KEY1: bit 7 current speed, bit 0 armed switch request
    key1: u8,

    hdma_src: u16,
    hdma_dst: u16,
    hdma_blocks_remaining: u8,
    hdma_active: bool,

    /// Latched by the PPU when a frame finishes compositing
    frame_ready: bool,
}

impl GbBus {
    pub fn new(cgb: bool) -> Self {
        Self {
            mapper: None,
            ppu: Ppu::new(cgb),
            apu: GbApu::new(),
            timer: Timer::new(),
            joypad: Joypad::new(),
            wram: vec![0; WRAM_SIZE],
            wram_bank: 1,
            hram: [0; 0x7F],
            ie: 0,
            if_reg: 0x01,
            serial_data: 0,
            serial_control: 0,
            dma_reg: 0,
            cgb,
            key1: 0,
            hdma_src: 0,
            hdma_dst: 0x8000,
            hdma_blocks_remaining: 0,
            hdma_active: false,
            frame_ready: false,
        }
    }

    pub fn insert_cartridge(&mut self, mapper: Mapper) {
        self.mapper = Some(mapper);
    }

    pub fn eject_cartridge(&mut self) {
        self.mapper = None;
    }

    pub fn take_mapper(&mut self) -> Option<Mapper> {
        self.mapper.take()
    }

    pub fn has_cartridge(&self) -> bool {
        self.mapper.is_some()
    }

    pub fn mapper(&self) -> Option<&Mapper> {
        self.mapper.as_ref()
    }

    /// CPU runs at double speed
    pub fn double_speed(&self) -> bool {
        self.key1 & 0x80 != 0
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn request_interrupt(&mut self, int: Interrupt) {
        self.if_reg |= int.mask();
    }

    /// Advance every peripheral by the given machine cycles, collecting
    /// their interrupt lines. Returns true when a frame completed.
    pub fn tick(&mut self, cycles: u32) -> bool {
        if self.timer.step(cycles) {
            self.request_interrupt(Interrupt::Timer);
        }

        let events = self.ppu.step(cycles);
        if events.vblank_interrupt {
            self.request_interrupt(Interrupt::VBlank);
        }
        if events.stat_interrupt {
            self.request_interrupt(Interrupt::LcdStat);
        }
        if events.entered_hblank {
            self.tick_hblank_dma();
        }
        if events.frame_complete {
            self.frame_ready = true;
        }

        self.apu.step(cycles);

        if self.joypad.take_interrupt() {
            self.request_interrupt(Interrupt::Joypad);
        }

        self.frame_ready
    }

    /// Consume the frame-ready latch
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    /// Little-endian 16-bit read
    pub fn read_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read(addr), self.read(addr.wrapping_add(1))])
    }

    /// Little-endian 16-bit write
    pub fn write_word(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write(addr, lo);
        self.write(addr.wrapping_add(1), hi);
    }

    // ---- DMA engines -------------------------------------------------

    /// OAM DMA (0xFF46): copy 160 bytes from `value << 8` into OAM,
    /// modeled as an atomic transfer at the point of write.
    fn oam_dma(&mut self, val: u8) {
        let src = (val as u16) << 8;
        for i in 0..0xA0u16 {
            let byte = self.read(src.wrapping_add(i));
            self.ppu.write_oam(i, byte);
        }
    }

    fn hdma_source_valid(src: u16) -> bool {
        src <= 0x7FF0 || (0xA000..=0xDFF0).contains(&src)
    }

    /// Copy one 16-byte block and advance the transfer pointers
    fn hdma_copy_block(&mut self) {
        for i in 0..16u16 {
            let byte = self.read(self.hdma_src.wrapping_add(i));
            // Destination stays inside VRAM
            let dst = 0x8000 | (self.hdma_dst.wrapping_add(i) & 0x1FFF);
            self.ppu.write_vram(dst, byte);
        }
        self.hdma_src = self.hdma_src.wrapping_add(16);
        self.hdma_dst = self.hdma_dst.wrapping_add(16);
    }

    /// One HBlank entry: transfer a single block of an active HBlank DMA
    pub fn tick_hblank_dma(&mut self) {
        if !self.hdma_active {
            return;
        }
        self.hdma_copy_block();
        self.hdma_blocks_remaining -= 1;
        if self.hdma_blocks_remaining == 0 {
            self.hdma_active = false;
        }
    }

    /// 0xFF55 write: select mode and arm the engine, or cancel an active
    /// HBlank transfer (bit 7 clear while active).
    fn write_hdma_control(&mut self, val: u8) {
        if self.hdma_active && val & 0x80 == 0 {
            // Cancelled; the remaining block count stays readable
            self.hdma_active = false;
            return;
        }

        if !Self::hdma_source_valid(self.hdma_src) {
            warn!("VRAM DMA from invalid source {:#06x} ignored", self.hdma_src);
            return;
        }

        let blocks = (val & 0x7F) + 1;
        if val & 0x80 == 0 {
            // General-purpose: the whole block copies immediately
            for _ in 0..blocks {
                self.hdma_copy_block();
            }
            self.hdma_blocks_remaining = 0;
            self.hdma_active = false;
        } else {
            self.hdma_blocks_remaining = blocks;
            self.hdma_active = true;
        }
    }

    /// 0xFF55 read-back: remaining blocks while active, all-ones when idle
    fn read_hdma_control(&self) -> u8 {
        if self.hdma_active {
            self.hdma_blocks_remaining & 0x7F
        } else {
            0xFF
        }
    }

    // ---- I/O register dispatch ---------------------------------------

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read_register(),
            0xFF01 => self.serial_data,
            0xFF02 => self.serial_control | 0x7E,
            0xFF04..=0xFF07 => self.timer.read_register(addr),
            // Upper three bits of IF always read as one
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_register(addr),
            0xFF46 => self.dma_reg,
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_register(addr),
            0xFF4D if self.cgb => self.key1 | 0x7E,
            0xFF4F => self.ppu.read_register(addr),
            0xFF55 if self.cgb => self.read_hdma_control(),
            0xFF68..=0xFF6B => self.ppu.read_register(addr),
            0xFF70 if self.cgb => self.wram_bank | 0xF8,
            _ => 0xFF,
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.joypad.write_register(val),
            0xFF01 => self.serial_data = val,
            0xFF02 => {
                // No link partner: a started transfer completes at once
                // against an open line
                self.serial_control = val & 0x7F;
                if val & 0x80 != 0 {
                    self.serial_data = 0xFF;
                    self.request_interrupt(Interrupt::Serial);
                }
            }
            0xFF04..=0xFF07 => self.timer.write_register(addr, val),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_register(addr, val),
            0xFF46 => {
                self.dma_reg = val;
                self.oam_dma(val);
            }
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.write_register(addr, val),
            0xFF4D if self.cgb => self.key1 = (self.key1 & 0x80) | (val & 0x01),
            0xFF4F => self.ppu.write_register(addr, val),
            0xFF51 if self.cgb => self.hdma_src = (self.hdma_src & 0x00F0) | ((val as u16) << 8),
            0xFF52 if self.cgb => self.hdma_src = (self.hdma_src & 0xFF00) | (val & 0xF0) as u16,
            0xFF53 if self.cgb => {
                self.hdma_dst = 0x8000 | (self.hdma_dst & 0x00F0) | (((val & 0x1F) as u16) << 8)
            }
            0xFF54 if self.cgb => {
                self.hdma_dst = 0x8000 | (self.hdma_dst & 0x1F00) | (val & 0xF0) as u16
            }
            0xFF55 if self.cgb => self.write_hdma_control(val),
            0xFF68..=0xFF6B => self.ppu.write_register(addr, val),
            0xFF70 if self.cgb => self.wram_bank = (val & 0x07).max(1),
            _ => {}
        }
    }

    fn wram_offset(&self, addr: u16) -> usize {
        match addr {
            0xC000..=0xCFFF => (addr - 0xC000) as usize,
            // 0xD000-0xDFFF: switchable bank
            _ => self.wram_bank as usize * WRAM_BANK_SIZE + (addr - 0xD000) as usize,
        }
    }
}

impl MemoryLr35902 for GbBus {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => match &self.mapper {
                Some(mapper) => mapper.read_rom(addr),
                None => 0xFF,
            },
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xA000..=0xBFFF => match &self.mapper {
                Some(mapper) => mapper.read_ram(addr),
                None => 0xFF,
            },
            0xC000..=0xDFFF => self.wram[self.wram_offset(addr)],
            // Echo RAM mirrors 0xC000-0xDDFF
            0xE000..=0xFDFF => self.read(addr - 0x2000),
            0xFE00..=0xFE9F => self.ppu.read_oam(addr - 0xFE00),
            // Unusable region
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(mapper) = &mut self.mapper {
                    mapper.write_rom(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xA000..=0xBFFF => {
                if let Some(mapper) = &mut self.mapper {
                    mapper.write_ram(addr, val);
                }
            }
            0xC000..=0xDFFF => {
                let offset = self.wram_offset(addr);
                self.wram[offset] = val;
            }
            0xE000..=0xFDFF => self.write(addr - 0x2000, val),
            0xFE00..=0xFE9F => self.ppu.write_oam(addr - 0xFE00, val),
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie = val,
        }
    }

    fn speed_switch_requested(&self) -> bool {
        self.cgb && self.key1 & 0x01 != 0
    }

    fn perform_speed_switch(&mut self) {
        self.key1 = (self.key1 ^ 0x80) & 0x80;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{test_support::build_rom, Cartridge};

    fn dmg_bus() -> GbBus {
        GbBus::new(false)
    }

    fn cgb_bus() -> GbBus {
        GbBus::new(true)
    }

    fn bus_with_cart(cart_type: u8) -> GbBus {
        let mut bus = dmg_bus();
        let rom = build_rom(cart_type, 0, 0x02);
        bus.insert_cartridge(Mapper::from_cartridge(Cartridge::from_bytes(&rom).unwrap()));
        bus
    }

    #[test]
    fn hram_roundtrip() {
        let mut bus = dmg_bus();
        bus.write(0xFF80, 0x42);
        bus.write(0xFFFE, 0x99);
        assert_eq!(bus.read(0xFF80), 0x42);
        assert_eq!(bus.read(0xFFFE), 0x99);
    }

    #[test]
    fn word_access_is_little_endian() {
        let mut bus = dmg_bus();
        bus.write_word(0xC100, 0xBEEF);
        assert_eq!(bus.read(0xC100), 0xEF);
        assert_eq!(bus.read(0xC101), 0xBE);
        assert_eq!(
            bus.read_word(0xC100),
            ((bus.read(0xC101) as u16) << 8) | bus.read(0xC100) as u16
        );
    }

    #[test]
    fn wram_and_echo_mirror() {
        let mut bus = dmg_bus();
        bus.write(0xC123, 0x55);
        assert_eq!(bus.read(0xE123), 0x55);
        bus.write(0xF000, 0x66);
        assert_eq!(bus.read(0xD000), 0x66);
    }

    #[test]
    fn unusable_region_reads_ones_and_drops_writes() {
        let mut bus = dmg_bus();
        for addr in 0xFEA0..=0xFEFFu16 {
            bus.write(addr, 0x12);
            assert_eq!(bus.read(addr), 0xFF);
        }
    }

    #[test]
    fn missing_cartridge_reads_open_bus() {
        let bus = dmg_bus();
        assert_eq!(bus.read(0x0100), 0xFF);
        assert_eq!(bus.read(0xA000), 0xFF);
    }

    #[test]
    fn rom_writes_configure_mapper_not_memory() {
        let mut bus = bus_with_cart(0x01);
        let before = bus.read(0x0000);
        bus.write(0x0000, 0x0A); // MBC1 RAM enable, not a store
        assert_eq!(bus.read(0x0000), before);
        // The command took effect: external RAM is now accessible
        bus.write(0xA000, 0x42);
        assert_eq!(bus.read(0xA000), 0x42);
    }

    #[test]
    fn if_upper_bits_read_ones() {
        let mut bus = dmg_bus();
        bus.write(0xFF0F, 0x00);
        assert_eq!(bus.read(0xFF0F), 0xE0);
        bus.write(0xFF0F, 0xFF);
        assert_eq!(bus.read(0xFF0F), 0xFF);
    }

    #[test]
    fn ie_register_roundtrip() {
        let mut bus = dmg_bus();
        bus.write(0xFFFF, 0x15);
        assert_eq!(bus.read(0xFFFF), 0x15);
    }

    #[test]
    fn ly_write_is_ignored_through_the_bus() {
        let mut bus = dmg_bus();
        bus.tick(456);
        let ly = bus.read(0xFF44);
        bus.write(0xFF44, 0x77);
        assert_eq!(bus.read(0xFF44), ly);
    }

    #[test]
    fn timer_interrupt_reaches_if() {
        let mut bus = dmg_bus();
        bus.write(0xFF0F, 0x00);
        bus.write(0xFF05, 0xFF);
        bus.write(0xFF07, 0x05); // enabled, 16-cycle period
        bus.tick(16);
        assert_ne!(bus.read(0xFF0F) & Interrupt::Timer.mask(), 0);
    }

    #[test]
    fn vblank_interrupt_and_frame_ready() {
        let mut bus = dmg_bus();
        bus.write(0xFF0F, 0x00);
        let mut frame = false;
        for _ in 0..SCREEN_LINES {
            frame |= bus.tick(456);
        }
        assert!(frame);
        assert!(bus.take_frame_ready());
        assert!(!bus.take_frame_ready());
        assert_ne!(bus.read(0xFF0F) & Interrupt::VBlank.mask(), 0);
    }

    const SCREEN_LINES: usize = 145;

    #[test]
    fn joypad_press_requests_interrupt() {
        let mut bus = dmg_bus();
        bus.write(0xFF0F, 0x00);
        bus.joypad.set_buttons(0x01);
        bus.tick(4);
        assert_ne!(bus.read(0xFF0F) & Interrupt::Joypad.mask(), 0);
    }

    #[test]
    fn serial_transfer_completes_against_open_line() {
        let mut bus = dmg_bus();
        bus.write(0xFF0F, 0x00);
        bus.write(0xFF01, 0xA5);
        bus.write(0xFF02, 0x81);
        assert_eq!(bus.read(0xFF01), 0xFF); // nothing on the wire
        assert_ne!(bus.read(0xFF0F) & Interrupt::Serial.mask(), 0);
        assert_eq!(bus.read(0xFF02) & 0x80, 0);
    }

    #[test]
    fn oam_dma_copies_160_bytes() {
        let mut bus = dmg_bus();
        for i in 0..0xA0u16 {
            bus.write(0xC000 + i, i as u8);
        }
        bus.write(0xFF46, 0xC0);
        for i in 0..0xA0u16 {
            assert_eq!(bus.read(0xFE00 + i), i as u8);
        }
        assert_eq!(bus.read(0xFF46), 0xC0); // register reads back
    }

    #[test]
    fn wram_banking_on_color_model() {
        let mut bus = cgb_bus();
        bus.write(0xFF70, 0x02);
        bus.write(0xD000, 0x22);
        bus.write(0xFF70, 0x03);
        bus.write(0xD000, 0x33);
        assert_eq!(bus.read(0xD000), 0x33);
        bus.write(0xFF70, 0x02);
        assert_eq!(bus.read(0xD000), 0x22);
        // Bank select zero means bank one
        bus.write(0xFF70, 0x00);
        bus.write(0xD000, 0x11);
        bus.write(0xFF70, 0x01);
        assert_eq!(bus.read(0xD000), 0x11);
        assert_eq!(bus.read(0xFF70), 0xF9);
    }

    #[test]
    fn wram_bank_fixed_on_dmg() {
        let mut bus = dmg_bus();
        bus.write(0xFF70, 0x04); // ignored
        bus.write(0xD000, 0x44);
        assert_eq!(bus.read(0xD000), 0x44);
        assert_eq!(bus.read(0xFF70), 0xFF);
    }

    #[test]
    fn key1_request_and_switch() {
        let mut bus = cgb_bus();
        assert!(!bus.double_speed());
        assert!(!bus.speed_switch_requested());

        bus.write(0xFF4D, 0x01);
        assert!(bus.speed_switch_requested());
        assert_eq!(bus.read(0xFF4D), 0x7F);

        bus.perform_speed_switch();
        assert!(bus.double_speed());
        assert!(!bus.speed_switch_requested());
        assert_eq!(bus.read(0xFF4D), 0xFE);

        bus.write(0xFF4D, 0x01);
        bus.perform_speed_switch();
        assert!(!bus.double_speed());
    }

    #[test]
    fn key1_unavailable_on_dmg() {
        let mut bus = dmg_bus();
        bus.write(0xFF4D, 0x01);
        assert!(!bus.speed_switch_requested());
        assert_eq!(bus.read(0xFF4D), 0xFF);
    }

    #[test]
    fn gdma_copies_immediately() {
        let mut bus = cgb_bus();
        for i in 0..64u16 {
            bus.write(0xC000 + i, (i as u8).wrapping_mul(3));
        }
        bus.write(0xFF51, 0xC0);
        bus.write(0xFF52, 0x00);
        bus.write(0xFF53, 0x00);
        bus.write(0xFF54, 0x00);
        bus.write(0xFF55, 0x03); // 4 blocks, general purpose

        for i in 0..64u16 {
            assert_eq!(bus.read(0x8000 + i), (i as u8).wrapping_mul(3));
        }
        assert_eq!(bus.read(0xFF55), 0xFF); // engine idle
    }

    #[test]
    fn hblank_dma_transfers_one_block_per_hblank() {
        let mut bus = cgb_bus();
        for i in 0..48u16 {
            bus.write(0xC000 + i, i as u8 + 1);
        }
        bus.write(0xFF51, 0xC0);
        bus.write(0xFF52, 0x00);
        bus.write(0xFF53, 0x00);
        bus.write(0xFF54, 0x00);
        bus.write(0xFF55, 0x82); // 3 blocks, HBlank mode

        assert_eq!(bus.read(0xFF55), 0x03);
        assert_eq!(bus.read(0x8000), 0x00); // nothing copied yet

        bus.tick_hblank_dma();
        assert_eq!(bus.read(0x8000), 0x01);
        assert_eq!(bus.read(0x800F), 0x10);
        assert_eq!(bus.read(0x8010), 0x00);
        assert_eq!(bus.read(0xFF55), 0x02);

        bus.tick_hblank_dma();
        bus.tick_hblank_dma();
        assert_eq!(bus.read(0x802F), 0x30);
        assert_eq!(bus.read(0xFF55), 0xFF); // complete
    }

    #[test]
    fn hblank_dma_cancel_preserves_remaining_count_readback() {
        let mut bus = cgb_bus();
        bus.write(0xFF51, 0xC0);
        bus.write(0xFF52, 0x00);
        bus.write(0xFF53, 0x00);
        bus.write(0xFF54, 0x00);
        bus.write(0xFF55, 0x84); // 5 blocks

        bus.tick_hblank_dma();
        assert_eq!(bus.read(0xFF55), 0x04);

        bus.write(0xFF55, 0x00); // cancel
        assert_eq!(bus.read(0xFF55), 0xFF); // idle reads all-ones
        // No further blocks move
        bus.tick_hblank_dma();
        assert_eq!(bus.read(0xFF55), 0xFF);
    }

    #[test]
    fn hdma_rejects_invalid_source() {
        let mut bus = cgb_bus();
        bus.write(0xFF51, 0xFE); // HRAM region is not a legal source
        bus.write(0xFF52, 0x00);
        bus.write(0xFF53, 0x00);
        bus.write(0xFF54, 0x00);
        bus.write(0xFF55, 0x80);
        assert_eq!(bus.read(0xFF55), 0xFF); // never armed
    }

    #[test]
    fn hdma_registers_unavailable_on_dmg() {
        let mut bus = dmg_bus();
        bus.write(0xFF55, 0x80);
        assert_eq!(bus.read(0xFF55), 0xFF);
    }

    #[test]
    fn unmapped_io_reads_ones() {
        let mut bus = dmg_bus();
        bus.write(0xFF7C, 0x12);
        assert_eq!(bus.read(0xFF7C), 0xFF);
        assert_eq!(bus.read(0xFF03), 0xFF);
    }
}
