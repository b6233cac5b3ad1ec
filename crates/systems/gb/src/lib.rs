//! Handheld console emulation: the original monochrome model and its
//! color-capable successor.
//!
//! # Architecture
//!
//! The system is a single-threaded cooperative simulation. One frame is a
//! fixed budget of ~70,224 base-clock cycles; the loop fetches and
//! executes one CPU instruction, then advances the PPU, APU, timer and
//! joypad by the machine cycles that instruction consumed. Peripheral
//! interrupt lines are collected into the IF register between
//! instructions, never mid-instruction.
//!
//! Components:
//! - CPU: the Sharp LR35902 core from `brick_core`, generic over this
//!   crate's [`bus::GbBus`]
//! - Bus: address-space router, banked WRAM/VRAM, DMA engines, KEY1
//! - Mappers: plain, MBC1, MBC2, MBC3 (+RTC), MBC5 (+rumble)
//! - PPU: scanline state machine with monochrome and color paths
//! - APU: four generators mixed to a 44.1 kHz stereo stream
//!
//! The emulator begins in the post-boot register state; boot-ROM
//! execution is not modeled. Frames are 160×144 ABGR8888; audio is
//! delivered as 512-frame stereo chunks through an
//! [`brick_core::types::AudioSink`].

use brick_core::cpu_lr35902::CpuLr35902;
use brick_core::types::{AudioSink, Frame};
use brick_core::{MountPointInfo, System};

pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod joypad;
pub mod mappers;
pub mod ppu;
pub mod timer;

use bus::GbBus;
use cartridge::{Cartridge, CartridgeError};
use joypad::Button;
use mappers::Mapper;

/// Base-clock cycles per video frame (~59.7 Hz)
pub const CYCLES_PER_FRAME: u32 = 70_224;

/// Console model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// Original monochrome model
    Dmg,
    /// Color-capable model
    Cgb,
}

#[derive(thiserror::Error, Debug)]
pub enum GbError {
    #[error("No cartridge loaded")]
    NoCartridge,
    #[error("Invalid mount point")]
    InvalidMountPoint,
    #[error("Cartridge rejected: {0}")]
    Cartridge(#[from] CartridgeError),
}

pub struct GbSystem {
    cpu: CpuLr35902<GbBus>,
    /// Model forced by the caller; `None` follows the cartridge header
    forced_model: Option<Model>,
    cart_loaded: bool,
}

impl Default for GbSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl GbSystem {
    pub fn new() -> Self {
        let mut system = Self {
            cpu: CpuLr35902::new(GbBus::new(false)),
            forced_model: None,
            cart_loaded: false,
        };
        system.reset();
        system
    }

    /// Pin the console model instead of following the cartridge header
    pub fn with_model(model: Model) -> Self {
        let mut system = Self {
            cpu: CpuLr35902::new(GbBus::new(model == Model::Cgb)),
            forced_model: Some(model),
            cart_loaded: false,
        };
        system.reset();
        system
    }

    /// The model the machine is currently running as
    pub fn model(&self) -> Model {
        if self.cpu.memory.is_cgb() {
            Model::Cgb
        } else {
            Model::Dmg
        }
    }

    /// Set the full button state.
    /// Bits: 0=Right, 1=Left, 2=Up, 3=Down, 4=A, 5=B, 6=Select, 7=Start
    pub fn set_controller(&mut self, state: u8) {
        self.cpu.memory.joypad.set_buttons(state);
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.cpu.memory.joypad.set_button(button, pressed);
    }

    /// Attach the audio consumer
    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.cpu.memory.apu.set_sink(sink);
    }

    /// Rumble motor state on rumble-equipped cartridges
    pub fn rumble_active(&self) -> bool {
        self.cpu.memory.mapper().is_some_and(Mapper::rumble_active)
    }

    /// Rebuild the machine around a fresh bus, carrying over the mapper
    /// and the audio sink
    fn rebuild(&mut self, cgb: bool) {
        let mapper = self.cpu.memory.take_mapper();
        let sink = self.cpu.memory.apu.take_sink();
        self.cpu.memory = GbBus::new(cgb);
        if let Some(mapper) = mapper {
            self.cpu.memory.insert_cartridge(mapper);
        }
        if let Some(sink) = sink {
            self.cpu.memory.apu.set_sink(sink);
        }
    }

    /// Apply the documented post-boot register state
    fn apply_post_boot_state(&mut self) {
        let cgb = self.cpu.memory.is_cgb();
        self.cpu.reset();
        self.cpu.set_af(if cgb { 0x11B0 } else { 0x01B0 });
        self.cpu.set_bc(0x0013);
        self.cpu.set_de(0x00D8);
        self.cpu.set_hl(0x014D);
        self.cpu.sp = 0xFFFE;
        self.cpu.pc = 0x0100;
    }
}

impl System for GbSystem {
    type Error = GbError;

    fn reset(&mut self) {
        let cgb = self.cpu.memory.is_cgb();
        self.rebuild(cgb);
        self.apply_post_boot_state();
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        if !self.cart_loaded {
            return Err(GbError::NoCartridge);
        }

        // One frame of machine cycles. At double speed the CPU sees twice
        // as many of its own cycles while the peripherals still advance
        // by the same machine-cycle budget.
        let mut cycles = 0;
        while cycles < CYCLES_PER_FRAME {
            let cpu_cycles = self.cpu.step();
            let machine_cycles = if self.cpu.memory.double_speed() {
                (cpu_cycles / 2).max(1)
            } else {
                cpu_cycles
            };
            self.cpu.memory.tick(machine_cycles);
            cycles += machine_cycles;
        }
        self.cpu.memory.take_frame_ready();

        Ok(self.cpu.memory.ppu.frame())
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({
            "system": "gb",
            "version": 1,
            "model": if self.cpu.memory.is_cgb() { "cgb" } else { "dmg" },
            "cpu": {
                "a": self.cpu.a,
                "f": self.cpu.f,
                "b": self.cpu.b,
                "c": self.cpu.c,
                "d": self.cpu.d,
                "e": self.cpu.e,
                "h": self.cpu.h,
                "l": self.cpu.l,
                "sp": self.cpu.sp,
                "pc": self.cpu.pc,
                "ime": self.cpu.ime,
                "halted": self.cpu.halted,
                "stopped": self.cpu.stopped,
            }
        })
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
        macro_rules! load_u8 {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_u64()) {
                    $target = val as u8;
                }
            };
        }

        macro_rules! load_u16 {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_u64()) {
                    $target = val as u16;
                }
            };
        }

        macro_rules! load_bool {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_bool()) {
                    $target = val;
                }
            };
        }

        if let Some(cpu_state) = v.get("cpu") {
            load_u8!(cpu_state, "a", self.cpu.a);
            load_u8!(cpu_state, "f", self.cpu.f);
            load_u8!(cpu_state, "b", self.cpu.b);
            load_u8!(cpu_state, "c", self.cpu.c);
            load_u8!(cpu_state, "d", self.cpu.d);
            load_u8!(cpu_state, "e", self.cpu.e);
            load_u8!(cpu_state, "h", self.cpu.h);
            load_u8!(cpu_state, "l", self.cpu.l);
            load_u16!(cpu_state, "sp", self.cpu.sp);
            load_u16!(cpu_state, "pc", self.cpu.pc);
            load_bool!(cpu_state, "ime", self.cpu.ime);
            load_bool!(cpu_state, "halted", self.cpu.halted);
            load_bool!(cpu_state, "stopped", self.cpu.stopped);
        }
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: "Cartridge".to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["gb".to_string(), "gbc".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id != "Cartridge" {
            return Err(GbError::InvalidMountPoint);
        }

        let cart = Cartridge::from_bytes(data)?;
        let cgb = match self.forced_model {
            Some(model) => model == Model::Cgb,
            None => cart.color_support().is_color(),
        };

        self.rebuild(cgb);
        self.cpu.memory.insert_cartridge(Mapper::from_cartridge(cart));
        self.cart_loaded = true;
        self.apply_post_boot_state();

        Ok(())
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id != "Cartridge" {
            return Err(GbError::InvalidMountPoint);
        }

        self.cpu.memory.eject_cartridge();
        self.cart_loaded = false;
        Ok(())
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == "Cartridge" && self.cart_loaded
    }
}
