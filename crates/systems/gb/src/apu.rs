//! Audio processing unit.
//!
//! Four generators (two pulse, one wave-table, one noise) built from the
//! core synthesis components, clocked by the 512 Hz frame sequencer and
//! mixed down to a 44.1 kHz stereo stream. The register file at
//! 0xFF10-0xFF26 plus wave RAM lives here, including the read-back masks
//! and the power-gating rules: turning the master enable off zeroes every
//! register except wave RAM, and while off only the master enable, the
//! length fields and wave RAM accept writes.

use brick_core::apu::{
    Envelope, FrameSequencer, LengthCounter, Mixer, NoiseChannel, PulseChannel, SweepOutcome,
    SweepUnit, WaveChannel,
};
use brick_core::types::{AudioSink, StereoFrame, AUDIO_CHUNK_FRAMES};

/// Base clock in Hz
const CPU_CLOCK_HZ: f64 = 4_194_304.0;
/// Output sample rate in Hz
const SAMPLE_RATE_HZ: f64 = 44_100.0;
/// Base-clock cycles per output sample
const CYCLES_PER_SAMPLE: f64 = CPU_CLOCK_HZ / SAMPLE_RATE_HZ;

pub struct GbApu {
    pulse1: PulseChannel,
    pulse1_sweep: SweepUnit,
    pulse1_envelope: Envelope,
    pulse1_length: LengthCounter,

    pulse2: PulseChannel,
    pulse2_envelope: Envelope,
    pulse2_length: LengthCounter,

    wave: WaveChannel,
    wave_length: LengthCounter,

    noise: NoiseChannel,
    noise_envelope: Envelope,
    noise_length: LengthCounter,

    sequencer: FrameSequencer,
    mixer: Mixer,
    power_on: bool,

    sample_accum: f64,
    buffer: Vec<StereoFrame>,
    sink: Option<Box<dyn AudioSink>>,
}

impl GbApu {
    pub fn new() -> Self {
        let mut apu = Self {
            pulse1: PulseChannel::new(),
            pulse1_sweep: SweepUnit::new(),
            pulse1_envelope: Envelope::new(),
            pulse1_length: LengthCounter::new(64),
            pulse2: PulseChannel::new(),
            pulse2_envelope: Envelope::new(),
            pulse2_length: LengthCounter::new(64),
            wave: WaveChannel::new(),
            wave_length: LengthCounter::new(256),
            noise: NoiseChannel::new(),
            noise_envelope: Envelope::new(),
            noise_length: LengthCounter::new(64),
            sequencer: FrameSequencer::new(),
            mixer: Mixer::new(),
            power_on: true,
            sample_accum: 0.0,
            buffer: Vec::with_capacity(AUDIO_CHUNK_FRAMES),
            sink: None,
        };
        // Post-boot mixer state: full volume, the usual panning pattern
        apu.mixer.left_volume = 7;
        apu.mixer.right_volume = 7;
        apu.mixer.panning = 0xF3;
        apu
    }

    /// Attach the consumer for finished 512-frame chunks
    pub fn set_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.sink = Some(sink);
    }

    /// Detach the audio consumer (used when the machine is rebuilt)
    pub fn take_sink(&mut self) -> Option<Box<dyn AudioSink>> {
        self.sink.take()
    }

    // ---- Clocking ----------------------------------------------------

    /// Advance by a number of machine cycles
    pub fn step(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.clock();
        }
    }

    fn clock(&mut self) {
        if self.power_on {
            if let Some(step) = self.sequencer.tick() {
                self.clock_sequencer_step(step);
            }
            self.pulse1.clock();
            self.pulse2.clock();
            self.wave.clock();
            self.noise.clock();
        }

        // The resampler keeps emitting (silent) frames while powered off
        // so the output stream stays continuous
        self.sample_accum += 1.0;
        if self.sample_accum >= CYCLES_PER_SAMPLE {
            self.sample_accum -= CYCLES_PER_SAMPLE;
            let frame = self.mixer.mix(self.channel_outputs());
            self.buffer.push(frame);
            if self.buffer.len() >= AUDIO_CHUNK_FRAMES {
                if let Some(sink) = self.sink.as_mut() {
                    sink.push(&self.buffer);
                }
                self.buffer.clear();
            }
        }
    }

    fn clock_sequencer_step(&mut self, step: u8) {
        if FrameSequencer::clocks_length(step) {
            if self.pulse1_length.clock() {
                self.pulse1.enabled = false;
            }
            if self.pulse2_length.clock() {
                self.pulse2.enabled = false;
            }
            if self.wave_length.clock() {
                self.wave.enabled = false;
            }
            if self.noise_length.clock() {
                self.noise.enabled = false;
            }
        }
        if FrameSequencer::clocks_sweep(step) {
            match self.pulse1_sweep.clock() {
                SweepOutcome::Idle => {}
                SweepOutcome::Update(freq) => self.pulse1.set_frequency(freq),
                SweepOutcome::Disable => self.pulse1.enabled = false,
            }
        }
        if FrameSequencer::clocks_envelope(step) {
            self.pulse1_envelope.clock();
            self.pulse2_envelope.clock();
            self.noise_envelope.clock();
        }
    }

    /// Per-channel DAC outputs in [-1, 1]
    fn channel_outputs(&self) -> [f32; 4] {
        let dac = |digital: u8, on: bool| {
            if on {
                digital as f32 / 7.5 - 1.0
            } else {
                0.0
            }
        };
        [
            dac(
                self.pulse1.duty_output() * self.pulse1_envelope.volume(),
                self.pulse1.enabled && self.pulse1_envelope.dac_enabled(),
            ),
            dac(
                self.pulse2.duty_output() * self.pulse2_envelope.volume(),
                self.pulse2.enabled && self.pulse2_envelope.dac_enabled(),
            ),
            dac(self.wave.output(), self.wave.enabled && self.wave.dac_enabled),
            dac(
                self.noise.output() * self.noise_envelope.volume(),
                self.noise.enabled && self.noise_envelope.dac_enabled(),
            ),
        ]
    }

    /// The extra length tick applies in the first half of a length
    /// period, when the next sequencer step will not clock length.
    fn length_quirk_window(&self) -> bool {
        !self.sequencer.next_step_clocks_length()
    }

    /// Shared NRx4 length-enable handling with the extra-tick quirk.
    /// Returns true when the extra tick expired the counter.
    fn write_length_enable(length: &mut LengthCounter, enable: bool, quirk_window: bool) -> bool {
        let was_enabled = length.is_enabled();
        length.set_enabled(enable);
        if !was_enabled && enable && quirk_window {
            return length.extra_clock();
        }
        false
    }

    /// Trigger-time length reload; a reload in the quirk window starts at
    /// max minus one.
    fn trigger_length(length: &mut LengthCounter, quirk_window: bool) {
        if length.trigger_reload() && length.is_enabled() && quirk_window {
            length.extra_clock();
        }
    }

    // ---- Register file -----------------------------------------------

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            // NR10: sweep
            0xFF10 => {
                0x80 | (self.pulse1_sweep.period() << 4)
                    | if self.pulse1_sweep.negate() { 0x08 } else { 0 }
                    | self.pulse1_sweep.shift()
            }
            // NR11: duty readable, length write-only
            0xFF11 => (self.pulse1.duty << 6) | 0x3F,
            // NR12: envelope
            0xFF12 => {
                (self.pulse1_envelope.initial_volume() << 4)
                    | if self.pulse1_envelope.add_mode() { 0x08 } else { 0 }
                    | self.pulse1_envelope.period()
            }
            // NR13: frequency low (write-only)
            0xFF13 => 0xFF,
            // NR14: only the length-enable bit reads back
            0xFF14 => 0xBF | if self.pulse1_length.is_enabled() { 0x40 } else { 0 },

            0xFF15 => 0xFF,
            0xFF16 => (self.pulse2.duty << 6) | 0x3F,
            0xFF17 => {
                (self.pulse2_envelope.initial_volume() << 4)
                    | if self.pulse2_envelope.add_mode() { 0x08 } else { 0 }
                    | self.pulse2_envelope.period()
            }
            0xFF18 => 0xFF,
            0xFF19 => 0xBF | if self.pulse2_length.is_enabled() { 0x40 } else { 0 },

            // NR30: wave DAC enable
            0xFF1A => 0x7F | if self.wave.dac_enabled { 0x80 } else { 0 },
            0xFF1B => 0xFF,
            // NR32: volume code
            0xFF1C => 0x9F | (self.wave.volume_code << 5),
            0xFF1D => 0xFF,
            0xFF1E => 0xBF | if self.wave_length.is_enabled() { 0x40 } else { 0 },

            0xFF1F => 0xFF,
            0xFF20 => 0xFF,
            0xFF21 => {
                (self.noise_envelope.initial_volume() << 4)
                    | if self.noise_envelope.add_mode() { 0x08 } else { 0 }
                    | self.noise_envelope.period()
            }
            // NR43: polynomial counter
            0xFF22 => {
                (self.noise.clock_shift << 4)
                    | if self.noise.narrow { 0x08 } else { 0 }
                    | self.noise.divisor_code
            }
            0xFF23 => 0xBF | if self.noise_length.is_enabled() { 0x40 } else { 0 },

            // NR50: master volume
            0xFF24 => (self.mixer.left_volume << 4) | self.mixer.right_volume,
            // NR51: panning
            0xFF25 => self.mixer.panning,
            // NR52: power and channel-active bits
            0xFF26 => {
                0x70 | if self.power_on { 0x80 } else { 0 }
                    | if self.pulse1.enabled { 0x01 } else { 0 }
                    | if self.pulse2.enabled { 0x02 } else { 0 }
                    | if self.wave.enabled { 0x04 } else { 0 }
                    | if self.noise.enabled { 0x08 } else { 0 }
            }

            // Wave RAM
            0xFF30..=0xFF3F => self.wave.read_ram((addr - 0xFF30) as usize),

            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        // Wave RAM is never gated
        if let 0xFF30..=0xFF3F = addr {
            self.wave.write_ram((addr - 0xFF30) as usize, val);
            return;
        }

        if !self.power_on {
            match addr {
                0xFF26 => {}
                // Length fields stay writable while the APU is off
                0xFF11 => {
                    self.pulse1_length.load((val & 0x3F) as u16);
                    return;
                }
                0xFF16 => {
                    self.pulse2_length.load((val & 0x3F) as u16);
                    return;
                }
                0xFF1B => {
                    self.wave_length.load(val as u16);
                    return;
                }
                0xFF20 => {
                    self.noise_length.load((val & 0x3F) as u16);
                    return;
                }
                _ => return,
            }
        }

        let quirk_window = self.length_quirk_window();

        match addr {
            // NR10: sweep parameters
            0xFF10 => {
                self.pulse1_sweep.set_params((val >> 4) & 0x07, val & 0x08 != 0, val & 0x07);
            }
            // NR11: duty and length
            0xFF11 => {
                self.pulse1.duty = val >> 6;
                self.pulse1_length.load((val & 0x3F) as u16);
            }
            // NR12: envelope; an all-zero upper field kills the DAC
            0xFF12 => {
                self.pulse1_envelope.set_params(val >> 4, val & 0x08 != 0, val & 0x07);
                if !self.pulse1_envelope.dac_enabled() {
                    self.pulse1.enabled = false;
                }
            }
            // NR13/NR14: frequency and control
            0xFF13 => {
                let freq = (self.pulse1.frequency() & 0x0700) | val as u16;
                self.pulse1.set_frequency(freq);
            }
            0xFF14 => {
                let freq = (self.pulse1.frequency() & 0x00FF) | (((val & 0x07) as u16) << 8);
                self.pulse1.set_frequency(freq);
                if Self::write_length_enable(&mut self.pulse1_length, val & 0x40 != 0, quirk_window)
                {
                    self.pulse1.enabled = false;
                }
                if val & 0x80 != 0 {
                    self.trigger_pulse1(quirk_window);
                }
            }

            0xFF15 => {}
            0xFF16 => {
                self.pulse2.duty = val >> 6;
                self.pulse2_length.load((val & 0x3F) as u16);
            }
            0xFF17 => {
                self.pulse2_envelope.set_params(val >> 4, val & 0x08 != 0, val & 0x07);
                if !self.pulse2_envelope.dac_enabled() {
                    self.pulse2.enabled = false;
                }
            }
            0xFF18 => {
                let freq = (self.pulse2.frequency() & 0x0700) | val as u16;
                self.pulse2.set_frequency(freq);
            }
            0xFF19 => {
                let freq = (self.pulse2.frequency() & 0x00FF) | (((val & 0x07) as u16) << 8);
                self.pulse2.set_frequency(freq);
                if Self::write_length_enable(&mut self.pulse2_length, val & 0x40 != 0, quirk_window)
                {
                    self.pulse2.enabled = false;
                }
                if val & 0x80 != 0 {
                    self.pulse2.trigger();
                    self.pulse2_envelope.trigger();
                    if !self.pulse2_envelope.dac_enabled() {
                        self.pulse2.enabled = false;
                    }
                    Self::trigger_length(&mut self.pulse2_length, quirk_window);
                }
            }

            // NR30: explicit DAC bit
            0xFF1A => {
                self.wave.dac_enabled = val & 0x80 != 0;
                if !self.wave.dac_enabled {
                    self.wave.enabled = false;
                }
            }
            0xFF1B => self.wave_length.load(val as u16),
            0xFF1C => self.wave.volume_code = (val >> 5) & 0x03,
            0xFF1D => {
                let freq = (self.wave.frequency() & 0x0700) | val as u16;
                self.wave.set_frequency(freq);
            }
            0xFF1E => {
                let freq = (self.wave.frequency() & 0x00FF) | (((val & 0x07) as u16) << 8);
                self.wave.set_frequency(freq);
                if Self::write_length_enable(&mut self.wave_length, val & 0x40 != 0, quirk_window) {
                    self.wave.enabled = false;
                }
                if val & 0x80 != 0 {
                    self.wave.trigger();
                    Self::trigger_length(&mut self.wave_length, quirk_window);
                }
            }

            0xFF1F => {}
            0xFF20 => self.noise_length.load((val & 0x3F) as u16),
            0xFF21 => {
                self.noise_envelope.set_params(val >> 4, val & 0x08 != 0, val & 0x07);
                if !self.noise_envelope.dac_enabled() {
                    self.noise.enabled = false;
                }
            }
            0xFF22 => {
                self.noise.clock_shift = val >> 4;
                self.noise.narrow = val & 0x08 != 0;
                self.noise.divisor_code = val & 0x07;
            }
            0xFF23 => {
                if Self::write_length_enable(&mut self.noise_length, val & 0x40 != 0, quirk_window)
                {
                    self.noise.enabled = false;
                }
                if val & 0x80 != 0 {
                    self.noise.trigger();
                    self.noise_envelope.trigger();
                    if !self.noise_envelope.dac_enabled() {
                        self.noise.enabled = false;
                    }
                    Self::trigger_length(&mut self.noise_length, quirk_window);
                }
            }

            0xFF24 => {
                self.mixer.left_volume = (val >> 4) & 0x07;
                self.mixer.right_volume = val & 0x07;
            }
            0xFF25 => self.mixer.panning = val,
            0xFF26 => {
                let power = val & 0x80 != 0;
                if self.power_on && !power {
                    self.power_off();
                } else if !self.power_on && power {
                    self.sequencer.reset();
                }
                self.power_on = power;
            }

            _ => {}
        }
    }

    fn trigger_pulse1(&mut self, quirk_window: bool) {
        self.pulse1.trigger();
        self.pulse1_envelope.trigger();
        if !self.pulse1_envelope.dac_enabled() {
            self.pulse1.enabled = false;
        }
        Self::trigger_length(&mut self.pulse1_length, quirk_window);
        if self.pulse1_sweep.trigger(self.pulse1.frequency()) {
            self.pulse1.enabled = false;
        }
    }

    /// Master power off: every register clears except wave RAM
    fn power_off(&mut self) {
        self.pulse1.power_off();
        self.pulse1_sweep.power_off();
        self.pulse1_envelope = Envelope::new();
        self.pulse1_length.power_off();
        self.pulse2.power_off();
        self.pulse2_envelope = Envelope::new();
        self.pulse2_length.power_off();
        self.wave.power_off();
        self.wave_length.power_off();
        self.noise.power_off();
        self.noise_envelope = Envelope::new();
        self.noise_length.power_off();
        self.mixer.power_off();
    }
}

impl Default for GbApu {
    fn default() -> Self {
        Self::new()
    }
}
