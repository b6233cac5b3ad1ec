//! Length counter for automatic note duration.
//!
//! Pulse and noise channels count up to 64, the wave channel up to 256.
//! Registers store a length *value* n; the counter then runs for
//! `max - n` length clocks before silencing the channel.

/// Length counter component.
///
/// Decrements on length-clock frame-sequencer steps while its enable bit
/// is set; reaching zero disables the owning channel.
#[derive(Debug, Clone)]
pub struct LengthCounter {
    value: u16,
    max: u16,
    enabled: bool,
}

impl LengthCounter {
    /// Create a counter with the given maximum (64 or 256)
    pub fn new(max: u16) -> Self {
        Self { value: 0, max, enabled: false }
    }

    /// Load from a register write: counter becomes `max - n`
    pub fn load(&mut self, n: u16) {
        self.value = self.max - (n % self.max);
    }

    /// Length clock. Returns true when this tick brought the counter to
    /// zero (the channel must disable).
    pub fn clock(&mut self) -> bool {
        if self.enabled && self.value > 0 {
            self.value -= 1;
            return self.value == 0;
        }
        false
    }

    /// Channel trigger: a zero counter reloads to max. Returns true when
    /// the reload happened.
    pub fn trigger_reload(&mut self) -> bool {
        if self.value == 0 {
            self.value = self.max;
            return true;
        }
        false
    }

    /// One extra decrement, applied by the register-write quirks. Returns
    /// true when the counter hit zero.
    pub fn extra_clock(&mut self) -> bool {
        if self.value > 0 {
            self.value -= 1;
            return self.value == 0;
        }
        false
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Power-off clears the counter state but keeps the configured maximum
    pub fn power_off(&mut self) {
        self.value = 0;
        self.enabled = false;
    }
}
