//! Reusable audio-synthesis components.
//!
//! The assembled sound unit wires four generators (two pulse, one wave,
//! one noise) to the subunits in this module: length counters, envelope
//! generators, a frequency sweep, the 512 Hz frame sequencer that clocks
//! them, and the stereo mixer with its DC-blocking output filter.

mod envelope;
pub mod frame_sequencer;
mod length_counter;
mod mixer;
mod noise;
mod pulse;
mod sweep;
mod wave;

pub use envelope::Envelope;
pub use frame_sequencer::FrameSequencer;
pub use length_counter::LengthCounter;
pub use mixer::{DcBlocker, Mixer};
pub use noise::NoiseChannel;
pub use pulse::PulseChannel;
pub use sweep::{SweepOutcome, SweepUnit};
pub use wave::WaveChannel;
