//! Graphics primitives shared by rendering code.

mod color;

pub use color::ColorOps;
