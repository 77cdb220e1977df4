//! Network impairment primitives

pub mod random;
pub mod shaper;

pub use random::{RandomSource, ScriptedRandom, SeededRandom, ThreadRandom};
pub use shaper::{ShapingProfile, StreamShaper, MAX_CHUNK};
