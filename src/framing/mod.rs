//! Serial framing: byte stream to discrete reports

pub mod engine;
pub mod ring_buffer;
pub mod tagged;

pub use engine::{FramingConfig, FramingEngine, FramingStats};
pub use ring_buffer::RingBuffer;
pub use tagged::{TaggedFrameDriver, encode_frame};
