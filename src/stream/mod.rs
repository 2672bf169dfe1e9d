// src/stream/mod.rs
pub mod emitter;
pub mod protocol;

pub use emitter::Emitter;
pub use protocol::{FrameDecoder, Phase, ProtocolError, ScanEvent};
