//! Streaming plumbing: frame decoding and cancellation

pub mod cancel;
pub mod frame;

pub use cancel::CancelHandle;
pub use frame::{FrameParser, frames};
