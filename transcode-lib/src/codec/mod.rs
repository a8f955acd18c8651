//! Built-in encoders that need no external codec library

pub mod pcm;
pub mod rawvideo;

pub use pcm::PcmEncoder;
pub use rawvideo::RawVideoEncoder;
