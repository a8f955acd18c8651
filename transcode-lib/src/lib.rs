//! Transcoding core
//!
//! Decoded audio goes through a [`Resampler`] (rate, layout and sample format
//! conversion with optional dither and drift compensation) and an encoder;
//! video goes through an optional pixel converter and an encoder. Each output
//! stream is a [`lane::Lane`], and a [`Scheduler`] interleaves the encoded
//! units of all lanes by presentation time into a container writer. A
//! [`TranscodeSession`] drives the whole thing and always finalizes the
//! container.

pub mod audio;
pub mod capability;
pub mod clock;
pub mod codec;
pub mod error;
pub mod lane;
pub mod mux;
pub mod resample;
pub mod session;
pub mod synth;
pub mod types;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_utils;

#[cfg(test)]
pub(crate) mod tests;

pub use audio::{AudioSpec, ChannelLayout, SampleBuffer, SampleFormat};
pub use capability::{
    ContainerWriter, EncodedUnit, Encoder, Frame, FrameSource, StreamDescriptor,
};
pub use clock::StreamClock;
pub use error::{FfmpegError, Result, TranscodeError};
pub use mux::{PacketLogWriter, Scheduler, Step};
pub use resample::{DitherMethod, Resampler, ResamplerOptions};
pub use session::{CancelToken, SessionReport, TranscodeSession};
pub use types::{MediaKind, Rational};
