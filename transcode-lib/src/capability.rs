//! Interfaces to the external codec and container capabilities
//!
//! Demuxers, decoders, encoders, pixel converters and container writers are
//! reached through the traits in this module. Decoders and encoders follow the
//! two-call pattern: feed with `send_*` (with `None` meaning end of input),
//! then drain with `receive_*` until it asks for more input.

use bytes::Bytes;
use std::fmt;

use crate::audio::{AudioSpec, ChannelLayout, SampleBuffer};
use crate::error::{Result, TranscodeError};
use crate::types::{MediaKind, Rational};

/// One compressed unit (packet) of an elementary stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    pub stream_index: usize,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub data: Bytes,
    pub keyframe: bool,
}

impl EncodedUnit {
    pub fn new(stream_index: usize, pts: i64, duration: i64, data: Bytes) -> Self {
        Self {
            stream_index,
            pts,
            dts: pts,
            duration,
            data,
            keyframe: true,
        }
    }
}

/// Decoded audio with its timing
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: SampleBuffer,
    pub rate: u32,
    pub layout: ChannelLayout,
    /// Presentation timestamp in the source time base
    pub pts: i64,
}

impl AudioFrame {
    pub fn spec(&self) -> AudioSpec {
        AudioSpec::new(self.rate, self.samples.format(), self.layout)
    }

    pub fn frames(&self) -> usize {
        self.samples.frames()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuv420p,
    Rgb24,
    Gray8,
}

impl PixelFormat {
    /// Byte size of each plane for a picture of `width` x `height`.
    pub fn plane_sizes(&self, width: u32, height: u32) -> Vec<usize> {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Yuv420p => {
                let chroma = w.div_ceil(2) * h.div_ceil(2);
                vec![w * h, chroma, chroma]
            }
            PixelFormat::Rgb24 => vec![w * h * 3],
            PixelFormat::Gray8 => vec![w * h],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Gray8 => "gray",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geometry, pixel format and rate of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: Rational,
}

impl VideoSpec {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TranscodeError::config(format!(
                "invalid picture size {}x{}",
                self.width, self.height
            )));
        }
        if !self.frame_rate.is_valid_time_base() {
            return Err(TranscodeError::config(format!(
                "invalid frame rate {}",
                self.frame_rate
            )));
        }
        Ok(())
    }

    /// Whether `frame` has this geometry and pixel format.
    pub fn matches(&self, frame: &VideoFrame) -> bool {
        frame.width == self.width && frame.height == self.height && frame.format == self.format
    }
}

impl fmt::Display for VideoSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} @ {} fps",
            self.width, self.height, self.format, self.frame_rate
        )
    }
}

/// Decoded picture with its timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Vec<u8>>,
    pub pts: i64,
}

impl VideoFrame {
    /// A black picture.
    pub fn blank(width: u32, height: u32, format: PixelFormat, pts: i64) -> Self {
        let sizes = format.plane_sizes(width, height);
        let planes = sizes
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let fill = if format == PixelFormat::Yuv420p && i > 0 { 128 } else { 0 };
                vec![fill; len]
            })
            .collect();
        Self {
            width,
            height,
            format,
            planes,
            pts,
        }
    }

    /// Check that the plane data matches the declared geometry.
    pub fn validate(&self) -> Result<()> {
        let sizes = self.format.plane_sizes(self.width, self.height);
        let ok = sizes.len() == self.planes.len()
            && sizes.iter().zip(&self.planes).all(|(&n, p)| p.len() == n);
        if ok {
            Ok(())
        } else {
            Err(TranscodeError::config(format!(
                "{}x{} {} frame has malformed planes",
                self.width, self.height, self.format
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl Frame {
    pub fn kind(&self) -> MediaKind {
        match self {
            Frame::Audio(_) => MediaKind::Audio,
            Frame::Video(_) => MediaKind::Video,
        }
    }

    pub fn pts(&self) -> i64 {
        match self {
            Frame::Audio(a) => a.pts,
            Frame::Video(v) => v.pts,
        }
    }
}

/// Result of asking a decoder for output
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<F> {
    Frame(F),
    NeedMoreInput,
    EndOfStream,
}

/// Result of asking an encoder for output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    Unit(EncodedUnit),
    Buffered,
    EndOfStream,
}

/// Where an encoder's codec configuration lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// Extradata in the container header
    Global,
    /// Repeated in-band with the units
    PerFrame,
}

/// Demuxed packets of one stream
pub trait PacketSource: Send {
    fn read_packet(&mut self) -> Result<Option<EncodedUnit>>;
    fn time_base(&self) -> Rational;
}

pub trait Decoder: Send {
    /// Feed one packet, or `None` to start draining.
    fn send_packet(&mut self, packet: Option<&EncodedUnit>) -> Result<()>;
    fn receive_frame(&mut self) -> Result<Decoded<Frame>>;
}

/// Anything that yields decoded frames in presentation order
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
    /// Time base of frame timestamps.
    fn time_base(&self) -> Rational;
}

pub trait Encoder: Send {
    /// Feed one frame, or `None` to start draining.
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<()>;
    fn receive_unit(&mut self) -> Result<Encoded>;
    fn header_mode(&self) -> HeaderMode;
    /// Codec configuration for the container header, when `header_mode` is global.
    fn global_header(&self) -> Option<Bytes>;
    fn time_base(&self) -> Rational;
    /// Fixed number of samples per audio frame, if the codec requires one.
    fn frame_size(&self) -> Option<usize>;
    fn codec_name(&self) -> &str;
}

pub trait PixelConverter: Send {
    fn convert(&mut self, frame: VideoFrame) -> Result<VideoFrame>;
}

/// Stream parameters recorded in the container header
#[derive(Debug, Clone, PartialEq)]
pub enum StreamParams {
    Audio {
        rate: u32,
        channels: usize,
    },
    Video {
        width: u32,
        height: u32,
        format: PixelFormat,
        frame_rate: Rational,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
    pub time_base: Rational,
    pub global_header: Option<Bytes>,
    pub params: StreamParams,
}

/// Output container
pub trait ContainerWriter {
    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<()>;
    /// Called with non-decreasing timestamps per stream.
    fn write_unit(&mut self, stream: usize, unit: &EncodedUnit) -> Result<()>;
    fn write_trailer(&mut self) -> Result<()>;
}

/// Joins a packet source and a decoder into a [`FrameSource`].
pub struct DecodingSource<P, D> {
    packets: P,
    decoder: D,
    draining: bool,
    finished: bool,
}

impl<P: PacketSource, D: Decoder> DecodingSource<P, D> {
    pub fn new(packets: P, decoder: D) -> Self {
        Self {
            packets,
            decoder,
            draining: false,
            finished: false,
        }
    }
}

impl<P: PacketSource, D: Decoder> FrameSource for DecodingSource<P, D> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while !self.finished {
            match self.decoder.receive_frame()? {
                Decoded::Frame(frame) => return Ok(Some(frame)),
                Decoded::EndOfStream => self.finished = true,
                Decoded::NeedMoreInput if self.draining => self.finished = true,
                Decoded::NeedMoreInput => match self.packets.read_packet()? {
                    Some(packet) => self.decoder.send_packet(Some(&packet))?,
                    None => {
                        self.decoder.send_packet(None)?;
                        self.draining = true;
                    }
                },
            }
        }
        Ok(None)
    }

    fn time_base(&self) -> Rational {
        self.packets.time_base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleFormat;
    use std::collections::VecDeque;

    struct Packets(VecDeque<EncodedUnit>);

    impl PacketSource for Packets {
        fn read_packet(&mut self) -> Result<Option<EncodedUnit>> {
            Ok(self.0.pop_front())
        }
        fn time_base(&self) -> Rational {
            Rational::new(1, 8000)
        }
    }

    /// Decodes every packet into one frame per data byte, holding the last one until drained.
    #[derive(Default)]
    struct ByteDecoder {
        queue: VecDeque<i64>,
        held: Option<i64>,
        draining: bool,
    }

    impl Decoder for ByteDecoder {
        fn send_packet(&mut self, packet: Option<&EncodedUnit>) -> Result<()> {
            match packet {
                Some(p) => self.queue.extend(p.data.iter().map(|&b| p.pts + b as i64)),
                None => self.draining = true,
            }
            Ok(())
        }

        fn receive_frame(&mut self) -> Result<Decoded<Frame>> {
            while let Some(pts) = self.queue.pop_front() {
                if let Some(prev) = self.held.replace(pts) {
                    return Ok(Decoded::Frame(frame(prev)));
                }
            }
            if self.draining {
                return Ok(match self.held.take() {
                    Some(pts) => Decoded::Frame(frame(pts)),
                    None => Decoded::EndOfStream,
                });
            }
            Ok(Decoded::NeedMoreInput)
        }
    }

    fn frame(pts: i64) -> Frame {
        Frame::Audio(AudioFrame {
            samples: SampleBuffer::new(SampleFormat::S16, 1, 0),
            rate: 8000,
            layout: ChannelLayout::MONO,
            pts,
        })
    }

    #[test]
    fn test_decoding_source_drains_decoder() {
        let packets = Packets(
            vec![
                EncodedUnit::new(0, 0, 2, Bytes::from_static(&[0, 1])),
                EncodedUnit::new(0, 2, 1, Bytes::from_static(&[0])),
            ]
            .into(),
        );
        let mut source = DecodingSource::new(packets, ByteDecoder::default());
        let mut pts = Vec::new();
        while let Some(f) = source.next_frame().unwrap() {
            pts.push(f.pts());
        }
        assert_eq!(pts, vec![0, 1, 2]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_plane_sizes() {
        assert_eq!(
            PixelFormat::Yuv420p.plane_sizes(352, 288),
            vec![352 * 288, 176 * 144, 176 * 144]
        );
        assert_eq!(PixelFormat::Yuv420p.plane_sizes(3, 3), vec![9, 4, 4]);
        let frame = VideoFrame::blank(4, 2, PixelFormat::Yuv420p, 0);
        assert!(frame.validate().is_ok());
    }
}
