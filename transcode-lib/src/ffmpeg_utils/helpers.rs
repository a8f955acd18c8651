//! Conversions between FFmpeg types and the core types, and the FFI field
//! accessors `ffmpeg-next` does not wrap.
//!
//! All `unsafe` of the FFmpeg backend lives in this file.

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::format::sample::{Sample, Type};

use crate::audio::{ChannelLayout, SampleBuffer, SampleFormat, SampleType};
use crate::capability::AudioFrame;
use crate::error::{FfmpegError, Result};
use crate::types::Rational;

pub fn rational_from_ffmpeg(r: ffmpeg::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

pub fn rational_to_ffmpeg(r: Rational) -> ffmpeg::Rational {
    ffmpeg::Rational::new(r.num, r.den)
}

pub fn sample_format_from_ffmpeg(sample: Sample) -> Result<SampleFormat> {
    let (ty, planar) = match sample {
        Sample::U8(t) => (SampleType::U8, t),
        Sample::I16(t) => (SampleType::S16, t),
        Sample::I32(t) => (SampleType::S32, t),
        Sample::F32(t) => (SampleType::F32, t),
        Sample::F64(t) => (SampleType::F64, t),
        other => {
            return Err(
                FfmpegError::UnsupportedFormat(format!("sample format {:?}", other)).into(),
            )
        }
    };
    Ok(match planar {
        Type::Packed => SampleFormat::packed(ty),
        Type::Planar => SampleFormat::planar(ty),
    })
}

pub fn sample_format_to_ffmpeg(format: SampleFormat) -> Sample {
    let t = if format.planar {
        Type::Planar
    } else {
        Type::Packed
    };
    match format.sample {
        SampleType::U8 => Sample::U8(t),
        SampleType::S16 => Sample::I16(t),
        SampleType::S32 => Sample::I32(t),
        SampleType::F32 => Sample::F32(t),
        SampleType::F64 => Sample::F64(t),
    }
}

/// FFmpeg layouts the encoder wrapper can set up.
pub fn channel_layout_to_ffmpeg(channels: usize) -> Result<ffmpeg::ChannelLayout> {
    match channels {
        1 => Ok(ffmpeg::ChannelLayout::MONO),
        2 => Ok(ffmpeg::ChannelLayout::STEREO),
        n => Err(FfmpegError::UnsupportedFormat(format!("{} channel encoder layout", n)).into()),
    }
}

/// Copy a decoded FFmpeg frame into an owned [`AudioFrame`].
pub fn audio_frame_from_ffmpeg(frame: &ffmpeg::frame::Audio) -> Result<AudioFrame> {
    let format = sample_format_from_ffmpeg(frame.format())?;
    let channels = frame.channels() as usize;
    let frames = frame.samples();
    let mut samples = SampleBuffer::new(format, channels, frames);
    samples.set_frames(frames)?;
    let plane_len = if format.planar {
        frames * format.bytes_per_sample()
    } else {
        frames * channels * format.bytes_per_sample()
    };
    for p in 0..samples.plane_count() {
        samples.plane_mut(p)[..plane_len].copy_from_slice(&frame.data(p)[..plane_len]);
    }
    Ok(AudioFrame {
        samples,
        rate: frame.rate(),
        layout: ChannelLayout::default_for(channels as u16),
        pts: frame.pts().or(frame.timestamp()).unwrap_or(0),
    })
}

/// Build an FFmpeg frame from an [`AudioFrame`].
pub fn audio_frame_to_ffmpeg(frame: &AudioFrame) -> Result<ffmpeg::frame::Audio> {
    let format = frame.samples.format();
    let layout = channel_layout_to_ffmpeg(frame.samples.channels())?;
    let mut out = ffmpeg::frame::Audio::new(sample_format_to_ffmpeg(format), frame.frames(), layout);
    out.set_rate(frame.rate);
    out.set_pts(Some(frame.pts));
    let plane_len = if format.planar {
        frame.frames() * format.bytes_per_sample()
    } else {
        frame.frames() * frame.samples.channels() * format.bytes_per_sample()
    };
    for p in 0..frame.samples.plane_count() {
        out.data_mut(p)[..plane_len].copy_from_slice(&frame.samples.plane(p)[..plane_len]);
    }
    Ok(out)
}

/// Codec extradata of an opened encoder, if it published any.
pub fn encoder_extradata(encoder: &ffmpeg::encoder::Audio) -> Option<Bytes> {
    use std::ops::Deref;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `ctx.as_ptr()` is valid for the lifetime of `encoder`. The
    // extradata buffer is owned by the context and only read here.
    unsafe {
        let raw = ctx.as_ptr();
        let size = (*raw).extradata_size;
        if (*raw).extradata.is_null() || size <= 0 {
            return None;
        }
        let slice = std::slice::from_raw_parts((*raw).extradata, size as usize);
        Some(Bytes::copy_from_slice(slice))
    }
}

/// Allocate a fresh `AVCodecParameters` from an opened encoder.
pub fn encoder_codec_parameters(encoder: &ffmpeg::encoder::Audio) -> ffmpeg::codec::Parameters {
    use std::ops::Deref;
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_from_context` copies fields out of a live,
    // opened encoder context into a freshly allocated parameter struct.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Read `sample_rate` from an `AVCodecParameters` struct.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::Parameters) -> u32 {
    // SAFETY: plain scalar field of a valid parameter struct.
    unsafe { (*params.as_ptr()).sample_rate as u32 }
}

/// Zero out `codec_tag` so the muxer picks the tag of the target container.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `codecpar` is set by `set_parameters` and valid for the
    // lifetime of the stream; `codec_tag` is a plain u32 field.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}
