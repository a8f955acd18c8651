//! End-to-end tests: resampler behaviour through the public API and complete
//! sessions from synthetic sources to a packet log.

use std::fs;

use crate::audio::{AudioSpec, ChannelLayout, SampleBuffer, SampleFormat};
use crate::codec::{PcmEncoder, RawVideoEncoder};
use crate::lane::{AudioLane, Lane, ThreadedLane, VideoLane};
use crate::mux::PacketLogWriter;
use crate::resample::{DitherMethod, Resampler, ResamplerOptions};
use crate::session::TranscodeSession;
use crate::synth::{SineSweepSource, TestPatternSource};
use crate::tests::support::{BufferSource, MemoryWriter};
use crate::types::Rational;

/// Run `input` through `resampler` and flush it, returning all output.
fn convert_all(resampler: &mut Resampler, input: &SampleBuffer) -> SampleBuffer {
    let out_spec = *resampler.output_spec();
    let mut all = SampleBuffer::new(out_spec.format, out_spec.channels(), 0);
    let mut out = SampleBuffer::new(out_spec.format, out_spec.channels(), 0);
    let cap = resampler.output_frames_for(input.frames()).max(1);
    let n = resampler
        .convert(Some(input), input.frames(), &mut out, cap)
        .unwrap();
    all.append(&out, n).unwrap();
    loop {
        let n = resampler.flush(&mut out, 4096).unwrap();
        if n == 0 {
            break;
        }
        all.append(&out, n).unwrap();
    }
    all
}

fn ramp(format: SampleFormat, channels: usize, frames: usize) -> SampleBuffer {
    SampleBuffer::from_fn(format, channels, frames, |ch, i| {
        ((i * 37 + ch * 11) % 200) as f64 / 128.0 - 0.78
    })
}

#[test]
fn test_triangular_dither_on_silence_stays_within_one_lsb() {
    let options = ResamplerOptions {
        dither_method: DitherMethod::Triangular,
        dither_seed: 7,
        ..Default::default()
    };
    let mut resampler = Resampler::new(
        AudioSpec::new(44100, SampleFormat::FLT, ChannelLayout::STEREO),
        AudioSpec::new(48000, SampleFormat::S16, ChannelLayout::STEREO),
        options,
    )
    .unwrap();
    let silence = SampleBuffer::from_fn(SampleFormat::FLT, 2, 1024, |_, _| 0.0);
    let out = convert_all(&mut resampler, &silence);

    // 1024 * 48000 / 44100 = 1114.6
    assert!((1114..=1115).contains(&out.frames()), "{}", out.frames());
    let lsb = 1.0 / 32768.0;
    for plane in out.to_planar_f64() {
        assert!(plane.iter().all(|v| v.abs() <= lsb + 1e-12));
    }
}

#[test]
fn test_mono_to_stereo_copies_samples_exactly() {
    for format in SampleFormat::ALL {
        let input = ramp(format, 1, 256);
        let mut resampler = Resampler::new(
            AudioSpec::new(48000, format, ChannelLayout::MONO),
            AudioSpec::new(48000, format, ChannelLayout::STEREO),
            ResamplerOptions::default(),
        )
        .unwrap();
        let out = convert_all(&mut resampler, &input);
        assert_eq!(out.frames(), 256, "{}", format);
        for i in 0..256 {
            assert_eq!(out.sample_bytes(0, i), input.sample_bytes(0, i), "{} frame {}", format, i);
            assert_eq!(out.sample_bytes(1, i), input.sample_bytes(0, i), "{} frame {}", format, i);
        }
    }
}

#[test]
fn test_identical_specs_pass_through_unchanged() {
    for format in SampleFormat::ALL {
        let spec = AudioSpec::new(44100, format, ChannelLayout::STEREO);
        let mut resampler = Resampler::new(spec, spec, ResamplerOptions::default()).unwrap();
        assert!(resampler.is_passthrough(), "{}", format);
        let input = ramp(format, 2, 300);
        let out = convert_all(&mut resampler, &input);
        assert_eq!(out.frames(), 300);
        for ch in 0..2 {
            for i in 0..300 {
                assert_eq!(out.sample_bytes(ch, i), input.sample_bytes(ch, i));
            }
        }
    }
}

#[test]
fn test_compensation_adds_exactly_the_requested_frames() {
    let input_spec = AudioSpec::new(44100, SampleFormat::S16, ChannelLayout::MONO);
    let output_spec = AudioSpec::new(48000, SampleFormat::S16, ChannelLayout::MONO);
    let mut plain = Resampler::new(input_spec, output_spec, ResamplerOptions::default()).unwrap();
    let mut comp = Resampler::new(input_spec, output_spec, ResamplerOptions::default()).unwrap();
    comp.set_compensation(10, 1000).unwrap();
    assert!(comp.is_compensating());

    let input = SampleBuffer::from_fn(SampleFormat::S16, 1, 4410, |_, _| 0.0);
    let a = convert_all(&mut plain, &input);
    let b = convert_all(&mut comp, &input);
    assert_eq!(b.frames(), a.frames() + 10);
}

#[test]
fn test_compensation_on_equal_rates_leaves_passthrough() {
    let spec = AudioSpec::new(48000, SampleFormat::S16, ChannelLayout::STEREO);
    let mut plain = Resampler::new(spec, spec, ResamplerOptions::default()).unwrap();
    let mut comp = Resampler::new(spec, spec, ResamplerOptions::default()).unwrap();
    assert!(comp.is_passthrough());
    comp.set_compensation(10, 1000).unwrap();
    assert!(!comp.is_passthrough());
    assert!(comp.is_compensating());

    let chunk = ramp(SampleFormat::S16, 2, 480);
    let mut out = SampleBuffer::new(SampleFormat::S16, 2, 0);
    let (mut a, mut b) = (0, 0);
    for _ in 0..10 {
        a += plain.convert(Some(&chunk), 480, &mut out, 4096).unwrap();
        b += comp.convert(Some(&chunk), 480, &mut out, 4096).unwrap();
    }
    assert_eq!(a, 4800);
    // the filter holds back part of its window until flushed
    assert!(b < a + 10);
    loop {
        let n = comp.flush(&mut out, 4096).unwrap();
        if n == 0 {
            break;
        }
        b += n;
    }
    assert_eq!(plain.flush(&mut out, 4096).unwrap(), 0);
    assert_eq!(b, a + 10);
}

#[test]
fn test_audio_lane_rechunks_resampled_audio() {
    let input = AudioSpec::new(44100, SampleFormat::S16, ChannelLayout::STEREO);
    let output = AudioSpec::new(48000, SampleFormat::S16, ChannelLayout::STEREO);
    let source = BufferSource::silence(44100, SampleFormat::S16, ChannelLayout::STEREO, 4410, 441);
    let encoder = PcmEncoder::new(output, 1024).unwrap();
    let lane = AudioLane::new(
        0,
        Box::new(source),
        input,
        output,
        ResamplerOptions::default(),
        Box::new(encoder),
    )
    .unwrap();

    let mut session =
        TranscodeSession::new(vec![Box::new(lane) as Box<dyn Lane>], MemoryWriter::default())
            .unwrap();
    session.run().unwrap();
    let writer = session.into_writer();
    let units = writer.stream_units(0);
    let total: i64 = units.iter().map(|u| u.duration).sum();
    assert!((total - 4800).abs() <= 1, "{}", total);
    assert!(units[..units.len() - 1].iter().all(|u| u.duration == 1024));
    assert!(units.windows(2).all(|w| w[1].pts == w[0].pts + w[0].duration));
}

fn synthetic_lanes(threaded: bool) -> Vec<Box<dyn Lane>> {
    let sweep = SineSweepSource::new(48000, 2, 1000, 0.5);
    let spec = sweep.spec();
    let audio = AudioLane::new(
        0,
        Box::new(sweep),
        spec,
        spec,
        ResamplerOptions::default(),
        Box::new(PcmEncoder::new(spec, 1024).unwrap()),
    )
    .unwrap();

    let pattern = TestPatternSource::new(TestPatternSource::DEFAULT_SPEC, 12);
    let video = VideoLane::new(
        1,
        Box::new(pattern),
        TestPatternSource::DEFAULT_SPEC,
        None,
        Box::new(RawVideoEncoder::new(TestPatternSource::DEFAULT_SPEC).unwrap()),
    )
    .unwrap();

    if threaded {
        vec![
            Box::new(ThreadedLane::spawn(Box::new(audio), 4).unwrap()),
            Box::new(ThreadedLane::spawn(Box::new(video), 2).unwrap()),
        ]
    } else {
        vec![Box::new(audio), Box::new(video)]
    }
}

#[test]
fn test_synthetic_session_writes_packet_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let writer = PacketLogWriter::create(&path).unwrap();
    let mut session = TranscodeSession::new(synthetic_lanes(false), writer).unwrap();
    let report = session.run().unwrap();

    // 24000 samples in 1024-sample units, plus 12 pictures
    assert_eq!(report.units_written(), 24 + 12);
    assert!(report.failures.is_empty());
    drop(session);

    let log = fs::read_to_string(&path).unwrap();
    assert!(log.starts_with("#format: packet log\n"));
    assert!(log.contains("#codec 0: pcm_s16le"));
    assert!(log.contains("#dimensions 1: 352x288"));
    assert!(log.contains("#extradata 1: 4 bytes"));
    let units: Vec<&str> = log.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(units.len(), 36);

    // interleaved by presentation time
    let seconds: Vec<f64> = units
        .iter()
        .map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let pts: f64 = fields[2].parse().unwrap();
            match fields[0] {
                "0" => pts / 48000.0,
                _ => pts / 25.0,
            }
        })
        .collect();
    assert!(seconds.windows(2).all(|w| w[0] <= w[1]), "{:?}", seconds);
}

#[test]
fn test_threaded_lanes_produce_the_same_interleaving() {
    let mut direct = TranscodeSession::new(synthetic_lanes(false), MemoryWriter::default()).unwrap();
    direct.run().unwrap();
    let mut threaded =
        TranscodeSession::new(synthetic_lanes(true), MemoryWriter::default()).unwrap();
    threaded.run().unwrap();

    let order = |w: &MemoryWriter| -> Vec<(usize, i64)> {
        w.units.iter().map(|(s, u)| (*s, u.pts)).collect()
    };
    assert_eq!(order(direct.writer()), order(threaded.writer()));

    let header = threaded.writer().header.as_ref().unwrap();
    assert_eq!(header[1].time_base, Rational::new(1, 25));
    assert_eq!(header[1].global_header.as_deref(), Some(&b"I420"[..]));
}
