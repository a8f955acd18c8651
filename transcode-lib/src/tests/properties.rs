//! Property tests for the scheduler ordering and the resampler frame count

use proptest::prelude::*;

use crate::audio::{AudioSpec, ChannelLayout, SampleBuffer, SampleFormat};
use crate::mux::{Scheduler, Step};
use crate::resample::{Resampler, ResamplerOptions};
use crate::tests::support::{MemoryWriter, ScriptedLane};
use crate::types::{MediaKind, Rational};

const RATES: [u32; 6] = [8000, 11025, 22050, 44100, 48000, 96000];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn scheduler_output_is_ordered_by_presentation_time(
        audio in prop::collection::vec(1i64..4096, 1..40),
        video in prop::collection::vec(1i64..4, 1..20),
        audio_den in prop::sample::select(vec![8000, 44100, 48000]),
    ) {
        let audio_tb = Rational::new(1, audio_den);
        let video_tb = Rational::new(1, 30);
        let lanes: Vec<Box<dyn crate::lane::Lane>> = vec![
            Box::new(ScriptedLane::with_durations(0, MediaKind::Audio, audio_tb, &audio)),
            Box::new(ScriptedLane::with_durations(1, MediaKind::Video, video_tb, &video)),
        ];
        let mut scheduler = Scheduler::new(lanes).unwrap();
        let mut writer = MemoryWriter::default();
        while scheduler.step(&mut writer).unwrap() != Step::Finished {}

        prop_assert_eq!(writer.units.len(), audio.len() + video.len());
        for stream in 0..2 {
            let pts: Vec<i64> = writer.stream_units(stream).iter().map(|u| u.pts).collect();
            prop_assert!(pts.windows(2).all(|w| w[0] <= w[1]));
        }
        let seconds = writer.unit_seconds(&[audio_tb, video_tb]);
        prop_assert!(seconds.windows(2).all(|w| w[0] <= w[1] + 1e-9), "{:?}", seconds);
    }

    #[test]
    fn resampled_frame_count_follows_rate_ratio(
        in_rate in prop::sample::select(RATES.to_vec()),
        out_rate in prop::sample::select(RATES.to_vec()),
        frames in 1usize..5000,
    ) {
        let mut resampler = Resampler::new(
            AudioSpec::new(in_rate, SampleFormat::S16, ChannelLayout::MONO),
            AudioSpec::new(out_rate, SampleFormat::S16, ChannelLayout::MONO),
            ResamplerOptions::default(),
        )
        .unwrap();
        let input = SampleBuffer::from_fn(SampleFormat::S16, 1, frames, |_, _| 0.0);
        let mut out = SampleBuffer::new(SampleFormat::S16, 1, 0);
        let cap = resampler.output_frames_for(frames).max(1);
        let mut total = resampler.convert(Some(&input), frames, &mut out, cap).unwrap();
        loop {
            let n = resampler.flush(&mut out, 4096).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }

        let expected = frames as f64 * out_rate as f64 / in_rate as f64;
        prop_assert!(
            (total as f64 - expected).abs() <= 1.0,
            "{} -> {}: {} frames gave {}, expected {:.2}",
            in_rate, out_rate, frames, total, expected
        );
    }
}
