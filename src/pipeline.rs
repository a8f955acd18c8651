//! Builds lanes and the container writer from the configuration and runs the
//! session.

use tracing::{debug, info};

use transcode_lib::capability::{ContainerWriter, Encoder, FrameSource, PixelFormat, VideoSpec};
use transcode_lib::codec::{PcmEncoder, RawVideoEncoder};
use transcode_lib::lane::{AudioLane, Lane, ThreadedLane, VideoLane};
use transcode_lib::synth::{SineSweepSource, TestPatternSource};
use transcode_lib::{AudioSpec, PacketLogWriter, Rational, SessionReport, TranscodeSession};

#[cfg(feature = "ffmpeg")]
use transcode_lib::ffmpeg_utils::{self, ffmpeg, AudioEncoderSettings, FfmpegAudioEncoder};

use crate::config::{AppConfig, AudioConfig, AudioSource, VideoConfig};
use crate::error::{AppError, Result};

/// Samples per frame of the generated sweep
const SWEEP_FRAME: usize = 1024;

const AUDIO_STREAM: usize = 0;
const VIDEO_STREAM: usize = 1;

/// Lanes ready to run, plus the codec parameters an FFmpeg writer needs
struct Lanes {
    lanes: Vec<Box<dyn Lane>>,
    #[cfg(feature = "ffmpeg")]
    parameters: Vec<(usize, ffmpeg::codec::Parameters)>,
}

/// Run one session as configured.
pub fn run(config: &AppConfig) -> Result<SessionReport> {
    let built = build_lanes(config)?;
    if config.output.is_packet_log() {
        let writer = PacketLogWriter::create(&config.output.path)?;
        run_session(config, built.lanes, writer)
    } else {
        run_ffmpeg_output(config, built)
    }
}

#[cfg(feature = "ffmpeg")]
fn run_ffmpeg_output(config: &AppConfig, built: Lanes) -> Result<SessionReport> {
    let mut writer = ffmpeg_utils::FfmpegWriter::create(&config.output.path)?;
    for (stream, parameters) in built.parameters {
        writer.add_parameters(stream, parameters);
    }
    run_session(config, built.lanes, writer)
}

#[cfg(not(feature = "ffmpeg"))]
fn run_ffmpeg_output(config: &AppConfig, _built: Lanes) -> Result<SessionReport> {
    Err(AppError::FeatureDisabled(format!(
        "writing {:?}",
        config.output.path
    )))
}

fn run_session<W: ContainerWriter>(
    config: &AppConfig,
    lanes: Vec<Box<dyn Lane>>,
    writer: W,
) -> Result<SessionReport> {
    let lanes = if config.output.threaded {
        lanes
            .into_iter()
            .map(|lane| {
                ThreadedLane::spawn(lane, config.output.queue_capacity)
                    .map(|t| Box::new(t) as Box<dyn Lane>)
            })
            .collect::<transcode_lib::Result<Vec<_>>>()?
    } else {
        lanes
    };
    let mut session = TranscodeSession::new(lanes, writer)?;
    info!(
        session = %session.id(),
        output = ?config.output.path,
        threaded = config.output.threaded,
        "transcoder: session created"
    );
    match session.run() {
        Ok(report) => Ok(report),
        Err(source) => match session.report() {
            Some(report) => Err(AppError::Session {
                report: Box::new(report.clone()),
                source,
            }),
            None => Err(source.into()),
        },
    }
}

fn build_lanes(config: &AppConfig) -> Result<Lanes> {
    let mut built = Lanes {
        lanes: Vec::new(),
        #[cfg(feature = "ffmpeg")]
        parameters: Vec::new(),
    };
    if let Some(audio) = &config.audio {
        let output = AudioSpec::new(audio.rate, audio.format, audio.layout);
        let (source, input) = audio_source(audio)?;
        let encoder = audio_encoder(audio, output, !config.output.is_packet_log(), &mut built)?;
        debug!(input = %input, output = %output, codec = %audio.codec, "transcoder: audio lane");
        built.lanes.push(Box::new(AudioLane::new(
            AUDIO_STREAM,
            source,
            input,
            output,
            audio.resampler.clone(),
            encoder,
        )?));
    }
    if let Some(video) = &config.video {
        if !config.output.is_packet_log() {
            return Err(AppError::Config(
                "raw video can only be written to a packet log".to_string(),
            ));
        }
        built.lanes.push(Box::new(video_lane(video)?));
    }
    if built.lanes.is_empty() {
        return Err(AppError::Config("no streams configured".to_string()));
    }
    Ok(built)
}

fn audio_source(audio: &AudioConfig) -> Result<(Box<dyn FrameSource>, AudioSpec)> {
    match &audio.source {
        AudioSource::Sweep {
            rate,
            channels,
            seconds,
        } => {
            let source = SineSweepSource::new(*rate, *channels, SWEEP_FRAME, *seconds);
            let spec = source.spec();
            Ok((Box::new(source), spec))
        }
        #[cfg(feature = "ffmpeg")]
        AudioSource::File(path) => {
            let (source, spec) = ffmpeg_utils::open_audio_source(path)?;
            Ok((Box::new(source), spec))
        }
        #[cfg(not(feature = "ffmpeg"))]
        AudioSource::File(path) => Err(AppError::FeatureDisabled(format!("decoding {:?}", path))),
    }
}

#[cfg_attr(not(feature = "ffmpeg"), allow(unused_variables))]
fn audio_encoder(
    audio: &AudioConfig,
    output: AudioSpec,
    global_header: bool,
    built: &mut Lanes,
) -> Result<Box<dyn Encoder>> {
    if audio.codec == "pcm" {
        return Ok(Box::new(PcmEncoder::new(output, audio.frame_size)?));
    }
    #[cfg(feature = "ffmpeg")]
    {
        let encoder = FfmpegAudioEncoder::open(&AudioEncoderSettings {
            codec: audio.codec.clone(),
            spec: output,
            bit_rate: audio.bit_rate,
            global_header,
        })?;
        built.parameters.push((AUDIO_STREAM, encoder.parameters()));
        Ok(Box::new(encoder))
    }
    #[cfg(not(feature = "ffmpeg"))]
    Err(AppError::FeatureDisabled(format!("encoder {}", audio.codec)))
}

fn video_lane(video: &VideoConfig) -> Result<VideoLane> {
    let spec = VideoSpec {
        width: video.width,
        height: video.height,
        format: PixelFormat::Yuv420p,
        frame_rate: Rational::new(video.frame_rate as i32, 1),
    };
    let source = TestPatternSource::new(spec, video.frames);
    let encoder = RawVideoEncoder::new(spec)?;
    Ok(VideoLane::new(
        VIDEO_STREAM,
        Box::new(source),
        spec,
        None,
        Box::new(encoder),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, VideoConfig};
    use std::fs;
    use transcode_lib::capability::{StreamDescriptor, StreamParams};
    use transcode_lib::lane::{LaneState, Pump};
    use transcode_lib::{MediaKind, TranscodeError};

    /// An audio lane whose encoder fails on the first frame
    struct BrokenLane {
        failed: bool,
    }

    impl Lane for BrokenLane {
        fn stream_index(&self) -> usize {
            AUDIO_STREAM
        }

        fn kind(&self) -> MediaKind {
            MediaKind::Audio
        }

        fn time_base(&self) -> Rational {
            Rational::new(1, 48000)
        }

        fn descriptor(&self) -> StreamDescriptor {
            StreamDescriptor {
                index: AUDIO_STREAM,
                kind: MediaKind::Audio,
                codec: "pcm_s16le".to_string(),
                time_base: self.time_base(),
                global_header: None,
                params: StreamParams::Audio {
                    rate: 48000,
                    channels: 2,
                },
            }
        }

        fn state(&self) -> LaneState {
            if self.failed {
                LaneState::Closed
            } else {
                LaneState::Idle
            }
        }

        fn pump(&mut self) -> transcode_lib::Result<Pump> {
            if self.failed {
                return Ok(Pump::Drained);
            }
            self.failed = true;
            Err(TranscodeError::Encoder {
                stream: AUDIO_STREAM,
                message: "codec rejected the frame".to_string(),
            })
        }

        fn timestamp_clamps(&self) -> u64 {
            0
        }

        fn close(&mut self) {
            self.failed = true;
        }
    }

    fn small_config(path: std::path::PathBuf, threaded: bool) -> AppConfig {
        AppConfig {
            output: OutputConfig {
                path,
                threaded,
                queue_capacity: 4,
            },
            audio: Some(AudioConfig {
                source: AudioSource::Sweep {
                    rate: 44100,
                    channels: 2,
                    seconds: 0.5,
                },
                ..Default::default()
            }),
            video: Some(VideoConfig {
                width: 64,
                height: 48,
                frame_rate: 25,
                frames: 12,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_demo_pipeline_writes_packet_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.log");
        let report = run(&small_config(path.clone(), false)).unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.streams.len(), 2);
        assert_eq!(report.streams[1].units, 12);

        let log = fs::read_to_string(&path).unwrap();
        assert!(log.contains("#codec 0: pcm_s16le"));
        assert!(log.contains("#dimensions 1: 64x48"));
        let units = log.lines().filter(|l| !l.starts_with('#')).count() as u64;
        assert_eq!(units, report.units_written());
    }

    #[test]
    fn test_threaded_pipeline_matches_direct() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("direct.log");
        let b = dir.path().join("threaded.log");
        run(&small_config(a.clone(), false)).unwrap();
        run(&small_config(b.clone(), true)).unwrap();
        assert_eq!(fs::read_to_string(a).unwrap(), fs::read_to_string(b).unwrap());
    }

    #[test]
    fn test_failed_lane_keeps_session_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.log");
        let config = small_config(path.clone(), false);
        let video = config.video.clone().unwrap();
        let lanes: Vec<Box<dyn Lane>> = vec![
            Box::new(BrokenLane { failed: false }),
            Box::new(video_lane(&video).unwrap()),
        ];
        let writer = PacketLogWriter::create(&path).unwrap();
        match run_session(&config, lanes, writer) {
            Err(AppError::Session { report, source }) => {
                assert!(matches!(source, TranscodeError::LaneFailures { count: 1, .. }));
                assert_eq!(report.failures.len(), 1);
                assert_eq!(report.failures[0].0, AUDIO_STREAM);
                let video = report.streams.iter().find(|s| s.stream == VIDEO_STREAM).unwrap();
                assert_eq!(video.units, 12);
            }
            other => panic!("expected a session error, got {:?}", other.map(|r| r.id)),
        }
        assert!(fs::read_to_string(&path).unwrap().contains("#dimensions 1: 64x48"));
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_file_input_needs_ffmpeg() {
        let mut config = small_config("x.log".into(), false);
        if let Some(audio) = config.audio.as_mut() {
            audio.source = AudioSource::File("input.mkv".into());
        }
        assert!(matches!(run(&config), Err(AppError::FeatureDisabled(_))));
    }
}
