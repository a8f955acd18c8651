//! Textual packet log container
//!
//! Writes a per-stream header followed by one line per unit, in the style of
//! a frame checksum listing. Useful for inspecting interleaving without any
//! real container library.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::capability::{ContainerWriter, EncodedUnit, StreamDescriptor, StreamParams};
use crate::error::{Result, TranscodeError};

pub struct PacketLogWriter<W: Write> {
    out: W,
    header_written: bool,
    trailer_written: bool,
    last_dts: HashMap<usize, i64>,
    units: u64,
}

impl PacketLogWriter<BufWriter<File>> {
    /// Create (or truncate) a log file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> PacketLogWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
            trailer_written: false,
            last_dts: HashMap::new(),
            units: 0,
        }
    }

    pub fn units_written(&self) -> u64 {
        self.units
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ContainerWriter for PacketLogWriter<W> {
    fn write_header(&mut self, streams: &[StreamDescriptor]) -> Result<()> {
        if self.header_written {
            return Err(TranscodeError::Writer("header already written".to_string()));
        }
        writeln!(self.out, "#format: packet log")?;
        for s in streams {
            writeln!(self.out, "#tb {}: {}", s.index, s.time_base)?;
            writeln!(self.out, "#media_type {}: {}", s.index, s.kind)?;
            writeln!(self.out, "#codec {}: {}", s.index, s.codec)?;
            match &s.params {
                StreamParams::Audio { rate, channels } => {
                    writeln!(self.out, "#sample_rate {}: {}", s.index, rate)?;
                    writeln!(self.out, "#channels {}: {}", s.index, channels)?;
                }
                StreamParams::Video {
                    width,
                    height,
                    format,
                    frame_rate,
                } => {
                    writeln!(self.out, "#dimensions {}: {}x{}", s.index, width, height)?;
                    writeln!(self.out, "#pixel_format {}: {}", s.index, format)?;
                    writeln!(self.out, "#frame_rate {}: {}", s.index, frame_rate)?;
                }
            }
            if let Some(extradata) = &s.global_header {
                writeln!(self.out, "#extradata {}: {} bytes", s.index, extradata.len())?;
            }
        }
        writeln!(self.out, "#stream#, dts, pts, duration, size, keyframe")?;
        self.header_written = true;
        Ok(())
    }

    fn write_unit(&mut self, stream: usize, unit: &EncodedUnit) -> Result<()> {
        if !self.header_written || self.trailer_written {
            return Err(TranscodeError::Writer(format!(
                "unit for stream {} outside header/trailer",
                stream
            )));
        }
        if let Some(&last) = self.last_dts.get(&stream) {
            if unit.dts < last {
                return Err(TranscodeError::Writer(format!(
                    "stream {} dts went backwards: {} after {}",
                    stream, unit.dts, last
                )));
            }
        }
        self.last_dts.insert(stream, unit.dts);
        writeln!(
            self.out,
            "{}, {:>10}, {:>10}, {:>8}, {:>8}, {}",
            stream,
            unit.dts,
            unit.pts,
            unit.duration,
            unit.data.len(),
            if unit.keyframe { "K" } else { "_" }
        )?;
        self.units += 1;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        if self.trailer_written {
            return Ok(());
        }
        self.trailer_written = true;
        self.out.flush()?;
        Ok(())
    }
}
