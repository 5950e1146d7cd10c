//! Capture replay sources
//!
//! `CaptureFileSource` streams a zip-packed logic capture: a text `header`
//! entry with the capture metadata plus one packed-bit entry per line
//! (`L-0`, `L-1`, ...), bits LSB-first within each byte. Lines are unpacked
//! into run-length [`Sample`] streams at load time and replayed by one
//! thread per connected destination.
//!
//! `TraceSource` replays in-memory edge lists, mainly for tests and
//! synthetic scenarios.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, info};
use zip::ZipArchive;

use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::sample::Sample;
use crate::{Result, SiboError};

/// Capture metadata from the zip `header` entry.
///
/// The header is line-oriented `key=value` text; section markers and
/// comments are skipped, unknown keys are tolerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHeader {
    /// Acquisition rate in Hz
    pub sample_rate: u64,
    /// Samples per line
    pub total_samples: u64,
    /// Number of capture lines
    pub probes: usize,
}

impl CaptureHeader {
    pub fn parse(text: &str) -> Result<Self> {
        let mut sample_rate = None;
        let mut total_samples = None;
        let mut probes = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('[') || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| SiboError::ParseHeader(format!("malformed line: {line}")))?;
            let value = value.trim();
            match key.trim() {
                "samplerate" => sample_rate = Some(parse_field("samplerate", value)?),
                "total samples" => total_samples = Some(parse_field("total samples", value)?),
                "total probes" => probes = Some(parse_field("total probes", value)? as usize),
                _ => {}
            }
        }

        Ok(Self {
            sample_rate: sample_rate
                .ok_or_else(|| SiboError::MissingField("samplerate".to_string()))?,
            total_samples: total_samples
                .ok_or_else(|| SiboError::MissingField("total samples".to_string()))?,
            probes: probes.ok_or_else(|| SiboError::MissingField("total probes".to_string()))?,
        })
    }
}

fn parse_field(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| SiboError::ParseHeader(format!("invalid {key}: {value}")))
}

/// Convert one packed-bit line blob into a run-length sample stream.
fn unpack_line(packed: &[u8], total_samples: u64) -> Result<Vec<Sample>> {
    if (packed.len() as u64) * 8 < total_samples {
        return Err(SiboError::ParseHeader(format!(
            "line holds {} bits but header claims {} samples",
            packed.len() * 8,
            total_samples
        )));
    }

    let bit_at = |pos: u64| (packed[(pos / 8) as usize] >> (pos % 8)) & 1 == 1;

    let mut level = total_samples > 0 && bit_at(0);
    let mut samples = vec![Sample::new(level, 0)];
    for pos in 1..total_samples {
        let bit = bit_at(pos);
        if bit != level {
            level = bit;
            samples.push(Sample::new(bit, pos));
        }
    }
    Ok(samples)
}

/// Self-threading source node replaying a packed capture file.
///
/// One output port per capture line (`line0`, `line1`, ...). On `work()` it
/// spawns one sender thread per connected destination; each thread streams
/// the line's run-length samples and closes its channel.
pub struct CaptureFileSource {
    name: String,
    header: CaptureHeader,
    lines: Vec<Arc<Vec<Sample>>>,
    threads_total: usize,
    threads_done: Arc<AtomicUsize>,
    started: bool,
}

impl CaptureFileSource {
    /// Open a capture file, parse its header and unpack all lines.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut archive = ZipArchive::new(file)?;

        let header = {
            let mut entry = archive.by_name("header")?;
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            CaptureHeader::parse(&text)?
        };

        let mut lines = Vec::with_capacity(header.probes);
        for index in 0..header.probes {
            let entry_name = format!("L-{index}");
            let mut entry = archive
                .by_name(&entry_name)
                .map_err(|_| SiboError::UnknownLine(entry_name.clone()))?;
            let mut packed = Vec::new();
            entry.read_to_end(&mut packed)?;
            lines.push(Arc::new(unpack_line(&packed, header.total_samples)?));
        }

        info!(
            "loaded capture: {} lines, {} samples at {} Hz",
            header.probes, header.total_samples, header.sample_rate
        );

        Ok(Self {
            name: "capture_file_source".to_string(),
            header,
            lines,
            threads_total: 0,
            threads_done: Arc::new(AtomicUsize::new(0)),
            started: false,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }
}

impl ProcessNode for CaptureFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_self_threading(&self) -> bool {
        true
    }

    fn should_stop(&self) -> bool {
        self.started && self.threads_done.load(Ordering::Relaxed) >= self.threads_total
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        self.lines.len()
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        (0..self.lines.len())
            .map(|i| PortSchema::new::<Sample>(format!("line{i}"), i, PortDirection::Output))
            .collect()
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut spawned = 0;

        for (index, line) in self.lines.iter().enumerate() {
            let Some(senders) = outputs[index].split_senders::<Sample>() else {
                debug!("[{}] line {} not connected", self.name, index);
                continue;
            };

            for sender in senders {
                let line = Arc::clone(line);
                let done = Arc::clone(&self.threads_done);
                thread::spawn(move || {
                    for &sample in line.iter() {
                        if sender.send(sample).is_err() {
                            break;
                        }
                    }
                    sender.close();
                    done.fetch_add(1, Ordering::Relaxed);
                });
                spawned += 1;
            }
        }

        debug!("[{}] spawned {} sender threads", self.name, spawned);
        self.threads_total = spawned;
        self.started = true;
        Ok(0)
    }
}

/// In-memory source replaying explicit per-line sample streams.
///
/// Self-threading like [`CaptureFileSource`]: one sender thread per
/// connected destination, so a line with more transitions than the channel
/// buffer cannot block the other lines while the consumer waits on them.
pub struct TraceSource {
    name: String,
    lines: Vec<Arc<Vec<Sample>>>,
    threads_total: usize,
    threads_done: Arc<AtomicUsize>,
    started: bool,
}

impl TraceSource {
    pub fn new(lines: Vec<Vec<Sample>>) -> Self {
        Self {
            name: "trace_source".to_string(),
            lines: lines.into_iter().map(Arc::new).collect(),
            threads_total: 0,
            threads_done: Arc::new(AtomicUsize::new(0)),
            started: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl ProcessNode for TraceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_self_threading(&self) -> bool {
        true
    }

    fn should_stop(&self) -> bool {
        self.started && self.threads_done.load(Ordering::Relaxed) >= self.threads_total
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        self.lines.len()
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        (0..self.lines.len())
            .map(|i| PortSchema::new::<Sample>(format!("line{i}"), i, PortDirection::Output))
            .collect()
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut spawned = 0;

        for (index, line) in self.lines.iter().enumerate() {
            let Some(senders) = outputs[index].split_senders::<Sample>() else {
                debug!("[{}] line {} not connected", self.name, index);
                continue;
            };

            for sender in senders {
                let line = Arc::clone(line);
                let done = Arc::clone(&self.threads_done);
                thread::spawn(move || {
                    for &sample in line.iter() {
                        if sender.send(sample).is_err() {
                            break;
                        }
                    }
                    sender.close();
                    done.fetch_add(1, Ordering::Relaxed);
                });
                spawned += 1;
            }
        }

        debug!("[{}] spawned {} sender threads", self.name, spawned);
        self.threads_total = spawned;
        self.started = true;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::sender::{ChannelMessage, Sender};
    use crossbeam_channel::bounded;
    use std::io::Write;
    use std::time::Duration;
    use zip::write::SimpleFileOptions;

    fn write_capture(
        suffix: &str,
        header: &str,
        lines: &[&[u8]],
    ) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sibo-capture-test-{}-{suffix}.zip",
            std::process::id()
        ));
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        writer.start_file("header", options).unwrap();
        writer.write_all(header.as_bytes()).unwrap();
        for (index, packed) in lines.iter().enumerate() {
            writer.start_file(format!("L-{index}"), options).unwrap();
            writer.write_all(packed).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_header_parse() {
        let header = CaptureHeader::parse(
            "[header]\n# capture metadata\nsamplerate=1000000\ntotal samples=64\ntotal probes=2\nextra=ignored\n",
        )
        .unwrap();
        assert_eq!(
            header,
            CaptureHeader {
                sample_rate: 1_000_000,
                total_samples: 64,
                probes: 2
            }
        );
    }

    #[test]
    fn test_header_missing_field() {
        let err = CaptureHeader::parse("samplerate=1000\ntotal probes=2\n").unwrap_err();
        assert!(matches!(err, SiboError::MissingField(f) if f == "total samples"));
    }

    #[test]
    fn test_header_malformed_line() {
        let err = CaptureHeader::parse("samplerate 1000\n").unwrap_err();
        assert!(matches!(err, SiboError::ParseHeader(_)));
    }

    #[test]
    fn test_unpack_line_run_length() {
        // Bits LSB-first: 0b0001_1110 reads 0,1,1,1,1,0,0,0
        let samples = unpack_line(&[0b0001_1110], 8).unwrap();
        assert_eq!(
            samples,
            vec![
                Sample::new(false, 0),
                Sample::new(true, 1),
                Sample::new(false, 5),
            ]
        );
    }

    #[test]
    fn test_unpack_line_too_short() {
        let err = unpack_line(&[0xFF], 9).unwrap_err();
        assert!(matches!(err, SiboError::ParseHeader(_)));
    }

    #[test]
    fn test_capture_file_source_streams_lines() {
        let path = write_capture(
            "stream",
            "samplerate=1000\ntotal samples=8\ntotal probes=2\n",
            &[&[0b0001_1110], &[0b0000_0000]],
        );

        let mut source = CaptureFileSource::new(&path).unwrap();
        assert_eq!(source.header().probes, 2);
        assert_eq!(source.num_outputs(), 2);

        let (tx0, rx0) = bounded::<ChannelMessage<Sample>>(64);
        let (tx1, rx1) = bounded::<ChannelMessage<Sample>>(64);
        let outputs = vec![
            OutputPort::new(Sender::new(vec![tx0])),
            OutputPort::new(Sender::new(vec![tx1])),
        ];

        source.work(&[], &outputs).unwrap();

        let mut line0 = Vec::new();
        while let Ok(msg) = rx0.recv_timeout(Duration::from_secs(2)) {
            match msg {
                ChannelMessage::Sample(s) => line0.push(s),
                ChannelMessage::EndOfStream => break,
            }
        }
        assert_eq!(
            line0,
            vec![
                Sample::new(false, 0),
                Sample::new(true, 1),
                Sample::new(false, 5),
            ]
        );

        let mut line1 = Vec::new();
        while let Ok(msg) = rx1.recv_timeout(Duration::from_secs(2)) {
            match msg {
                ChannelMessage::Sample(s) => line1.push(s),
                ChannelMessage::EndOfStream => break,
            }
        }
        assert_eq!(line1, vec![Sample::new(false, 0)]);

        // All sender threads finished, the node reports completion
        for _ in 0..100 {
            if source.should_stop() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(source.should_stop());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_capture_file_source_missing_line_entry() {
        let path = write_capture(
            "missing",
            "samplerate=1000\ntotal samples=8\ntotal probes=2\n",
            &[&[0u8]], // header claims two probes, archive has one
        );
        match CaptureFileSource::new(&path) {
            Ok(_) => panic!("expected a missing line entry error"),
            Err(SiboError::UnknownLine(name)) => assert_eq!(name, "L-1"),
            Err(other) => panic!("unexpected error: {other}"),
        }
        std::fs::remove_file(&path).ok();
    }

    fn drain(rx: &crossbeam_channel::Receiver<ChannelMessage<Sample>>) -> Vec<Sample> {
        let mut received = Vec::new();
        while let Ok(msg) = rx.recv_timeout(Duration::from_secs(2)) {
            match msg {
                ChannelMessage::Sample(s) => received.push(s),
                ChannelMessage::EndOfStream => return received,
            }
        }
        panic!("stream was not closed");
    }

    #[test]
    fn test_trace_source_sends_and_closes() {
        let samples = vec![Sample::new(false, 0), Sample::new(true, 10)];
        let mut source = TraceSource::new(vec![samples.clone()]);

        let (tx, rx) = bounded::<ChannelMessage<Sample>>(64);
        let outputs = vec![OutputPort::new(Sender::new(vec![tx]))];

        assert!(!source.should_stop());
        source.work(&[], &outputs).unwrap();

        assert_eq!(drain(&rx), samples);

        for _ in 0..100 {
            if source.should_stop() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(source.should_stop());
    }

    #[test]
    fn test_trace_source_long_line_does_not_block_others() {
        // One line with far more transitions than the channel buffer must
        // not stall delivery on the other line while the consumer waits
        // there first.
        let long: Vec<Sample> = (0..40)
            .map(|i| Sample::new(i % 2 == 1, i as u64))
            .collect();
        let short = vec![Sample::new(false, 0), Sample::new(true, 20)];
        let mut source = TraceSource::new(vec![long.clone(), short.clone()]);

        let (tx0, rx0) = bounded::<ChannelMessage<Sample>>(4);
        let (tx1, rx1) = bounded::<ChannelMessage<Sample>>(4);
        let outputs = vec![
            OutputPort::new(Sender::new(vec![tx0])),
            OutputPort::new(Sender::new(vec![tx1])),
        ];

        source.work(&[], &outputs).unwrap();

        // Consume the short line to completion before touching the long one
        assert_eq!(drain(&rx1), short);
        assert_eq!(drain(&rx0), long);
    }
}
