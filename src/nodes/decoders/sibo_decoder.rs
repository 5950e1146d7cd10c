//! SIBO serial bus decoder node
//!
//! Consumes run-length `Sample` streams for the CLK and DATA lines (plus an
//! optional SDIR direction line) and produces `Annotation` events describing
//! the protocol traffic: frame headers, decoded fields, command summaries,
//! per-byte direction attribution and data-run counts.
//!
//! Bits are sampled on the falling clock edge, using the data level latched
//! at the preceding rising edge. Two filters run before bit sampling:
//!
//! - CLK and DATA rising at the same position is crosstalk; the decoder
//!   waits for the clock to fall and re-observes.
//! - DATA falling on its own while the clock is high is a race, not a bit
//!   boundary, and is skipped.
//!
//! Clock pulses one sample wide are rejected as noise.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::tables::{self, FrameLabel};
use super::types::{
    Annotation, AnnotationKind, ControlOp, FRAME_BITS, FrameKind, classify,
};
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::receiver::Receiver;
use crate::runtime::sample::Sample;
use crate::runtime::sender::Sender;

fn to_labels(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

/// A transition observed on the merged CLK/DATA streams.
///
/// `clk`/`data` flag which lines changed at `position`; both set means the
/// edges were coincident.
#[derive(Debug, Clone, Copy)]
struct Edge {
    position: u64,
    clk: bool,
    data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    /// Waiting for a high bit to open the next frame (after a null frame)
    FindStart,
    /// Accumulating bits into the current frame
    InFrame,
}

/// Decode state, kept separate from the node wrapper so it can borrow the
/// channel receivers without aliasing the putback buffers they wrap.
struct DecoderCore {
    show_clock_pulses: bool,
    show_bits: bool,
    show_raw_frames: bool,
    show_guessed_asic_data: bool,

    initialized: bool,
    clk_level: bool,
    data_level: bool,
    sdir_level: bool,

    state: FrameState,
    frame: Vec<bool>,
    clk_starts: Vec<u64>,
    clk_rise: u64,
    current_bit: bool,

    asic_tx: bool,
    expect_asic_data: bool,

    run_start: Option<u64>,
    run_end: u64,
    run_count: u64,
}

impl DecoderCore {
    fn new() -> Self {
        Self {
            show_clock_pulses: false,
            show_bits: false,
            show_raw_frames: false,
            show_guessed_asic_data: false,
            initialized: false,
            clk_level: false,
            data_level: false,
            sdir_level: false,
            state: FrameState::FindStart,
            frame: Vec::new(),
            clk_starts: Vec::new(),
            clk_rise: 0,
            current_bit: false,
            asic_tx: false,
            expect_asic_data: false,
            run_start: None,
            run_end: 0,
            run_count: 0,
        }
    }

    /// Consume the initial level sample of each line.
    fn ensure_initialized(
        &mut self,
        clk: &mut Receiver<'_, Sample>,
        data: &mut Receiver<'_, Sample>,
        sdir: Option<&mut Receiver<'_, Sample>>,
    ) -> WorkResult {
        if self.initialized {
            return Ok(());
        }
        self.clk_level = clk.recv()?.value;
        self.data_level = data.recv()?.value;
        if let Some(sdir) = sdir {
            match sdir.recv() {
                Ok(sample) => self.sdir_level = sample.value,
                Err(WorkError::Shutdown) => {}
                Err(e) => return Err(e),
            }
        }
        self.initialized = true;
        Ok(())
    }

    /// Wait for the next transition on CLK or DATA, whichever comes first.
    /// Updates the line levels. Equal positions yield a coincident edge.
    fn wait_edge(
        &mut self,
        clk: &mut Receiver<'_, Sample>,
        data: &mut Receiver<'_, Sample>,
    ) -> WorkResult<Edge> {
        let clk_next = match clk.peek() {
            Ok(s) => Some(*s),
            Err(WorkError::Shutdown) => None,
            Err(e) => return Err(e),
        };
        let data_next = match data.peek() {
            Ok(s) => Some(*s),
            Err(WorkError::Shutdown) => None,
            Err(e) => return Err(e),
        };

        match (clk_next, data_next) {
            (None, None) => Err(WorkError::Shutdown),
            (Some(c), None) => {
                clk.recv()?;
                self.clk_level = c.value;
                Ok(Edge {
                    position: c.position,
                    clk: true,
                    data: false,
                })
            }
            (None, Some(d)) => {
                data.recv()?;
                self.data_level = d.value;
                Ok(Edge {
                    position: d.position,
                    clk: false,
                    data: true,
                })
            }
            (Some(c), Some(d)) => {
                if c.position < d.position {
                    clk.recv()?;
                    self.clk_level = c.value;
                    Ok(Edge {
                        position: c.position,
                        clk: true,
                        data: false,
                    })
                } else if d.position < c.position {
                    data.recv()?;
                    self.data_level = d.value;
                    Ok(Edge {
                        position: d.position,
                        clk: false,
                        data: true,
                    })
                } else {
                    clk.recv()?;
                    data.recv()?;
                    self.clk_level = c.value;
                    self.data_level = d.value;
                    Ok(Edge {
                        position: c.position,
                        clk: true,
                        data: true,
                    })
                }
            }
        }
    }

    /// Discard edges until the clock falls.
    fn wait_clk_fall(
        &mut self,
        clk: &mut Receiver<'_, Sample>,
        data: &mut Receiver<'_, Sample>,
    ) -> WorkResult {
        loop {
            let edge = self.wait_edge(clk, data)?;
            if edge.clk && !self.clk_level {
                return Ok(());
            }
        }
    }

    /// Catch the SDIR level up to `position` and return it. A missing SDIR
    /// line reads as low.
    fn sdir_level_at(
        &mut self,
        sdir: Option<&mut Receiver<'_, Sample>>,
        position: u64,
    ) -> WorkResult<bool> {
        let Some(sdir) = sdir else {
            return Ok(false);
        };
        loop {
            let next = match sdir.peek() {
                Ok(s) => Some(s.position),
                Err(WorkError::Shutdown) => None,
                Err(e) => return Err(e),
            };
            match next {
                Some(p) if p <= position => {
                    let sample = sdir.recv()?;
                    self.sdir_level = sample.value;
                }
                _ => break,
            }
        }
        Ok(self.sdir_level)
    }

    /// Advance the decode by one sampled bit (one full clock pulse).
    /// Returns the number of annotations emitted.
    fn advance(
        &mut self,
        clk: &mut Receiver<'_, Sample>,
        data: &mut Receiver<'_, Sample>,
        mut sdir: Option<&mut Receiver<'_, Sample>>,
        out: &Sender<Annotation>,
    ) -> WorkResult<usize> {
        self.ensure_initialized(clk, data, sdir.as_mut().map(|r| &mut **r))?;

        loop {
            let mut edge = self.wait_edge(clk, data)?;

            // Coincident rising edges are crosstalk between the two lines.
            while edge.clk && edge.data && self.clk_level && self.data_level {
                self.wait_clk_fall(clk, data)?;
                edge = self.wait_edge(clk, data)?;
            }

            // DATA falling on its own while the clock is high is a race,
            // not a bit boundary.
            if edge.data && !edge.clk && self.clk_level && !self.data_level {
                edge = self.wait_edge(clk, data)?;
            }

            if !edge.clk {
                continue;
            }

            if self.clk_level {
                // Rising edge: latch the data level for this bit
                self.clk_rise = edge.position;
                self.current_bit = self.data_level;

                if (self.state == FrameState::FindStart && self.current_bit)
                    || self.frame.is_empty()
                {
                    self.frame.clear();
                    self.clk_starts.clear();
                    self.state = FrameState::InFrame;
                }
            } else if edge.position - self.clk_rise > 1 {
                // Falling edge of a pulse wide enough to be real
                return self.process_bit(edge.position, sdir.as_mut().map(|r| &mut **r), out);
            }
        }
    }

    fn process_bit(
        &mut self,
        fall: u64,
        sdir: Option<&mut Receiver<'_, Sample>>,
        out: &Sender<Annotation>,
    ) -> WorkResult<usize> {
        let mut emitted = 0;
        let rise = self.clk_rise;

        if self.show_clock_pulses {
            out.send(Annotation::new(
                rise,
                fall,
                AnnotationKind::ClockPulse,
                to_labels(tables::CLK_LABELS),
            ))?;
            emitted += 1;
        }
        if self.show_bits {
            let label = if self.current_bit { "1" } else { "0" };
            out.send(Annotation::new(
                rise,
                fall,
                AnnotationKind::Bit,
                vec![label.to_string()],
            ))?;
            emitted += 1;
        }

        self.frame.push(self.current_bit);
        self.clk_starts.push(rise);

        // SDIR marks the slave driving the bus at exactly the fourth bit
        if self.frame.len() == 4 && self.sdir_level_at(sdir, fall)? {
            self.asic_tx = true;
        }

        while self.frame.len() > FRAME_BITS {
            self.frame.remove(0);
            self.clk_starts.remove(0);
        }
        if self.frame.len() == FRAME_BITS {
            emitted += self.process_frame(fall, out)?;
        }
        Ok(emitted)
    }

    fn bit_span(&self, bits: (usize, usize)) -> (u64, u64) {
        (self.clk_starts[bits.0], self.clk_starts[bits.1])
    }

    fn emit_label(
        &self,
        out: &Sender<Annotation>,
        label: &FrameLabel,
        suffix: Option<&str>,
    ) -> WorkResult {
        let (start, end) = self.bit_span(label.bits);
        let labels = match suffix {
            Some(sfx) => label.labels.iter().map(|l| format!("{l}{sfx}")).collect(),
            None => to_labels(label.labels),
        };
        out.send(Annotation::new(start, end, label.kind, labels))?;
        Ok(())
    }

    fn process_frame(&mut self, frame_end: u64, out: &Sender<Annotation>) -> WorkResult<usize> {
        let mut emitted = 0;
        let kind = classify(&self.frame);

        if kind == FrameKind::Null {
            // Close the run first: the count spans earlier samples and must
            // precede the null marker
            emitted += self.flush_run(out)?;
            out.send(Annotation::new(
                frame_end,
                frame_end,
                AnnotationKind::NullFrame,
                to_labels(tables::NULL_LABELS),
            ))?;
            emitted += 1;
            // Resynchronize: wait for a high bit to open the next frame
            self.state = FrameState::FindStart;
            return Ok(emitted);
        }

        match kind {
            FrameKind::Control(op) => emitted += self.process_control(op, out)?,
            FrameKind::Data { value } => emitted += self.process_data(value, frame_end, out)?,
            FrameKind::Unclassified => {
                trace!("unclassified frame ending at {}", frame_end);
            }
            FrameKind::Null => unreachable!(),
        }

        if self.state != FrameState::FindStart {
            if self.show_raw_frames {
                let bits: Vec<&str> = self
                    .frame
                    .iter()
                    .map(|&b| if b { "1" } else { "0" })
                    .collect();
                let (start, end) = self.bit_span((0, FRAME_BITS - 1));
                out.send(Annotation::new(
                    start,
                    end,
                    AnnotationKind::RawFrame,
                    vec![format!("[{}]", bits.join(" "))],
                ))?;
                emitted += 1;
            }
            self.frame.clear();
            self.clk_starts.clear();
        }
        Ok(emitted)
    }

    fn process_control(&mut self, op: ControlOp, out: &Sender<Annotation>) -> WorkResult<usize> {
        let mut emitted = 1;
        self.emit_label(out, &tables::FCTRL, None)?;
        self.expect_asic_data = false;
        emitted += self.flush_run(out)?;

        match op {
            ControlOp::SelectReset { address, select } => {
                self.emit_label(out, &tables::SSR, None)?;
                let (start, end) = self.bit_span((3, 9));
                out.send(Annotation::new(
                    start,
                    end,
                    AnnotationKind::FieldValue,
                    vec![format!("{address} {address:#x}"), address.to_string()],
                ))?;
                emitted += 2;

                if select {
                    self.emit_label(out, &tables::SSEL, None)?;
                    if address == 0 {
                        self.emit_label(out, &tables::SDES, None)?;
                    } else {
                        self.emit_label(out, &tables::SSELX, Some(&address.to_string()))?;
                        // A selected slave may answer with data
                        self.expect_asic_data = true;
                    }
                } else {
                    self.emit_label(out, &tables::SRES, None)?;
                    if address == 0 {
                        self.emit_label(out, &tables::SRALL, None)?;
                    } else {
                        self.emit_label(out, &tables::SRESX, Some(&address.to_string()))?;
                    }
                }
                emitted += 2;
            }
            ControlOp::SlaveControl { register, mode } => {
                self.emit_label(out, &tables::SCTL, None)?;

                // One marker per mode bit: transfer count, width, direction
                let flags = [mode.multi, mode.word, mode.read];
                for (i, &flag) in flags.iter().enumerate() {
                    let (start, end) = self.bit_span((7 + i, 8 + i));
                    out.send(Annotation::new(
                        start,
                        end,
                        AnnotationKind::ModeLabel,
                        to_labels(tables::MODE_BIT_LABELS[i][flag as usize]),
                    ))?;
                }
                if mode.read {
                    self.expect_asic_data = true;
                }

                let (start, end) = self.bit_span((3, 7));
                out.send(Annotation::new(
                    start,
                    end,
                    AnnotationKind::FieldValue,
                    vec![format!("{register} {register:#x}"), register.to_string()],
                ))?;

                let names = tables::SCTL_MODES[mode.index()];
                let (start, end) = self.bit_span((0, 11));
                out.send(Annotation::new(
                    start,
                    end,
                    AnnotationKind::Summary,
                    vec![
                        format!("{} (Register {register})", names[0]),
                        format!("{}:{register}", names[1]),
                    ],
                ))?;
                emitted += 6;
            }
        }
        Ok(emitted)
    }

    fn process_data(
        &mut self,
        value: u8,
        frame_end: u64,
        out: &Sender<Annotation>,
    ) -> WorkResult<usize> {
        self.emit_label(out, &tables::FDATA, None)?;

        // First data frame after a control frame opens a run
        if self.run_start.is_none() {
            self.run_start = Some(self.clk_starts[0]);
        }

        let (start, end) = self.bit_span(tables::DATA_SPAN);
        out.send(Annotation::new(
            start,
            end,
            AnnotationKind::FieldValue,
            vec![format!("{value} {value:#x}"), value.to_string()],
        ))?;

        // Exactly one direction row per byte; SDIR evidence wins over the
        // protocol-based guess.
        let direction = if self.asic_tx {
            AnnotationKind::AsicData
        } else if self.show_guessed_asic_data && self.expect_asic_data {
            AnnotationKind::GuessedAsicData
        } else {
            AnnotationKind::HostData
        };
        out.send(Annotation::new(
            start,
            end,
            direction,
            vec![value.to_string()],
        ))?;
        self.asic_tx = false;

        self.run_end = frame_end;
        self.run_count += 1;
        Ok(3)
    }

    /// Close a pending data run, emitting its frame count.
    fn flush_run(&mut self, out: &Sender<Annotation>) -> WorkResult<usize> {
        let Some(start) = self.run_start.take() else {
            return Ok(0);
        };
        debug!("data run of {} frames ended at {}", self.run_count, self.run_end);
        out.send(Annotation::new(
            start,
            self.run_end,
            AnnotationKind::FrameCount,
            vec![self.run_count.to_string()],
        ))?;
        self.run_count = 0;
        Ok(1)
    }
}

/// SIBO bus decoder node: 2-3 `Sample` inputs, one `Annotation` output.
///
/// Inputs are `clk` and `data`, plus `sdir` when built `with_sdir()`.
/// Annotation verbosity is controlled with the builder options; frame,
/// field, summary, direction and run-count annotations are always emitted.
pub struct SiboDecoder {
    name: String,
    has_sdir: bool,
    clk_buf: VecDeque<Sample>,
    data_buf: VecDeque<Sample>,
    sdir_buf: VecDeque<Sample>,
    core: DecoderCore,
}

impl SiboDecoder {
    pub fn new() -> Self {
        Self {
            name: "sibo_decoder".to_string(),
            has_sdir: false,
            clk_buf: VecDeque::new(),
            data_buf: VecDeque::new(),
            sdir_buf: VecDeque::new(),
            core: DecoderCore::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add the optional SDIR input for hardware direction detection.
    pub fn with_sdir(mut self) -> Self {
        self.has_sdir = true;
        self
    }

    /// Emit a `ClockPulse` annotation per clock pulse.
    pub fn with_clock_pulses(mut self) -> Self {
        self.core.show_clock_pulses = true;
        self
    }

    /// Emit a `Bit` annotation per sampled bit.
    pub fn with_bits(mut self) -> Self {
        self.core.show_bits = true;
        self
    }

    /// Emit a `RawFrame` dump for every complete non-null frame.
    pub fn with_raw_frames(mut self) -> Self {
        self.core.show_raw_frames = true;
        self
    }

    /// Attribute data bytes to the peripheral from protocol context when no
    /// SDIR evidence is available.
    pub fn with_guessed_asic_data(mut self) -> Self {
        self.core.show_guessed_asic_data = true;
        self
    }
}

impl Default for SiboDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNode for SiboDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        if self.has_sdir { 3 } else { 2 }
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        let mut schema = vec![
            PortSchema::new::<Sample>("clk", 0, PortDirection::Input),
            PortSchema::new::<Sample>("data", 1, PortDirection::Input),
        ];
        if self.has_sdir {
            schema.push(PortSchema::new::<Sample>("sdir", 2, PortDirection::Input));
        }
        schema
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Annotation>(
            "annotations",
            0,
            PortDirection::Output,
        )]
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let out = outputs[0]
            .get::<Annotation>()
            .ok_or_else(|| WorkError::NodeError("missing annotation output".to_string()))?;
        let mut clk = inputs[0]
            .get::<Sample>(&mut self.clk_buf)
            .ok_or_else(|| WorkError::NodeError("missing clk input".to_string()))?;
        let mut data = inputs[1]
            .get::<Sample>(&mut self.data_buf)
            .ok_or_else(|| WorkError::NodeError("missing data input".to_string()))?;
        let mut sdir = if self.has_sdir {
            inputs
                .get(2)
                .and_then(|port| port.get::<Sample>(&mut self.sdir_buf))
        } else {
            None
        };

        match self.core.advance(&mut clk, &mut data, sdir.as_mut(), &out) {
            Ok(emitted) => Ok(emitted),
            Err(WorkError::Shutdown) => {
                // End of capture: a still-open data run gets its count now
                if let Err(e) = self.core.flush_run(&out) {
                    debug!("[{}] final run count not delivered: {}", self.name, e);
                }
                out.close();
                Err(WorkError::Shutdown)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::sender::ChannelMessage;
    use crossbeam_channel::bounded;

    const PULSE: u64 = 4;
    const PERIOD: u64 = 10;

    /// Run-length waveform builder for one line.
    struct Wave {
        samples: Vec<Sample>,
        level: bool,
    }

    impl Wave {
        fn new() -> Self {
            Self {
                samples: vec![Sample::new(false, 0)],
                level: false,
            }
        }

        fn to(&mut self, level: bool, position: u64) {
            if level != self.level {
                self.samples.push(Sample::new(level, position));
                self.level = level;
            }
        }
    }

    /// Clock out a bit sequence starting at `t0`. Data changes at the period
    /// start, the clock rises 2 samples later and stays high for `PULSE`.
    /// Returns the position after the last bit period.
    fn clock_bits(clk: &mut Wave, data: &mut Wave, bits: &[bool], t0: u64) -> u64 {
        let mut t = t0;
        for &bit in bits {
            data.to(bit, t);
            clk.to(true, t + 2);
            clk.to(false, t + 2 + PULSE);
            t += PERIOD;
        }
        data.to(false, t);
        t
    }

    fn lsb(value: u8, n: usize) -> Vec<bool> {
        (0..n).map(|i| (value >> i) & 1 == 1).collect()
    }

    fn control_frame(byte: [bool; 8]) -> Vec<bool> {
        let mut bits = vec![true, false, false];
        bits.extend_from_slice(&byte);
        bits.push(false);
        bits
    }

    fn select_frame(address: u8, select: bool) -> Vec<bool> {
        let mut byte = [false; 8];
        for (i, b) in lsb(address, 6).into_iter().enumerate() {
            byte[i] = b;
        }
        byte[6] = select;
        control_frame(byte)
    }

    fn slave_control_frame(register: u8, multi: bool, word: bool, read: bool) -> Vec<bool> {
        let mut byte = [false; 8];
        for (i, b) in lsb(register, 4).into_iter().enumerate() {
            byte[i] = b;
        }
        byte[4] = multi;
        byte[5] = word;
        byte[6] = read;
        byte[7] = true;
        control_frame(byte)
    }

    fn data_frame(value: u8) -> Vec<bool> {
        let mut bits = vec![true, true, false];
        bits.extend(lsb(value, 8));
        bits.push(false);
        bits
    }

    fn null_frame() -> Vec<bool> {
        vec![false; FRAME_BITS]
    }

    /// Feed pre-built sample streams through the decoder until end of
    /// stream and collect the annotations.
    fn run_decoder(
        mut decoder: SiboDecoder,
        clk: Vec<Sample>,
        data: Vec<Sample>,
        sdir: Option<Vec<Sample>>,
    ) -> Vec<Annotation> {
        let (ann_tx, ann_rx) = bounded::<ChannelMessage<Annotation>>(4096);
        let outputs = vec![OutputPort::new(Sender::new(vec![ann_tx]))];

        let mut lines = vec![clk, data];
        if let Some(sdir) = sdir {
            lines.push(sdir);
        }
        let mut inputs = Vec::new();
        for samples in lines {
            let (tx, rx) = bounded::<ChannelMessage<Sample>>(4096);
            for s in samples {
                tx.send(ChannelMessage::Sample(s)).unwrap();
            }
            tx.send(ChannelMessage::EndOfStream).unwrap();
            inputs.push(InputPort::new(rx));
        }

        loop {
            match decoder.work(&inputs, &outputs) {
                Ok(_) => {}
                Err(WorkError::Shutdown) => break,
                Err(e) => panic!("decoder failed: {e}"),
            }
        }

        let mut annotations = Vec::new();
        while let Ok(ChannelMessage::Sample(a)) = ann_rx.try_recv() {
            annotations.push(a);
        }
        annotations
    }

    fn of_kind(annotations: &[Annotation], kind: AnnotationKind) -> Vec<&Annotation> {
        annotations.iter().filter(|a| a.kind == kind).collect()
    }

    #[test]
    fn test_select_then_data_run_counted_at_null() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut bits = select_frame(5, true);
        bits.extend(data_frame(1));
        bits.extend(data_frame(2));
        bits.extend(data_frame(3));
        bits.extend(null_frame());
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        let summaries = of_kind(&anns, AnnotationKind::Summary);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].labels[0], "Select Slave 5");
        assert_eq!(summaries[0].labels[1], "SSel:5");

        assert!(
            anns.iter()
                .any(|a| a.kind == AnnotationKind::FieldValue && a.labels[0] == "5 0x5")
        );

        assert_eq!(of_kind(&anns, AnnotationKind::ControlFrame).len(), 1);
        assert_eq!(of_kind(&anns, AnnotationKind::DataFrame).len(), 3);
        assert_eq!(of_kind(&anns, AnnotationKind::NullFrame).len(), 1);

        // No SDIR, no guessing: everything attributed to the host
        let host: Vec<&str> = of_kind(&anns, AnnotationKind::HostData)
            .iter()
            .map(|a| a.labels[0].as_str())
            .collect();
        assert_eq!(host, ["1", "2", "3"]);
        assert!(of_kind(&anns, AnnotationKind::AsicData).is_empty());
        assert!(of_kind(&anns, AnnotationKind::GuessedAsicData).is_empty());

        // The null frame closes the run of three data frames
        let counts = of_kind(&anns, AnnotationKind::FrameCount);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].labels[0], "3");
        assert!(counts[0].start < counts[0].end);

        // The count spans earlier samples, so it is emitted before the
        // null marker
        let count_idx = anns
            .iter()
            .position(|a| a.kind == AnnotationKind::FrameCount)
            .unwrap();
        let null_idx = anns
            .iter()
            .position(|a| a.kind == AnnotationKind::NullFrame)
            .unwrap();
        assert!(count_idx < null_idx);
    }

    #[test]
    fn test_deselect_and_reset_summaries() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut bits = select_frame(0, true); // deselect all
        bits.extend(select_frame(0, false)); // reset all
        bits.extend(select_frame(9, false)); // reset slave 9
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        let summaries: Vec<&str> = of_kind(&anns, AnnotationKind::Summary)
            .iter()
            .map(|a| a.labels[0].as_str())
            .collect();
        assert_eq!(
            summaries,
            ["Deselect All Slaves", "Reset All Slaves", "Reset Slave 9"]
        );
    }

    #[test]
    fn test_slave_control_decode() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let bits = slave_control_frame(2, true, false, true);
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        assert_eq!(of_kind(&anns, AnnotationKind::SlaveControl).len(), 1);

        let modes: Vec<&str> = of_kind(&anns, AnnotationKind::ModeLabel)
            .iter()
            .map(|a| a.labels[0].as_str())
            .collect();
        assert_eq!(modes, ["Multi", "Byte", "Read"]);

        assert!(
            anns.iter()
                .any(|a| a.kind == AnnotationKind::FieldValue && a.labels[0] == "2 0x2")
        );

        let summaries = of_kind(&anns, AnnotationKind::Summary);
        assert_eq!(summaries[0].labels[0], "Multi-Byte Read (Register 2)");
        assert_eq!(summaries[0].labels[1], "MuByRe:2");
    }

    #[test]
    fn test_guessed_direction_after_select() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut bits = select_frame(5, true);
        bits.extend(data_frame(0x42));
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(
            SiboDecoder::new().with_guessed_asic_data(),
            clk.samples.clone(),
            data.samples.clone(),
            None,
        );
        let guessed = of_kind(&anns, AnnotationKind::GuessedAsicData);
        assert_eq!(guessed.len(), 1);
        assert_eq!(guessed[0].labels[0], "66");
        assert!(of_kind(&anns, AnnotationKind::HostData).is_empty());

        // With the option off the same byte lands on the host row
        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);
        assert_eq!(of_kind(&anns, AnnotationKind::HostData).len(), 1);
        assert!(of_kind(&anns, AnnotationKind::GuessedAsicData).is_empty());
    }

    #[test]
    fn test_guess_cleared_by_write_control() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut bits = select_frame(5, true);
        bits.extend(slave_control_frame(1, false, false, false)); // write: clears the guess
        bits.extend(data_frame(7));
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(
            SiboDecoder::new().with_guessed_asic_data(),
            clk.samples,
            data.samples,
            None,
        );
        assert_eq!(of_kind(&anns, AnnotationKind::HostData).len(), 1);
        assert!(of_kind(&anns, AnnotationKind::GuessedAsicData).is_empty());
    }

    #[test]
    fn test_sdir_attributes_byte_to_asic() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut sdir = Wave::new();

        let mut bits = select_frame(5, true);
        bits.extend(data_frame(0xAA));
        bits.extend(data_frame(0xBB));
        clock_bits(&mut clk, &mut data, &bits, 100);

        // First data frame starts at bit 12; its fourth bit occupies the
        // period starting at 100 + 15 * PERIOD. Raise SDIR across it.
        let bit = 100 + 15 * PERIOD;
        sdir.to(true, bit - 2);
        sdir.to(false, bit + PERIOD);

        let anns = run_decoder(
            SiboDecoder::new().with_sdir(),
            clk.samples,
            data.samples,
            Some(sdir.samples),
        );

        let asic = of_kind(&anns, AnnotationKind::AsicData);
        assert_eq!(asic.len(), 1);
        assert_eq!(asic[0].labels[0], "170");

        // The flag does not leak into the next frame
        let host = of_kind(&anns, AnnotationKind::HostData);
        assert_eq!(host.len(), 1);
        assert_eq!(host[0].labels[0], "187");
    }

    #[test]
    fn test_coincident_rising_edges_ignored() {
        let mut clk = Wave::new();
        let mut data = Wave::new();

        // Crosstalk: both lines rise at the same position
        clk.to(true, 50);
        data.to(true, 50);
        clk.to(false, 54);
        data.to(false, 56);

        let bits = select_frame(5, true);
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        assert_eq!(of_kind(&anns, AnnotationKind::ControlFrame).len(), 1);
        let summaries = of_kind(&anns, AnnotationKind::Summary);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].labels[0], "Select Slave 5");
    }

    #[test]
    fn test_data_fall_during_clock_high_ignored() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let bits = select_frame(5, true);

        // First bit clocked by hand, with DATA dropping mid-pulse. The bit
        // was latched at the rising edge and must still read as 1.
        data.to(true, 100);
        clk.to(true, 102);
        data.to(false, 104);
        clk.to(false, 106);
        clock_bits(&mut clk, &mut data, &bits[1..], 110);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        let summaries = of_kind(&anns, AnnotationKind::Summary);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].labels[0], "Select Slave 5");
    }

    #[test]
    fn test_single_sample_clock_pulse_rejected() {
        let mut clk = Wave::new();
        let mut data = Wave::new();

        let bits = select_frame(5, true);
        let first = &bits[..6];
        let rest = &bits[6..];
        let t = clock_bits(&mut clk, &mut data, first, 100);

        // One-sample blip between bits 5 and 6
        clk.to(true, t + 2);
        clk.to(false, t + 3);

        clock_bits(&mut clk, &mut data, rest, t + PERIOD);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        let summaries = of_kind(&anns, AnnotationKind::Summary);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].labels[0], "Select Slave 5");
    }

    #[test]
    fn test_null_resync_skips_idle_bits() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut bits = null_frame();
        bits.extend([false, false]); // two extra idle clocks keep the window all-zero
        bits.extend(select_frame(5, true));
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        assert_eq!(of_kind(&anns, AnnotationKind::NullFrame).len(), 3);
        let summaries = of_kind(&anns, AnnotationKind::Summary);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].labels[0], "Select Slave 5");
    }

    #[test]
    fn test_clock_and_bit_annotations() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        clock_bits(&mut clk, &mut data, &null_frame(), 100);

        let anns = run_decoder(
            SiboDecoder::new().with_clock_pulses().with_bits(),
            clk.samples,
            data.samples,
            None,
        );

        assert_eq!(of_kind(&anns, AnnotationKind::ClockPulse).len(), 12);
        let bits = of_kind(&anns, AnnotationKind::Bit);
        assert_eq!(bits.len(), 12);
        assert!(bits.iter().all(|a| a.labels[0] == "0"));
    }

    #[test]
    fn test_run_closed_by_next_control_frame() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut bits = select_frame(5, true);
        bits.extend(data_frame(1));
        bits.extend(data_frame(2));
        bits.extend(select_frame(0, true));
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        let counts = of_kind(&anns, AnnotationKind::FrameCount);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].labels[0], "2");
    }

    #[test]
    fn test_end_of_stream_flushes_pending_run() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let mut bits = select_frame(5, true);
        bits.extend(data_frame(1));
        bits.extend(data_frame(2));
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);

        let counts = of_kind(&anns, AnnotationKind::FrameCount);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].labels[0], "2");
    }

    #[test]
    fn test_raw_frame_dump() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        let bits = select_frame(5, true);
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(
            SiboDecoder::new().with_raw_frames(),
            clk.samples,
            data.samples,
            None,
        );

        let raw = of_kind(&anns, AnnotationKind::RawFrame);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].labels[0], "[1 0 0 1 0 1 0 0 0 1 0 0]");
    }

    #[test]
    fn test_unclassified_frame_emits_nothing() {
        let mut clk = Wave::new();
        let mut data = Wave::new();
        // Prefix [0,1] matches no frame type and is not all-zero
        let mut bits = vec![false; FRAME_BITS];
        bits[1] = true;
        clock_bits(&mut clk, &mut data, &bits, 100);

        let anns = run_decoder(SiboDecoder::new(), clk.samples, data.samples, None);
        assert!(anns.is_empty());
    }
}
