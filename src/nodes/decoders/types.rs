//! Frame and annotation types for the SIBO decoder
//!
//! A SIBO frame is 12 bits on the wire. Bits 0-1 select the frame type
//! ("10" control, "11" data), bits 3-10 carry the payload byte, and an
//! all-zero frame is the bus-idle null marker. Multi-bit fields are clocked
//! least-significant bit first, so field extraction reverses the sampled
//! order before folding into an integer.

use std::fmt;

/// Bits in a complete frame
pub const FRAME_BITS: usize = 12;

/// Fold a wire-order bit slice into an integer, first-sampled bit least
/// significant.
pub fn field_value(bits: &[bool]) -> u8 {
    bits.iter().rev().fold(0u8, |acc, &b| (acc << 1) | b as u8)
}

/// The three mode bits of a slave-control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeBits {
    /// Multi-transfer (true) vs single (false)
    pub multi: bool,
    /// Word-wide (true) vs byte-wide (false)
    pub word: bool,
    /// Read (true) vs write (false)
    pub read: bool,
}

impl ModeBits {
    /// Index into the mode-name table (multi = bit 0, word = bit 1, read = bit 2)
    pub fn index(&self) -> usize {
        self.multi as usize | (self.word as usize) << 1 | (self.read as usize) << 2
    }
}

/// Decoded control-frame operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    /// Slave select (or reset) frame. Address 0 addresses all slaves:
    /// deselect-all when selecting, reset-all when resetting.
    SelectReset {
        /// 6-bit slave address
        address: u8,
        /// Select (true) vs reset (false)
        select: bool,
    },
    /// Slave-control register frame
    SlaveControl {
        /// 4-bit register number
        register: u8,
        mode: ModeBits,
    },
}

/// Classified 12-bit frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Control(ControlOp),
    /// Data frame carrying one payload byte
    Data { value: u8 },
    /// All-zero frame: bus idle / resynchronization point
    Null,
    /// Frame-type prefix matches no known frame
    Unclassified,
}

/// Classify a complete 12-bit frame (bits in sampled wire order).
///
/// The all-zero check comes first: a null frame overrides any other
/// reading of the bits.
pub fn classify(bits: &[bool]) -> FrameKind {
    debug_assert_eq!(bits.len(), FRAME_BITS);

    if bits.iter().all(|&b| !b) {
        return FrameKind::Null;
    }

    let byte = &bits[3..11];
    match (bits[0], bits[1]) {
        (true, false) => {
            // Control frame; byte bit 7 discriminates the variant
            if !byte[7] {
                FrameKind::Control(ControlOp::SelectReset {
                    address: field_value(&byte[0..6]),
                    select: byte[6],
                })
            } else {
                FrameKind::Control(ControlOp::SlaveControl {
                    register: field_value(&byte[0..4]),
                    mode: ModeBits {
                        multi: byte[4],
                        word: byte[5],
                        read: byte[6],
                    },
                })
            }
        }
        (true, true) => FrameKind::Data {
            value: field_value(byte),
        },
        _ => FrameKind::Unclassified,
    }
}

/// Annotation category emitted by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// Raw clock pulse (behind `show_clock_pulses`)
    ClockPulse,
    /// Sampled bit (behind `show_bits`)
    Bit,
    /// Null frame marker
    NullFrame,
    /// Control frame header (bits 0-1)
    ControlFrame,
    /// Data frame header (bits 0-1)
    DataFrame,
    /// Select/reset variant marker (bit 10)
    SelectReset,
    /// Slave-control variant marker (bit 10)
    SlaveControl,
    /// Numeric field value (slave address, register number, data byte)
    FieldValue,
    /// Raw 12-bit frame dump (behind `show_raw_frames`)
    RawFrame,
    /// Human-readable command summary spanning the whole frame
    Summary,
    /// Count of consecutive data frames in a run
    FrameCount,
    /// Short label for one mode bit (single/multi, byte/word, read/write)
    ModeLabel,
    /// Payload byte, host-originated direction
    HostData,
    /// Payload byte, peripheral-originated (SDIR observed high)
    AsicData,
    /// Payload byte, speculatively attributed to the peripheral
    GuessedAsicData,
}

/// Decoded annotation event
///
/// `start`/`end` are capture sample positions. Labels are ordered from most
/// to least verbose; a consumer may pick any one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub start: u64,
    pub end: u64,
    pub kind: AnnotationKind,
    pub labels: Vec<String>,
}

impl Annotation {
    pub fn new(start: u64, end: u64, kind: AnnotationKind, labels: Vec<String>) -> Self {
        Self {
            start,
            end,
            kind,
            labels,
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}..{}] {:?}: {}",
            self.start,
            self.end,
            self.kind,
            self.labels.first().map(String::as_str).unwrap_or("")
        )
    }
}
