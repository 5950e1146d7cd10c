//! Static annotation tables for the SIBO decoder
//!
//! Each `FrameLabel` names a protocol element: the bit span it covers within
//! a 12-bit frame, the annotation category, and the label strings from most
//! to least verbose.

use super::types::AnnotationKind;

/// Label set for one protocol element
///
/// `bits` indexes into the per-frame clock-start positions: the span runs
/// from the start of bit `bits.0` to the start of bit `bits.1`.
#[derive(Debug, Clone, Copy)]
pub struct FrameLabel {
    pub bits: (usize, usize),
    pub kind: AnnotationKind,
    pub labels: &'static [&'static str],
}

/// Control frame header (frame-type bits)
pub const FCTRL: FrameLabel = FrameLabel {
    bits: (0, 2),
    kind: AnnotationKind::ControlFrame,
    labels: &["Control Frame", "CTRL", "C"],
};

/// Data frame header (frame-type bits)
pub const FDATA: FrameLabel = FrameLabel {
    bits: (0, 2),
    kind: AnnotationKind::DataFrame,
    labels: &["Data Frame", "DATA", "D"],
};

/// Select/reset discriminant bit
pub const SSR: FrameLabel = FrameLabel {
    bits: (10, 11),
    kind: AnnotationKind::SelectReset,
    labels: &["Slave Select/Reset", "SSelRes", "S"],
};

/// Slave-control discriminant bit
pub const SCTL: FrameLabel = FrameLabel {
    bits: (10, 11),
    kind: AnnotationKind::SlaveControl,
    labels: &["Slave Control", "C"],
};

/// Reset variant marker
pub const SRES: FrameLabel = FrameLabel {
    bits: (9, 10),
    kind: AnnotationKind::ModeLabel,
    labels: &["Slave Reset", "Reset", "R"],
};

/// Select variant marker
pub const SSEL: FrameLabel = FrameLabel {
    bits: (9, 10),
    kind: AnnotationKind::ModeLabel,
    labels: &["Slave (De)Select", "S"],
};

/// Whole-frame summary: deselect all slaves (select with address 0)
pub const SDES: FrameLabel = FrameLabel {
    bits: (0, 11),
    kind: AnnotationKind::Summary,
    labels: &["Deselect All Slaves", "SDesAll", "SS0"],
};

/// Whole-frame summary: select a specific slave (address appended)
pub const SSELX: FrameLabel = FrameLabel {
    bits: (0, 11),
    kind: AnnotationKind::Summary,
    labels: &["Select Slave ", "SSel:", "SS"],
};

/// Whole-frame summary: reset all slaves (reset with address 0)
pub const SRALL: FrameLabel = FrameLabel {
    bits: (0, 11),
    kind: AnnotationKind::Summary,
    labels: &["Reset All Slaves", "SResAll", "SR0"],
};

/// Whole-frame summary: reset a specific slave (address appended)
pub const SRESX: FrameLabel = FrameLabel {
    bits: (0, 11),
    kind: AnnotationKind::Summary,
    labels: &["Reset Slave ", "SRes:", "SR"],
};

/// Payload byte span (bits 3 through 10)
pub const DATA_SPAN: (usize, usize) = (3, 11);

/// Clock pulse labels (sample-position span, not bit span)
pub const CLK_LABELS: &[&str] = &["CLK", "C"];

/// Null frame labels (sample-position span, not bit span)
pub const NULL_LABELS: &[&str] = &["N"];

/// Slave-control mode names, indexed by `ModeBits::index()`
pub const SCTL_MODES: [[&str; 2]; 8] = [
    ["Single Byte Write", "SiByWr"],
    ["Multi-Byte Write", "MuByWr"],
    ["Single Word Write", "SiWoWr"],
    ["Multi-Word Write", "MuWoWr"],
    ["Single Byte Read", "SiByRe"],
    ["Multi-Byte Read", "MuByRe"],
    ["Single Word Read", "SiWoRe"],
    ["Multi-Word Read", "MuWoRe"],
];

/// Per-mode-bit labels: `[clear, set]` for transfer count, width, direction
pub const MODE_BIT_LABELS: [[&[&str]; 2]; 3] = [
    [&["Single", "Si", "S"], &["Multi", "Mu", "M"]],
    [&["Byte", "By", "B"], &["Word", "Wo", "W"]],
    [&["Write", "Wr", "W"], &["Read", "Re", "R"]],
];
