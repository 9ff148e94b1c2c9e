//! # ESC/POS Protocol Commands
//!
//! Control commands for ESC/POS receipt printers: initialization, code page
//! selection, paper feed and cutting.
//!
//! ## Escape Sequence Structure
//!
//! - Single byte: `LF`
//! - Two bytes: `ESC @`
//! - With parameters: `ESC t n`, `ESC d n`, `GS V m n`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print the line buffer and advance one line
pub const LF: u8 = 0x0A;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Clears the print buffer and resets text formatting, alignment and
/// character size to power-on defaults. Sent at the start of every job.
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
///
/// ```
/// use crema::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Select Character Code Table (ESC t n)
///
/// Selects the code page used to render bytes >= 0x80. Must match the
/// encoding of the text payload.
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | ESC t n  |
/// | Hex     | 1B 74 n  |
#[inline]
pub fn select_code_page(n: u8) -> Vec<u8> {
    vec![ESC, b't', n]
}

// ============================================================================
// PAPER FEED AND CUT
// ============================================================================

/// # Feed to Cut Position, Then Partial Cut (GS V 66 0)
///
/// Feeds the last printed line past the cutter, then leaves a small hinge
/// so the receipt can be torn off without dropping.
///
/// | Format  | Bytes       |
/// |---------|-------------|
/// | ASCII   | GS V B NUL  |
/// | Hex     | 1D 56 42 00 |
#[inline]
pub fn cut_partial_feed() -> Vec<u8> {
    vec![GS, b'V', 66, 0]
}
