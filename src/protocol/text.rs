//! # ESC/POS Text Styling Commands
//!
//! | Style | Command | Effect |
//! |-------|---------|--------|
//! | Alignment | ESC a n | Left / center / right |
//! | Bold | ESC E n | **Emphasized** text |
//! | Underline | ESC - n | Underlined text |
//! | Size | GS ! n | Width and height multipliers |

use super::commands::{ESC, GS};

// ============================================================================
// TEXT ALIGNMENT
// ============================================================================

/// Text alignment options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left = 0,
    Center = 1,
    Right = 2,
}

/// # Set Justification (ESC a n)
///
/// Takes effect at the start of the next line.
///
/// ```
/// use crema::protocol::text::{align, Alignment};
///
/// assert_eq!(align(Alignment::Center), vec![0x1B, 0x61, 0x01]);
/// ```
pub fn align(alignment: Alignment) -> Vec<u8> {
    vec![ESC, b'a', alignment as u8]
}

// ============================================================================
// EMPHASIS
// ============================================================================

/// Enable emphasized (bold) printing (ESC E 1)
#[inline]
pub fn bold_on() -> Vec<u8> {
    vec![ESC, b'E', 1]
}

/// Disable emphasized printing (ESC E 0)
#[inline]
pub fn bold_off() -> Vec<u8> {
    vec![ESC, b'E', 0]
}

/// Enable single-dot underline (ESC - 1)
#[inline]
pub fn underline_on() -> Vec<u8> {
    vec![ESC, b'-', 1]
}

/// Disable underline (ESC - 0)
#[inline]
pub fn underline_off() -> Vec<u8> {
    vec![ESC, b'-', 0]
}

// ============================================================================
// CHARACTER SIZE
// ============================================================================

/// Character sizes accepted by `<font size='...'>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontSize {
    #[default]
    Normal,
    /// Double width
    Wide,
    /// Double height
    Tall,
    /// Double width and height
    Big,
}

impl FontSize {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "wide" => Some(Self::Wide),
            "tall" => Some(Self::Tall),
            "big" => Some(Self::Big),
            _ => None,
        }
    }

    /// Horizontal multiplier; a column of this size spans this many cells.
    pub fn width_factor(self) -> usize {
        match self {
            Self::Normal | Self::Tall => 1,
            Self::Wide | Self::Big => 2,
        }
    }
}

/// # Select Character Size (GS ! n)
///
/// High nibble is the width multiplier minus one, low nibble the height
/// multiplier minus one.
///
/// ```
/// use crema::protocol::text::{size, FontSize};
///
/// assert_eq!(size(FontSize::Big), vec![0x1D, 0x21, 0x11]);
/// ```
pub fn size(font_size: FontSize) -> Vec<u8> {
    let n = match font_size {
        FontSize::Normal => 0x00,
        FontSize::Wide => 0x10,
        FontSize::Tall => 0x01,
        FontSize::Big => 0x11,
    };
    vec![GS, b'!', n]
}
