//! # Printer Configuration
//!
//! Hardware and charset parameters of the receipt printer the encoder
//! targets.
//!
//! ## Supported Printers
//!
//! | Preset | Resolution | Print width | Chars/line | Charset |
//! |--------|------------|-------------|------------|---------|
//! | `CAFE_58MM` | 180 DPI | 72 mm | 32 | EUC-KR (code page 13) |
//!
//! ## Usage
//!
//! ```
//! use crema::printer::PrinterConfig;
//!
//! let config = PrinterConfig::CAFE_58MM;
//! println!("{} columns, {} dots wide", config.chars_per_line, config.width_dots());
//! ```

use encoding_rs::Encoding;

use crate::error::PrinterError;

/// Character set of the text payload and the code page that selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    /// WHATWG encoding label, e.g. "EUC-KR"
    pub label: &'static str,
    /// Printer code page number (ESC t n)
    pub code_page: u8,
}

impl Charset {
    pub const EUC_KR: Self = Self {
        label: "EUC-KR",
        code_page: 13,
    };

    /// Resolve the label to an encoder.
    pub fn encoding(&self) -> Result<&'static Encoding, PrinterError> {
        Encoding::for_label(self.label.as_bytes()).ok_or_else(|| {
            PrinterError::Config(format!("Unsupported charset label: {}", self.label))
        })
    }
}

/// # Printer Configuration
///
/// ## Physical Properties
///
/// - **dpi**: Resolution in dots per inch
/// - **width_mm**: Printable width in millimeters
/// - **chars_per_line**: Columns of the default font across the printable width
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
/// width_dots  = width_mm * dots_per_mm
///
/// For CAFE_58MM:
///   dots_per_mm = 180 / 25.4 ≈ 7.09
///   width_dots  = 72 * 7.09 ≈ 510
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: &'static str,

    /// Resolution in dots per inch
    pub dpi: u16,

    /// Printable width in millimeters
    pub width_mm: f32,

    /// Characters per line in the normal font
    pub chars_per_line: u16,

    /// Payload encoding and code page
    pub charset: Charset,
}

impl PrinterConfig {
    /// The café's Bluetooth receipt printer.
    pub const CAFE_58MM: Self = Self {
        name: "Cafe Bluetooth receipt printer",
        dpi: 180,
        width_mm: 72.0,
        chars_per_line: 32,
        charset: Charset::EUC_KR,
    };

    /// Calculate dots per millimeter
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi as f32 / 25.4
    }

    /// Printable width in dots
    #[inline]
    pub fn width_dots(&self) -> u16 {
        (self.width_mm * self.dots_per_mm()).round() as u16
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::CAFE_58MM
    }
}
