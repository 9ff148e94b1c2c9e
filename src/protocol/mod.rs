//! # ESC/POS Protocol Implementation
//!
//! Low-level command builders and the markup encoder for ESC/POS receipt
//! printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Basic printer commands (init, code page, feed, cut)
//! - [`text`]: Text styling (alignment, bold, underline, size)
//! - [`markup`]: Receipt markup parser (`[C]`, `<b>`, `<font size='big'>`)
//! - [`encoder`]: Job encoder producing the final byte stream
//!
//! ## Usage Example
//!
//! ```
//! use crema::protocol::{commands, text};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(text::align(text::Alignment::Center));
//! data.extend(text::bold_on());
//! data.extend(b"RECEIPT\n");
//! data.extend(text::bold_off());
//! data.extend(commands::cut_partial_feed());
//! ```

pub mod commands;
pub mod encoder;
pub mod markup;
pub mod text;

pub use encoder::EscPosEncoder;
