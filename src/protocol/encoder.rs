//! # ESC/POS Job Encoder
//!
//! Turns a [`PrintJob`] into the byte stream the printer consumes.
//!
//! ## Stream Layout
//!
//! ```text
//! ESC @                  initialize
//! ESC t <code page>      select the charset's code page
//! (per line)
//!   ESC a n              alignment (single-segment lines)
//!   [style changes]      ESC E / ESC - / GS ! as runs switch style
//!   <encoded text>       text in the charset's encoding
//!   LF
//! [style reset]
//! GS V 66 0              feed to cutter and partial cut
//! ```
//!
//! Lines with several `[L]`/`[C]`/`[R]` segments are laid out as columns
//! across `chars_per_line`, padding with spaces. A wide or big run occupies
//! two columns per byte.

use std::time::Duration;

use encoding_rs::Encoding;
use tracing::debug;

use super::commands;
use super::markup::{self, Line, Segment, Style};
use super::text::{self, Alignment};
use crate::device::DeviceLink;
use crate::error::PrinterError;
use crate::printer::{PrintJob, PrinterConfig};
use crate::sleep::Pacer;

/// Encodes markup receipts for one printer configuration.
#[derive(Debug, Clone)]
pub struct EscPosEncoder {
    config: PrinterConfig,
    encoding: &'static Encoding,
}

impl EscPosEncoder {
    pub fn new(config: PrinterConfig) -> Result<Self, PrinterError> {
        let encoding = config.charset.encoding()?;
        Ok(Self { config, encoding })
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    /// Encode a whole job, including the trailing feed and cut.
    pub fn encode(&self, job: &PrintJob) -> Vec<u8> {
        let mut out = commands::init();
        out.extend(commands::select_code_page(self.config.charset.code_page));

        let mut state = Style::default();
        for line in markup::parse(job.text()) {
            self.encode_line(&line, &mut state, &mut out);
        }
        switch_style(&mut state, Style::default(), &mut out);

        out.extend(commands::cut_partial_feed());
        out
    }

    /// Encode the job, buffer it on the link and send it.
    ///
    /// The send waits for the payload to drain plus the job's feed delay.
    pub fn print(
        &self,
        link: &mut DeviceLink,
        job: &PrintJob,
        pacer: &Pacer<'_>,
    ) -> Result<(), PrinterError> {
        let bytes = self.encode(job);
        link.write(&bytes);
        link.send(job.feed_delay(), pacer)
    }

    /// Settle time [`print`](Self::print) waits for this job.
    pub fn settle_time(&self, job: &PrintJob) -> Duration {
        crate::transport::settle_time(self.encode(job).len(), job.feed_delay())
    }

    fn encode_line(&self, line: &Line, state: &mut Style, out: &mut Vec<u8>) {
        match line.segments.as_slice() {
            [segment] => {
                out.extend(text::align(segment.alignment));
                self.encode_runs(segment, state, out);
            }
            segments => {
                out.extend(text::align(Alignment::Left));
                self.encode_columns(segments, state, out);
            }
        }
        out.push(commands::LF);
    }

    fn encode_columns(&self, segments: &[Segment], state: &mut Style, out: &mut Vec<u8>) {
        let line_width = usize::from(self.config.chars_per_line);
        let mut cursor = 0;

        for segment in segments {
            let width = self.segment_width(segment);
            let gap = usize::from(cursor > 0);
            let start = match segment.alignment {
                Alignment::Left => cursor,
                Alignment::Center => line_width.saturating_sub(width) / 2,
                Alignment::Right => line_width.saturating_sub(width),
            }
            .max(cursor + gap);

            if start > cursor {
                switch_style(state, Style::default(), out);
                out.extend(std::iter::repeat_n(b' ', start - cursor));
            }
            self.encode_runs(segment, state, out);
            cursor = start + width;
        }
    }

    fn encode_runs(&self, segment: &Segment, state: &mut Style, out: &mut Vec<u8>) {
        for run in &segment.runs {
            switch_style(state, run.style, out);
            out.extend_from_slice(&self.encode_text(&run.text));
        }
    }

    /// Columns a segment occupies in the normal font.
    fn segment_width(&self, segment: &Segment) -> usize {
        segment
            .runs
            .iter()
            .map(|run| self.encode_text(&run.text).len() * run.style.size.width_factor())
            .sum()
    }

    /// Characters the charset cannot represent print as `?`.
    fn encode_text(&self, text: &str) -> Vec<u8> {
        let (bytes, _, had_errors) = self.encoding.encode(text);
        if !had_errors {
            return bytes.into_owned();
        }
        debug!(text, charset = self.encoding.name(), "replacing unmappable characters");

        let mut out = Vec::with_capacity(bytes.len());
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            let (encoded, _, unmappable) = self.encoding.encode(ch.encode_utf8(&mut buf));
            if unmappable {
                out.push(b'?');
            } else {
                out.extend_from_slice(&encoded);
            }
        }
        out
    }
}

/// Emit only the commands needed to move from `state` to `target`.
fn switch_style(state: &mut Style, target: Style, out: &mut Vec<u8>) {
    if state.bold != target.bold {
        out.extend(if target.bold {
            text::bold_on()
        } else {
            text::bold_off()
        });
    }
    if state.underline != target.underline {
        out.extend(if target.underline {
            text::underline_on()
        } else {
            text::underline_off()
        });
    }
    if state.size != target.size {
        out.extend(text::size(target.size));
    }
    *state = target;
}
