//! # Receipt Markup
//!
//! Parses the small inline markup used by receipt text:
//!
//! | Markup | Meaning |
//! |--------|---------|
//! | `[L]` `[C]` `[R]` | Start a left / center / right aligned segment |
//! | `<b>…</b>` | Bold |
//! | `<u>…</u>` | Underline |
//! | `<font size='big'>…</font>` | Character size (`normal`, `wide`, `tall`, `big`) |
//!
//! An alignment tag at the start of a line aligns the whole line. Several
//! tags in one line split it into columns, e.g. `[L]Latte[R]2`.
//!
//! The parser never rejects input: anything that is not a recognized tag is
//! kept as literal text.

use super::text::{Alignment, FontSize};

/// Text style in effect for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub bold: bool,
    pub underline: bool,
    pub size: FontSize,
}

/// Text printed in one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub style: Style,
}

/// Part of a line with a single alignment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub alignment: Alignment,
    pub runs: Vec<Run>,
}

impl Segment {
    fn new(alignment: Alignment) -> Self {
        Self {
            alignment,
            runs: Vec::new(),
        }
    }
}

/// One printed line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    pub segments: Vec<Segment>,
}

/// Parse markup text into lines. Styles carry over line breaks until closed.
pub fn parse(text: &str) -> Vec<Line> {
    let mut parser = Parser::default();
    text.split('\n')
        .map(|line| parser.line(line.strip_suffix('\r').unwrap_or(line)))
        .collect()
}

enum Tag {
    Align(Alignment),
    Bold(bool),
    Underline(bool),
    FontOpen(FontSize),
    FontClose,
}

#[derive(Default)]
struct Parser {
    bold: bool,
    underline: bool,
    sizes: Vec<FontSize>,
}

impl Parser {
    fn style(&self) -> Style {
        Style {
            bold: self.bold,
            underline: self.underline,
            size: self.sizes.last().copied().unwrap_or_default(),
        }
    }

    fn line(&mut self, line: &str) -> Line {
        let mut segments = Vec::new();
        let mut current = Segment::default();
        let mut text = String::new();
        let mut rest = line;

        while let Some(c) = rest.chars().next() {
            if let Some((len, tag)) = read_tag(rest) {
                self.flush(&mut current, &mut text);
                match tag {
                    Tag::Align(alignment) if current.runs.is_empty() => {
                        current.alignment = alignment;
                    }
                    Tag::Align(alignment) => {
                        segments.push(std::mem::replace(&mut current, Segment::new(alignment)));
                    }
                    Tag::Bold(on) => self.bold = on,
                    Tag::Underline(on) => self.underline = on,
                    Tag::FontOpen(size) => self.sizes.push(size),
                    Tag::FontClose => {
                        self.sizes.pop();
                    }
                }
                rest = &rest[len..];
                continue;
            }
            text.push(c);
            rest = &rest[c.len_utf8()..];
        }

        self.flush(&mut current, &mut text);
        if !current.runs.is_empty() || segments.is_empty() {
            segments.push(current);
        }
        Line { segments }
    }

    fn flush(&self, segment: &mut Segment, text: &mut String) {
        if text.is_empty() {
            return;
        }
        let style = self.style();
        match segment.runs.last_mut() {
            Some(run) if run.style == style => run.text.push_str(text),
            _ => segment.runs.push(Run {
                text: text.clone(),
                style,
            }),
        }
        text.clear();
    }
}

fn read_tag(input: &str) -> Option<(usize, Tag)> {
    const FIXED: [(&str, fn() -> Tag); 7] = [
        ("[L]", || Tag::Align(Alignment::Left)),
        ("[C]", || Tag::Align(Alignment::Center)),
        ("[R]", || Tag::Align(Alignment::Right)),
        ("<b>", || Tag::Bold(true)),
        ("</b>", || Tag::Bold(false)),
        ("<u>", || Tag::Underline(true)),
        ("</u>", || Tag::Underline(false)),
    ];

    for (literal, tag) in FIXED {
        if input.starts_with(literal) {
            return Some((literal.len(), tag()));
        }
    }
    if input.starts_with("</font>") {
        return Some(("</font>".len(), Tag::FontClose));
    }
    if input.starts_with("<font") {
        let end = input.find('>')?;
        let size = font_size_attribute(&input[5..end])?;
        return Some((end + 1, Tag::FontOpen(size)));
    }
    None
}

/// Parse ` size='big'` (either quote style) into a size.
fn font_size_attribute(attributes: &str) -> Option<FontSize> {
    let value = attributes.trim().strip_prefix("size")?.trim_start();
    let value = value.strip_prefix('=')?.trim();
    let value = value.trim_matches(|c| c == '\'' || c == '"');
    FontSize::from_name(value)
}
