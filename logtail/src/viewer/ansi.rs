//! Terminal styling sequences to display markup
//!
//! Log messages frequently carry SGR escape sequences (`ESC [ ... m`). They are
//! parsed into styled spans which can then be rendered as escaped HTML. Anything
//! that is not a well-formed SGR sequence is kept as plain text.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

const ESC: char = '\u{1b}';

/// An RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

const PALETTE: [Rgb; 16] = [
    Rgb(0, 0, 0),
    Rgb(187, 0, 0),
    Rgb(0, 187, 0),
    Rgb(187, 187, 0),
    Rgb(0, 0, 187),
    Rgb(187, 0, 187),
    Rgb(0, 187, 187),
    Rgb(255, 255, 255),
    Rgb(85, 85, 85),
    Rgb(255, 85, 85),
    Rgb(0, 255, 0),
    Rgb(255, 255, 85),
    Rgb(85, 85, 255),
    Rgb(255, 85, 255),
    Rgb(85, 255, 255),
    Rgb(255, 255, 255),
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

/// Colour of the xterm 256-colour table
pub fn xterm_color(index: u8) -> Rgb {
    match index {
        0..=15 => PALETTE[index as usize],
        16..=231 => {
            let i = index - 16;
            Rgb(
                CUBE_LEVELS[(i / 36) as usize],
                CUBE_LEVELS[((i / 6) % 6) as usize],
                CUBE_LEVELS[(i % 6) as usize],
            )
        }
        _ => {
            let level = 8 + (index - 232) * 10;
            Rgb(level, level, level)
        }
    }
}

/// Text attributes in effect for a span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Style {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fg: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg: Option<Rgb>,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
}

impl Style {
    pub fn is_plain(&self) -> bool {
        *self == Style::default()
    }

    fn css(&self) -> String {
        let mut rules = Vec::new();
        if let Some(Rgb(r, g, b)) = self.fg {
            rules.push(format!("color:rgb({},{},{})", r, g, b));
        }
        if let Some(Rgb(r, g, b)) = self.bg {
            rules.push(format!("background-color:rgb({},{},{})", r, g, b));
        }
        if self.bold {
            rules.push("font-weight:bold".to_string());
        }
        if self.dim {
            rules.push("opacity:0.7".to_string());
        }
        if self.italic {
            rules.push("font-style:italic".to_string());
        }
        if self.underline {
            rules.push("text-decoration:underline".to_string());
        }
        rules.join(";")
    }

    /// Apply the parameters of one SGR sequence
    fn apply_sgr(&mut self, params: &[u16]) {
        if params.is_empty() {
            *self = Style::default();
            return;
        }

        let mut i = 0;
        while i < params.len() {
            match params[i] {
                0 => *self = Style::default(),
                1 => self.bold = true,
                2 => self.dim = true,
                3 => self.italic = true,
                4 => self.underline = true,
                22 => {
                    self.bold = false;
                    self.dim = false;
                }
                23 => self.italic = false,
                24 => self.underline = false,
                code @ 30..=37 => self.fg = Some(PALETTE[(code - 30) as usize]),
                code @ 90..=97 => self.fg = Some(PALETTE[(code - 90 + 8) as usize]),
                code @ 40..=47 => self.bg = Some(PALETTE[(code - 40) as usize]),
                code @ 100..=107 => self.bg = Some(PALETTE[(code - 100 + 8) as usize]),
                39 => self.fg = None,
                49 => self.bg = None,
                code @ (38 | 48) => match extended_color(&params[i + 1..]) {
                    Some((color, consumed)) => {
                        if code == 38 {
                            self.fg = Some(color);
                        } else {
                            self.bg = Some(color);
                        }
                        i += consumed;
                    }
                    // The rest of the sequence cannot be interpreted reliably
                    None => return,
                },
                _ => {}
            }
            i += 1;
        }
    }
}

/// Decode `5;n` or `2;r;g;b`, returning the colour and the number of parameters used
fn extended_color(params: &[u16]) -> Option<(Rgb, usize)> {
    let byte = |v: &u16| u8::try_from(*v).ok();
    match params {
        [5, n, ..] => Some((xterm_color(byte(n)?), 2)),
        [2, r, g, b, ..] => Some((Rgb(byte(r)?, byte(g)?, byte(b)?), 4)),
        _ => None,
    }
}

/// A run of text sharing one style
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnsiSpan {
    pub style: Style,
    pub text: String,
}

enum Sequence<'a> {
    Sgr(Vec<u16>),
    /// Not a supported SGR sequence, emitted verbatim
    Raw(&'a str),
}

/// Read the escape sequence starting at the beginning of `input` (which starts with ESC)
fn read_sequence(input: &str) -> (Sequence<'_>, usize) {
    let bytes = input.as_bytes();
    if bytes.len() < 2 || bytes[1] != b'[' {
        return (Sequence::Raw(&input[..ESC.len_utf8()]), ESC.len_utf8());
    }

    let mut end = 2;
    while end < bytes.len() && (0x30..=0x3f).contains(&bytes[end]) {
        end += 1;
    }
    let params_end = end;
    while end < bytes.len() && (0x20..=0x2f).contains(&bytes[end]) {
        end += 1;
    }
    if end >= bytes.len() || !(0x40..=0x7e).contains(&bytes[end]) {
        // Unterminated, keep what was consumed as text
        return (Sequence::Raw(&input[..end]), end);
    }

    let len = end + 1;
    let raw = &input[..len];
    if bytes[end] != b'm' || params_end != end {
        return (Sequence::Raw(raw), len);
    }

    match parse_params(&input[2..params_end]) {
        Some(params) => (Sequence::Sgr(params), len),
        None => (Sequence::Raw(raw), len),
    }
}

fn parse_params(params: &str) -> Option<Vec<u16>> {
    if params.is_empty() {
        return Some(Vec::new());
    }
    params
        .split(';')
        .map(|p| if p.is_empty() { Some(0) } else { p.parse::<u16>().ok() })
        .collect()
}

/// Split `text` into styled spans. Pure and deterministic.
pub fn parse(text: &str) -> Vec<AnsiSpan> {
    let mut spans: Vec<AnsiSpan> = Vec::new();
    let mut style = Style::default();
    let mut rest = text;

    let mut push = |style: Style, chunk: &str| {
        if chunk.is_empty() {
            return;
        }
        match spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(chunk),
            _ => spans.push(AnsiSpan {
                style,
                text: chunk.to_string(),
            }),
        }
    };

    while let Some(pos) = rest.find(ESC) {
        push(style, &rest[..pos]);
        let (sequence, len) = read_sequence(&rest[pos..]);
        match sequence {
            Sequence::Sgr(params) => style.apply_sgr(&params),
            Sequence::Raw(raw) => push(style, raw),
        }
        rest = &rest[pos + len..];
    }
    push(style, rest);

    spans
}

fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
}

/// Render spans as escaped HTML
pub fn render_html(spans: &[AnsiSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        if span.style.is_plain() {
            escape_html(&span.text, &mut out);
        } else {
            out.push_str("<span style=\"");
            out.push_str(&span.style.css());
            out.push_str("\">");
            escape_html(&span.text, &mut out);
            out.push_str("</span>");
        }
    }
    out
}

/// Convert terminal-styled text to HTML
pub fn to_html(text: &str) -> String {
    render_html(&parse(text))
}

/// Per-render memo so each distinct text is formatted at most once
#[derive(Debug, Default)]
pub struct HtmlCache {
    entries: HashMap<String, Arc<str>>,
}

impl HtmlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(&mut self, text: &str) -> Arc<str> {
        if let Some(html) = self.entries.get(text) {
            return html.clone();
        }
        let html: Arc<str> = Arc::from(to_html(text));
        self.entries.insert(text.to_string(), html.clone());
        html
    }

    /// Number of distinct texts formatted so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
