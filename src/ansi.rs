//! ANSI SGR parsing for presentation.
//!
//! The execution core treats escape sequences as opaque bytes; this module
//! is the boundary where a renderer turns a chunk of captured output into
//! styled spans. Only SGR sequences (`ESC [ <params> m`) are interpreted:
//! the 16-color palette, bold, dim, italic, and underline. Unknown
//! parameters are ignored and non-SGR escapes pass through as text.

use std::sync::LazyLock;

use regex::Regex;

static SGR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[([0-9;]*)m").expect("invalid SGR pattern"));

/// The classic 16-color terminal palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl AnsiColor {
    fn from_base(code: u32) -> Option<AnsiColor> {
        match code {
            0 => Some(AnsiColor::Black),
            1 => Some(AnsiColor::Red),
            2 => Some(AnsiColor::Green),
            3 => Some(AnsiColor::Yellow),
            4 => Some(AnsiColor::Blue),
            5 => Some(AnsiColor::Magenta),
            6 => Some(AnsiColor::Cyan),
            7 => Some(AnsiColor::White),
            _ => None,
        }
    }

    fn brighten(self) -> AnsiColor {
        match self {
            AnsiColor::Black => AnsiColor::BrightBlack,
            AnsiColor::Red => AnsiColor::BrightRed,
            AnsiColor::Green => AnsiColor::BrightGreen,
            AnsiColor::Yellow => AnsiColor::BrightYellow,
            AnsiColor::Blue => AnsiColor::BrightBlue,
            AnsiColor::Magenta => AnsiColor::BrightMagenta,
            AnsiColor::Cyan => AnsiColor::BrightCyan,
            AnsiColor::White => AnsiColor::BrightWhite,
            bright => bright,
        }
    }
}

/// Attributes in effect for a span of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStyle {
    pub foreground: Option<AnsiColor>,
    pub background: Option<AnsiColor>,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
}

impl TextStyle {
    fn apply(&mut self, code: u32) {
        match code {
            0 => *self = TextStyle::default(),
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
            30..=37 => self.foreground = AnsiColor::from_base(code - 30),
            39 => self.foreground = None,
            40..=47 => self.background = AnsiColor::from_base(code - 40),
            49 => self.background = None,
            90..=97 => self.foreground = AnsiColor::from_base(code - 90).map(AnsiColor::brighten),
            100..=107 => {
                self.background = AnsiColor::from_base(code - 100).map(AnsiColor::brighten)
            }
            _ => {} // unsupported SGR parameter, ignore
        }
    }
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub style: TextStyle,
}

/// Split `input` into styled spans. Style state carries across sequences
/// within the input, starting from the default style.
pub fn parse_sgr(input: &str) -> Vec<StyledSpan> {
    let mut spans = Vec::new();
    let mut style = TextStyle::default();
    let mut last_end = 0;

    for caps in SGR_PATTERN.captures_iter(input) {
        let whole = caps.get(0).expect("capture 0 always present");

        let text = &input[last_end..whole.start()];
        if !text.is_empty() {
            spans.push(StyledSpan {
                text: text.to_string(),
                style,
            });
        }
        last_end = whole.end();

        let params = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if params.is_empty() {
            // `ESC [ m` is shorthand for a full reset
            style = TextStyle::default();
        } else {
            for code in params.split(';').filter_map(|p| p.parse::<u32>().ok()) {
                style.apply(code);
            }
        }
    }

    let rest = &input[last_end..];
    if !rest.is_empty() {
        spans.push(StyledSpan {
            text: rest.to_string(),
            style,
        });
    }

    spans
}

/// Remove SGR sequences, leaving plain text. Used for search and match
/// highlighting over captured output.
pub fn strip_ansi(input: &str) -> String {
    SGR_PATTERN.replace_all(input, "").into_owned()
}
