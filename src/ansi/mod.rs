//! Streaming ANSI escape interpretation
//!
//! The toolchain REPL colors its output with SGR escape sequences. Raw
//! subprocess output must never reach a display sink with literal escape
//! bytes in it, so each output stream is pushed through an [`AnsiFilter`]
//! that turns byte chunks into styled text spans.
//!
//! The filter is stateful: the active style persists across chunks, and an
//! escape sequence split across a chunk boundary is resumed when the next
//! chunk arrives. Escape sequences other than SGR are consumed and dropped.

/// Foreground colors of the 16-color SGR set
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
    fn from_sgr(code: u16) -> Option<Self> {
        let color = match code {
            30 => Self::Black,
            31 => Self::Red,
            32 => Self::Green,
            33 => Self::Yellow,
            34 => Self::Blue,
            35 => Self::Magenta,
            36 => Self::Cyan,
            37 => Self::White,
            90 => Self::BrightBlack,
            91 => Self::BrightRed,
            92 => Self::BrightGreen,
            93 => Self::BrightYellow,
            94 => Self::BrightBlue,
            95 => Self::BrightMagenta,
            96 => Self::BrightCyan,
            97 => Self::BrightWhite,
            _ => return None,
        };
        Some(color)
    }
}

/// Text attributes carried by a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStyle {
    /// Foreground color, `None` meaning the terminal default
    pub fg: Option<AnsiColor>,
    /// Bold
    pub bold: bool,
    /// Italic
    pub italic: bool,
    /// Underline
    pub underline: bool,
}

/// A run of text rendered with a single style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    /// Text content, free of escape sequences
    pub text: String,
    /// Style the text should be rendered with
    pub style: TextStyle,
}

/// Parser state between chunks
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseState {
    /// Plain text
    Ground,
    /// Saw ESC, waiting for the introducer byte
    Escape,
    /// Inside a CSI sequence, accumulating until the final byte
    Csi(String),
    /// Inside an OSC sequence, waiting for BEL or ST
    Osc,
    /// Inside an OSC sequence, saw ESC of a possible ST terminator
    OscEscape,
}

/// Stateful filter turning raw output chunks into styled spans
#[derive(Debug)]
pub struct AnsiFilter {
    state: ParseState,
    style: TextStyle,
    /// Incomplete trailing UTF-8 sequence held back from the last chunk
    pending: Vec<u8>,
}

impl Default for AnsiFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiFilter {
    /// Create a filter with the default style active
    pub fn new() -> Self {
        Self {
            state: ParseState::Ground,
            style: TextStyle::default(),
            pending: Vec::new(),
        }
    }

    /// Currently active style
    pub fn style(&self) -> TextStyle {
        self.style
    }

    /// Feed a raw byte chunk, returning the styled spans it completes
    ///
    /// A multi-byte UTF-8 character split across chunks is held back and
    /// completed by the next chunk, like an escape sequence split across
    /// chunks; invalid bytes decode to replacement characters.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<StyledSpan> {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(chunk);

        let mut text = String::with_capacity(data.len());
        let mut rest: &[u8] = &data;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(std::str::from_utf8(valid).unwrap_or(""));
                    match e.error_len() {
                        Some(n) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[n..];
                        }
                        None => {
                            // Incomplete sequence at the chunk boundary
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        self.push(&text)
    }

    /// Feed a text chunk, returning the styled spans it completes
    pub fn push(&mut self, chunk: &str) -> Vec<StyledSpan> {
        let mut spans = Vec::new();
        let mut buffer = String::new();

        for c in chunk.chars() {
            match &mut self.state {
                ParseState::Ground => {
                    if c == '\x1b' {
                        self.state = ParseState::Escape;
                    } else {
                        buffer.push(c);
                    }
                }
                ParseState::Escape => match c {
                    '[' => self.state = ParseState::Csi(String::new()),
                    ']' => self.state = ParseState::Osc,
                    // Two-byte escape (RIS, charset selection, ...): drop
                    _ => self.state = ParseState::Ground,
                },
                ParseState::Csi(params) => {
                    if ('\x40'..='\x7e').contains(&c) {
                        let params = std::mem::take(params);
                        self.state = ParseState::Ground;
                        if c == 'm' {
                            let next = self.apply_sgr(&params);
                            if next != self.style {
                                flush(&mut spans, &mut buffer, self.style);
                                self.style = next;
                            }
                        }
                        // Non-SGR CSI sequences are dropped
                    } else {
                        params.push(c);
                    }
                }
                ParseState::Osc => match c {
                    '\x07' => self.state = ParseState::Ground,
                    '\x1b' => self.state = ParseState::OscEscape,
                    _ => {}
                },
                ParseState::OscEscape => {
                    // '\\' completes the ST terminator; anything else ends
                    // the sequence as malformed. Either way, back to text.
                    self.state = ParseState::Ground;
                }
            }
        }

        flush(&mut spans, &mut buffer, self.style);
        spans
    }

    /// Apply an SGR parameter list to the current style
    fn apply_sgr(&self, params: &str) -> TextStyle {
        let mut style = self.style;
        let codes: Vec<u16> = params
            .split(';')
            .map(|p| if p.is_empty() { 0 } else { p.parse().unwrap_or(u16::MAX) })
            .collect();

        let mut i = 0;
        while i < codes.len() {
            match codes[i] {
                0 => style = TextStyle::default(),
                1 => style.bold = true,
                3 => style.italic = true,
                4 => style.underline = true,
                22 => style.bold = false,
                23 => style.italic = false,
                24 => style.underline = false,
                39 => style.fg = None,
                // Extended color selectors carry a variable number of
                // following parameters; consume them without interpreting
                // (only the 16-color set is rendered).
                38 | 48 => match codes.get(i + 1) {
                    Some(5) => i += 2,
                    Some(2) => i += 4,
                    _ => {}
                },
                code => {
                    if let Some(color) = AnsiColor::from_sgr(code) {
                        style.fg = Some(color);
                    }
                }
            }
            i += 1;
        }

        style
    }
}

fn flush(spans: &mut Vec<StyledSpan>, buffer: &mut String, style: TextStyle) {
    if !buffer.is_empty() {
        spans.push(StyledSpan {
            text: std::mem::take(buffer),
            style,
        });
    }
}
