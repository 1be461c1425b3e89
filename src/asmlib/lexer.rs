//! Line intake and lexeme segmentation.
//!
//! The scanner is a cursor over one tab-expanded source line.  A
//! lexeme is a run of alphanumeric characters, a quoted character
//! (`"x`), or a single punctuation character; `/`, `;` and end of
//! line terminate a statement.  Directives reposition the cursor
//! directly (TEXT and TITLE swallow delimited strings, conditionals
//! skip whole regions), so the cursor state is plain data rather
//! than an iterator.

use super::symbol::symbol_name;

/// Longest physical line; longer input is consumed in chunks of
/// this size, as if each chunk were its own line.
pub(crate) const LINE_LEN: usize = 96;

/// Statement-level whitespace.  `>` closes a conditional block and
/// is otherwise insignificant, so it spaces like a blank.
pub(crate) fn is_blank(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | 0x0c | b'>')
}

pub(crate) fn is_end(c: u8) -> bool {
    c == 0 || c == b'\n'
}

pub(crate) fn is_done(c: u8) -> bool {
    c == b'/' || c == b';' || is_end(c)
}

/// The source text split into physical lines of at most
/// [`LINE_LEN`] - 2 bytes, rewindable for the second pass.
#[derive(Debug)]
pub(crate) struct LineSource {
    lines: Vec<String>,
    pos: usize,
}

impl LineSource {
    pub(crate) fn new(body: &str) -> LineSource {
        let mut lines = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let mut take = rest.len().min(LINE_LEN - 2);
            if let Some(nl) = rest[..take].find('\n') {
                take = nl + 1;
            }
            lines.push(rest[..take].to_string());
            rest = &rest[take..];
        }
        LineSource { lines, pos: 0 }
    }

    pub(crate) fn rewind(&mut self) {
        self.pos = 0;
    }

    pub(crate) fn next(&mut self) -> Option<&str> {
        let line = self.lines.get(self.pos)?;
        self.pos += 1;
        Some(line)
    }
}

/// Cursor state for the line being assembled.
#[derive(Debug)]
pub(crate) struct Scanner {
    line: Vec<u8>,
    /// Line length including the terminating newline.
    pub(crate) maxcc: usize,
    /// Column of the next unexamined character.
    pub(crate) cc: usize,
    pub(crate) lexstart: usize,
    pub(crate) lexterm: usize,
    pub(crate) lexstartprev: usize,
    pub(crate) lextermprev: usize,
    /// Character just after the most recently evaluated term.
    pub(crate) delimiter: u8,
    /// While FLTG input is active, alphanumeric runs end at any
    /// letter so the exponent marker lexes on its own.
    pub(crate) fltg_digits: bool,
}

impl Scanner {
    pub(crate) fn new() -> Scanner {
        let mut s = Scanner {
            line: Vec::new(),
            maxcc: 0,
            cc: 0,
            lexstart: 0,
            lexterm: 0,
            lexstartprev: 0,
            lextermprev: 0,
            delimiter: b'\n',
            fltg_digits: false,
        };
        s.load("\n");
        s
    }

    /// Install a fresh line: expand tabs to 8-column stops, drop a
    /// CR before the newline, and guarantee a newline terminator.
    pub(crate) fn load(&mut self, raw: &str) {
        self.line.clear();
        for b in raw.bytes() {
            match b {
                b'\t' => loop {
                    self.line.push(b' ');
                    if self.line.len() % 8 == 0 {
                        break;
                    }
                },
                b'\r' => {}
                _ => self.line.push(b),
            }
        }
        if self.line.last() != Some(&b'\n') {
            self.line.push(b'\n');
        }
        self.maxcc = self.line.len();
        self.cc = 0;
        self.lexstart = 0;
        self.lexterm = 0;
        self.lexstartprev = 0;
        self.lextermprev = 0;
    }

    pub(crate) fn ch(&self, i: usize) -> u8 {
        self.line.get(i).copied().unwrap_or(0)
    }

    /// First character of the current lexeme.
    pub(crate) fn first(&self) -> u8 {
        self.ch(self.lexstart)
    }

    /// Character just past the current lexeme.
    pub(crate) fn term(&self) -> u8 {
        self.ch(self.lexterm)
    }

    pub(crate) fn text(&self) -> &str {
        // The line came from a &str and tab expansion only inserts
        // spaces, so it is still valid UTF-8.
        std::str::from_utf8(&self.line).unwrap_or("")
    }

    /// Symbol-table name for the lexeme spanning `[from, term)`.
    pub(crate) fn lexeme_name(&self, from: usize, term: usize) -> String {
        let term = term.min(self.line.len());
        let from = from.min(term);
        symbol_name(std::str::from_utf8(&self.line[from..term]).unwrap_or(""))
    }

    /// Advance to the next lexeme.  Returns the column of a quoted
    /// character with nothing to quote, which the caller diagnoses.
    pub(crate) fn next_lexeme(&mut self) -> Option<usize> {
        let mut truncated_quote = None;
        self.lexstartprev = self.lexstart;
        self.lextermprev = self.lexterm;

        while is_blank(self.ch(self.cc)) {
            self.cc += 1;
        }
        self.lexstart = self.cc;

        let c = self.ch(self.cc);
        if c.is_ascii_alphanumeric() {
            if self.fltg_digits && !c.is_ascii_digit() {
                self.cc += 1;
            } else if self.fltg_digits {
                while self.ch(self.cc).is_ascii_digit() {
                    self.cc += 1;
                }
            } else {
                while self.ch(self.cc).is_ascii_alphanumeric() {
                    self.cc += 1;
                }
            }
        } else if is_end(c) {
            // Stay at end of line.
        } else {
            match c {
                b'"' => {
                    if self.cc + 2 < self.maxcc {
                        self.cc += 2;
                    } else {
                        truncated_quote = Some(self.lexstart);
                        self.cc += 1;
                    }
                }
                b'/' => {
                    // Comment; the cursor stays put.
                }
                _ => {
                    self.cc += 1;
                }
            }
        }
        self.lexterm = self.cc;
        truncated_quote
    }

    pub(crate) fn move_to_end_of_line(&mut self) {
        while !is_end(self.ch(self.cc)) {
            self.cc += 1;
        }
        self.lexstart = self.cc;
        self.lexterm = self.cc;
        self.lexstartprev = self.lexstart;
    }
}
