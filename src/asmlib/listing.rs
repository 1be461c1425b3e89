//! The assembly listing: pagination, the four line shapes, queued
//! per-line diagnostics, the symbol table dump and the concordance.

use std::fmt::Write as _;

use super::symtab::{SymbolTable, XrefTab};

/// Lines per listing page, including the five-line header.
pub(crate) const LINES_PER_PAGE: usize = 55;
const TITLE_LEN: usize = 63;
const SYMBOL_COLUMNS: usize = 5;
const XREF_COLUMNS: usize = 8;
/// At most this many diagnostics are queued against one line.
const ERROR_QUEUE: usize = 20;

/// How one source line is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineStyle {
    /// Source text only.
    Line,
    /// Source plus a bare value (assignments and origin settings).
    LineVal,
    /// Source plus location and value; repeats for the same source
    /// line continue as location/value rows.
    LineLocVal,
    /// Location/value row with no source (literal pool flushes).
    LocVal,
}

#[derive(Debug)]
enum Sink {
    /// Pass 1: no listing exists.
    Disconnected,
    Writing(String),
    /// XLIST stashed the stream here.
    Suppressed(String),
}

#[derive(Debug)]
pub(crate) struct Listing {
    sink: Sink,
    /// Set once the current source line has been printed; repeats
    /// then use the continuation shape.
    pub(crate) listed: bool,
    title: String,
    title_set: bool,
    page_lineno: usize,
    list_lineno: usize,
    list_pageno: usize,
    queued: Vec<(&'static str, i32)>,
}

impl Listing {
    pub(crate) fn new() -> Listing {
        Listing {
            sink: Sink::Disconnected,
            listed: true,
            title: String::new(),
            title_set: false,
            page_lineno: LINES_PER_PAGE,
            list_lineno: 0,
            list_pageno: 0,
            queued: Vec::new(),
        }
    }

    /// Reset for a pass.  Only pass 2 gets a live stream.
    pub(crate) fn begin_pass(&mut self, active: bool) {
        self.sink = if active {
            Sink::Writing(String::new())
        } else {
            Sink::Disconnected
        };
        self.listed = true;
        self.title.clear();
        self.title_set = false;
        self.page_lineno = LINES_PER_PAGE;
        self.list_lineno = 0;
        self.list_pageno = 0;
        self.queued.clear();
    }

    fn out(&mut self) -> Option<&mut String> {
        match &mut self.sink {
            Sink::Writing(buf) => Some(buf),
            _ => None,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(self.sink, Sink::Writing(_))
    }

    /// XLIST with no argument.
    pub(crate) fn toggle(&mut self) {
        let current = std::mem::replace(&mut self.sink, Sink::Disconnected);
        self.sink = match current {
            Sink::Writing(buf) => Sink::Suppressed(buf),
            Sink::Suppressed(buf) => Sink::Writing(buf),
            Sink::Disconnected => Sink::Disconnected,
        };
    }

    pub(crate) fn enable(&mut self) {
        let current = std::mem::replace(&mut self.sink, Sink::Disconnected);
        self.sink = match current {
            Sink::Suppressed(buf) => Sink::Writing(buf),
            other => other,
        };
    }

    pub(crate) fn disable(&mut self) {
        let current = std::mem::replace(&mut self.sink, Sink::Disconnected);
        self.sink = match current {
            Sink::Writing(buf) => Sink::Suppressed(buf),
            other => other,
        };
    }

    /// Undo any outstanding XLIST so closing output lands in the
    /// real stream.
    pub(crate) fn restore(&mut self) {
        self.enable();
    }

    /// The first line of the file doubles as the default title.
    pub(crate) fn set_default_title(&mut self, line: &str) {
        self.title = line.to_string();
        self.title_set = false;
    }

    /// TITLE's explicit setting; forces a page break.
    pub(crate) fn set_title(&mut self, title: &str) {
        self.title = title.chars().take(TITLE_LEN).collect();
        self.title_set = true;
        self.force_page_break();
    }

    pub(crate) fn force_page_break(&mut self) {
        self.page_lineno = LINES_PER_PAGE;
    }

    fn page_break(&mut self, sub_title: Option<&str>) {
        if self.page_lineno >= LINES_PER_PAGE {
            if !self.title_set {
                let trimmed = self.title.trim_end_matches('\n').to_string();
                self.title = trimmed.chars().take(TITLE_LEN).collect();
                self.title_set = true;
            }
            self.top_of_form(sub_title);
        }
    }

    fn top_of_form(&mut self, sub_title: Option<&str>) {
        self.list_pageno += 1;
        let page = format!("Page {}", self.list_pageno);
        let title = self.title.clone();
        let first_page = self.list_pageno == 1;
        if let Some(out) = self.out() {
            if !first_page {
                out.push('\u{c}');
            }
            let _ = writeln!(out, "\n\n\n      {title:<63} {page:>10}");
        }
        self.page_lineno = 3;
        match sub_title {
            Some(sub) => {
                if let Some(out) = self.out() {
                    let _ = writeln!(out, "{sub:>80}");
                }
                self.page_lineno += 1;
            }
            None => {
                if let Some(out) = self.out() {
                    out.push('\n');
                }
                self.page_lineno += 1;
            }
        }
        if let Some(out) = self.out() {
            out.push('\n');
        }
        self.page_lineno += 1;
    }

    /// Render one line of the listing, breaking the page first when
    /// needed, then append any queued diagnostics.
    pub(crate) fn print_line(
        &mut self,
        line: &str,
        lineno: usize,
        loc: i32,
        val: i32,
        style: LineStyle,
        indirect: bool,
    ) {
        if !matches!(self.sink, Sink::Writing(_)) {
            self.queued.clear();
            return;
        }
        self.page_break(None);
        self.list_lineno += 1;
        self.page_lineno += 1;
        match style {
            LineStyle::Line => {
                if let Some(out) = self.out() {
                    let _ = write!(out, "{lineno:5}             {line}");
                }
                self.listed = true;
            }
            LineStyle::LineVal => {
                if let Some(out) = self.out() {
                    let _ = write!(out, "{lineno:5}       {val:04o}  {line}");
                }
                self.listed = true;
            }
            LineStyle::LineLocVal => {
                if !self.listed {
                    let tag = if indirect { '@' } else { ' ' };
                    if let Some(out) = self.out() {
                        let _ = write!(out, "{lineno:5} {loc:05o} {val:04o}{tag} {line}");
                    }
                    self.listed = true;
                } else if let Some(out) = self.out() {
                    let _ = writeln!(out, "      {loc:05o} {val:04o}");
                }
            }
            LineStyle::LocVal => {
                if let Some(out) = self.out() {
                    let _ = writeln!(out, "      {loc:05o} {val:04o}");
                }
            }
        }
        self.print_queued_errors();
    }

    /// Queue a diagnostic against the current line; if the line has
    /// already been listed, emit it at once.
    pub(crate) fn save_error(&mut self, tag: &'static str, col: i32) {
        if self.queued.len() < ERROR_QUEUE {
            self.queued.push((tag, col));
        }
        if self.listed {
            self.print_queued_errors();
        }
    }

    pub(crate) fn print_queued_errors(&mut self) {
        if !matches!(self.sink, Sink::Writing(_)) {
            self.queued.clear();
            return;
        }
        let queued = std::mem::take(&mut self.queued);
        for (tag, col) in queued {
            self.page_break(None);
            if let Some(out) = self.out() {
                let _ = write!(out, "{tag:<18.18}");
            }
            if col >= 0 {
                if let Some(out) = self.out() {
                    for _ in 0..col {
                        out.push(' ');
                    }
                    out.push('^');
                }
                self.list_lineno += 1;
                self.page_lineno += 1;
            }
            if let Some(out) = self.out() {
                out.push('\n');
            }
        }
    }

    /// Raw append, outside the pagination (closing summary).
    pub(crate) fn append(&mut self, text: &str) {
        if let Some(out) = self.out() {
            out.push_str(text);
        }
    }

    /// Dump the user symbols (the region past the permanent prefix)
    /// in column-major order.  `?` marks undefined symbols, `#`
    /// redefined ones; label values print with their field bits.
    pub(crate) fn print_symbol_table(&mut self, symtab: &SymbolTable) {
        let base = symtab.fixed_count();
        let top = symtab.len();
        self.list_lineno = 0;
        let mut page = 0;
        let mut ix = base;
        while ix < top {
            self.force_page_break();
            self.page_break(Some("Symbol Table"));
            let symbol_lines = LINES_PER_PAGE - self.page_lineno;
            let mut row = 0;
            while self.page_lineno < LINES_PER_PAGE && ix < top {
                self.list_lineno += 1;
                self.page_lineno += 1;
                let lineno = self.list_lineno;
                if let Some(out) = self.out() {
                    let _ = write!(out, "{lineno:5}");
                }
                for col in 0..SYMBOL_COLUMNS {
                    if ix >= top {
                        break;
                    }
                    let cx = symbol_lines * (SYMBOL_COLUMNS * page + col) + row + base;
                    if cx < base || cx >= top {
                        continue;
                    }
                    let sym = symtab.entry(cx);
                    let mark = if !sym.styp.is_defined() {
                        '?'
                    } else if sym.styp.is_redefined() {
                        '#'
                    } else {
                        ' '
                    };
                    let cell = if sym.styp.is_label() {
                        format!(" {}{:<6.6} {:05o} ", mark, sym.name, sym.val)
                    } else {
                        format!(" {}{:<6.6}  {:04o} ", mark, sym.name, sym.val)
                    };
                    if let Some(out) = self.out() {
                        out.push_str(&cell);
                    }
                    ix += 1;
                }
                if let Some(out) = self.out() {
                    out.push('\n');
                }
                row += 1;
            }
            page += 1;
        }
    }

    /// The concordance: per user symbol, the definition line, a
    /// definition marker (`A` defined, `M` redefined, `U`
    /// undefined), the name, and the reference lines eight per row.
    pub(crate) fn print_cross_reference(&mut self, symtab: &SymbolTable, xref: &XrefTab) {
        self.force_page_break();
        self.list_lineno = 0;
        for ix in symtab.fixed_count()..symtab.len() {
            self.list_lineno += 1;
            self.page_lineno += 1;
            if self.page_lineno >= LINES_PER_PAGE {
                self.page_break(Some("Cross Reference"));
            }
            let sym = symtab.entry(ix);
            let lineno = self.list_lineno;
            let header = if !sym.styp.is_defined() {
                " U         ".to_string()
            } else if sym.styp.is_redefined() {
                format!(" M  {:5}  ", xref.get(sym.xref_index))
            } else {
                format!(" A  {:5}  ", xref.get(sym.xref_index))
            };
            if let Some(out) = self.out() {
                let _ = write!(out, "{lineno:5}{header}{:<6.6}  ", sym.name);
            }
            let mut cols = 0;
            for xc in 1..=sym.xref_count {
                if cols >= XREF_COLUMNS {
                    cols = 0;
                    self.page_lineno += 1;
                    if self.page_lineno >= LINES_PER_PAGE {
                        self.page_break(Some("Cross Reference"));
                    }
                    self.list_lineno += 1;
                    let lineno = self.list_lineno;
                    if let Some(out) = self.out() {
                        let _ = write!(out, "\n{lineno:5}{:<19}", " ");
                    }
                }
                let line = xref.get(sym.xref_index + xc);
                if let Some(out) = self.out() {
                    let _ = write!(out, "  {line:5}");
                }
                cols += 1;
            }
            if let Some(out) = self.out() {
                out.push('\n');
            }
        }
    }

    pub(crate) fn into_text(self) -> String {
        match self.sink {
            Sink::Disconnected => String::new(),
            Sink::Writing(buf) | Sink::Suppressed(buf) => buf,
        }
    }
}
