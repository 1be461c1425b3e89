//! The assembly driver: per-line dispatch and two-pass control.

use std::fmt::Write as _;
use std::path::Path;

use tracing::{event, span, Level};

use super::lexer::{is_blank, is_end, LineSource, Scanner};
use super::listing::{LineStyle, Listing};
use super::literals::{LiteralPool, PoolKind};
use super::output::ObjectSink;
use super::state::{NumeralMode, Pass};
use super::symbol::SymType;
use super::symtab::{SymbolTable, XrefTab};
use super::types::*;

pub(crate) const ADDRESS_FIELD: i32 = 0o0177;
pub(crate) const INDIRECT_BIT: i32 = 0o0400;
pub(crate) const PAGE_BIT: i32 = 0o0200;
pub(crate) const FIELD_MASK: i32 = 0o70000;

/// Observable flag effects of the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Dump the user symbol table after assembly (`-d`).
    pub dump_symbols: bool,
    /// Allow literal generation (`-l`); off by default.
    pub literals: bool,
    /// Emit a re-loadable permanent symbol table (`-p`).
    pub permanent: bool,
    /// Punch RIM format instead of BIN (`-r`).
    pub rim: bool,
    /// Generate a cross-reference (`-x`).
    pub xref: bool,
}

/// Everything one assembly run produces.
#[derive(Debug)]
pub struct Assembly {
    /// The object byte stream (`.bin` or `.rim`).
    pub object: Vec<u8>,
    /// The formatted listing (`.lst`).
    pub listing: String,
    /// Diagnostic lines (`.err`); empty when assembly was clean.
    pub errors: String,
    /// Re-loadable permanent symbol table (`.prm`), with `-p`.
    pub permanent: Option<String>,
    /// Errors recorded during pass 2; non-zero fails the run.
    pub error_count: usize,
    /// Errors recorded during pass 1 (not written to the error
    /// file, but they keep it from being deleted).
    pub pass1_error_count: usize,
}

impl Assembly {
    pub fn clean(&self) -> bool {
        self.error_count == 0 && self.pass1_error_count == 0
    }
}

/// The whole assembler state, carried explicitly instead of the
/// traditional pile of globals.
pub(crate) struct Assembler {
    pub(crate) opts: Options,
    pub(crate) filename: String,
    pub(crate) pass: Pass,
    pub(crate) symtab: SymbolTable,
    pub(crate) xreftab: Option<XrefTab>,
    pub(crate) src: LineSource,
    pub(crate) scan: Scanner,
    pub(crate) lineno: usize,
    /// Location counter, 15 bits: 3-bit field plus in-field address.
    pub(crate) clc: i32,
    /// Current field, kept pre-shifted into bits 12..14.
    pub(crate) field: i32,
    /// The 12-bit in-field part of the location counter.
    pub(crate) fieldlc: i32,
    /// Relocation distance set by RELOC.
    pub(crate) reloc: i32,
    pub(crate) radix: NumeralMode,
    pub(crate) cp: LiteralPool,
    pub(crate) pz: LiteralPool,
    pub(crate) rim_mode: bool,
    pub(crate) object: ObjectSink,
    pub(crate) checksum: i32,
    pub(crate) data_emitted: bool,
    pub(crate) listing: Listing,
    pub(crate) errfile: String,
    pub(crate) errors: usize,
    pub(crate) errors_pass1: usize,
    pub(crate) error_in_line: bool,
    /// Set when MRI fusion materialised an off-page operand behind
    /// an indirect literal; the listing marks the word with `@`.
    pub(crate) indirect_generated: bool,
    pub(crate) last_xref_lexstart: usize,
    pub(crate) last_xref_lineno: usize,
}

impl Assembler {
    pub(crate) fn new(filename: &str, body: &str, opts: Options) -> Assembler {
        let rim = opts.rim;
        Assembler {
            opts,
            filename: filename.to_string(),
            pass: Pass::One,
            symtab: SymbolTable::seeded(),
            xreftab: None,
            src: LineSource::new(body),
            scan: Scanner::new(),
            lineno: 0,
            clc: 0o200,
            field: 0,
            fieldlc: 0,
            reloc: 0,
            radix: NumeralMode::default(),
            cp: LiteralPool::new(),
            pz: LiteralPool::new(),
            rim_mode: rim,
            object: ObjectSink::Disconnected,
            checksum: 0,
            data_emitted: false,
            listing: Listing::new(),
            errfile: String::new(),
            errors: 0,
            errors_pass1: 0,
            error_in_line: false,
            indirect_generated: false,
            last_xref_lexstart: 0,
            last_xref_lineno: 0,
        }
    }

    pub(crate) fn begin_pass(&mut self, pass: Pass) {
        self.pass = pass;
        self.src.rewind();
        self.scan = Scanner::new();
        self.lineno = 0;
        self.clc = 0o200;
        self.field = 0;
        self.fieldlc = 0;
        self.reloc = 0;
        self.radix = NumeralMode::default();
        self.cp.reset();
        self.pz.reset();
        self.rim_mode = self.opts.rim;
        self.checksum = 0;
        self.data_emitted = false;
        self.errors = 0;
        self.errfile.clear();
        self.error_in_line = false;
        self.indirect_generated = false;
        self.last_xref_lexstart = 0;
        self.last_xref_lineno = 0;
        self.listing.begin_pass(pass == Pass::Two);
        self.object = match pass {
            Pass::One => ObjectSink::Disconnected,
            Pass::Two => ObjectSink::Writing(Vec::new()),
        };
    }

    /// Render the current line into the listing.
    pub(crate) fn print_line(&mut self, loc: i32, val: i32, style: LineStyle) {
        let Assembler {
            listing,
            scan,
            lineno,
            indirect_generated,
            ..
        } = self;
        listing.print_line(scan.text(), *lineno, loc, val, style, *indirect_generated);
    }

    /// List the current line plainly if nothing has listed it yet.
    pub(crate) fn list_line(&mut self) {
        if self.listing.is_active() && !self.listing.listed {
            self.print_line(0, 0, LineStyle::Line);
        }
    }

    /// Fetch the next source line, listing the previous one first.
    /// At end of input a `$` is synthesized and the missing
    /// terminator is diagnosed at `$`-handling time.
    pub(crate) fn read_line(&mut self) {
        self.list_line();
        self.lineno += 1;
        self.indirect_generated = false;
        self.listing.listed = false;
        match self.src.next() {
            Some(raw) => {
                self.scan.load(raw);
                self.error_in_line = false;
            }
            None => {
                self.scan.load("$\n");
                self.error_in_line = true;
            }
        }
        if self.lineno == 1 {
            self.listing.set_default_title(self.scan.text());
        }
    }

    pub(crate) fn next_lexeme(&mut self) {
        if let Some(col) = self.scan.next_lexeme() {
            self.error_message(&NO_LITERAL_VALUE, col as i32);
        }
    }

    /// Advance as [`Self::next_lexeme`], but reject a blank landing
    /// between operator and operand.
    pub(crate) fn next_lex_blank(&mut self) {
        self.next_lexeme();
        if is_blank(self.scan.delimiter) {
            self.error_message(&ILLEGAL_BLANK, self.scan.lexstart as i32 - 1);
        }
        self.scan.delimiter = self.scan.term();
    }

    pub(crate) fn move_to_end_of_line(&mut self) {
        self.scan.move_to_end_of_line();
    }

    pub(crate) fn error_message(&mut self, mesg: &Emsg, col: i32) {
        if self.pass == Pass::Two {
            self.errors += 1;
            let linecol = format!("({}:{})", self.lineno, col + 1);
            let _ = writeln!(
                self.errfile,
                "{}{:<9} : error:  {} at Loc = {:05o}",
                self.filename, linecol, mesg.file, self.clc
            );
            self.listing.save_error(mesg.list, col);
        } else {
            self.errors_pass1 += 1;
        }
        self.error_in_line = true;
    }

    pub(crate) fn error_symbol(&mut self, mesg: &Emsg, name: &str, col: i32) {
        if self.pass == Pass::Two {
            self.errors += 1;
            let linecol = format!("({}:{})", self.lineno, col + 1);
            let _ = writeln!(
                self.errfile,
                "{}{:<9} : error:  {} \"{}\" at Loc = {:05o}",
                self.filename, linecol, mesg.file, name, self.clc
            );
            self.listing.save_error(mesg.list, col);
        } else {
            self.errors_pass1 += 1;
        }
        self.error_in_line = true;
    }

    pub(crate) fn error_lexeme(&mut self, mesg: &Emsg, col: i32) {
        let name = self.scan.lexeme_name(self.scan.lexstart, self.scan.lexterm);
        self.error_symbol(mesg, &name, col);
    }

    /// Symbol-table lookup with the fatal-overflow policy attached.
    pub(crate) fn lookup_symbol(&mut self, name: &str) -> Result<usize, AssemblerFailure> {
        match self.symtab.lookup(name) {
            Ok(ix) => Ok(ix),
            Err(_) => {
                self.error_symbol(&SYMBOL_TABLE_FULL, name, self.scan.lexstart as i32);
                Err(AssemblerFailure::SymbolTableFull {
                    name: name.to_string(),
                    line: self.lineno,
                })
            }
        }
    }

    pub(crate) fn define_symbol(
        &mut self,
        name: &str,
        val: i32,
        typ: SymType,
        col: i32,
    ) -> Result<(), AssemblerFailure> {
        let outcome = match self.symtab.define(
            name,
            val,
            typ,
            self.pass,
            self.lineno,
            self.xreftab.as_mut(),
        ) {
            Ok(outcome) => outcome,
            Err(_) => {
                self.error_symbol(&SYMBOL_TABLE_FULL, name, self.scan.lexstart as i32);
                return Err(AssemblerFailure::SymbolTableFull {
                    name: name.to_string(),
                    line: self.lineno,
                });
            }
        };
        if let Some(outcome) = outcome {
            if outcome.diagnose_redefined {
                let name = self.symtab.entry(outcome.index).name.clone();
                self.error_symbol(&REDEFINED_SYMBOL, &name, col);
            }
        }
        Ok(())
    }

    pub(crate) fn define_lexeme(
        &mut self,
        start: usize,
        term: usize,
        val: i32,
        typ: SymType,
    ) -> Result<(), AssemblerFailure> {
        let name = self.scan.lexeme_name(start, term);
        self.define_symbol(&name, val, typ, start as i32)
    }

    /// Whether a conditional pseudo-op sees `styp` as defined.  On
    /// pass 2 a symbol still carrying CONDITION was defined later in
    /// the file than this point, so the conditional treats it as
    /// undefined, the same verdict pass 1 reached here.
    pub(crate) fn defined_conditionally(&self, styp: SymType) -> bool {
        match self.pass {
            Pass::One => styp.is_defined(),
            Pass::Two => styp.is_defined() && !styp.has_condition(),
        }
    }

    /// Advance the location counter one word, checking that code has
    /// not grown into a literal pool.  The field bits never change.
    pub(crate) fn increment_clc(&mut self) -> i32 {
        self.test_for_literal_collision(self.clc);
        self.clc = (self.clc & FIELD_MASK) + ((self.clc + 1) & 0o7777);
        self.fieldlc = self.clc & 0o7777;
        self.clc
    }

    /// Diagnose, once per pool, code overlapping the literal region.
    pub(crate) fn test_for_literal_collision(&mut self, loc: i32) -> bool {
        let tmppage = loc & 0o7600;
        let pagelc = loc & ADDRESS_FIELD;
        let mut result = false;
        if tmppage == 0 {
            if pagelc >= self.pz.loc() && !self.pz.error_latched() {
                self.error_message(&PZ_LITERAL_OVERFLOW, -1);
                self.pz.latch_error();
                result = true;
            }
        } else if pagelc >= self.cp.loc() && !self.cp.error_latched() {
            self.error_message(&LITERAL_OVERFLOW, -1);
            self.cp.latch_error();
            result = true;
        }
        result
    }

    /// Flush both literal pools at the end of a binary segment and
    /// settle the missing-`$` diagnostic.
    pub(crate) fn end_of_binary(&mut self) {
        self.punch_literal_pool(PoolKind::CurrentPage, self.clc - 1);
        self.punch_literal_pool(PoolKind::PageZero, 0);
        if self.error_in_line {
            self.listing.listed = true;
            // Report the missing terminator against the last real
            // location.
            self.clc = (self.clc & FIELD_MASK) + ((self.clc - 1) & 0o7777);
            self.error_message(&END_OF_FILE, -1);
            self.clc = (self.clc & FIELD_MASK) + ((self.clc + 1) & 0o7777);
        } else {
            self.list_line();
        }
    }

    /// Run one pass over the whole source.
    pub(crate) fn one_pass(&mut self) -> Result<(), AssemblerFailure> {
        loop {
            self.read_line();
            self.next_lexeme();

            let mut scanning_line = true;
            while scanning_line {
                let c = self.scan.first();
                if is_end(c) {
                    scanning_line = false;
                    continue;
                }
                match c {
                    b'/' => {
                        scanning_line = false;
                    }
                    b';' => {
                        self.next_lexeme();
                    }
                    b'$' => {
                        self.end_of_binary();
                        return Ok(());
                    }
                    b'*' => {
                        self.next_lexeme();
                        let newclc = (self.get_expr()?.val & 0o7777) | self.field;
                        // An erroneous origin expression must not
                        // move the location counter.
                        if !self.error_in_line {
                            if (newclc & 0o7600) != (self.clc & 0o7600) {
                                self.punch_literal_pool(PoolKind::CurrentPage, self.clc - 1);
                            }
                            self.clc = newclc - self.reloc;
                            self.fieldlc = self.clc & 0o7777;
                            event!(Level::DEBUG, "origin set to {:05o}", self.clc);
                            if !self.rim_mode {
                                self.punch_origin(self.clc);
                            }
                            self.print_line(0, self.fieldlc, LineStyle::LineVal);
                        }
                    }
                    _ => match self.scan.term() {
                        b',' => {
                            if c.is_ascii_alphabetic() {
                                let name = self
                                    .scan
                                    .lexeme_name(self.scan.lexstart, self.scan.lexterm);
                                // Plain lookup: a label definition is
                                // not a concordance reference.
                                let ix = self.lookup_symbol(&name)?;
                                let (styp, val, symname) = {
                                    let sym = self.symtab.entry(ix);
                                    (sym.styp, sym.val, sym.name.clone())
                                };
                                if styp.is_defined() {
                                    if val != self.clc && self.pass == Pass::Two {
                                        self.error_symbol(
                                            &DUPLICATE_LABEL,
                                            &symname,
                                            self.scan.lexstart as i32,
                                        );
                                    }
                                    let sym = self.symtab.entry_mut(ix);
                                    sym.styp = sym.styp.union(SymType::DUPLICATE);
                                }
                                self.define_lexeme(
                                    self.scan.lexstart,
                                    self.scan.lexterm,
                                    self.clc + self.reloc,
                                    SymType::LABEL,
                                )?;
                            } else {
                                self.error_lexeme(&LABEL_SYNTAX, self.scan.lexstart as i32);
                            }
                            self.next_lexeme(); // skip label
                            self.next_lexeme(); // skip comma
                        }
                        b'=' => {
                            if c.is_ascii_alphabetic() {
                                let start = self.scan.lexstart;
                                let term = self.scan.lexterm;
                                self.scan.delimiter = self.scan.term();
                                self.next_lex_blank(); // skip symbol
                                self.next_lex_blank(); // skip the =
                                let val = self.get_exprs()?;
                                self.define_lexeme(start, term, val, SymType::DEFINED)?;
                                self.print_line(0, val, LineStyle::LineVal);
                            } else {
                                self.error_lexeme(
                                    &SYMBOL_SYNTAX,
                                    self.scan.lexstartprev as i32,
                                );
                                self.next_lexeme(); // skip symbol
                                self.next_lexeme(); // skip the =
                                self.get_exprs()?; // skip expression
                            }
                        }
                        _ => {
                            if c.is_ascii_alphabetic() {
                                let ix = self.eval_symbol()?;
                                let (styp, val) = {
                                    let sym = self.symtab.entry(ix);
                                    (sym.styp, sym.val)
                                };
                                if styp.is_pseudo() {
                                    self.next_lexeme();
                                    scanning_line = self.dispatch_pseudo(val & 0o7777)?;
                                } else {
                                    let word = self.get_exprs()? & 0o7777;
                                    self.punch_out_object(self.clc, word);
                                    self.increment_clc();
                                }
                            } else {
                                let word = self.get_exprs()? & 0o7777;
                                self.punch_out_object(self.clc, word);
                                self.increment_clc();
                            }
                        }
                    },
                }
            }
        }
    }

    /// Close out pass 2 and collect the artifacts.
    pub(crate) fn finish(mut self) -> Assembly {
        // Undo NOPUNCH so the checksum lands in the real stream.
        self.object.restore();
        self.punch_checksum();
        self.punch_leader(1);
        // Undo XLIST likewise.
        self.listing.restore();

        if self.errors == 0 {
            self.listing.append("\n      No detected errors\n");
        } else {
            let noun = if self.errors == 1 { "error" } else { "errors" };
            let line = format!("\n      {} detected {}\n", self.errors, noun);
            self.listing.append(&line);
            self.errfile.push_str(&line);
        }
        event!(
            Level::INFO,
            "assembly complete: {} error(s) in pass 2",
            self.errors
        );

        if self.opts.dump_symbols {
            self.listing.print_symbol_table(&self.symtab);
        }
        let permanent = self
            .opts
            .permanent
            .then(|| self.symtab.permanent_table_text());
        if self.opts.xref {
            if let Some(xref) = self.xreftab.as_ref() {
                self.listing.print_cross_reference(&self.symtab, xref);
            }
        }

        Assembly {
            object: self.object.into_bytes(),
            listing: self.listing.into_text(),
            errors: self.errfile,
            permanent,
            error_count: self.errors,
            pass1_error_count: self.errors_pass1,
        }
    }
}

/// Assemble in-memory source text.  `filename` appears in error-file
/// lines.  The only hard failure is symbol table overflow.
pub fn assemble_source(
    filename: &str,
    body: &str,
    opts: &Options,
) -> Result<Assembly, AssemblerFailure> {
    let mut asm = Assembler::new(filename, body, opts.clone());
    {
        let span = span!(Level::ERROR, "assembly pass 1");
        let _enter = span.enter();
        asm.begin_pass(Pass::One);
        asm.one_pass()?;
        event!(
            Level::INFO,
            "pass 1 complete: {} symbols",
            asm.symtab.len()
        );
    }

    if asm.opts.xref {
        // Size the concordance arena from the pass 1 counts.
        asm.xreftab = Some(XrefTab::sized_for(&mut asm.symtab));
    }

    {
        let span = span!(Level::ERROR, "assembly pass 2");
        let _enter = span.enter();
        asm.begin_pass(Pass::Two);
        asm.punch_leader(0);
        asm.one_pass()?;
    }
    Ok(asm.finish())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), AssemblerFailure> {
    std::fs::write(path, bytes).map_err(|e| {
        AssemblerFailure::Io(IoFailed {
            action: IoAction::Write,
            target: path.to_path_buf(),
            error: e,
        })
    })
}

/// Assemble `input` and write the derived artifacts next to it:
/// `.bin`/`.rim`, `.lst`, `.err` (removed when clean) and, with
/// `-p`, `.prm`.
pub fn assemble_file(input: &Path, opts: &Options) -> Result<Assembly, AssemblerFailure> {
    let body = std::fs::read_to_string(input).map_err(|e| {
        AssemblerFailure::Io(IoFailed {
            action: IoAction::Read,
            target: input.to_path_buf(),
            error: e,
        })
    })?;
    let filename = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());

    let assembly = assemble_source(&filename, &body, opts)?;

    let object_ext = if opts.rim { "rim" } else { "bin" };
    write_bytes(&input.with_extension(object_ext), &assembly.object)?;
    write_bytes(&input.with_extension("lst"), assembly.listing.as_bytes())?;

    let err_path = input.with_extension("err");
    if assembly.clean() {
        let _ = std::fs::remove_file(&err_path);
    } else {
        write_bytes(&err_path, assembly.errors.as_bytes())?;
    }
    if let Some(perm) = &assembly.permanent {
        write_bytes(&input.with_extension("prm"), perm.as_bytes())?;
    }
    Ok(assembly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_program_is_leader_and_trailer() {
        let out = assemble_source("t.pal", "$\n", &Options::default())
            .expect("assembly should succeed");
        assert_eq!(out.object.len(), 241);
        assert!(out.object.iter().all(|&b| b == 0o200));
        assert_eq!(out.error_count, 0);
        assert!(out.clean());
    }

    #[test]
    fn test_missing_terminator_is_diagnosed() {
        let out = assemble_source("t.pal", "CLA\n", &Options::default())
            .expect("assembly should succeed");
        assert_eq!(out.error_count, 1);
        assert!(out.errors.contains("No $ at End-of-File"));
        assert!(out.listing.contains("ND no $ at EOF"));
    }

    #[test]
    fn test_error_file_line_format() {
        let out = assemble_source("t.pal", "*200\nTAD NOWHER\n$\n", &Options::default())
            .expect("assembly should succeed");
        assert_eq!(out.error_count, 1);
        assert!(
            out.errors
                .contains("t.pal(2:5)     : error:  undefined symbol \"NOWHER\" at Loc = 00200"),
            "unexpected error text: {}",
            out.errors
        );
    }

    #[test]
    fn test_exit_state_counts_pass_two_errors_only_once() {
        let out = assemble_source("t.pal", "*200\nQQQ\nQQQ\n$\n", &Options::default())
            .expect("assembly should succeed");
        assert_eq!(out.error_count, 2);
    }
}
