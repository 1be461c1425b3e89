//! The pseudo-op dispatch and handlers.

use tracing::{event, Level};

use super::driver::Assembler;
use super::lexer::{is_done, is_end};
use super::literals::PoolKind;
use super::state::{NumeralMode, Pass};
use super::symbol::SymType;
use super::types::*;

/// Every directive.  The discriminant is the value stored in the
/// directive's symbol table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pseudo {
    Bank = 0,
    Binpunch,
    Decimal,
    Dubl,
    Eject,
    Enpunch,
    Expunge,
    Field,
    Fixmri,
    Fixtab,
    Fltg,
    Ifdef,
    Ifndef,
    Ifnzero,
    Ifzero,
    Nopunch,
    Octal,
    Page,
    Pause,
    Reloc,
    Rimpunch,
    Segmnt,
    Text,
    Title,
    Xlist,
    Zblock,
}

impl Pseudo {
    pub(crate) fn code(self) -> i32 {
        self as i32
    }

    fn from_code(code: i32) -> Option<Pseudo> {
        use Pseudo::*;
        Some(match code {
            0 => Bank,
            1 => Binpunch,
            2 => Decimal,
            3 => Dubl,
            4 => Eject,
            5 => Enpunch,
            6 => Expunge,
            7 => Field,
            8 => Fixmri,
            9 => Fixtab,
            10 => Fltg,
            11 => Ifdef,
            12 => Ifndef,
            13 => Ifnzero,
            14 => Ifzero,
            15 => Nopunch,
            16 => Octal,
            17 => Page,
            18 => Pause,
            19 => Reloc,
            20 => Rimpunch,
            21 => Segmnt,
            22 => Text,
            23 => Title,
            24 => Xlist,
            25 => Zblock,
            _ => return None,
        })
    }
}

/// Seed entries for the directive names.  Like any symbol the names
/// are capped at six characters.
pub(crate) const PSEUDO_OPS: &[(&str, Pseudo)] = &[
    ("BANK", Pseudo::Bank),
    ("BINPUN", Pseudo::Binpunch),
    ("DECIMA", Pseudo::Decimal),
    ("DUBL", Pseudo::Dubl),
    ("EJECT", Pseudo::Eject),
    ("ENPUNC", Pseudo::Enpunch),
    ("EXPUNG", Pseudo::Expunge),
    ("FIELD", Pseudo::Field),
    ("FIXMRI", Pseudo::Fixmri),
    ("FIXTAB", Pseudo::Fixtab),
    ("FLTG", Pseudo::Fltg),
    ("IFDEF", Pseudo::Ifdef),
    ("IFNDEF", Pseudo::Ifndef),
    ("IFNZER", Pseudo::Ifnzero),
    ("IFZERO", Pseudo::Ifzero),
    ("NOPUNC", Pseudo::Nopunch),
    ("OCTAL", Pseudo::Octal),
    ("PAGE", Pseudo::Page),
    ("PAUSE", Pseudo::Pause),
    ("RELOC", Pseudo::Reloc),
    ("RIMPUN", Pseudo::Rimpunch),
    ("SEGMNT", Pseudo::Segmnt),
    ("TEXT", Pseudo::Text),
    ("TITLE", Pseudo::Title),
    ("XLIST", Pseudo::Xlist),
    ("ZBLOCK", Pseudo::Zblock),
];

impl Assembler {
    /// Handle one directive.  Returns false when the rest of the
    /// line must not be scanned (EJECT forces a fresh line).
    pub(crate) fn dispatch_pseudo(&mut self, code: i32) -> Result<bool, AssemblerFailure> {
        let Some(op) = Pseudo::from_code(code) else {
            return Ok(true);
        };
        match op {
            Pseudo::Bank => {
                // Selecting 32 KW out of 128 KW is not implemented.
                self.error_symbol(&NO_PSEUDO_OP, "BANK", self.scan.lexstartprev as i32);
            }

            Pseudo::Binpunch => {
                // Close out a RIM section before switching to BIN.
                if self.data_emitted && self.rim_mode {
                    let leaderlen = if is_done(self.scan.first()) {
                        8
                    } else {
                        self.get_expr()?.val
                    };
                    event!(Level::INFO, "switching from RIM to BIN output");
                    self.cp.reset();
                    self.pz.reset();
                    self.punch_leader(leaderlen);
                    self.checksum = 0;
                    self.data_emitted = false;
                }
                self.rim_mode = false;
            }

            Pseudo::Decimal => {
                self.radix = NumeralMode::Decimal;
            }

            Pseudo::Octal => {
                self.radix = NumeralMode::Octal;
            }

            Pseudo::Dubl => {
                self.input_dubl();
            }

            Pseudo::Fltg => {
                self.input_fltg();
            }

            Pseudo::Eject => {
                self.listing.force_page_break();
                return Ok(false);
            }

            Pseudo::Enpunch => {
                if self.pass == Pass::Two {
                    self.object.restore();
                }
            }

            Pseudo::Nopunch => {
                if self.pass == Pass::Two {
                    self.object.suppress();
                }
            }

            Pseudo::Expunge => {
                // Pass 2 needs the symbols collected after this
                // point in pass 1, so the wipe happens once.
                if self.pass == Pass::One {
                    self.symtab.expunge();
                }
            }

            Pseudo::Field => {
                self.punch_literal_pool(PoolKind::CurrentPage, self.clc - 1);
                self.punch_literal_pool(PoolKind::PageZero, 0);
                let lexstartsave = self.scan.lexstartprev as i32;
                let newfield = if is_done(self.scan.first()) {
                    (self.field >> 12) + 1
                } else {
                    self.get_expr()?.val
                };
                if self.rim_mode {
                    self.error_message(&IN_RIM_MODE, lexstartsave);
                } else if !(0..=7).contains(&newfield) {
                    self.error_message(&ILLEGAL_FIELD_VALUE, self.scan.lexstartprev as i32);
                } else {
                    let byte = ((newfield & 0o7) << 3) | 0o300;
                    self.punch_object(byte);
                    // Field settings ride outside the checksum.
                    self.checksum -= byte;
                    self.field = newfield << 12;
                    event!(Level::INFO, "field change to {newfield}");
                }
                self.clc = 0o200 | self.field;
                self.fieldlc = self.clc & 0o7777;
                if !self.rim_mode {
                    self.punch_origin(self.clc);
                }
            }

            Pseudo::Fixmri => {
                if self.scan.term() == b'=' && self.scan.first().is_ascii_alphabetic() {
                    let start = self.scan.lexstart;
                    let term = self.scan.lexterm;
                    self.next_lexeme(); // skip symbol
                    self.next_lexeme(); // skip the =
                    let val = self.get_exprs()?;
                    self.define_lexeme(start, term, val, SymType::MRI)?;
                } else {
                    self.error_lexeme(&SYMBOL_SYNTAX, self.scan.lexstart as i32);
                    self.next_lexeme();
                    self.next_lexeme();
                    self.get_exprs()?;
                }
            }

            Pseudo::Fixtab => {
                self.symtab.fixtab();
            }

            Pseudo::Ifdef => {
                if self.scan.first().is_ascii_alphabetic() {
                    let ix = self.eval_symbol()?;
                    let styp = self.symtab.entry(ix).styp;
                    self.next_lexeme();
                    if self.defined_conditionally(styp) {
                        self.condition_true();
                    } else {
                        self.condition_false();
                    }
                } else {
                    self.error_lexeme(&LABEL_SYNTAX, self.scan.lexstart as i32);
                }
            }

            Pseudo::Ifndef => {
                if self.scan.first().is_ascii_alphabetic() {
                    let ix = self.eval_symbol()?;
                    let styp = self.symtab.entry(ix).styp;
                    self.next_lexeme();
                    if self.defined_conditionally(styp) {
                        self.condition_false();
                    } else {
                        self.condition_true();
                    }
                } else {
                    self.error_lexeme(&LABEL_SYNTAX, self.scan.lexstart as i32);
                }
            }

            Pseudo::Ifnzero => {
                if self.get_expr()?.val == 0 {
                    self.condition_false();
                } else {
                    self.condition_true();
                }
            }

            Pseudo::Ifzero => {
                if self.get_expr()?.val == 0 {
                    self.condition_true();
                } else {
                    self.condition_false();
                }
            }

            Pseudo::Page => {
                self.punch_literal_pool(PoolKind::CurrentPage, self.clc - 1);
                let oldclc = self.clc;
                if is_done(self.scan.first()) {
                    // Round up to the next page boundary.
                    self.clc = (self.clc + 0o177) & 0o77600;
                } else {
                    let value = self.get_expr()?.val;
                    self.clc = self.field | ((value & 0o37) << 7);
                }
                self.fieldlc = self.clc & 0o7777;
                self.test_for_literal_collision(self.clc);
                if !self.rim_mode && self.clc != oldclc {
                    self.punch_origin(self.clc);
                }
            }

            Pseudo::Segmnt => {
                self.punch_literal_pool(PoolKind::CurrentPage, self.clc - 1);
                if is_done(self.scan.first()) {
                    // Advance to the next 1 KW boundary.
                    self.fieldlc = ((self.fieldlc & 0o6000) + 0o2000) & 0o7777;
                } else {
                    let value = self.get_expr()?.val;
                    self.fieldlc = (value & 0o3) << 10;
                }
                self.clc = self.field | self.fieldlc;
                if !self.rim_mode {
                    self.punch_origin(self.clc);
                }
                self.test_for_literal_collision(self.clc);
            }

            Pseudo::Pause => {}

            Pseudo::Reloc => {
                if is_done(self.scan.first()) {
                    self.reloc = 0;
                } else {
                    let value = self.get_expr()?.val;
                    self.reloc = value - (self.clc + self.reloc);
                }
                event!(Level::DEBUG, "relocation distance now {:o}", self.reloc);
            }

            Pseudo::Rimpunch => {
                // Close out the BIN section already punched, then
                // switch.  A leader length of -1 also suppresses the
                // section checksum.
                if self.data_emitted && !self.rim_mode {
                    let leaderlen = if is_done(self.scan.first()) {
                        8
                    } else {
                        self.get_expr()?.val
                    };
                    event!(Level::INFO, "switching from BIN to RIM output");
                    self.end_of_binary();
                    if leaderlen != -1 {
                        self.punch_checksum();
                    }
                    self.punch_leader(leaderlen);
                }
                self.rim_mode = true;
            }

            Pseudo::Text => self.pseudo_text(),

            Pseudo::Title => self.pseudo_title(),

            Pseudo::Xlist => {
                if is_done(self.scan.first()) {
                    self.listing.toggle();
                } else if self.get_expr()?.val == 0 {
                    self.listing.disable();
                } else {
                    self.listing.enable();
                }
            }

            Pseudo::Zblock => {
                let value = self.get_expr()?.val;
                if value < 0 {
                    self.error_message(&ZBLOCK_TOO_SMALL, self.scan.lexstartprev as i32);
                } else if value + (self.clc & 0o7777) - 1 > 0o7777 {
                    self.error_message(&ZBLOCK_TOO_LARGE, self.scan.lexstartprev as i32);
                } else {
                    for _ in 0..value {
                        self.punch_out_object(self.clc, 0);
                        self.increment_clc();
                    }
                }
            }
        }
        Ok(true)
    }

    /// TEXT: pack six-bit trimmed ASCII two characters to a word.
    /// An odd character lands in the high half of a final word; an
    /// even-length string gains a zero terminator word.
    fn pseudo_text(&mut self) {
        let delim = self.scan.first();
        let mut pack: i32 = 0;
        let mut count = 0;
        let mut index = self.scan.lexstart + 1;
        while self.scan.ch(index) != delim && !is_end(self.scan.ch(index)) {
            pack = ((pack << 6) | (self.scan.ch(index) as i32 & 0o77)) & 0o7777;
            count += 1;
            if count > 1 {
                self.punch_out_object(self.clc, pack);
                self.increment_clc();
                count = 0;
                pack = 0;
            }
            index += 1;
        }
        if count != 0 {
            self.punch_out_object(self.clc, (pack << 6) & 0o7777);
            self.increment_clc();
        } else {
            self.punch_out_object(self.clc, 0);
            self.increment_clc();
        }

        if is_end(self.scan.ch(index)) {
            self.scan.cc = index;
            self.scan.lexterm = index;
            self.error_message(&TEXT_STRING, index as i32);
        } else {
            self.scan.cc = index + 1;
            self.scan.lexterm = index + 1;
        }
        self.next_lexeme();
    }

    /// TITLE: a delimited string becomes the listing title; a
    /// doubled delimiter inside the string escapes itself.
    fn pseudo_title(&mut self) {
        let delim = self.scan.first();
        let mut ix = self.scan.lexstart + 1;
        let mut title = String::new();
        let mut closed = false;
        while !is_end(self.scan.ch(ix)) {
            let c = self.scan.ch(ix);
            if c == delim {
                if self.scan.ch(ix + 1) == delim {
                    title.push(delim as char);
                    ix += 2;
                    continue;
                }
                closed = true;
                break;
            }
            title.push(c as char);
            ix += 1;
        }
        if closed {
            self.scan.cc = ix + 1;
            self.scan.lexterm = ix + 1;
            self.listing.set_title(&title);
        } else {
            self.scan.cc = ix;
            self.scan.lexterm = ix;
            self.error_message(&TEXT_STRING, ix as i32);
        }
        self.next_lexeme();
    }

    /// The conditional held: step over the opening `<` and resume
    /// normal assembly inside the block.
    fn condition_true(&mut self) {
        if self.scan.first() == b'<' {
            self.next_lexeme();
        } else {
            self.error_message(&LT_EXPECTED, self.scan.lexstart as i32);
        }
    }

    /// The conditional failed: discard everything to the matching
    /// `>`, across line boundaries, counting nesting.  A `$` ends
    /// the skip unconditionally.
    fn condition_false(&mut self) {
        if self.scan.first() == b'<' {
            let mut level = 1;
            while level > 0 {
                if is_end(self.scan.ch(self.scan.cc)) {
                    self.read_line();
                } else {
                    match self.scan.ch(self.scan.cc) {
                        b'>' => {
                            level -= 1;
                            self.scan.cc += 1;
                        }
                        b'<' => {
                            level += 1;
                            self.scan.cc += 1;
                        }
                        b'$' => {
                            level = 0;
                            self.scan.cc += 1;
                        }
                        _ => {
                            self.scan.cc += 1;
                        }
                    }
                }
            }
            self.next_lexeme();
        } else {
            self.error_message(&LT_EXPECTED, self.scan.lexstart as i32);
        }
    }
}
