//! Expression evaluation.
//!
//! All binary operators bind equally and associate left; terms
//! separated by blanks combine by implicit OR, except that a term
//! following a memory reference instruction is fused into it as the
//! operand address (directly for page zero and current-page
//! addresses, through a current-page literal otherwise).

use super::driver::{Assembler, ADDRESS_FIELD, INDIRECT_BIT, PAGE_BIT};
use super::lexer::{is_blank, is_done, is_end};
use super::literals::PoolKind;
use super::state::Pass;
use super::symbol::SymType;
use super::types::*;

/// Value and attributes of an evaluated term.  The name rides along
/// for diagnostics against the term.
#[derive(Debug, Clone)]
pub(crate) struct ExprValue {
    pub(crate) val: i32,
    pub(crate) styp: SymType,
    pub(crate) name: String,
}

impl ExprValue {
    pub(crate) fn number(val: i32) -> ExprValue {
        ExprValue {
            val,
            styp: SymType::DEFINED,
            name: String::new(),
        }
    }
}

impl Assembler {
    /// Look up the current lexeme, counting the reference for the
    /// concordance.  A symbol is only counted once per source
    /// position, however many times evaluation revisits it.
    pub(crate) fn eval_symbol(&mut self) -> Result<usize, AssemblerFailure> {
        let name = self
            .scan
            .lexeme_name(self.scan.lexstart, self.scan.lexterm);
        let ix = self.lookup_symbol(&name)?;
        if self.scan.lexstart != self.last_xref_lexstart || self.lineno != self.last_xref_lineno {
            self.symtab.entry_mut(ix).xref_count += 1;
            self.last_xref_lexstart = self.scan.lexstart;
            self.last_xref_lineno = self.lineno;
            if self.pass == Pass::Two {
                if let Some(xref) = self.xreftab.as_mut() {
                    let sym = self.symtab.entry(ix);
                    xref.record(sym.xref_index + sym.xref_count, self.lineno);
                }
            }
        }
        Ok(ix)
    }

    /// Evaluate one primary: symbol, digit run in the current radix,
    /// quoted character, `.`, or a literal in brackets.
    pub(crate) fn eval(&mut self) -> Result<ExprValue, AssemblerFailure> {
        self.scan.delimiter = self.scan.term();
        let c = self.scan.first();

        if c.is_ascii_alphabetic() {
            let ix = self.eval_symbol()?;
            let result = {
                let sym = self.symtab.entry(ix);
                ExprValue {
                    val: sym.val,
                    styp: sym.styp,
                    name: sym.name.clone(),
                }
            };
            if !result.styp.is_defined() && self.pass == Pass::Two {
                let name = result.name.clone();
                self.error_symbol(&UNDEFINED_SYMBOL, &name, self.scan.lexstart as i32);
            }
            self.next_lexeme();
            return Ok(result);
        }

        if c.is_ascii_digit() {
            let radix = self.radix.radix();
            let mut val: i32 = 0;
            let mut from = self.scan.lexstart;
            while from < self.scan.lexterm {
                let ch = self.scan.ch(from);
                if ch.is_ascii_digit() {
                    let digit = (ch - b'0') as i32;
                    from += 1;
                    if digit < radix {
                        val = val.wrapping_mul(radix).wrapping_add(digit);
                    } else {
                        self.error_lexeme(&NUMBER_NOT_RADIX, from as i32 - 1);
                        val = 0;
                        from = self.scan.lexterm;
                    }
                } else {
                    self.error_lexeme(&NOT_A_NUMBER, self.scan.lexstart as i32);
                    val = 0;
                    from = self.scan.lexterm;
                }
            }
            self.next_lexeme();
            return Ok(ExprValue::number(val));
        }

        let mut val = 0;
        match c {
            b'"' => {
                // Character literal, marked up into the upper half.
                if self.scan.cc + 2 < self.scan.maxcc {
                    val = self.scan.ch(self.scan.lexstart + 1) as i32 | 0o200;
                    self.scan.delimiter = self.scan.ch(self.scan.lexstart + 2);
                    self.scan.cc = self.scan.lexstart + 2;
                } else {
                    self.error_message(&NO_LITERAL_VALUE, self.scan.lexstart as i32);
                }
                self.next_lexeme();
            }
            b'.' => {
                val = self.clc + self.reloc;
                self.next_lexeme();
            }
            b'[' => {
                // Page zero literal.
                if !self.opts.literals {
                    self.error_message(&LITERAL_GEN_OFF, self.scan.lexstart as i32);
                }
                self.next_lex_blank();
                let inner = self.get_expr()?.val & 0o7777;
                if self.scan.first() == b']' {
                    self.next_lex_blank();
                }
                let addr = if self.opts.literals {
                    self.insert_literal(PoolKind::PageZero, inner)
                } else {
                    0
                };
                return Ok(ExprValue::number(addr));
            }
            b'(' => {
                // Current page literal; the produced value is its
                // full in-field address.
                if !self.opts.literals {
                    self.error_message(&LITERAL_GEN_OFF, self.scan.lexstart as i32);
                }
                self.next_lex_blank();
                let inner = self.get_exprs()? & 0o7777;
                if self.scan.first() == b')' {
                    self.next_lex_blank();
                }
                let off = if self.opts.literals {
                    self.insert_literal(PoolKind::CurrentPage, inner)
                } else {
                    0
                };
                return Ok(ExprValue::number(off + ((self.clc + self.reloc) & 0o77600)));
            }
            b'=' => {
                self.error_message(&ILLEGAL_EQUALS, self.scan.lexstart as i32);
                self.move_to_end_of_line();
                self.next_lex_blank();
            }
            _ => {
                self.error_message(&ILLEGAL_CHARACTER, self.scan.lexstart as i32);
                self.next_lex_blank();
            }
        }
        Ok(ExprValue::number(val))
    }

    /// Evaluate an operator chain.  The expression ends at a blank,
    /// a statement terminator, or a bracket close.
    pub(crate) fn get_expr(&mut self) -> Result<ExprValue, AssemblerFailure> {
        self.scan.delimiter = self.scan.term();
        let mut acc = if self.scan.first() == b'-' {
            self.next_lex_blank();
            let mut v = self.eval()?;
            v.val = -v.val;
            v
        } else {
            self.eval()?
        };

        if is_blank(self.scan.delimiter) {
            return Ok(acc);
        }

        loop {
            if is_blank(self.scan.delimiter) {
                return Ok(acc);
            }
            match self.scan.first() {
                b'+' => {
                    self.next_lex_blank();
                    acc.val = acc.val.wrapping_add(self.eval()?.val);
                }
                b'-' => {
                    self.next_lex_blank();
                    acc.val = acc.val.wrapping_sub(self.eval()?.val);
                }
                b'^' => {
                    self.next_lex_blank();
                    acc.val = acc.val.wrapping_mul(self.eval()?.val);
                }
                b'%' => {
                    self.next_lex_blank();
                    let divisor = self.eval()?.val;
                    acc.val = if divisor == 0 { 0 } else { acc.val / divisor };
                }
                b'&' => {
                    self.next_lex_blank();
                    acc.val &= self.eval()?.val;
                }
                b'!' => {
                    self.next_lex_blank();
                    acc.val |= self.eval()?.val;
                }
                c => {
                    if is_end(c) {
                        return Ok(acc);
                    }
                    match c {
                        b'/' | b';' | b')' | b']' | b'<' => {}
                        b'=' => {
                            self.error_message(&ILLEGAL_EQUALS, self.scan.lexstart as i32);
                            self.move_to_end_of_line();
                            acc.val = 0;
                        }
                        _ => {
                            self.error_message(&ILLEGAL_EXPRESSION, self.scan.lexstart as i32);
                            self.move_to_end_of_line();
                            acc.val = 0;
                        }
                    }
                    return Ok(acc);
                }
            }
        }
    }

    /// OR together blank-separated expressions, fusing an operand
    /// address into a leading memory reference instruction.
    pub(crate) fn get_exprs(&mut self) -> Result<i32, AssemblerFailure> {
        let first = self.get_expr()?;
        let mut value = first.val;
        let value_type = first.styp;

        loop {
            let c = self.scan.first();
            if is_done(c) || c == b')' || c == b']' {
                return Ok(value);
            }

            // A blank between terms reads as logical OR.
            let term = self.get_expr()?;
            let temp = term.val & 0o7777;

            if value_type.is_mri() {
                if term.styp.is_mri() {
                    value |= temp;
                } else {
                    // This term is the operand address.
                    let here = self.fieldlc + self.reloc;
                    if temp < 0o200 {
                        value |= temp;
                    } else if (here & 0o7600) <= temp && temp <= (here | ADDRESS_FIELD) {
                        value |= PAGE_BIT | (temp & ADDRESS_FIELD);
                    } else if (value & INDIRECT_BIT) == INDIRECT_BIT {
                        // Off page but already indirect; no second
                        // level of deferral exists.
                        let name = term.name.clone();
                        self.error_symbol(
                            &ILLEGAL_INDIRECT,
                            &name,
                            self.scan.lexstartprev as i32,
                        );
                    } else if self.opts.literals {
                        let addr = self.insert_literal(PoolKind::CurrentPage, temp);
                        value |= 0o600 | addr;
                        self.indirect_generated = true;
                    } else {
                        let name = term.name.clone();
                        self.error_symbol(
                            &ILLEGAL_REFERENCE,
                            &name,
                            self.scan.lexstartprev as i32,
                        );
                        value |= temp & ADDRESS_FIELD;
                    }
                }
            } else {
                value |= temp;
            }
        }
    }
}
