use std::fmt::Write as _;

use tracing::{event, Level};

use super::directive::PSEUDO_OPS;
use super::state::Pass;
use super::symbol::{Symbol, SymType};

/// Capacity of the symbol arena.  Overflow is the assembler's only
/// fatal diagnostic.
pub(crate) const SYMBOL_TABLE_SIZE: usize = 1024;

/// The permanent symbol catalogue: memory reference instructions,
/// the floating point interpreter, the operate microinstructions and
/// the common IOT device codes.  The table is kept in lexical order
/// at run time, so entries here may appear in any order.
const PERMANENT_SYMBOLS: &[(&str, i32, SymType)] = &[
    // Memory reference instructions.
    ("AND", 0o0000, SymType::MRIFIX),
    ("TAD", 0o1000, SymType::MRIFIX),
    ("ISZ", 0o2000, SymType::MRIFIX),
    ("DCA", 0o3000, SymType::MRIFIX),
    ("I", 0o0400, SymType::MRIFIX),
    ("JMP", 0o5000, SymType::MRIFIX),
    ("JMS", 0o4000, SymType::MRIFIX),
    ("Z", 0o0000, SymType::MRIFIX),
    // Floating point interpreter instructions.
    ("FEXT", 0o0000, SymType::MRIFIX),
    ("FADD", 0o1000, SymType::MRIFIX),
    ("FSUB", 0o2000, SymType::MRIFIX),
    ("FMPY", 0o3000, SymType::MRIFIX),
    ("FDIV", 0o4000, SymType::MRIFIX),
    ("FGET", 0o5000, SymType::MRIFIX),
    ("FPUT", 0o6000, SymType::MRIFIX),
    ("FNOR", 0o7000, SymType::FIXED),
    ("SQUARE", 0o0001, SymType::FIXED),
    ("SQROOT", 0o0002, SymType::FIXED),
    // Group 1 operate microinstructions.
    ("NOP", 0o7000, SymType::FIXED),
    ("IAC", 0o7001, SymType::FIXED),
    ("RAL", 0o7004, SymType::FIXED),
    ("RTL", 0o7006, SymType::FIXED),
    ("RAR", 0o7010, SymType::FIXED),
    ("RTR", 0o7012, SymType::FIXED),
    ("CML", 0o7020, SymType::FIXED),
    ("CMA", 0o7040, SymType::FIXED),
    ("CLL", 0o7100, SymType::FIXED),
    ("CLA", 0o7200, SymType::FIXED),
    // Group 2 operate microinstructions.
    ("BSW", 0o7002, SymType::FIXED),
    ("HLT", 0o7402, SymType::FIXED),
    ("OSR", 0o7404, SymType::FIXED),
    ("SKP", 0o7410, SymType::FIXED),
    ("SNL", 0o7420, SymType::FIXED),
    ("SZL", 0o7430, SymType::FIXED),
    ("SZA", 0o7440, SymType::FIXED),
    ("SNA", 0o7450, SymType::FIXED),
    ("SMA", 0o7500, SymType::FIXED),
    ("SPA", 0o7510, SymType::FIXED),
    // Combined operate microinstructions.
    ("CIA", 0o7041, SymType::FIXED),
    ("STL", 0o7120, SymType::FIXED),
    ("GLK", 0o7204, SymType::FIXED),
    ("STA", 0o7240, SymType::FIXED),
    ("LAS", 0o7604, SymType::FIXED),
    // MQ instructions (PDP-8/e).
    ("MQL", 0o7421, SymType::FIXED),
    ("MQA", 0o7501, SymType::FIXED),
    ("SWP", 0o7521, SymType::FIXED),
    ("ACL", 0o7701, SymType::FIXED),
    // Program interrupt.
    ("IOT", 0o6000, SymType::FIXED),
    ("ION", 0o6001, SymType::FIXED),
    ("IOF", 0o6002, SymType::FIXED),
    ("SKON", 0o6000, SymType::FIXED),
    ("SRQ", 0o6003, SymType::FIXED),
    ("GTF", 0o6004, SymType::FIXED),
    ("RTF", 0o6005, SymType::FIXED),
    ("SGT", 0o6006, SymType::FIXED),
    ("CAF", 0o6007, SymType::FIXED),
    // Keyboard/reader.
    ("KSF", 0o6031, SymType::FIXED),
    ("KCC", 0o6032, SymType::FIXED),
    ("KRS", 0o6034, SymType::FIXED),
    ("KRB", 0o6036, SymType::FIXED),
    // Teleprinter/punch.
    ("TSF", 0o6041, SymType::FIXED),
    ("TCF", 0o6042, SymType::FIXED),
    ("TPC", 0o6044, SymType::FIXED),
    ("TLS", 0o6046, SymType::FIXED),
    // High speed paper tape reader.
    ("RSF", 0o6011, SymType::FIXED),
    ("RRB", 0o6012, SymType::FIXED),
    ("RFC", 0o6014, SymType::FIXED),
    // PC8-E high speed paper tape reader and punch.
    ("RPE", 0o6010, SymType::FIXED),
    ("PCE", 0o6020, SymType::FIXED),
    ("RCC", 0o6016, SymType::FIXED),
    // High speed paper tape punch.
    ("PSF", 0o6021, SymType::FIXED),
    ("PCF", 0o6022, SymType::FIXED),
    ("PPC", 0o6024, SymType::FIXED),
    ("PLS", 0o6026, SymType::FIXED),
    // DECtape transport TU55 / control TC01.
    ("DTRA", 0o6761, SymType::FIXED),
    ("DTCA", 0o6762, SymType::FIXED),
    ("DTXA", 0o6764, SymType::FIXED),
    ("DTLA", 0o6766, SymType::FIXED),
    ("DTSF", 0o6771, SymType::FIXED),
    ("DTRB", 0o6772, SymType::FIXED),
    ("DTLB", 0o6774, SymType::FIXED),
    // Disk file and control, DF32.
    ("DCMA", 0o6601, SymType::FIXED),
    ("DMAR", 0o6603, SymType::FIXED),
    ("DMAW", 0o6605, SymType::FIXED),
    ("DCEA", 0o6611, SymType::FIXED),
    ("DSAC", 0o6612, SymType::FIXED),
    ("DEAL", 0o6615, SymType::FIXED),
    ("DEAC", 0o6616, SymType::FIXED),
    ("DFSE", 0o6621, SymType::FIXED),
    ("DFSC", 0o6622, SymType::FIXED),
    ("DMAC", 0o6626, SymType::FIXED),
    // Disk file and control, RF08.
    ("DCIM", 0o6611, SymType::FIXED),
    ("DIML", 0o6615, SymType::FIXED),
    ("DIMA", 0o6616, SymType::FIXED),
    ("DISK", 0o6623, SymType::FIXED),
    ("DCXA", 0o6641, SymType::FIXED),
    ("DXAL", 0o6643, SymType::FIXED),
    ("DXAC", 0o6645, SymType::FIXED),
    ("DMMT", 0o6646, SymType::FIXED),
    // Memory extension control, type 183.
    ("CDF", 0o6201, SymType::FIXED),
    ("CIF", 0o6202, SymType::FIXED),
    ("CDI", 0o6203, SymType::FIXED),
    ("RDF", 0o6214, SymType::FIXED),
    ("RIF", 0o6224, SymType::FIXED),
    ("RIB", 0o6234, SymType::FIXED),
    ("RMF", 0o6224, SymType::FIXED),
    // Memory parity, MP8/I.
    ("SMP", 0o6101, SymType::FIXED),
    ("CMP", 0o6104, SymType::FIXED),
    // Memory parity, MP8-E.
    ("DPI", 0o6100, SymType::FIXED),
    ("SNP", 0o6101, SymType::FIXED),
    ("EPI", 0o6103, SymType::FIXED),
    ("CNP", 0o6104, SymType::FIXED),
    ("CEP", 0o6106, SymType::FIXED),
    ("SPO", 0o6107, SymType::FIXED),
    // Data communication systems, type 680I.
    ("TTINCR", 0o6401, SymType::FIXED),
    ("TTI", 0o6402, SymType::FIXED),
    ("TTO", 0o6404, SymType::FIXED),
    ("TTCL", 0o6411, SymType::FIXED),
    ("TTSL", 0o6412, SymType::FIXED),
    ("TTRL", 0o6414, SymType::FIXED),
    ("TTSKP", 0o6421, SymType::FIXED),
    ("TTXON", 0o6424, SymType::FIXED),
    ("TTXOF", 0o6422, SymType::FIXED),
];

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TableFull;

#[derive(Debug)]
pub(crate) struct DefineOutcome {
    pub(crate) index: usize,
    /// True when the symbol had already been redefined once; the
    /// caller diagnoses `redefined symbol`.
    pub(crate) diagnose_redefined: bool,
}

/// The symbol table: a flat arena of records kept sorted by name.
/// The first `fixed_count` entries are the permanent prefix; user
/// symbols live in the (also sorted) suffix.  Lookups search the two
/// regions in turn; a miss inserts an UNDEFINED entry in place.
#[derive(Debug)]
pub(crate) struct SymbolTable {
    entries: Vec<Symbol>,
    fixed_count: usize,
}

impl SymbolTable {
    /// A table holding the pseudo-op entries and the permanent
    /// symbol catalogue, all marked FIXED.
    pub(crate) fn seeded() -> SymbolTable {
        let mut table = SymbolTable {
            entries: Vec::with_capacity(SYMBOL_TABLE_SIZE / 4),
            fixed_count: 0,
        };
        table.seed_pseudo_ops();
        for (name, val, styp) in PERMANENT_SYMBOLS {
            table.seed(name, *val, styp.union(SymType::DEFFIX));
        }
        table.fixed_count = table.entries.len();
        table
    }

    fn seed(&mut self, name: &str, val: i32, styp: SymType) {
        match self.search(name, 0, self.entries.len()) {
            Ok(ix) => {
                // Duplicates in the catalogue keep their first
                // (fixed) definition.
                if !self.entries[ix].styp.is_fixed() {
                    self.entries[ix].val = val & 0o7777;
                    self.entries[ix].styp = styp;
                }
            }
            Err(ins) => {
                self.entries.insert(ins, Symbol::new(name, styp, val & 0o7777));
            }
        }
    }

    fn seed_pseudo_ops(&mut self) {
        for (name, op) in PSEUDO_OPS {
            self.seed(name, op.code(), SymType::PSEUDO);
        }
    }

    fn search(&self, name: &str, lo: usize, hi: usize) -> Result<usize, usize> {
        self.entries[lo..hi]
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .map(|i| i + lo)
            .map_err(|i| i + lo)
    }

    /// Find `name`, entering it as UNDEFINED if absent.
    pub(crate) fn lookup(&mut self, name: &str) -> Result<usize, TableFull> {
        if let Ok(ix) = self.search(name, 0, self.fixed_count) {
            return Ok(ix);
        }
        match self.search(name, self.fixed_count, self.entries.len()) {
            Ok(ix) => Ok(ix),
            Err(ins) => {
                if self.entries.len() + 1 >= SYMBOL_TABLE_SIZE {
                    return Err(TableFull);
                }
                self.entries
                    .insert(ins, Symbol::new(name, SymType::UNDEFINED, 0));
                Ok(ins)
            }
        }
    }

    /// Define `name`.  Permanent symbols are left untouched.  A pass
    /// 2 redefinition at a new value marks the symbol REDEFINED; the
    /// second such redefinition is reported back for diagnosis.
    /// Label values keep their field bits; all other definitions are
    /// masked to 12 bits.  Pass 1 definitions also set CONDITION;
    /// pass 2 definitions clear it.
    pub(crate) fn define(
        &mut self,
        name: &str,
        val: i32,
        typ: SymType,
        pass: Pass,
        lineno: usize,
        xref: Option<&mut XrefTab>,
    ) -> Result<Option<DefineOutcome>, TableFull> {
        if name.is_empty() {
            return Ok(None);
        }
        let index = self.lookup(name)?;
        if self.entries[index].styp.is_fixed() {
            return Ok(Some(DefineOutcome {
                index,
                diagnose_redefined: false,
            }));
        }

        let mut typ = typ;
        let mut diagnose_redefined = false;
        let mut xref_count = 0;
        {
            let sym = &mut self.entries[index];
            if sym.styp.is_defined() && pass == Pass::Two && sym.val != val {
                if sym.styp.is_redefined() {
                    diagnose_redefined = true;
                }
                typ = typ.union(SymType::REDEFINED);
                sym.xref_count += 1;
                xref_count = sym.xref_count;
            }
        }

        if pass == Pass::Two {
            if let Some(xref) = xref {
                // Slot zero of the symbol's region is the definition
                // line; a definition is not counted as a reference.
                let base = self.entries[index].xref_index;
                xref.record(base, lineno);
                xref.record(base + xref_count, lineno);
            }
        }

        let sym = &mut self.entries[index];
        sym.val = if typ == SymType::LABEL { val } else { val & 0o7777 };
        sym.styp = if pass == Pass::One {
            typ.union(SymType::CONDITION)
        } else {
            typ
        };
        Ok(Some(DefineOutcome {
            index,
            diagnose_redefined,
        }))
    }

    /// FIXTAB: promote every current entry to FIXED, advance the
    /// permanent watermark and restore full lexical order.
    pub(crate) fn fixtab(&mut self) {
        for e in self.entries.iter_mut() {
            e.styp = e.styp.union(SymType::FIXED);
        }
        self.entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.fixed_count = self.entries.len();
        event!(
            Level::DEBUG,
            "FIXTAB: {} symbols now permanent",
            self.fixed_count
        );
    }

    /// EXPUNGE: reset the table to just the pseudo-op seed.
    pub(crate) fn expunge(&mut self) {
        self.entries.clear();
        self.fixed_count = 0;
        self.seed_pseudo_ops();
        self.fixed_count = self.entries.len();
        event!(
            Level::DEBUG,
            "EXPUNGE: table reset to {} pseudo-ops",
            self.fixed_count
        );
    }

    pub(crate) fn entry(&self, index: usize) -> &Symbol {
        &self.entries[index]
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> &mut Symbol {
        &mut self.entries[index]
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn fixed_count(&self) -> usize {
        self.fixed_count
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Symbol> {
        self.entries.iter_mut()
    }

    /// Text of a `.prm` file which, assembled after nothing at all,
    /// recreates the current permanent table: an EXPUNGE, a FIXMRI
    /// line per memory reference instruction, a plain assignment per
    /// other fixed symbol and a closing FIXTAB.
    pub(crate) fn permanent_table_text(&self) -> String {
        let mut out = String::new();
        out.push_str("/ PERMANENT SYMBOL TABLE\n/\n");
        out.push_str("        EXPUNGE\n/\n");
        for e in self.entries.iter() {
            if e.styp.is_mri() {
                let _ = writeln!(out, "{:<7} {}={:04o}", "FIXMRI", e.name, e.val);
            }
        }
        for e in self.entries.iter() {
            if e.styp.is_fixed() && !e.styp.is_mri() && !e.styp.is_pseudo() {
                let _ = writeln!(out, "{:<7} {}={:04o}", " ", e.name, e.val);
            }
        }
        out.push_str("/\n        FIXTAB\n");
        out
    }
}

/// The concordance arena.  It is sized between the passes from the
/// reference counts collected in pass 1 and populated in pass 2.
#[derive(Debug)]
pub(crate) struct XrefTab {
    slots: Vec<usize>,
}

impl XrefTab {
    /// Assign each symbol its slice of the arena (count + 1 slots,
    /// slot zero for the definition line) and clear the counts for
    /// pass 2.
    pub(crate) fn sized_for(symtab: &mut SymbolTable) -> XrefTab {
        let mut space = 0;
        for sym in symtab.iter_mut() {
            sym.xref_index = space;
            space += sym.xref_count + 1;
            sym.xref_count = 0;
        }
        XrefTab {
            slots: vec![0; space],
        }
    }

    pub(crate) fn record(&mut self, slot: usize, lineno: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = lineno;
        }
    }

    pub(crate) fn get(&self, slot: usize) -> usize {
        self.slots.get(slot).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_sorted(t: &SymbolTable) -> bool {
        t.entries.windows(2).all(|w| w[0].name <= w[1].name)
    }

    #[test]
    fn test_seeded_table_is_sorted_and_fixed() {
        let t = SymbolTable::seeded();
        assert!(names_sorted(&t));
        assert_eq!(t.fixed_count(), t.len());
        assert!(t.iter().all(|s| s.styp.is_fixed()));
    }

    #[test]
    fn test_seeded_table_knows_the_basics() {
        let mut t = SymbolTable::seeded();
        let tad = t.lookup("TAD").expect("TAD should be present");
        assert_eq!(t.entry(tad).val, 0o1000);
        assert!(t.entry(tad).styp.is_mri());
        let cla = t.lookup("CLA").expect("CLA should be present");
        assert_eq!(t.entry(cla).val, 0o7200);
        assert!(!t.entry(cla).styp.is_mri());
        let page = t.lookup("PAGE").expect("PAGE should be present");
        assert!(t.entry(page).styp.is_pseudo());
    }

    #[test]
    fn test_lookup_inserts_undefined_in_order() {
        let mut t = SymbolTable::seeded();
        let before = t.len();
        let ix = t.lookup("QQQ").expect("insert should succeed");
        assert_eq!(t.len(), before + 1);
        assert!(!t.entry(ix).styp.is_defined());
        t.lookup("AAA").expect("insert should succeed");
        t.lookup("ZZZ").expect("insert should succeed");
        assert!(names_sorted(&t));
        // Repeated lookup must not insert again.
        let n = t.len();
        t.lookup("QQQ").expect("lookup should succeed");
        assert_eq!(t.len(), n);
    }

    #[test]
    fn test_define_masks_and_sets_condition_on_pass_1() {
        let mut t = SymbolTable::seeded();
        let out = t
            .define("FOO", 0o17777, SymType::DEFINED, Pass::One, 1, None)
            .expect("define should succeed")
            .expect("FOO is not empty");
        let sym = t.entry(out.index);
        assert_eq!(sym.val, 0o7777);
        assert!(sym.styp.has_condition());
    }

    #[test]
    fn test_label_values_keep_field_bits() {
        let mut t = SymbolTable::seeded();
        let out = t
            .define("LBL", 0o10200, SymType::LABEL, Pass::Two, 1, None)
            .expect("define should succeed")
            .expect("LBL is not empty");
        assert_eq!(t.entry(out.index).val, 0o10200);
        assert!(!t.entry(out.index).styp.has_condition());
    }

    #[test]
    fn test_permanent_symbols_cannot_be_redefined() {
        let mut t = SymbolTable::seeded();
        let out = t
            .define("CLA", 0o1234, SymType::DEFINED, Pass::Two, 1, None)
            .expect("define should succeed")
            .expect("CLA is not empty");
        assert_eq!(t.entry(out.index).val, 0o7200);
    }

    #[test]
    fn test_second_redefinition_is_diagnosed() {
        let mut t = SymbolTable::seeded();
        // Pass 1 leaves A at its final value, 6.
        t.define("A", 5, SymType::DEFINED, Pass::One, 1, None)
            .unwrap();
        t.define("A", 6, SymType::DEFINED, Pass::One, 2, None)
            .unwrap();
        // Pass 2 sees 5 first (differs from 6): marked, no report.
        let first = t
            .define("A", 5, SymType::DEFINED, Pass::Two, 1, None)
            .unwrap()
            .unwrap();
        assert!(!first.diagnose_redefined);
        assert!(t.entry(first.index).styp.is_redefined());
        // The second pass 2 redefinition reports.
        let second = t
            .define("A", 6, SymType::DEFINED, Pass::Two, 2, None)
            .unwrap()
            .unwrap();
        assert!(second.diagnose_redefined);
        assert_eq!(t.entry(second.index).val, 6);
    }

    #[test]
    fn test_fixtab_then_expunge() {
        let mut t = SymbolTable::seeded();
        t.define("USR", 0o123, SymType::DEFINED, Pass::One, 1, None)
            .unwrap();
        assert!(t.fixed_count() < t.len());
        t.fixtab();
        assert_eq!(t.fixed_count(), t.len());
        assert!(names_sorted(&t));
        let usr = t.lookup("USR").unwrap();
        assert!(t.entry(usr).styp.is_fixed());
        t.expunge();
        assert!(t.lookup("TAD").is_ok());
        // TAD was expunged with everything else, so it came back as
        // a fresh UNDEFINED user symbol.
        let tad = t.lookup("TAD").unwrap();
        assert!(!t.entry(tad).styp.is_defined());
        let page = t.lookup("PAGE").unwrap();
        assert!(t.entry(page).styp.is_pseudo());
    }

    #[test]
    fn test_xref_arena_layout() {
        let mut t = SymbolTable::seeded();
        let a = t.lookup("AA").unwrap();
        t.entry_mut(a).xref_count = 3;
        let b = t.lookup("BB").unwrap();
        t.entry_mut(b).xref_count = 1;
        let x = XrefTab::sized_for(&mut t);
        let a = t.lookup("AA").unwrap();
        let b = t.lookup("BB").unwrap();
        assert_eq!(t.entry(a).xref_count, 0);
        assert_eq!(t.entry(b).xref_index, t.entry(a).xref_index + 4);
        // Every fixed symbol gets one slot for its definition line.
        assert_eq!(x.slots.len(), t.len() + 3 + 1);
    }

    #[test]
    fn test_table_overflow_is_reported() {
        let mut t = SymbolTable::seeded();
        let mut result = Ok(0);
        for i in 0.. {
            result = t.lookup(&format!("U{i:04}"));
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(TableFull));
        assert!(t.len() < SYMBOL_TABLE_SIZE);
    }

    #[test]
    fn test_permanent_table_text_shape() {
        let t = SymbolTable::seeded();
        let text = t.permanent_table_text();
        assert!(text.starts_with("/ PERMANENT SYMBOL TABLE\n/\n        EXPUNGE\n/\n"));
        assert!(text.ends_with("/\n        FIXTAB\n"));
        assert!(text.contains("FIXMRI  TAD=1000\n"));
        assert!(text.contains("FIXMRI  JMP=5000\n"));
        assert!(text.contains("        CLA=7200\n"));
        assert!(text.contains("        HLT=7402\n"));
        // Pseudo-ops are recreated by the EXPUNGE, not listed.
        assert!(!text.contains("OCTAL="));
    }
}
