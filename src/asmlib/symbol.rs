use std::fmt::{self, Display, Formatter};

/// Symbols keep at most this many characters; longer lexemes are
/// silently truncated, as PAL-8 did.
pub(crate) const SYMBOL_NAME_LEN: usize = 6;

/// Symbol attribute bits.
///
/// The CONDITION bit supports the conditional-assembly pseudo-ops
/// (IFDEF and friends).  It is set whenever a symbol is defined
/// during pass 1 and cleared when the defining statement re-executes
/// during pass 2.  A conditional in pass 2 treats a symbol as
/// defined only when CONDITION is clear, so a reference ahead of the
/// definition point selects the same branch in both passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SymType(u16);

impl SymType {
    pub(crate) const UNDEFINED: SymType = SymType(0o000);
    pub(crate) const DEFINED: SymType = SymType(0o001);
    pub(crate) const FIXED: SymType = SymType(0o002);
    pub(crate) const MRI: SymType = SymType(0o004 | 0o001);
    pub(crate) const LABEL: SymType = SymType(0o010 | 0o001);
    pub(crate) const REDEFINED: SymType = SymType(0o020 | 0o001);
    pub(crate) const DUPLICATE: SymType = SymType(0o040 | 0o001);
    pub(crate) const PSEUDO: SymType = SymType(0o100 | 0o002 | 0o001);
    pub(crate) const CONDITION: SymType = SymType(0o200 | 0o001);
    pub(crate) const MRIFIX: SymType = SymType(0o004 | 0o002 | 0o001);
    pub(crate) const DEFFIX: SymType = SymType(0o001 | 0o002);

    pub(crate) fn contains(self, other: SymType) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn union(self, other: SymType) -> SymType {
        SymType(self.0 | other.0)
    }

    pub(crate) fn is_defined(self) -> bool {
        self.contains(SymType::DEFINED)
    }

    pub(crate) fn is_fixed(self) -> bool {
        self.contains(SymType::FIXED)
    }

    pub(crate) fn is_mri(self) -> bool {
        self.contains(SymType::MRI)
    }

    pub(crate) fn is_label(self) -> bool {
        self.contains(SymType::LABEL)
    }

    pub(crate) fn is_pseudo(self) -> bool {
        self.contains(SymType::PSEUDO)
    }

    pub(crate) fn is_redefined(self) -> bool {
        self.contains(SymType::REDEFINED)
    }

    pub(crate) fn has_condition(self) -> bool {
        self.contains(SymType::CONDITION)
    }
}

impl Display for SymType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

/// One symbol table entry.  `xref_index` locates this symbol's slice
/// of the concordance arena; slot zero holds the definition line and
/// the following `xref_count` slots hold reference lines.
#[derive(Debug, Clone)]
pub(crate) struct Symbol {
    pub(crate) name: String,
    pub(crate) styp: SymType,
    pub(crate) val: i32,
    pub(crate) xref_index: usize,
    pub(crate) xref_count: usize,
}

impl Symbol {
    pub(crate) fn new(name: &str, styp: SymType, val: i32) -> Symbol {
        Symbol {
            name: name.to_string(),
            styp,
            val,
            xref_index: 0,
            xref_count: 0,
        }
    }
}

/// Upper-case `text` and truncate it to the symbol length limit.
pub(crate) fn symbol_name(text: &str) -> String {
    text.chars()
        .take(SYMBOL_NAME_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_name_truncates_and_upcases() {
        assert_eq!(symbol_name("expunge"), "EXPUNG");
        assert_eq!(symbol_name("Tad"), "TAD");
        assert_eq!(symbol_name(""), "");
    }

    #[test]
    fn test_type_bit_containment() {
        assert!(SymType::MRIFIX.is_mri());
        assert!(SymType::MRIFIX.is_fixed());
        assert!(SymType::PSEUDO.is_pseudo());
        assert!(SymType::PSEUDO.is_fixed());
        assert!(!SymType::LABEL.is_mri());
        assert!(SymType::LABEL.is_defined());
        assert!(!SymType::UNDEFINED.is_defined());
        assert!(SymType::CONDITION.has_condition());
        assert!(!SymType::LABEL.has_condition());
    }
}
