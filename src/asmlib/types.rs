use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io::Error as IoError;
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum IoAction {
    Read,
    Write,
}

impl Display for IoAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            IoAction::Read => "read",
            IoAction::Write => "write",
        })
    }
}

#[derive(Debug)]
pub struct IoFailed {
    pub(crate) action: IoAction,
    pub(crate) target: PathBuf,
    pub(crate) error: IoError,
}

impl Display for IoFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let IoFailed {
            action,
            target,
            error,
        } = self;
        write!(
            f,
            "I/O error: {action} failed on file {}: {error}",
            target.display()
        )
    }
}

/// Ways in which assembly can fail outright.  Ordinary source errors
/// are not failures; they are diagnosed and assembly continues, so
/// that one run reports everything wrong with the file.
#[derive(Debug)]
pub enum AssemblerFailure {
    Io(IoFailed),
    /// The symbol table is a fixed-capacity arena; running out of
    /// room leaves nothing sensible to do but stop.
    SymbolTableFull {
        name: String,
        line: usize,
    },
}

impl Display for AssemblerFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            AssemblerFailure::Io(e) => write!(f, "{e}"),
            AssemblerFailure::SymbolTableFull { name, line } => {
                write!(f, "symbol table full at line {line} (defining {name})")
            }
        }
    }
}

impl Error for AssemblerFailure {}

#[derive(Debug)]
pub enum Fail {
    AsmFail(AssemblerFailure),
    InitialisationFailure(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::AsmFail(assembler_failure) => assembler_failure.fmt(f),
            Fail::InitialisationFailure(msg) => f.write_str(msg.as_str()),
        }
    }
}

impl Error for Fail {}

/// A diagnostic message.  `list` is the short form inserted in the
/// listing (leading two-letter codes follow the PAL-III indicators
/// where one exists); `file` is the longer phrase for the error file.
pub(crate) struct Emsg {
    pub(crate) list: &'static str,
    pub(crate) file: &'static str,
}

pub(crate) const DUPLICATE_LABEL: Emsg = Emsg {
    list: "DT duplicate",
    file: "duplicate label",
};
pub(crate) const ILLEGAL_BLANK: Emsg = Emsg {
    list: "IC illegal blank",
    file: "illegal blank",
};
pub(crate) const ILLEGAL_CHARACTER: Emsg = Emsg {
    list: "IC illegal char",
    file: "illegal character",
};
pub(crate) const ILLEGAL_EXPRESSION: Emsg = Emsg {
    list: "IC in expression",
    file: "illegal expression",
};
pub(crate) const LABEL_SYNTAX: Emsg = Emsg {
    list: "IC label syntax",
    file: "label syntax",
};
pub(crate) const NOT_A_NUMBER: Emsg = Emsg {
    list: "IC numeric syntax",
    file: "numeric syntax of",
};
pub(crate) const NUMBER_NOT_RADIX: Emsg = Emsg {
    list: "IC radix",
    file: "number not in current radix",
};
pub(crate) const SYMBOL_SYNTAX: Emsg = Emsg {
    list: "IC symbol syntax",
    file: "symbol syntax",
};
pub(crate) const ILLEGAL_EQUALS: Emsg = Emsg {
    list: "IE illegal =",
    file: "illegal equals",
};
pub(crate) const ILLEGAL_INDIRECT: Emsg = Emsg {
    list: "II off page",
    file: "illegal indirect",
};
pub(crate) const ILLEGAL_REFERENCE: Emsg = Emsg {
    list: "IR off page",
    file: "illegal reference",
};
pub(crate) const UNDEFINED_SYMBOL: Emsg = Emsg {
    list: "UD undefined",
    file: "undefined symbol",
};
pub(crate) const REDEFINED_SYMBOL: Emsg = Emsg {
    list: "RD redefined",
    file: "redefined symbol",
};
pub(crate) const LITERAL_OVERFLOW: Emsg = Emsg {
    list: "PE page exceeded",
    file: "current page literal capacity exceeded",
};
pub(crate) const PZ_LITERAL_OVERFLOW: Emsg = Emsg {
    list: "ZE page exceeded",
    file: "page zero capacity exceeded",
};
pub(crate) const DUBL_OVERFLOW: Emsg = Emsg {
    list: "dubl overflow",
    file: "DUBL value overflow",
};
pub(crate) const FLTG_OVERFLOW: Emsg = Emsg {
    list: "fltg overflow",
    file: "FLTG value overflow",
};
pub(crate) const ZBLOCK_TOO_SMALL: Emsg = Emsg {
    list: "expr too small",
    file: "ZBLOCK value too small",
};
pub(crate) const ZBLOCK_TOO_LARGE: Emsg = Emsg {
    list: "expr too large",
    file: "ZBLOCK value too large",
};
pub(crate) const END_OF_FILE: Emsg = Emsg {
    list: "ND no $ at EOF",
    file: "No $ at End-of-File",
};
pub(crate) const NO_PSEUDO_OP: Emsg = Emsg {
    list: "not implemented",
    file: "not implemented pseudo-op",
};
pub(crate) const ILLEGAL_FIELD_VALUE: Emsg = Emsg {
    list: "expr out of range",
    file: "field value not in range of 0 through 7",
};
pub(crate) const LITERAL_GEN_OFF: Emsg = Emsg {
    list: "literals off",
    file: "literal generation is off",
};
pub(crate) const NO_LITERAL_VALUE: Emsg = Emsg {
    list: "no value",
    file: "no literal value",
};
pub(crate) const TEXT_STRING: Emsg = Emsg {
    list: "no delimiter",
    file: "text string delimiters not matched",
};
pub(crate) const IN_RIM_MODE: Emsg = Emsg {
    list: "not OK in rim mode",
    file: "FIELD pseudo-op not valid in RIM mode",
};
pub(crate) const LT_EXPECTED: Emsg = Emsg {
    list: "'<' expected",
    file: "'<' expected",
};
pub(crate) const SYMBOL_TABLE_FULL: Emsg = Emsg {
    list: "ST Symbol Tbl Full",
    file: "Symbol Table Full",
};
