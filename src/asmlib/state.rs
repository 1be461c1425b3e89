use std::fmt::{self, Display, Formatter};

/// Which of the two assembly passes is running.  Pass one collects
/// symbol definitions and reference counts; pass two emits the
/// object stream, the listing, and the diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    One,
    Two,
}

impl Display for Pass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pass::One => "pass 1",
            Pass::Two => "pass 2",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumeralMode {
    Octal,
    Decimal,
}

impl NumeralMode {
    pub(crate) fn radix(&self) -> i32 {
        match self {
            NumeralMode::Octal => 8,
            NumeralMode::Decimal => 10,
        }
    }
}

// defeat derivable_impls here because if we simply derive Default
// it's unclear which value we get as the default.
#[allow(clippy::derivable_impls)]
impl Default for NumeralMode {
    fn default() -> NumeralMode {
        NumeralMode::Octal
    }
}
