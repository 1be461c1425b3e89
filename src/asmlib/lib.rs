#![deny(unreachable_pub)]
#![deny(unsafe_code)]

mod directive;
mod driver;
mod eval;
mod lexer;
mod listing;
mod literals;
mod numbers;
mod output;
mod state;
mod symbol;
mod symtab;
mod types;

pub use driver::{assemble_file, assemble_source, Assembly, Options};
pub use types::{AssemblerFailure, Fail};

/// Version string reported by `-v`.
pub const RELEASE: &str = concat!("pal8as-", env!("CARGO_PKG_VERSION"));
