use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use pal8as::*;

/// A PAL-dialect cross-assembler for the PDP-8
#[derive(Parser, Debug)]
#[clap(about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// File from which assembly source is read
    input: PathBuf,

    /// Dump the user symbol table at end of assembly
    #[clap(short = 'd')]
    dump_symbols: bool,

    /// Allow generation of literals
    #[clap(short = 'l')]
    literals: bool,

    /// Write the permanent symbol table to a .prm file
    #[clap(short = 'p')]
    permanent: bool,

    /// Produce output in RIM format (default is BIN)
    #[clap(short = 'r')]
    rim: bool,

    /// Generate a cross-reference (concordance) of user symbols
    #[clap(short = 'x')]
    xref: bool,

    /// Display the version and exit
    #[clap(short = 'v')]
    version: bool,
}

fn run_assembler() -> Result<usize, Fail> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage and version requests exit non-zero, as the
            // original assembler did.
            let _ = e.print();
            return Ok(1);
        }
    };
    if cli.version {
        eprintln!("{RELEASE}");
        return Ok(1);
    }

    // See
    // https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
    {
        Err(e) => {
            return Err(Fail::InitialisationFailure(format!(
                "failed to initialise tracing filter (perhaps there is a problem with environment variables): {}",
                e
            )));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let options = Options {
        dump_symbols: cli.dump_symbols,
        literals: cli.literals,
        permanent: cli.permanent,
        rim: cli.rim,
        xref: cli.xref,
    };

    let span = span!(Level::ERROR, "assemble", input=?cli.input);
    let _enter = span.enter();
    match assemble_file(&cli.input, &options) {
        Ok(assembly) => {
            if assembly.error_count > 0 {
                let noun = if assembly.error_count == 1 {
                    "error"
                } else {
                    "errors"
                };
                eprintln!("      {} detected {}", assembly.error_count, noun);
            }
            event!(
                Level::INFO,
                "assembly finished with {} error(s)",
                assembly.error_count
            );
            Ok(assembly.error_count)
        }
        Err(e) => {
            event!(Level::ERROR, "assembly failed: {:?}", e);
            Err(Fail::AsmFail(e))
        }
    }
}

fn main() -> ExitCode {
    match run_assembler() {
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
    }
}
