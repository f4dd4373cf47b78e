//! livedoc CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`. Errors are
//! reported as a JSON line on stdout and as text on stderr, and the
//! process exits non-zero.

use livedoc::cli;

fn main() {
    if let Err(e) = cli::run() {
        let _ = cli::write_error(e.code_str(), e.message());
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
