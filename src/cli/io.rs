//! JSON output for the CLI
//!
//! - One JSON object per line on stdout
//! - Errors as `{"status": "error", "code", "message"}`

use std::io::{self, Write};

use serde_json::Value;

use super::errors::CliResult;

/// Write one JSON line to `writer`
pub fn write_line<W: Write>(writer: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Write every line to stdout
pub fn write_lines(lines: &[Value]) -> CliResult<()> {
    let mut stdout = io::stdout();
    for line in lines {
        write_line(&mut stdout, line)?;
    }
    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(&mut io::stdout(), &response)
}
