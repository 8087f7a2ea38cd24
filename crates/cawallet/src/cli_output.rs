//! User-facing CLI output. Results go to stdout as JSON, errors to stderr as a
//! [`ToolError`] envelope.

use crate::errors::ToolError;
use eyre::Context as _;
use secrecy::SecretString;
use serde::Serialize;
use std::io::{IsTerminal as _, Write as _};

fn stderr_writeln(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    if stderr.write_all(b"\n").is_err() {
        return;
    }
    let _flush = stderr.flush();
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize>(v: &T) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize output")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{s}").context("write output")?;
    stdout.flush().context("flush output")
}

pub fn print_error(e: &ToolError) {
    let s = serde_json::to_string(e).unwrap_or_else(|_e| {
        format!("{{\"code\":\"{}\",\"message\":\"failed to serialize error\"}}", e.code)
    });
    stderr_writeln(&s);
}

pub fn print_mcp_banner(version: &str, network: &str) {
    if !std::io::stderr().is_terminal() {
        return;
    }
    stderr_writeln(&format!(
        "cawallet MCP\n============\nVersion : v{version}\nNetwork : {network}\nMode    : stdio"
    ));
}

/// Prompt on the terminal; refuses when stdin is not interactive.
pub fn prompt_password(prompt: &str) -> eyre::Result<SecretString> {
    if !std::io::stdin().is_terminal() {
        return Err(crate::errors::CaError::PasswordRequired.into());
    }
    let pw = rpassword::prompt_password(prompt).context("read password")?;
    Ok(SecretString::new(pw.into()))
}
