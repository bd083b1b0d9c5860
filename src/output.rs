// src/output.rs

// Styled status lines for the operator. Lines are terminated with CRLF
// because raw mode is active while a foreground scan streams its output.

use std::fmt::Display;
use std::io::Write;

use crossterm::style::Stylize;

fn emit(prefix: impl Display, msg: impl Display) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "[{prefix}] {msg}\r\n");
    let _ = stdout.flush();
}

pub fn info(msg: impl Display) {
    emit("-".blue().bold(), msg);
}

pub fn success(msg: impl Display) {
    emit("+".green().bold(), msg);
}

pub fn warn(msg: impl Display) {
    emit("?".yellow().bold(), msg);
}

pub fn error(msg: impl Display) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "[{}] {msg}\r\n", "!".red().bold());
    let _ = stderr.flush();
}

/// Echo one line of scan-tool output while a job runs un-silenced in the
/// foreground.
pub fn tool_line(line: &str) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "{}\r\n", line.dark_grey());
    let _ = stdout.flush();
}
