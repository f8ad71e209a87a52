//! Terminal input lines, parsed into commands for the chat worker.

use std::{future::Future, pin::Pin};

use tokio::io::{AsyncBufRead, Lines};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Upload(String),
    /// Zero-based log position.
    Download(usize),
    Select(usize),
    Delete,
    Save,
    Load,
    List,
    Quit,
}

pub const HELP: &str = "commands: /upload <path>, /download <n>, /select <n>, /delete, /save, /load, /list, /quit";

/// `Ok(None)` for a blank line. Entry numbers are typed as shown by `/list`,
/// starting at 1.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "upload" if !arg.is_empty() => Command::Upload(arg.to_string()),
        "upload" => return Err("usage: /upload <path>".into()),
        "download" => Command::Download(entry_number(arg)?),
        "select" => Command::Select(entry_number(arg)?),
        "delete" => Command::Delete,
        "save" => Command::Save,
        "load" => Command::Load,
        "list" => Command::List,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command /{other}; {HELP}")),
    };
    Ok(Some(command))
}

fn entry_number(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("expected an entry number from /list, got `{arg}`")),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Eof,
    SessionEnded,
}

/// Next stdin line, or `SessionEnded` as soon as `ended` resolves even while
/// the terminal is idle.
pub async fn next_input<R, F>(
    lines: &mut Lines<R>,
    ended: Pin<&mut F>,
) -> std::io::Result<Input>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        _ = ended => Ok(Input::SessionEnded),
        line = lines.next_line() => Ok(line?.map_or(Input::Eof, Input::Line)),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
