//! Line-by-line interactive evaluation.

use anyhow::Result;
use quickjs_bridge::{EvalRequest, HostValue};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, stderr, stdin, stdout};

use crate::session::Session;

/// Prompt written before each line is read.
const PROMPT: &str = "> ";

/// File name reported in stack traces for REPL input.
const REPL_FILENAME: &str = "<repl>";

/// Read lines from stdin and evaluate each one until EOF or `.exit`.
///
/// Script errors are reported and the loop continues.
///
/// # Errors
/// Returns an error only when stdin or stdout fail.
pub async fn run(session: &mut Session) -> Result<()> {
    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();
    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let code = line.trim();
        if code.is_empty() {
            continue;
        }
        if is_exit(code) {
            break;
        }
        let request = EvalRequest::new(code).filename(REPL_FILENAME);
        match session.run(&request).await {
            Ok(value) => {
                if let Some(text) = display(&value) {
                    out.write_all(format!("{text}\n").as_bytes()).await?;
                }
            }
            Err(error) => {
                tracing::debug!("REPL input failed: {error:?}");
                stderr().write_all(format!("{error}\n").as_bytes()).await?;
            }
        }
    }
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

/// Whether the line asks to leave the REPL.
fn is_exit(code: &str) -> bool {
    matches!(code, ".exit" | "exit()" | ".quit")
}

/// Text to echo for a result; nothing for `null` and `undefined`.
pub fn display(value: &HostValue) -> Option<String> {
    match value {
        HostValue::Null | HostValue::Unit => None,
        other => Some(other.to_string()),
    }
}
