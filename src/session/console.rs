//! Line-based console driver for [`Session`].

use super::state::{Session, SessionState, SessionSummary};
use crate::error::Result;
use std::io::{BufRead, Write};
use tracing::debug;

/// Drive `session` from `input` until it is done or input ends.
///
/// A preset `name` and `mode` (from the command line) answer their prompts
/// as if typed. Input errors are printed and the prompt is repeated.
pub fn run<R: BufRead, W: Write>(
    session: &mut Session<'_>,
    mut name: Option<String>,
    mut mode: Option<String>,
    mut input: R,
    out: &mut W,
) -> Result<SessionSummary> {
    while session.state() != SessionState::Done {
        let preset = match session.state() {
            SessionState::AwaitingName => name.take(),
            SessionState::AwaitingMode => mode.take(),
            _ => None,
        };

        let line = match preset {
            Some(line) => line,
            None => {
                write!(out, "{}", session.prompt())?;
                out.flush()?;

                let mut line = String::new();
                if input.read_line(&mut line)? == 0 {
                    debug!("End of input");
                    writeln!(out)?;
                    print_lines(out, &session.finish()?)?;
                    break;
                }
                line
            }
        };

        match session.handle(&line) {
            Ok(lines) => print_lines(out, &lines)?,
            Err(e) if e.is_input_error() => {
                debug!("Re-prompting at document {:?}", session.current_document());
                writeln!(out, "⚠️  {}", e)?
            }
            Err(e) => return Err(e),
        }
    }

    Ok(session.summary())
}

fn print_lines<W: Write>(out: &mut W, lines: &[String]) -> Result<()> {
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}
