//! Terminal output for pipeline runs.

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::io::{self, IsTerminal, Write};

/// Colour only when the stream is a terminal.
fn color_choice(is_tty: bool) -> ColorChoice {
    if is_tty {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Writes user-facing status lines.
///
/// Progress and success lines go to stdout, warnings and errors to stderr.
/// `quiet` suppresses everything except warnings and errors; `verbose`
/// enables [`verbose`](Self::verbose) lines.
#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Print a progress line.
    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        glyph_line(&mut self.stdout(), "→", Color::Blue, message)
    }

    /// Print a success line.
    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        glyph_line(&mut self.stdout(), "✓", Color::Green, message)
    }

    /// Print a warning (shown even when quiet).
    pub fn warn(&self, message: &str) -> io::Result<()> {
        glyph_line(&mut self.stderr(), "⚠", Color::Yellow, message)
    }

    /// Print an error (shown even when quiet).
    pub fn error(&self, message: &str) -> io::Result<()> {
        glyph_line(&mut self.stderr(), "✗", Color::Red, message)
    }

    /// Print a section header.
    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut out = self.stdout();
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        writeln!(out, "{}", title)?;
        out.reset()?;
        writeln!(out, "{}", "─".repeat(title.chars().count()))
    }

    /// Print an indented detail line.
    pub fn indent(&self, message: &str) -> io::Result<()> {
        self.plain(&format!("  {}", message))
    }

    /// Print only in verbose mode.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if self.verbose {
            self.plain(message)
        } else {
            Ok(())
        }
    }

    fn plain(&self, line: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(self.stdout(), "{}", line)
    }

    fn stdout(&self) -> StandardStream {
        StandardStream::stdout(color_choice(io::stdout().is_terminal()))
    }

    fn stderr(&self) -> StandardStream {
        StandardStream::stderr(color_choice(io::stderr().is_terminal()))
    }
}

fn glyph_line(out: &mut StandardStream, glyph: &str, color: Color, message: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(out, "{}", glyph)?;
    out.reset()?;
    writeln!(out, " {}", message)
}

impl crate::pipeline::Progress for OutputManager {
    fn stage_completed(&self, stage: &str, detail: &str) {
        let _ = self.success(&format!("{:<10} {}", stage, detail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piped_output_is_never_coloured() {
        assert_eq!(color_choice(false), ColorChoice::Never);
        assert_eq!(color_choice(true), ColorChoice::Auto);
    }

    #[test]
    fn quiet_suppresses_stdout_lines() {
        let output = OutputManager::new(false, true);
        assert!(output.progress("hidden").is_ok());
        assert!(output.section("hidden").is_ok());
        assert!(output.verbose("hidden").is_ok());
    }
}
