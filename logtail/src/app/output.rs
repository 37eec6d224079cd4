//! Writing display lines to stdout

use std::io::Write;

use colored::Colorize;

use crate::app::options::OutputFormat;
use crate::errors::LogsError;
use crate::models::log::{format_timestamp, LogStream};
use crate::viewer::coordinator::DisplayLine;

/// Writes lines in the chosen format
pub struct Printer<W: Write> {
    format: OutputFormat,
    out: W,
}

impl<W: Write> Printer<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self { format, out }
    }

    pub fn print_all<'a>(
        &mut self,
        lines: impl IntoIterator<Item = &'a DisplayLine>,
    ) -> Result<(), LogsError> {
        for line in lines {
            self.print(line)?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn print(&mut self, line: &DisplayLine) -> Result<(), LogsError> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, line)?;
                writeln!(self.out)?;
            }
            OutputFormat::Html => {
                writeln!(self.out, "{}", line.html)?;
            }
            OutputFormat::Text => {
                let stream = match line.line.stream {
                    LogStream::Stdout => "stdout".normal(),
                    LogStream::Stderr => "stderr".red(),
                    LogStream::Platform => "platform".cyan(),
                };
                let date = format_timestamp(&line.line.date).dimmed();
                match &line.line.instance_id {
                    Some(instance) => writeln!(
                        self.out,
                        "{} {} {} {}",
                        date,
                        stream,
                        instance.dimmed(),
                        line.line.text
                    )?,
                    None => writeln!(self.out, "{} {} {}", date, stream, line.line.text)?,
                }
            }
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
