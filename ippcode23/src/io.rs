use std::io::{self, BufRead, Write};

/// Line-oriented reader for the program's runtime standard input.
///
/// `READ` treats end of input and parse failure identically (both yield
/// `Nil`), so the port only needs to distinguish "a line" from "no more
/// lines" — it never needs to report an I/O error of its own.
pub trait InputPort {
    fn read_line(&mut self) -> Option<String>;
}

/// Wraps any `BufRead` (typically stdin or an opened `--input` file) as an
/// `InputPort`.
pub struct StdinPort<R: BufRead> {
    reader: R,
}

impl<R: BufRead> StdinPort<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> InputPort for StdinPort<R> {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(line)
            }
            Err(_) => None,
        }
    }
}

/// Preloaded lines for tests, yielding `None` (EOF) once exhausted.
#[derive(Debug, Default)]
pub struct VecInputPort {
    lines: std::collections::VecDeque<String>,
}

impl VecInputPort {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl InputPort for VecInputPort {
    fn read_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Byte-stream sink for `WRITE`, `DPRINT`, and `BREAK`.
///
/// One trait serves both stdout and stderr: the Engine never knows which
/// physical stream it is writing to, only which logical port.
pub trait OutputPort {
    fn write_str(&mut self, s: &str) -> io::Result<()>;
}

/// Wraps any `Write` (stdout, stderr, or a file) as an `OutputPort`.
pub struct StreamOutputPort<W: Write> {
    writer: W,
}

impl<W: Write> StreamOutputPort<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> OutputPort for StreamOutputPort<W> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.writer.write_all(s.as_bytes())
    }
}

/// Collects everything written to it, for tests.
#[derive(Debug, Default)]
pub struct CollectingOutputPort {
    buffer: String,
}

impl CollectingOutputPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        &self.buffer
    }
}

impl OutputPort for CollectingOutputPort {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.buffer.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn vec_input_port_yields_lines_then_eof() {
        let mut port = VecInputPort::new(["1", "2"]);
        assert_eq!(port.read_line(), Some("1".to_owned()));
        assert_eq!(port.read_line(), Some("2".to_owned()));
        assert_eq!(port.read_line(), None);
    }

    #[test]
    fn collecting_output_port_accumulates_writes() {
        let mut port = CollectingOutputPort::new();
        port.write_str("a").unwrap();
        port.write_str("b").unwrap();
        assert_eq!(port.output(), "ab");
    }
}
