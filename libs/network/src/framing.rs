//! Cancel-safe line reader for the wire protocol
//!
//! All partial state lives in the reader, so a `next_line` future may be
//! dropped (timeout, `select!`) and called again without losing bytes.

use std::io;

use fleet_codec::LINE_TERMINATOR;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Outcome of one [`LineReader::next_line`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// Complete line, terminator and trailing `\r` removed
    Line(String),
    /// Line exceeded the limit and was skipped; carries its length
    Oversized(usize),
    /// Line was not valid UTF-8 and was skipped
    InvalidUtf8,
    /// Stream closed; `partial` unterminated bytes were discarded
    Eof { partial: usize },
}

pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max_line_bytes: usize,
    // Bytes skipped so far for an oversized line still in progress
    discarding: Option<usize>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            max_line_bytes,
            discarding: None,
        }
    }

    /// Read the next frame. Only I/O failures are errors.
    pub async fn next_line(&mut self) -> io::Result<ReadLine> {
        loop {
            let available = self.reader.fill_buf().await?;

            if available.is_empty() {
                let partial = self.discarding.take().unwrap_or(0) + self.buf.len();
                self.buf.clear();
                return Ok(ReadLine::Eof { partial });
            }

            match available.iter().position(|b| *b == LINE_TERMINATOR) {
                Some(pos) => {
                    let so_far = self.discarding.unwrap_or(0) + self.buf.len() + pos;
                    if self.discarding.is_some() || so_far > self.max_line_bytes {
                        self.reader.consume(pos + 1);
                        self.discarding = None;
                        self.buf.clear();
                        return Ok(ReadLine::Oversized(so_far));
                    }

                    self.buf.extend_from_slice(&available[..pos]);
                    self.reader.consume(pos + 1);

                    let mut line = std::mem::take(&mut self.buf);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    return Ok(match String::from_utf8(line) {
                        Ok(line) => ReadLine::Line(line),
                        Err(_) => ReadLine::InvalidUtf8,
                    });
                }
                None => {
                    let len = available.len();
                    match self.discarding.as_mut() {
                        Some(skipped) => *skipped += len,
                        None => {
                            self.buf.extend_from_slice(available);
                            if self.buf.len() > self.max_line_bytes {
                                self.discarding = Some(self.buf.len());
                                self.buf = Vec::new();
                            }
                        }
                    }
                    self.reader.consume(len);
                }
            }
        }
    }
}
