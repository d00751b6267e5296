//! Line framing rules
//!
//! One envelope per line, UTF-8, `\n`-terminated. A trailing `\r` is
//! tolerated so peers writing CRLF still interoperate. A chunk that ends
//! without the terminator is a partial message: the reader discards it when
//! the stream closes.

/// Byte that ends every frame
pub const LINE_TERMINATOR: u8 = b'\n';

/// Return the frame body if `chunk` is a complete line, `None` if partial.
///
/// The terminator (and a preceding `\r`) is removed from the result.
pub fn strip_terminator(chunk: &str) -> Option<&str> {
    let body = chunk.strip_suffix('\n')?;
    Some(body.strip_suffix('\r').unwrap_or(body))
}
