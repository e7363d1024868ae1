use crate::{
    errors::ErrorKind,
    limits::{ConnLimits, ReqLimits},
};
use memchr::memchr;
use std::io;
use tokio::{io::AsyncReadExt, time::sleep};

impl ConnLimits {
    #[inline]
    pub(crate) async fn read_bytes<S>(&self, stream: &mut S, buf: &mut [u8]) -> io::Result<usize>
    where
        S: AsyncReadExt + Unpin,
    {
        match self.socket_read_timeout {
            None => stream.read(buf).await,
            Some(time) => {
                tokio::select! {
                    biased;

                    read_result = stream.read(buf) => read_result,
                    _ = sleep(time) => {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
                    },
                }
            }
        }
    }
}

/// Buffered line extraction over a socket, bounded by `line_size`.
///
/// The buffer is allocated once per worker and reused for every request.
/// Two read modes share it:
///
/// - [`read_line`](Self::read_line) is strict: a line that does not fit the
///   buffer is a protocol violation and fails with
///   [`ErrorKind::LineTooLong`]. Used for the client's request and headers.
/// - [`read_chunk`](Self::read_chunk) is lenient: when no newline fits, the
///   full buffer is handed out as one chunk. Used for relaying origin
///   responses, whose bodies are data rather than protocol lines.
#[derive(Debug, PartialEq)]
pub(crate) struct LineReader {
    buffer: Box<[u8]>,
    start: usize,
    end: usize,
}

impl LineReader {
    #[inline]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Self {
            buffer: vec![0; limits.line_size].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Reads one line (newline included) into `line`, clearing it first.
    ///
    /// Returns the number of bytes placed into `line`; `0` means a clean end
    /// of stream. A final unterminated line before EOF is returned as-is.
    #[inline]
    pub(crate) async fn read_line<S>(
        &mut self,
        stream: &mut S,
        conn: &ConnLimits,
        line: &mut Vec<u8>,
    ) -> Result<usize, ErrorKind>
    where
        S: AsyncReadExt + Unpin,
    {
        self.fill_line(stream, conn, line, true).await
    }

    /// Reads a chunk: one line, or the full buffer when no newline fits,
    /// whichever comes first. Binary-safe; never fails on long runs.
    #[inline]
    pub(crate) async fn read_chunk<S>(
        &mut self,
        stream: &mut S,
        conn: &ConnLimits,
        chunk: &mut Vec<u8>,
    ) -> Result<usize, ErrorKind>
    where
        S: AsyncReadExt + Unpin,
    {
        self.fill_line(stream, conn, chunk, false).await
    }

    async fn fill_line<S>(
        &mut self,
        stream: &mut S,
        conn: &ConnLimits,
        line: &mut Vec<u8>,
        strict: bool,
    ) -> Result<usize, ErrorKind>
    where
        S: AsyncReadExt + Unpin,
    {
        line.clear();

        loop {
            if let Some(at) = memchr(b'\n', &self.buffer[self.start..self.end]) {
                line.extend_from_slice(&self.buffer[self.start..self.start + at + 1]);
                self.start += at + 1;
                return Ok(line.len());
            }

            // Compact the unfinished tail to the front before refilling.
            if self.start > 0 {
                self.buffer.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }

            if self.end == self.buffer.len() {
                if strict {
                    return Err(ErrorKind::LineTooLong(self.buffer.len()));
                }

                line.extend_from_slice(&self.buffer[..self.end]);
                self.end = 0;
                return Ok(line.len());
            }

            let read = conn.read_bytes(stream, &mut self.buffer[self.end..]).await?;
            if read == 0 {
                line.extend_from_slice(&self.buffer[self.start..self.end]);
                self.start = 0;
                self.end = 0;
                return Ok(line.len());
            }
            self.end += read;
        }
    }
}

/// The two tokens of the request line the proxy acts on.
///
/// The version token is accepted as-is: the upstream exchange always speaks
/// HTTP/1.0 regardless of what the client announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestLine {
    pub(crate) method: String,
    pub(crate) target: String,
}

impl RequestLine {
    pub(crate) fn split(line: &[u8]) -> Result<Self, ErrorKind> {
        let line = simdutf8::basic::from_utf8(line).map_err(|_| ErrorKind::MalformedRequest)?;

        let mut tokens = line.split_ascii_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(method), Some(target)) => Ok(Self {
                method: method.to_string(),
                target: target.to_string(),
            }),
            _ => Err(ErrorKind::MalformedRequest),
        }
    }

    #[inline]
    pub(crate) fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A header line ends the header block when nothing precedes its newline.
#[inline]
pub(crate) fn is_blank_line(line: &[u8]) -> bool {
    matches!(line, b"\r\n" | b"\n")
}
