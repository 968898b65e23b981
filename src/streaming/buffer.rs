use crate::config::DEFAULT_MAX_BUFFER_BYTES;
use crate::error::{Result, StreamError};
use bytes::{Buf, BytesMut};

const LF_BOUNDARY: &[u8] = b"\n\n";
const CRLF_BOUNDARY: &[u8] = b"\r\n\r\n";

/// One delimited unit of the wire stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub raw: String,
}

impl Frame {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            raw: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Reassembles frames from arbitrarily fragmented network chunks
///
/// Bytes are kept raw until a full boundary has been seen, so a UTF-8
/// sequence split across two chunks is never decoded half way.
pub struct FrameBuffer {
    buffer: BytesMut,
    /// Bytes already searched for a boundary since the last split
    scanned: usize,
    max_size: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFER_BYTES)
    }

    pub fn with_limit(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
            max_size,
        }
    }

    /// Append a raw chunk without extracting anything
    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Feed new data and extract complete frames
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.append(chunk);
        self.extract_frames()
    }

    /// Remove and return every frame whose boundary has been fully observed
    pub fn extract_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();

        while let Some((end, boundary_len)) = self.find_boundary() {
            let frame_bytes = self.buffer.split_to(end);
            self.buffer.advance(boundary_len);
            self.scanned = 0;
            frames.push(Frame::from_bytes(&frame_bytes));
        }

        if let Some((start, end)) = self.find_whole_object() {
            tracing::debug!(size = end - start, "Emitting self-delimited object frame");
            frames.push(Frame::from_bytes(&self.buffer[start..end]));
            self.buffer.clear();
            self.scanned = 0;
        }

        frames
    }

    /// Fail once the unterminated remainder has grown past the configured limit
    ///
    /// Call after the frames of the latest chunk were handled, so complete
    /// frames ahead of an oversized tail are still delivered.
    pub fn check_overflow(&self) -> Result<()> {
        if self.buffer.len() > self.max_size {
            return Err(StreamError::BufferOverflow {
                buffered: self.buffer.len(),
                limit: self.max_size,
            });
        }
        Ok(())
    }

    /// Flush the remainder at end of stream
    ///
    /// The peer closing the connection terminates the last frame.
    pub fn finish(&mut self) -> Option<Frame> {
        let frame = if self.buffer.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(Frame::from_bytes(&self.buffer))
        };
        self.buffer.clear();
        self.scanned = 0;
        frame
    }

    /// Drop all buffered data (used on cancellation)
    pub fn reset(&mut self) {
        self.buffer.clear();
        if self.buffer.capacity() > 65536 {
            self.buffer = BytesMut::with_capacity(8192);
        }
        self.scanned = 0;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Earliest blank-line boundary as `(frame_end, boundary_len)`
    fn find_boundary(&mut self) -> Option<(usize, usize)> {
        // A boundary may straddle the previously scanned region by up to 3 bytes
        let from = self.scanned.saturating_sub(CRLF_BOUNDARY.len() - 1);
        let haystack = &self.buffer[from..];

        let lf = find_subsequence(haystack, LF_BOUNDARY).map(|i| (from + i, LF_BOUNDARY.len()));
        let crlf =
            find_subsequence(haystack, CRLF_BOUNDARY).map(|i| (from + i, CRLF_BOUNDARY.len()));

        let found = match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        };

        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    /// Compatibility path for peers that send bare JSON objects without
    /// blank-line delimiters: the buffer must hold exactly one object.
    fn find_whole_object(&self) -> Option<(usize, usize)> {
        let start = self.buffer.iter().position(|b| !b.is_ascii_whitespace())?;
        if self.buffer[start] != b'{' {
            return None;
        }

        let end = start + find_object_boundary(&self.buffer[start..])?;
        if self.buffer[end..].iter().all(u8::is_ascii_whitespace) {
            Some((start, end))
        } else {
            None
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// End offset of the first balanced JSON object, honouring string escapes
fn find_object_boundary(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else {
                match byte {
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
            }
        } else {
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
    }

    None
}
