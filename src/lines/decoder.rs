use std::io::{BufRead, Read};
use bytes::Bytes;
use crate::core::error::{Error, Result};
use crate::dispatch::batch::Decoder;

pub const DEFAULT_MAX_LINE_LEN: usize = 64 << 20;

/// One item per non-blank input line, without the line terminator.
pub struct LineDecoder<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
    max_line_len: usize,
}

impl<R: BufRead> LineDecoder<R> {
    pub fn new(reader: R) -> Self {
        LineDecoder::with_max_line_len(reader, DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_line_len(reader: R, max_line_len: usize) -> Self {
        LineDecoder {
            reader,
            buf: Vec::with_capacity(1024),
            line_no: 0,
            max_line_len,
        }
    }

    /// Lines consumed so far, blank ones included.
    pub fn line_no(&self) -> u64 {
        self.line_no
    }
}

impl<R: BufRead> Decoder<Bytes> for LineDecoder<R> {
    fn decode(&mut self) -> Result<Option<Bytes>> {
        loop {
            self.buf.clear();
            // room for the longest allowed line plus "\r\n"
            let budget = self.max_line_len as u64 + 2;
            let read = (&mut self.reader).take(budget).read_until(b'\n', &mut self.buf)?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if read as u64 == budget && self.buf.last() != Some(&b'\n') {
                return Err(Error::decode(format!(
                    "line {} is longer than the {} byte limit",
                    self.line_no, self.max_line_len
                )));
            }

            let mut end = self.buf.len();
            while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
                end -= 1;
            }
            if end == 0 {
                continue;
            }
            if end > self.max_line_len {
                return Err(Error::decode(format!(
                    "line {} is {} bytes, longer than the {} byte limit",
                    self.line_no, end, self.max_line_len
                )));
            }
            return Ok(Some(Bytes::copy_from_slice(&self.buf[..end])));
        }
    }
}
