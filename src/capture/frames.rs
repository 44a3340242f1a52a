use std::borrow::Borrow;
use std::io::{self, ErrorKind, Read, Write};
use crate::Error;
use super::frame::{decode, encode, FRAME_LEN};
use super::record::PacketRecord;

/// Reassembles fixed-size frames from a byte stream.
pub struct Frames<R> {
    inner: R,
    buf:   Vec<u8>,
    fill:  usize,
}

impl<R: Read> Frames<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: inner,
            buf:   vec![0; FRAME_LEN],
            fill:  0,
        }
    }

    /// Read the next complete frame. `Ok(None)` is a clean end of stream and
    /// an end of stream inside a frame is `UnexpectedEof`. Other errors keep
    /// the partial frame so the next call resumes where this one stopped.
    pub fn read_frame(&mut self) -> io::Result<Option<&[u8]>> {
        while self.fill < FRAME_LEN {
            match self.inner.read(&mut self.buf[self.fill..]) {
                Ok(0) if self.fill == 0 => return Ok(None),
                Ok(0)                   => return Err(self.truncated()),
                Ok(n)                   => self.fill += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e)                  => return Err(e),
            }
        }
        self.fill = 0;
        Ok(Some(&self.buf))
    }

    fn truncated(&mut self) -> io::Error {
        let n = self.fill;
        self.fill = 0;
        let msg = format!("stream closed after {} of {} frame bytes", n, FRAME_LEN);
        io::Error::new(ErrorKind::UnexpectedEof, msg)
    }
}

pub fn save<W: Write, R: Borrow<PacketRecord>>(mut w: W, records: &[R]) -> Result<usize, Error> {
    for rec in records {
        w.write_all(&encode(rec.borrow()))?;
    }
    w.flush()?;
    Ok(records.len())
}

pub fn load<R: Read>(r: R) -> Result<Vec<PacketRecord>, Error> {
    let mut frames  = Frames::new(r);
    let mut records = Vec::new();
    while let Some(frame) = frames.read_frame()? {
        records.push(decode(frame)?);
    }
    Ok(records)
}
