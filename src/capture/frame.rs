//! Fixed-layout frame codec.
//!
//! Every frame on the capture stream is exactly [`FRAME_LEN`] bytes, packed
//! on 2-byte boundaries, integers little-endian:
//!
//! | offset | width | field                          |
//! |-------:|------:|--------------------------------|
//! |      0 |     4 | id (i32)                       |
//! |      4 |     4 | source port (i32, 0..=65535)   |
//! |      8 |     4 | dest port (i32, 0..=65535)     |
//! |     12 |    22 | protocol                       |
//! |     34 |    22 | source ip                      |
//! |     56 |    22 | dest ip                        |
//! |     78 |    22 | source mac                     |
//! |    100 |    22 | dest mac                       |
//! |    122 |    22 | host name                      |
//! |    144 |     4 | capture length (u32)           |
//! |    148 |     4 | original length (u32)          |
//! |    152 |     8 | timestamp seconds (u64)        |
//! |    160 |     4 | timestamp microseconds (u32)   |
//! |    164 | 65536 | raw bytes, zero padded         |
//!
//! Text fields are ASCII, terminated by the first NUL and right-padded with
//! NULs or spaces. Encoding keeps at most 21 bytes so a terminator always fits.

use std::convert::TryFrom;
use std::fmt;
use super::record::{PacketRecord, Timestamp};

pub const TEXT_LEN:  usize = 22;
pub const RAW_LEN:   usize = 65_536;
pub const FRAME_LEN: usize = RAW + RAW_LEN;

const ID:           usize = 0;
const SRC_PORT:     usize = 4;
const DST_PORT:     usize = 8;
const PROTOCOL:     usize = 12;
const SRC_IP:       usize = PROTOCOL + TEXT_LEN;
const DST_IP:       usize = SRC_IP   + TEXT_LEN;
const SRC_MAC:      usize = DST_IP   + TEXT_LEN;
const DST_MAC:      usize = SRC_MAC  + TEXT_LEN;
const HOST:         usize = DST_MAC  + TEXT_LEN;
const CAPTURE_LEN:  usize = HOST     + TEXT_LEN;
const ORIGINAL_LEN: usize = CAPTURE_LEN  + 4;
const TS_SEC:       usize = ORIGINAL_LEN + 4;
const TS_USEC:      usize = TS_SEC + 8;
const RAW:          usize = TS_USEC + 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    IncompleteFrame(usize),
    UnexpectedSize(usize),
    CaptureLength(u32),
    PortRange(i32),
}

pub fn decode(buf: &[u8]) -> Result<PacketRecord, DecodeError> {
    match buf.len() {
        n if n < FRAME_LEN => return Err(DecodeError::IncompleteFrame(n)),
        n if n > FRAME_LEN => return Err(DecodeError::UnexpectedSize(n)),
        _                  => (),
    }

    let capture_len = u32::from_le_bytes(array(buf, CAPTURE_LEN));
    if capture_len as usize > RAW_LEN {
        return Err(DecodeError::CaptureLength(capture_len));
    }

    let raw = &buf[RAW..RAW + capture_len as usize];

    Ok(PacketRecord {
        id:           i32::from_le_bytes(array(buf, ID)),
        src_port:     port(buf, SRC_PORT)?,
        dst_port:     port(buf, DST_PORT)?,
        protocol:     text(buf, PROTOCOL),
        src_ip:       text(buf, SRC_IP),
        dst_ip:       text(buf, DST_IP),
        src_mac:      text(buf, SRC_MAC),
        dst_mac:      text(buf, DST_MAC),
        host:         text(buf, HOST),
        capture_len:  capture_len,
        original_len: u32::from_le_bytes(array(buf, ORIGINAL_LEN)),
        timestamp:    Timestamp {
            sec:  u64::from_le_bytes(array(buf, TS_SEC)),
            usec: u32::from_le_bytes(array(buf, TS_USEC)),
        },
        raw:          raw.to_vec(),
    })
}

/// Encode a record into one frame. The capture length written is the length
/// of the raw buffer, truncated to [`RAW_LEN`].
pub fn encode(rec: &PacketRecord) -> Vec<u8> {
    let mut buf = vec![0u8; FRAME_LEN];
    let raw     = &rec.raw[..rec.raw.len().min(RAW_LEN)];

    put(&mut buf, ID,           &rec.id.to_le_bytes());
    put(&mut buf, SRC_PORT,     &i32::from(rec.src_port).to_le_bytes());
    put(&mut buf, DST_PORT,     &i32::from(rec.dst_port).to_le_bytes());
    put_text(&mut buf, PROTOCOL, &rec.protocol);
    put_text(&mut buf, SRC_IP,   &rec.src_ip);
    put_text(&mut buf, DST_IP,   &rec.dst_ip);
    put_text(&mut buf, SRC_MAC,  &rec.src_mac);
    put_text(&mut buf, DST_MAC,  &rec.dst_mac);
    put_text(&mut buf, HOST,     &rec.host);
    put(&mut buf, CAPTURE_LEN,  &(raw.len() as u32).to_le_bytes());
    put(&mut buf, ORIGINAL_LEN, &rec.original_len.to_le_bytes());
    put(&mut buf, TS_SEC,       &rec.timestamp.sec.to_le_bytes());
    put(&mut buf, TS_USEC,      &rec.timestamp.usec.to_le_bytes());
    put(&mut buf, RAW,          raw);

    buf
}

fn array<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

fn port(buf: &[u8], at: usize) -> Result<u16, DecodeError> {
    let n = i32::from_le_bytes(array(buf, at));
    u16::try_from(n).map_err(|_| DecodeError::PortRange(n))
}

fn text(buf: &[u8], at: usize) -> String {
    let field = &buf[at..at + TEXT_LEN];
    let end   = field.iter().position(|&b| b == 0).unwrap_or(TEXT_LEN);
    String::from_utf8_lossy(&field[..end]).trim_end().to_owned()
}

fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

fn put_text(buf: &mut [u8], at: usize, s: &str) {
    let bytes = s.as_bytes();
    let n     = bytes.len().min(TEXT_LEN - 1);
    put(buf, at, &bytes[..n]);
}

impl std::error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::IncompleteFrame(n) => write!(f, "incomplete frame: {} of {} bytes", n, FRAME_LEN),
            DecodeError::UnexpectedSize(n)  => write!(f, "unexpected frame size: {} bytes", n),
            DecodeError::CaptureLength(n)   => write!(f, "capture length {} exceeds {}", n, RAW_LEN),
            DecodeError::PortRange(n)       => write!(f, "port {} out of range", n),
        }
    }
}
