//! Binary framing shared by operation payloads, results and cookies
//!
//! Every field is written in a fixed order with no self-description:
//! - strings: `u16` big-endian length followed by UTF-8 bytes
//! - times: `i64` big-endian milliseconds since the Unix epoch (UTC)
//! - bytes and floats: written as-is in big-endian order
//!
//! Readers consume from the front of a `Buf`, so a payload can be decoded
//! field by field with the same sequence of calls that wrote it.

use bytes::{Buf, BufMut};
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of data reading {0}")]
    UnexpectedEof(&'static str),
    #[error("string of {0} bytes exceeds the maximum field length")]
    TooLong(usize),
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
    #[error("timestamp {0} out of range")]
    InvalidTime(i64),
    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),
}

pub fn write_string<B: BufMut>(buf: &mut B, value: &str) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| CodecError::TooLong(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

pub fn read_string<B: Buf>(buf: &mut B) -> Result<String, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEof("string length"));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEof("string"));
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
}

pub fn write_time<B: BufMut>(buf: &mut B, value: &DateTime<Utc>) {
    buf.put_i64(value.timestamp_millis());
}

pub fn read_time<B: Buf>(buf: &mut B) -> Result<DateTime<Utc>, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::UnexpectedEof("time"));
    }
    let millis = buf.get_i64();
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(CodecError::InvalidTime(millis))
}

pub fn write_byte<B: BufMut>(buf: &mut B, value: u8) {
    buf.put_u8(value);
}

pub fn read_byte<B: Buf>(buf: &mut B) -> Result<u8, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::UnexpectedEof("byte"));
    }
    Ok(buf.get_u8())
}

pub fn write_u16<B: BufMut>(buf: &mut B, value: u16) {
    buf.put_u16(value);
}

pub fn read_u16<B: Buf>(buf: &mut B) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEof("u16"));
    }
    Ok(buf.get_u16())
}

pub fn write_f32<B: BufMut>(buf: &mut B, value: f32) {
    buf.put_f32(value);
}

pub fn read_f32<B: Buf>(buf: &mut B) -> Result<f32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEof("f32"));
    }
    Ok(buf.get_f32())
}
