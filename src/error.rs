//! Error types for RT-130 container reading and packet decoding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Rt130Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead { wanted: usize, got: usize },

    #[error("invalid BCD nibble {nibble:#x} at digit {digit}")]
    BadBcd { nibble: u8, digit: usize },

    #[error("unknown packet type {0:?}")]
    UnknownPacketType(String),

    #[error("invalid packet header: {0}")]
    InvalidHeader(String),

    #[error("corrupt packet: {0}")]
    CorruptPacket(String),

    #[error("unsupported data format: {0:#04x}")]
    UnsupportedFormat(u8),

    #[error("steim decode error: {0}")]
    SteimDecode(String),

    #[error("no event metadata for stream {stream} channel {channel}")]
    MissingMetadata { stream: u16, channel: u16 },

    #[error("recovery failed: {0}")]
    Recovery(String),
}

pub type Result<T> = std::result::Result<T, Rt130Error>;
