//! Pure Rust reader for RefTek RT-130 raw seismic data.
//!
//! Zero `unsafe`, zero C dependencies. Reads the headerless 1024-byte
//! packet stream an RT-130 datalogger writes, from a bare recording
//! file, a CF-card directory tree, or a ZIP/tar archive of one.
//! Handles BCD-packed headers, Steim1/2 compressed and uncompressed
//! sample payloads, and the full set of status packet types, and
//! assembles data packets into per-stream, per-channel events.
//!
//! # Packet timestamps
//!
//! ```
//! use rt130::PacketTime;
//!
//! let t = PacketTime::from_ascii("2017123010203004");
//! assert_eq!(t.year, 2017);
//! assert_eq!(t.doy, 123);
//! assert_eq!(t.to_compact(), "2017123010203004");
//! ```
//!
//! # Reading events from a recording
//!
//! ```no_run
//! use rt130::{Rt130Reader, Result};
//!
//! fn main() -> Result<()> {
//!     let mut reader = Rt130Reader::new("2017123.9D30.zip", None)?;
//!     loop {
//!         let (stream, points, end_of_file) = reader.get_event()?;
//!         for (stream, events) in reader.get_stream_event(stream) {
//!             for event in events.iter().filter(|ev| ev.event.is_some()) {
//!                 println!(
//!                     "stream {} channel {} samples {}",
//!                     stream, event.channel_number, event.sample_count
//!                 );
//!             }
//!         }
//!         if end_of_file {
//!             let _ = points;
//!             break;
//!         }
//!     }
//!     for line in reader.get_errs() {
//!         eprintln!("{line}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod bcd;
pub mod codes;
pub mod container;
pub mod error;
pub mod header;
pub mod packets;
pub mod reader;
pub mod steim;
pub mod time;

pub use assembler::{
    Assembler, EndKind, Event130, Outcome, ParEntry, Reports, StreamEvents, TraceSegment,
    NUM_CHANNELS, NUM_STREAMS,
};
pub use container::{open_container, InputKind, PacketSource, PeekBuffer};
pub use error::{Result, Rt130Error};
pub use header::{PacketHeader, PacketType, HEADER_SIZE, PACKET_SIZE};
pub use packets::{DataPacket, EventHeader, SampleFormat};
pub use reader::{PacketCounts, Rt130Reader};
pub use time::PacketTime;
