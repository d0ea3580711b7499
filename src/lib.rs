//! # MIL-STD-1553B Physical Layer
//!
//! Bit-level transmitter and receiver for the MIL-STD-1553B military data bus,
//! running on a simulated differential line.
//!
//! MIL-STD-1553B is a serial synchronous data bus used in military avionics
//! and aerospace systems. This library provides:
//!
//! - Manchester II encoding and decoding of 16-bit words
//! - Command and data sync waveforms
//! - Odd parity generation and checking
//! - A queued [`Transmitter`] and a sync-classifying [`Receiver`]
//! - An offline frame path ([`Frame`], [`RawFrame`]) for testing without a bus
//!
//! Timing runs on the tokio timer, so the bit rate is scaled down from the
//! nominal 1 Mbit/s (see [`config`]).
//!
//! ## Features
//!
//! - `serde`: Enable serialization/deserialization support and JSON configuration
//!
//! ## Example
//!
//! ```
//! use milstd1553b_phy::{BusConfig, BusLine, Receiver, ResetLine, Transmitter, Word};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build()?.block_on(async {
//! let bus = BusLine::new();
//! let reset = ResetLine::released();
//! let config = BusConfig::new(50);
//! let tx = Transmitter::new(&bus, &reset, config)?;
//! let rx = Receiver::new(&bus, &reset, config)?;
//!
//! tx.write_cmd(Word::from(0x1234).bytes()).await?;
//! assert_eq!(rx.read_cmd().await, Word::from(0x1234));
//! # Ok::<(), milstd1553b_phy::BusError>(())
//! # })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod core;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod line;
pub mod receiver;
mod task;
pub mod timing;
pub mod transmitter;

pub use config::BusConfig;
pub use crate::core::{FrameBits, SyncType, Word};
pub use encoding::{ManchesterDecoder, ManchesterEncoder, ManchesterType};
pub use error::{BusError, Result};
pub use frame::{DecodedFrame, Frame, RawFrame};
pub use line::{BusLine, BusMonitor, BusValue, Level, Logic, ResetLine, ResetMonitor};
pub use receiver::{Receiver, ReceiverStats};
pub use timing::BitClock;
pub use transmitter::Transmitter;

/// MIL-STD-1553B framing constants
pub mod consts {
    /// Nominal bus bit rate in Hz
    pub const NOMINAL_BIT_RATE: u32 = 1_000_000; // 1 Mbps

    /// Bytes submitted per word
    pub const WORD_BYTES: usize = 2;

    /// Payload bits per word
    pub const PAYLOAD_BITS: usize = 16;

    /// Sync length in half bits (1.5 bit-times per level)
    pub const SYNC_HALF_BITS: usize = 6;

    /// Manchester-encoded payload length in half bits
    pub const PAYLOAD_HALF_BITS: usize = PAYLOAD_BITS * 2;

    /// Word length in bit-times: sync, payload and parity
    pub const FRAME_BIT_TIMES: usize = 20;

    /// Word length in half bits
    pub const HALF_BITS_PER_FRAME: usize = FRAME_BIT_TIMES * 2;

    /// Manchester-encoded payload length in bytes
    pub const ENCODED_WORD_BYTES: usize = WORD_BYTES * 2;
}
