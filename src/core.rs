//! Core types for MIL-STD-1553B word transmission

use bitfield::bitfield;

use crate::encoding::odd_parity;
use crate::error::{BusError, Result};

/// Sync waveform preceding a word on the bus
///
/// The sync decides which receive queue a word lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncType {
    /// Command sync (also used by status words on a real bus)
    Command,
    /// Data sync
    Data,
}

impl SyncType {
    /// Both sync types, command first
    pub const ALL: [SyncType; 2] = [SyncType::Command, SyncType::Data];

    /// The other sync type
    pub fn mirror(&self) -> Self {
        match self {
            SyncType::Command => SyncType::Data,
            SyncType::Data => SyncType::Command,
        }
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncType::Command => write!(f, "CMD_SYNC"),
            SyncType::Data => write!(f, "DATA_SYNC"),
        }
    }
}

/// A single 16-bit word, held as the two bytes it was submitted with
///
/// The bytes are sent in reverse order: the last submitted byte goes on the
/// wire first, each byte most significant bit first. [`Word::from`] a `u16`
/// stores it little-endian, so the most significant bit of the value leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Word([u8; 2]);

impl Word {
    /// Number of bytes in a word
    pub const BYTES: usize = 2;

    /// Create a word from its two submitted bytes
    pub fn new(bytes: [u8; 2]) -> Self {
        Word(bytes)
    }

    /// Create a word from a byte slice, which must hold exactly two bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let bytes: [u8; 2] = data.try_into().map_err(|_| {
            BusError::invalid_word(format!(
                "{:02X?} must be exactly {} bytes, got {}",
                data,
                Self::BYTES,
                data.len()
            ))
        })?;
        Ok(Word(bytes))
    }

    /// Rebuild a word from bytes in wire order
    pub fn from_wire_bytes(wire: [u8; 2]) -> Self {
        Word([wire[1], wire[0]])
    }

    /// The submitted bytes
    pub fn bytes(&self) -> [u8; 2] {
        self.0
    }

    /// The submitted bytes as a slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The bytes in transmission order
    pub fn wire_bytes(&self) -> [u8; 2] {
        [self.0[1], self.0[0]]
    }

    /// The word read as a little-endian value
    pub fn value(&self) -> u16 {
        u16::from_le_bytes(self.0)
    }

    /// Odd parity bit over the 16 payload bits
    pub fn parity_bit(&self) -> bool {
        odd_parity(&self.0)
    }
}

impl From<u16> for Word {
    fn from(value: u16) -> Self {
        Word(value.to_le_bytes())
    }
}

impl From<Word> for u16 {
    fn from(word: Word) -> Self {
        word.value()
    }
}

impl TryFrom<&[u8]> for Word {
    type Error = BusError;

    fn try_from(data: &[u8]) -> Result<Self> {
        Word::from_bytes(data)
    }
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Word(0x{:04X})", self.value())
    }
}

bitfield! {
    /// Payload and parity bits of one frame
    ///
    /// Format:
    /// - Bits 16-1: payload, in wire order (first transmitted bit in bit 16)
    /// - Bit 0: parity
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct FrameBits(u32);
    impl Debug;
    pub u32, payload, set_payload: 16, 1;
    pub parity, set_parity: 0;
}

impl FrameBits {
    /// Pack a word and a parity bit
    pub fn pack(word: Word, parity: bool) -> Self {
        let mut bits = FrameBits(0);
        bits.set_payload(u16::from_be_bytes(word.wire_bytes()) as u32);
        bits.set_parity(parity);
        bits
    }

    /// The payload as a word
    pub fn word(&self) -> Word {
        Word::from_wire_bytes((self.payload() as u16).to_be_bytes())
    }

    /// True when payload and parity together hold an odd number of ones
    pub fn has_odd_parity(&self) -> bool {
        (self.0 & 0x1FFFF).count_ones() % 2 == 1
    }
}
