//! Wire-level frames
//!
//! A frame is 20 bit-times, or 40 half bits:
//! - 6 half bits of sync (two levels held 1.5 bit-times each, not Manchester)
//! - 32 half bits of Manchester-encoded payload, wire bytes MSB first
//! - 2 half bits of Manchester-encoded odd parity
//!
//! [`Frame`] renders and drives the transmit side. [`RawFrame`] holds what
//! the receiver sampled and decodes it; [`RawFrame::from_half_bits`] samples
//! a rendered waveform at the same points the live receiver does.

use std::time::Duration;

use crate::consts::{ENCODED_WORD_BYTES, HALF_BITS_PER_FRAME, PAYLOAD_HALF_BITS, SYNC_HALF_BITS};
use crate::core::{FrameBits, SyncType, Word};
use crate::encoding::{ManchesterDecoder, ManchesterEncoder, ManchesterType};
use crate::error::{BusError, Result};
use crate::line::{BusLine, BusValue, Level};
use crate::timing::BitClock;

/// One word ready for transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    sync: SyncType,
    word: Word,
    parity: bool,
}

impl Frame {
    /// Frame a word, computing its odd parity bit
    pub fn new(sync: SyncType, word: Word) -> Self {
        Frame {
            sync,
            word,
            parity: word.parity_bit(),
        }
    }

    /// Replace the parity bit, e.g. to inject a parity fault
    pub fn with_parity(mut self, parity: bool) -> Self {
        self.parity = parity;
        self
    }

    /// Sync type of the frame
    pub fn sync(&self) -> SyncType {
        self.sync
    }

    /// Payload word
    pub fn word(&self) -> Word {
        self.word
    }

    /// Parity bit carried by the frame
    pub fn parity(&self) -> bool {
        self.parity
    }

    /// Manchester-encoded payload in wire order
    pub fn encoded_payload(&self, code: ManchesterType) -> [u8; ENCODED_WORD_BYTES] {
        let encoded = ManchesterEncoder::encode(&self.word.wire_bytes(), code);
        let mut payload = [0u8; ENCODED_WORD_BYTES];
        payload.copy_from_slice(&encoded);
        payload
    }

    /// Bus level of every half bit of the frame, in transmission order
    pub fn half_bits(&self, code: ManchesterType) -> Vec<Level> {
        let (first, second) = code.sync_halves(self.sync);
        let mut levels = Vec::with_capacity(HALF_BITS_PER_FRAME);
        levels.extend([first; SYNC_HALF_BITS / 2]);
        levels.extend([second; SYNC_HALF_BITS / 2]);

        for byte in self.encoded_payload(code) {
            for x in (0..8).rev() {
                levels.push(Level::from_signal_bit((byte >> x) & 1 != 0));
            }
        }

        let (first, second) = code.halves(self.parity);
        levels.push(first);
        levels.push(second);
        levels
    }

    /// Drive the frame onto the bus, one level per half bit, then return it to neutral
    pub async fn drive(&self, bus: &BusLine, code: ManchesterType, half_bit: Duration) {
        let clock = BitClock::start(half_bit);
        for (n, level) in self.half_bits(code).into_iter().enumerate() {
            bus.write(level);
            clock.wait_boundary(n as u32 + 1).await;
        }
        bus.write(BusValue::NEUTRAL);
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} parity {}", self.sync, self.word, self.parity as u8)
    }
}

/// Bus samples of one frame as taken by a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawFrame {
    /// The two sync half-symbols
    pub sync: [BusValue; 2],
    /// Sampled payload signal bits, four bytes MSB first
    pub payload: [u8; ENCODED_WORD_BYTES],
    /// The two parity half-symbols
    pub parity: [BusValue; 2],
}

impl RawFrame {
    /// Sample a rendered frame waveform
    ///
    /// One sample per sync level and one per payload and parity half bit.
    pub fn from_half_bits(levels: &[Level]) -> Result<Self> {
        if levels.len() < HALF_BITS_PER_FRAME {
            return Err(BusError::insufficient_data(format!(
                "Expected {} half bits for a frame, got {}",
                HALF_BITS_PER_FRAME,
                levels.len()
            )));
        }

        let mut raw = RawFrame {
            sync: [levels[0].into(), levels[SYNC_HALF_BITS / 2].into()],
            ..Default::default()
        };

        let payload_end = SYNC_HALF_BITS + PAYLOAD_HALF_BITS;
        for (n, &level) in levels[SYNC_HALF_BITS..payload_end].iter().enumerate() {
            raw.set_payload_half(n, level.into());
        }
        raw.parity = [levels[payload_end].into(), levels[payload_end + 1].into()];

        Ok(raw)
    }

    /// Record payload half bit `n`; only a clean high sets a signal bit
    pub fn set_payload_half(&mut self, n: usize, value: BusValue) {
        if value.signal_bit() == 1 {
            self.payload[n / 8] |= 0x80 >> (n % 8);
        }
    }

    /// Match the sync half-symbols against both sync patterns
    ///
    /// Returns `None` when neither matches.
    pub fn classify(&self, code: ManchesterType) -> Option<SyncType> {
        let observed = (self.sync[0].level()?, self.sync[1].level()?);
        SyncType::ALL
            .into_iter()
            .find(|&sync| code.sync_halves(sync) == observed)
    }

    /// Classify and decode the frame and check its parity
    ///
    /// Fails only when the payload breaks Manchester coding.
    pub fn decode(&self, code: ManchesterType) -> Result<DecodedFrame> {
        let wire = ManchesterDecoder::decode(&self.payload, code)?;
        let word = Word::from_wire_bytes([wire[0], wire[1]]);
        let parity_bit = self.parity[0]
            .level()
            .is_some_and(|level| code.bit_from_first_half(level));

        Ok(DecodedFrame {
            sync: self.classify(code),
            word,
            parity_bit,
            parity_ok: FrameBits::pack(word, parity_bit).has_odd_parity(),
        })
    }
}

/// A received frame after decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedFrame {
    /// Sync classification, `None` for an unrecognized pattern
    pub sync: Option<SyncType>,
    /// Recovered word, in submission byte order
    pub word: Word,
    /// Received parity bit
    pub parity_bit: bool,
    /// Payload and parity hold an odd number of ones
    pub parity_ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    const CODES: [ManchesterType; 2] = [ManchesterType::Thomas, ManchesterType::Ieee];

    fn loopback(frame: &Frame, code: ManchesterType) -> DecodedFrame {
        let levels = frame.half_bits(code);
        RawFrame::from_half_bits(&levels).unwrap().decode(code).unwrap()
    }

    #[test]
    fn test_frame_shape() {
        let code = ManchesterType::milstd();
        let levels = Frame::new(SyncType::Command, Word::from(0x8000)).half_bits(code);
        assert_eq!(levels.len(), HALF_BITS_PER_FRAME);
        assert_eq!(&levels[..6], &[Level::High, Level::High, Level::High, Level::Low, Level::Low, Level::Low]);
        // MSB of 0x8000 is a 1: high then low
        assert_eq!(&levels[6..8], &[Level::High, Level::Low]);
        assert_eq!(&levels[8..10], &[Level::Low, Level::High]);
        // one bit set: parity bit is 0
        assert_eq!(&levels[38..], &[Level::Low, Level::High]);

        let levels = Frame::new(SyncType::Data, Word::from(0x8000)).half_bits(code);
        assert_eq!(&levels[..6], &[Level::Low, Level::Low, Level::Low, Level::High, Level::High, Level::High]);
    }

    #[test]
    fn test_every_half_bit_after_sync_has_mid_bit_transition() {
        let levels = Frame::new(SyncType::Data, Word::from(0x5A3C)).half_bits(ManchesterType::milstd());
        for pair in levels[SYNC_HALF_BITS..].chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_encoded_payload_is_wire_order() {
        let frame = Frame::new(SyncType::Data, Word::new([0x34, 0x12]));
        let code = ManchesterType::Thomas;
        assert_eq!(frame.encoded_payload(code).to_vec(), ManchesterEncoder::encode(&[0x12, 0x34], code));
    }

    #[test]
    fn test_exhaustive_incrementing_words() {
        for code in CODES {
            for value in 0..=u16::MAX {
                for sync in SyncType::ALL {
                    let frame = Frame::new(sync, Word::from(value));
                    let decoded = loopback(&frame, code);
                    assert_eq!(decoded.word, frame.word());
                    assert_eq!(decoded.sync, Some(sync));
                    assert!(decoded.parity_ok, "parity failed for {:#06X}", value);
                }
            }
        }
    }

    #[test]
    fn test_exhaustive_shuffled_words() {
        let mut values: Vec<u16> = (0..=u16::MAX).collect();
        values.shuffle(&mut rand::thread_rng());
        let code = ManchesterType::milstd();
        for value in values {
            let frame = Frame::new(SyncType::Command, Word::from(value));
            let decoded = loopback(&frame, code);
            assert_eq!(decoded.word.value(), value);
            assert_eq!(decoded.sync, Some(SyncType::Command));
        }
    }

    #[test]
    fn test_flipped_parity_is_detected() {
        let code = ManchesterType::milstd();
        let word = Word::from(0x0F0F);
        let frame = Frame::new(SyncType::Data, word).with_parity(!word.parity_bit());
        let decoded = loopback(&frame, code);
        assert!(!decoded.parity_ok);
        assert_eq!(decoded.word, word);
        assert_eq!(decoded.sync, Some(SyncType::Data));
    }

    #[test]
    fn test_corrupted_payload_bit_is_detected() {
        let code = ManchesterType::milstd();
        let word = Word::from(0x1234);
        let corrupted = Word::from(0x1234 ^ 0x0010);
        let frame = Frame::new(SyncType::Command, corrupted).with_parity(word.parity_bit());
        let decoded = loopback(&frame, code);
        assert!(!decoded.parity_ok);
        assert_eq!(decoded.word, corrupted);
    }

    #[test]
    fn test_mismatched_convention_swaps_sync() {
        let frame = Frame::new(SyncType::Command, Word::from(0x00FF));
        let levels = frame.half_bits(ManchesterType::Thomas);
        let decoded = RawFrame::from_half_bits(&levels)
            .unwrap()
            .decode(ManchesterType::Ieee)
            .unwrap();
        assert_eq!(decoded.sync, Some(SyncType::Data));
        assert_eq!(decoded.word, Word::from(0xFF00));
    }

    #[test]
    fn test_unmatched_sync_is_unclassified() {
        let mut raw = RawFrame::from_half_bits(
            &Frame::new(SyncType::Command, Word::from(1)).half_bits(ManchesterType::milstd()),
        )
        .unwrap();
        raw.sync = [Level::High.into(), Level::High.into()];
        assert_eq!(raw.classify(ManchesterType::milstd()), None);

        raw.sync = [BusValue::NEUTRAL, Level::Low.into()];
        let decoded = raw.decode(ManchesterType::milstd()).unwrap();
        assert_eq!(decoded.sync, None);
        assert_eq!(decoded.word, Word::from(1));
    }

    #[test]
    fn test_manchester_violation_fails_decode() {
        let raw = RawFrame::default();
        assert!(matches!(
            raw.decode(ManchesterType::milstd()),
            Err(BusError::InvalidManchesterEncoding(_))
        ));
    }

    #[test]
    fn test_short_waveform_rejected() {
        let levels = vec![Level::High; HALF_BITS_PER_FRAME - 1];
        assert!(RawFrame::from_half_bits(&levels).is_err());
    }
}
