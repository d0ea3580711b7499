//! Bus timing and line-code configuration

use std::time::Duration;

use crate::encoding::ManchesterType;
use crate::error::{BusError, Result};

/// Resolution of the tokio timer wheel
pub const TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// Highest bit rate whose half-bit centre stays two timer ticks from either edge
///
/// Driver and sampler deadlines are each rounded up to the next tick, so a
/// sample can land up to one tick late against a transition that landed on
/// time. The second tick absorbs task wake-up latency on a real clock.
pub const MAX_BIT_RATE: u32 = 125;

/// Default simulated bit rate: 8 ms bit-time, 4 ms half bit
pub const DEFAULT_BIT_RATE: u32 = MAX_BIT_RATE;

/// Configuration shared by a transmitter and receiver on one bus
///
/// Both ends of a bus must use the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BusConfig {
    /// Bits per second on the line
    pub bit_rate_hz: u32,
    /// Manchester bit-to-level mapping and sync polarity
    pub encoding: ManchesterType,
}

impl BusConfig {
    /// Create a configuration with the MIL-STD-1553B line code
    pub fn new(bit_rate_hz: u32) -> Self {
        BusConfig {
            bit_rate_hz,
            encoding: ManchesterType::milstd(),
        }
    }

    /// Set the bit rate
    pub fn with_bit_rate(mut self, bit_rate_hz: u32) -> Self {
        self.bit_rate_hz = bit_rate_hz;
        self
    }

    /// Set the line-code convention
    pub fn with_encoding(mut self, encoding: ManchesterType) -> Self {
        self.encoding = encoding;
        self
    }

    /// Duration of one bit
    pub fn bit_time(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.bit_rate_hz.max(1)))
    }

    /// Duration of half a bit, the base delay of both state machines
    pub fn half_bit(&self) -> Duration {
        self.bit_time() / 2
    }

    /// Check that the configuration can be timed
    pub fn validate(&self) -> Result<()> {
        if self.bit_rate_hz == 0 {
            return Err(BusError::invalid_config("bit rate must be non-zero"));
        }

        if self.bit_rate_hz > MAX_BIT_RATE {
            return Err(BusError::invalid_config(format!(
                "bit rate {} Hz exceeds {} Hz: quarter bit-time {:?} is under two {:?} timer ticks",
                self.bit_rate_hz,
                MAX_BIT_RATE,
                self.half_bit() / 2,
                TIMER_RESOLUTION
            )));
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BusConfig = serde_json::from_str(json)
            .map_err(|e| BusError::invalid_config(format!("JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIT_RATE)
    }
}

impl std::fmt::Display for BusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bit/s, {:?} Manchester", self.bit_rate_hz, self.encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = BusConfig::default();
        assert_eq!(config.bit_time(), Duration::from_millis(8));
        assert_eq!(config.half_bit(), Duration::from_millis(4));
        assert_eq!(config.encoding, ManchesterType::Thomas);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bit_rate() {
        assert!(BusConfig::new(0).validate().is_err());
        assert!(BusConfig::new(1).validate().is_ok());
        assert!(BusConfig::new(MAX_BIT_RATE).validate().is_ok());
        assert!(BusConfig::new(MAX_BIT_RATE + 1).validate().is_err());
        assert!(BusConfig::new(250).validate().is_err());
        assert!(matches!(
            BusConfig::new(crate::consts::NOMINAL_BIT_RATE).validate(),
            Err(BusError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_builder() {
        let config = BusConfig::default()
            .with_bit_rate(50)
            .with_encoding(ManchesterType::Ieee);
        assert_eq!(config.bit_rate_hz, 50);
        assert_eq!(config.half_bit(), Duration::from_millis(10));
        assert_eq!(config.encoding, ManchesterType::Ieee);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json() {
        let config = BusConfig::from_json(r#"{"bit_rate_hz": 100, "encoding": "Ieee"}"#).unwrap();
        assert_eq!(config, BusConfig::new(100).with_encoding(ManchesterType::Ieee));

        let config = BusConfig::from_json("{}").unwrap();
        assert_eq!(config, BusConfig::default());

        assert!(BusConfig::from_json(r#"{"bit_rate_hz": 1000000}"#).is_err());
        assert!(BusConfig::from_json("not json").is_err());
    }
}
