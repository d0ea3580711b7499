//! Differential bus line and reset line
//!
//! Both lines are shared signals backed by `tokio::sync::watch`. A write that
//! changes the value is a transition; monitors wait for the next one.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{BusError, Result};

/// Logic state of a single rail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Logic {
    /// Driven low
    #[default]
    Low,
    /// Driven high
    High,
    /// Not driven (high impedance)
    Unresolved,
    /// Driven both ways at once
    Conflict,
}

impl Logic {
    /// True for a clean high or low
    pub fn is_resolved(&self) -> bool {
        matches!(self, Logic::Low | Logic::High)
    }
}

impl std::fmt::Display for Logic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Logic::Low => write!(f, "0"),
            Logic::High => write!(f, "1"),
            Logic::Unresolved => write!(f, "z"),
            Logic::Conflict => write!(f, "x"),
        }
    }
}

/// Differential level of the bus while it is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Positive rail high, negative rail low
    High,
    /// Positive rail low, negative rail high
    Low,
}

impl Level {
    /// Signal bit carried by this level in encoded data
    pub fn signal_bit(&self) -> u8 {
        match self {
            Level::High => 1,
            Level::Low => 0,
        }
    }

    /// Level carried by a signal bit
    pub fn from_signal_bit(bit: bool) -> Self {
        if bit {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Value of the two-rail bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusValue {
    /// Positive rail
    pub pos: Logic,
    /// Negative rail
    pub neg: Logic,
}

impl BusValue {
    /// Idle bus: both rails low
    pub const NEUTRAL: BusValue = BusValue::new(Logic::Low, Logic::Low);

    /// Undriven bus
    pub const UNDRIVEN: BusValue = BusValue::new(Logic::Unresolved, Logic::Unresolved);

    /// Create a bus value from its rails
    pub const fn new(pos: Logic, neg: Logic) -> Self {
        BusValue { pos, neg }
    }

    /// Both rails carry the same state; no differential level
    pub fn rails_equal(&self) -> bool {
        self.pos == self.neg
    }

    /// Neither rail is undriven or in conflict
    pub fn is_resolved(&self) -> bool {
        self.pos.is_resolved() && self.neg.is_resolved()
    }

    /// The differential level, if the bus is cleanly driven one way
    pub fn level(&self) -> Option<Level> {
        match (self.pos, self.neg) {
            (Logic::High, Logic::Low) => Some(Level::High),
            (Logic::Low, Logic::High) => Some(Level::Low),
            _ => None,
        }
    }

    /// Signal bit for sampled data: 1 only for a clean high level
    pub fn signal_bit(&self) -> u8 {
        self.level().map_or(0, |level| level.signal_bit())
    }
}

impl From<Level> for BusValue {
    fn from(level: Level) -> Self {
        match level {
            Level::High => BusValue::new(Logic::High, Logic::Low),
            Level::Low => BusValue::new(Logic::Low, Logic::High),
        }
    }
}

impl std::fmt::Display for BusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.neg, self.pos)
    }
}

/// Shared differential bus line
///
/// Clones drive and observe the same line.
#[derive(Debug, Clone)]
pub struct BusLine {
    tx: Arc<watch::Sender<BusValue>>,
}

impl BusLine {
    /// Create a neutral bus line
    pub fn new() -> Self {
        Self::with_value(BusValue::NEUTRAL)
    }

    /// Create a bus line holding `value`
    pub fn with_value(value: BusValue) -> Self {
        let (tx, _) = watch::channel(value);
        BusLine { tx: Arc::new(tx) }
    }

    /// Current value of the line
    pub fn read(&self) -> BusValue {
        *self.tx.borrow()
    }

    /// Drive the line; returns true when the value changed
    pub fn write(&self, value: impl Into<BusValue>) -> bool {
        let value = value.into();
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Start observing transitions from the current value on
    ///
    /// A monitor does not keep the line open; once every [`BusLine`] handle
    /// is dropped, waiting for a transition fails.
    pub fn monitor(&self) -> BusMonitor {
        BusMonitor {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for BusLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only observer of a [`BusLine`]
#[derive(Debug, Clone)]
pub struct BusMonitor {
    rx: watch::Receiver<BusValue>,
}

impl BusMonitor {
    /// Sample the line; later transitions are measured from here
    pub fn sample(&mut self) -> BusValue {
        *self.rx.borrow_and_update()
    }

    /// Wait for the next transition after the last sample and return the new value
    pub async fn next_transition(&mut self) -> Result<BusValue> {
        self.rx
            .changed()
            .await
            .map_err(|_| BusError::line_closed("bus line"))?;
        Ok(self.sample())
    }
}

/// Active-low reset line
///
/// Logic 0 holds both components in reset; logic 1 lets them run.
#[derive(Debug, Clone)]
pub struct ResetLine {
    tx: Arc<watch::Sender<bool>>,
}

impl ResetLine {
    /// Create a reset line; `released` is the initial logic level
    pub fn new(released: bool) -> Self {
        let (tx, _) = watch::channel(released);
        ResetLine { tx: Arc::new(tx) }
    }

    /// A reset line that starts high
    pub fn released() -> Self {
        Self::new(true)
    }

    /// A reset line that starts low
    pub fn asserted() -> Self {
        Self::new(false)
    }

    /// Pull the line low
    pub fn assert_reset(&self) {
        self.tx.send_replace(false);
    }

    /// Drive the line high
    pub fn release(&self) {
        self.tx.send_replace(true);
    }

    /// True while the line is low
    pub fn is_asserted(&self) -> bool {
        !*self.tx.borrow()
    }

    /// Start observing the line
    ///
    /// The last level stays readable after every [`ResetLine`] handle is dropped.
    pub fn monitor(&self) -> ResetMonitor {
        ResetMonitor {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ResetLine {
    fn default() -> Self {
        Self::released()
    }
}

/// Read-only observer of a [`ResetLine`]
#[derive(Debug, Clone)]
pub struct ResetMonitor {
    rx: watch::Receiver<bool>,
}

impl ResetMonitor {
    /// True while the line is high
    pub fn is_released(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the line is high; returns at once if it already is
    ///
    /// Fails when the line is dropped while still low.
    pub async fn released(&mut self) -> Result<()> {
        self.rx
            .wait_for(|high| *high)
            .await
            .map(|_| ())
            .map_err(|_| BusError::line_closed("reset line"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bus_value_predicates() {
        assert!(BusValue::NEUTRAL.rails_equal());
        assert!(BusValue::NEUTRAL.is_resolved());
        assert_eq!(BusValue::NEUTRAL.level(), None);

        let high = BusValue::from(Level::High);
        assert!(!high.rails_equal());
        assert_eq!(high.level(), Some(Level::High));
        assert_eq!(high.signal_bit(), 1);
        assert_eq!(BusValue::from(Level::Low).signal_bit(), 0);

        let floating = BusValue::new(Logic::Unresolved, Logic::Low);
        assert!(!floating.rails_equal());
        assert!(!floating.is_resolved());
        assert_eq!(floating.level(), None);
        assert!(BusValue::UNDRIVEN.rails_equal());
        assert!(!BusValue::new(Logic::High, Logic::Conflict).is_resolved());
    }

    #[test]
    fn test_bus_value_display() {
        assert_eq!(BusValue::from(Level::High).to_string(), "01");
        assert_eq!(BusValue::from(Level::Low).to_string(), "10");
        assert_eq!(BusValue::UNDRIVEN.to_string(), "zz");
    }

    #[test]
    fn test_write_reports_transitions() {
        let bus = BusLine::new();
        assert!(!bus.write(BusValue::NEUTRAL));
        assert!(bus.write(Level::High));
        assert!(!bus.write(Level::High));
        assert_eq!(bus.read().level(), Some(Level::High));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_sees_next_transition() {
        let bus = BusLine::new();
        let mut monitor = bus.monitor();
        assert_eq!(monitor.sample(), BusValue::NEUTRAL);

        let driver = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            driver.write(Level::Low);
        });

        let value = monitor.next_transition().await.unwrap();
        assert_eq!(value.level(), Some(Level::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_monitor_waits_for_release() {
        let reset = ResetLine::asserted();
        let mut monitor = reset.monitor();
        assert!(!monitor.is_released());
        assert!(reset.is_asserted());

        let line = reset.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            line.release();
        });

        monitor.released().await.unwrap();
        assert!(monitor.is_released());
        assert!(!reset.is_asserted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_bus_line_closes_monitor() {
        let bus = BusLine::new();
        let mut monitor = bus.monitor();
        let mut copy = monitor.clone();
        drop(bus);

        assert!(matches!(monitor.next_transition().await, Err(BusError::LineClosed(_))));
        assert!(matches!(copy.next_transition().await, Err(BusError::LineClosed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_reset_line_keeps_last_level() {
        let released = ResetLine::released();
        let mut monitor = released.monitor();
        drop(released);
        assert!(monitor.released().await.is_ok());

        let asserted = ResetLine::asserted();
        let mut monitor = asserted.monitor();
        drop(asserted);
        assert!(!monitor.is_released());
        assert!(matches!(monitor.released().await, Err(BusError::LineClosed(_))));
    }
}
