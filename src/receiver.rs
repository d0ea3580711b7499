//! MIL-STD-1553B receiver (bus sink)
//!
//! A background loop hunts for a sync waveform, samples the following
//! Manchester half bits and parity, and files each decoded word in the
//! command or data queue according to its sync.
//!
//! Sampling points, in half bits `H` from the edge that starts a frame:
//! - `H`: first sync half-symbol
//! - `H` after the mid-sync edge: second sync half-symbol
//! - centre of every payload and parity half bit, timed from the mid-sync edge
//!
//! After the parity bit the loop waits for the transition that ends the frame.
//! False triggers, unresolved logic, Manchester violations, unknown syncs and
//! parity failures are logged and counted; none of them stops the loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

use crate::config::BusConfig;
use crate::consts::{PAYLOAD_HALF_BITS, SYNC_HALF_BITS};
use crate::core::{SyncType, Word};
use crate::encoding::ManchesterType;
use crate::error::Result;
use crate::frame::{DecodedFrame, RawFrame};
use crate::line::{BusLine, BusMonitor, ResetLine, ResetMonitor};
use crate::task::LoopTask;
use crate::timing::BitClock;

/// Counters kept by a receiver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceiverStats {
    /// Frames sampled after a valid start edge
    pub frames: u64,
    /// Words filed in the command queue
    pub command_words: u64,
    /// Words filed in the data queue
    pub data_words: u64,
    /// Frames whose sync matched neither pattern
    pub invalid_sync: u64,
    /// Delivered or discarded frames that failed the parity check
    pub parity_errors: u64,
    /// Transitions that left both rails equal
    pub false_triggers: u64,
    /// Start edges onto an undriven or conflicting rail
    pub unresolved_logic: u64,
    /// Frames dropped for a payload pair without a mid-bit transition
    pub manchester_errors: u64,
}

#[derive(Debug, Default)]
struct RxState {
    command: VecDeque<Word>,
    data: VecDeque<Word>,
    stats: ReceiverStats,
}

impl RxState {
    fn queue(&self, sync: SyncType) -> &VecDeque<Word> {
        match sync {
            SyncType::Command => &self.command,
            SyncType::Data => &self.data,
        }
    }

    fn queue_mut(&mut self, sync: SyncType) -> &mut VecDeque<Word> {
        match sync {
            SyncType::Command => &mut self.command,
            SyncType::Data => &mut self.data,
        }
    }
}

#[derive(Debug, Default)]
struct RxShared {
    state: Mutex<RxState>,
    /// A frame is being sampled
    active: AtomicBool,
    available: Notify,
}

impl RxShared {
    fn record(&self, update: impl FnOnce(&mut ReceiverStats)) {
        update(&mut self.state.lock().stats);
    }

    fn file(&self, decoded: &DecodedFrame) {
        let mut state = self.state.lock();
        state.stats.frames += 1;
        if !decoded.parity_ok {
            state.stats.parity_errors += 1;
        }

        match decoded.sync {
            Some(SyncType::Command) => state.stats.command_words += 1,
            Some(SyncType::Data) => state.stats.data_words += 1,
            None => state.stats.invalid_sync += 1,
        }
        if let Some(sync) = decoded.sync {
            state.queue_mut(sync).push_back(decoded.word);
        }
    }
}

/// Receive side of a MIL-STD-1553B bus
///
/// Must be created inside a tokio runtime. Dropping the receiver stops its
/// loop; words still queued are dropped with it.
#[derive(Debug)]
pub struct Receiver {
    shared: Arc<RxShared>,
    monitor: BusMonitor,
    reset: ResetMonitor,
    config: BusConfig,
    task: LoopTask,
}

impl Receiver {
    /// Create a receiver watching `bus`, held off while `reset` is low
    ///
    /// The receiver only observes the bus and does not keep it open. Its loop
    /// ends once every [`BusLine`] handle has been dropped.
    pub fn new(bus: &BusLine, reset: &ResetLine, config: BusConfig) -> Result<Self> {
        config.validate()?;

        info!("MIL-STD-1553 sink");
        info!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        info!("Sink bus: {}", config);

        let shared = Arc::new(RxShared::default());
        let monitor = bus.monitor();
        let reset = reset.monitor();
        let task = Self::spawn_loop(&shared, &monitor, &reset, config);

        Ok(Receiver {
            shared,
            monitor,
            reset,
            config,
            task,
        })
    }

    fn spawn_loop(
        shared: &Arc<RxShared>,
        monitor: &BusMonitor,
        reset: &ResetMonitor,
        config: BusConfig,
    ) -> LoopTask {
        let worker = RxLoop {
            shared: shared.clone(),
            monitor: monitor.clone(),
            reset: reset.clone(),
            code: config.encoding,
            half_bit: config.half_bit(),
        };
        LoopTask::spawn("receiver", info_span!("receiver"), move |token| {
            worker.run(token)
        })
    }

    /// The configuration in use
    pub fn config(&self) -> BusConfig {
        self.config
    }

    /// True while the receive loop is alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for a word with the given sync and take it
    pub async fn read(&self, sync: SyncType) -> Word {
        loop {
            self.available(sync).await;
            if let Some(word) = self.read_nowait(sync) {
                return word;
            }
        }
    }

    /// Wait for the next command word
    pub async fn read_cmd(&self) -> Word {
        self.read(SyncType::Command).await
    }

    /// Wait for the next data word
    pub async fn read_data(&self) -> Word {
        self.read(SyncType::Data).await
    }

    /// Take a word with the given sync if one is queued
    pub fn read_nowait(&self, sync: SyncType) -> Option<Word> {
        self.shared.state.lock().queue_mut(sync).pop_front()
    }

    /// Wait at most `timeout` for a word; nothing is taken on expiry
    pub async fn read_timeout(&self, sync: SyncType, timeout: Duration) -> Option<Word> {
        tokio::time::timeout(timeout, self.read(sync)).await.ok()
    }

    /// Wait until a word with the given sync is queued, without taking it
    ///
    /// With a timeout, returns whether a word arrived in time.
    pub async fn wait(&self, sync: SyncType, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.available(sync))
                .await
                .is_ok(),
            None => {
                self.available(sync).await;
                true
            }
        }
    }

    async fn available(&self, sync: SyncType) {
        loop {
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.empty(sync) {
                return;
            }
            notified.await;
        }
    }

    /// Number of queued words with the given sync
    pub fn count(&self, sync: SyncType) -> usize {
        self.shared.state.lock().queue(sync).len()
    }

    /// True when no word with the given sync is queued
    pub fn empty(&self, sync: SyncType) -> bool {
        self.shared.state.lock().queue(sync).is_empty()
    }

    /// True when no frame is being sampled
    pub fn idle(&self) -> bool {
        !self.shared.active.load(Ordering::Acquire)
    }

    /// Drop every queued word with the given sync
    pub fn clear(&self, sync: SyncType) {
        let dropped = {
            let mut state = self.shared.state.lock();
            let queue = state.queue_mut(sync);
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            debug!("Cleared {} {} words", dropped, sync);
        }
    }

    /// Snapshot of the receive counters
    pub fn stats(&self) -> ReceiverStats {
        self.shared.state.lock().stats.clone()
    }

    /// Kill the loop and start a fresh one
    ///
    /// A frame being sampled is abandoned. Queued words are kept.
    pub fn restart(&mut self) {
        self.task.stop();
        self.shared.active.store(false, Ordering::Release);
        self.task = Self::spawn_loop(&self.shared, &self.monitor, &self.reset, self.config);
        info!("Sink restarted");
    }
}

/// State owned by the receive loop
struct RxLoop {
    shared: Arc<RxShared>,
    monitor: BusMonitor,
    reset: ResetMonitor,
    code: ManchesterType,
    half_bit: Duration,
}

impl RxLoop {
    async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = self.cycle() => {
                    if let Err(err) = result {
                        warn!("Sink loop halted: {}", err);
                        break;
                    }
                }
            }
        }
        self.shared.active.store(false, Ordering::Release);
    }

    /// One attempt at receiving a frame
    async fn cycle(&mut self) -> Result<()> {
        self.reset.released().await?;

        let mut value = self.monitor.sample();
        if value.rails_equal() {
            value = self.monitor.next_transition().await?;
            if value.rails_equal() {
                debug!("false trigger, data values equal ({})", value);
                self.shared.record(|stats| stats.false_triggers += 1);
                return Ok(());
            }
        }

        if !value.is_resolved() {
            warn!("Invalid data bit: {}", value);
            self.shared.record(|stats| stats.unresolved_logic += 1);
            self.monitor.next_transition().await?;
            return Ok(());
        }

        self.shared.active.store(true, Ordering::Release);
        let raw = self.sample_frame().await?;
        self.deliver(&raw);
        self.shared.active.store(false, Ordering::Release);

        // the second parity half ends with one more transition
        self.monitor.next_transition().await?;
        Ok(())
    }

    /// Sample sync, payload and parity, starting at the current edge
    async fn sample_frame(&mut self) -> Result<RawFrame> {
        let mut raw = RawFrame::default();

        let edge = BitClock::start(self.half_bit);
        edge.wait_boundary(1).await;
        raw.sync[0] = self.monitor.sample();

        self.monitor.next_transition().await?;
        let mid = BitClock::start(self.half_bit);
        mid.wait_boundary(1).await;
        raw.sync[1] = self.monitor.sample();

        // payload starts where the second sync level ends
        let first = (SYNC_HALF_BITS / 2) as u32;
        for n in 0..PAYLOAD_HALF_BITS {
            mid.wait_centre(first + n as u32).await;
            raw.set_payload_half(n, self.monitor.sample());
        }

        let parity = first + PAYLOAD_HALF_BITS as u32;
        mid.wait_centre(parity).await;
        raw.parity[0] = self.monitor.sample();
        mid.wait_centre(parity + 1).await;
        raw.parity[1] = self.monitor.sample();

        Ok(raw)
    }

    fn deliver(&self, raw: &RawFrame) {
        let decoded = match raw.decode(self.code) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("Dropped frame, encoded word {:02X?}: {}", raw.payload, err);
                self.shared.record(|stats| {
                    stats.frames += 1;
                    stats.manchester_errors += 1;
                });
                return;
            }
        };

        if !decoded.parity_ok {
            error!("Parity Check Failed: {} parity bit {}", decoded.word, decoded.parity_bit as u8);
        }

        self.shared.file(&decoded);

        let label = match decoded.sync {
            Some(sync) => sync.to_string(),
            None => {
                warn!("Unrecognized sync {} {}, word discarded", raw.sync[0], raw.sync[1]);
                "INVALID".to_string()
            }
        };
        info!(
            "Recv {}, original word {:02X?} : decoded word {:02X?} : parity bit {}.",
            label,
            raw.payload,
            decoded.word.bytes(),
            decoded.parity_bit as u8
        );

        self.shared.available.notify_waiters();
    }
}
