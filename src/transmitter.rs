//! MIL-STD-1553B transmitter (bus source)
//!
//! Words are queued with a sync type and sent strictly in submission order.
//! A background loop takes one frame at a time, drives its sync, payload and
//! parity half bits onto the bus and returns the line to neutral.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

use crate::config::BusConfig;
use crate::core::{SyncType, Word};
use crate::encoding::ManchesterType;
use crate::error::Result;
use crate::frame::Frame;
use crate::line::{BusLine, BusValue, ResetLine, ResetMonitor};
use crate::task::LoopTask;

#[derive(Debug, Default)]
struct TxState {
    queue: VecDeque<Frame>,
    /// A frame is being driven
    active: bool,
}

impl TxState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.active
    }
}

#[derive(Debug)]
struct TxShared {
    state: Mutex<TxState>,
    pending: Notify,
    idle: watch::Sender<bool>,
}

impl TxShared {
    fn new() -> Self {
        let (idle, _) = watch::channel(true);
        TxShared {
            state: Mutex::new(TxState::default()),
            pending: Notify::new(),
            idle,
        }
    }

    fn publish_idle(&self, state: &TxState) {
        self.idle.send_replace(state.is_idle());
    }

    async fn frame_pending(&self) {
        loop {
            let ready = !self.state.lock().queue.is_empty();
            if ready {
                return;
            }
            self.pending.notified().await;
        }
    }

    fn start_frame(&self) -> Option<Frame> {
        let mut state = self.state.lock();
        let frame = state.queue.pop_front()?;
        state.active = true;
        Some(frame)
    }

    fn finish_frame(&self) {
        let mut state = self.state.lock();
        state.active = false;
        self.publish_idle(&state);
    }
}

/// Transmit side of a MIL-STD-1553B bus
///
/// Must be created inside a tokio runtime. Dropping the transmitter stops
/// its loop and releases the bus to neutral.
#[derive(Debug)]
pub struct Transmitter {
    shared: Arc<TxShared>,
    bus: BusLine,
    reset: ResetMonitor,
    config: BusConfig,
    task: LoopTask,
}

impl Transmitter {
    /// Create a transmitter driving `bus`, held off while `reset` is low
    pub fn new(bus: &BusLine, reset: &ResetLine, config: BusConfig) -> Result<Self> {
        config.validate()?;

        info!("MIL-STD-1553 source");
        info!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        info!("Source bus: {}", config);

        bus.write(BusValue::NEUTRAL);
        let shared = Arc::new(TxShared::new());
        let reset = reset.monitor();
        let task = Self::spawn_loop(&shared, bus, &reset, config);

        Ok(Transmitter {
            shared,
            bus: bus.clone(),
            reset,
            config,
            task,
        })
    }

    fn spawn_loop(
        shared: &Arc<TxShared>,
        bus: &BusLine,
        reset: &ResetMonitor,
        config: BusConfig,
    ) -> LoopTask {
        let worker = TxLoop {
            shared: shared.clone(),
            bus: bus.clone(),
            reset: reset.clone(),
            code: config.encoding,
            half_bit: config.half_bit(),
        };
        LoopTask::spawn("transmitter", info_span!("transmitter"), move |token| {
            worker.run(token)
        })
    }

    /// The configuration in use
    pub fn config(&self) -> BusConfig {
        self.config
    }

    /// True while the transmit loop is alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Queue a word and wait until every queued frame has been sent
    pub async fn write(&self, sync: SyncType, data: impl AsRef<[u8]>) -> Result<()> {
        self.write_nowait(sync, data)?;
        self.wait().await;
        Ok(())
    }

    /// Send a word behind a command sync and wait for the queue to drain
    pub async fn write_cmd(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.write(SyncType::Command, data).await
    }

    /// Send a word behind a data sync and wait for the queue to drain
    pub async fn write_data(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.write(SyncType::Data, data).await
    }

    /// Queue a word and return at once
    ///
    /// Anything but exactly two bytes is logged and rejected; nothing is queued.
    pub fn write_nowait(&self, sync: SyncType, data: impl AsRef<[u8]>) -> Result<()> {
        let word = Word::from_bytes(data.as_ref()).inspect_err(|err| {
            error!("Rejected {} submission: {}", sync, err);
        })?;

        {
            let mut state = self.shared.state.lock();
            state.queue.push_back(Frame::new(sync, word));
            self.shared.publish_idle(&state);
        }
        self.shared.pending.notify_one();

        debug!("Queued {} {}", sync, word);
        Ok(())
    }

    /// Queue a word behind a command sync
    pub fn write_nowait_cmd(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.write_nowait(SyncType::Command, data)
    }

    /// Queue a word behind a data sync
    pub fn write_nowait_data(&self, data: impl AsRef<[u8]>) -> Result<()> {
        self.write_nowait(SyncType::Data, data)
    }

    /// Number of frames waiting to be sent
    pub fn count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// True when no frame is waiting
    pub fn empty(&self) -> bool {
        self.shared.state.lock().queue.is_empty()
    }

    /// True when nothing is queued and no frame is on the bus
    pub fn idle(&self) -> bool {
        self.shared.state.lock().is_idle()
    }

    /// Drop every queued frame; a frame already on the bus completes
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        self.shared.publish_idle(&state);
        if dropped > 0 {
            debug!("Cleared {} queued frames", dropped);
        }
    }

    /// Wait until the transmitter is idle
    pub async fn wait(&self) {
        let mut idle = self.shared.idle.subscribe();
        idle.wait_for(|idle| *idle).await.ok();
    }

    /// Wait until idle or until `timeout` passes; returns true when idle
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Kill the loop and start a fresh one
    ///
    /// A frame in flight is abandoned and the bus returns to neutral.
    /// Queued frames are kept.
    pub fn restart(&mut self) {
        self.task.stop();
        self.bus.write(BusValue::NEUTRAL);
        {
            let mut state = self.shared.state.lock();
            state.active = false;
            self.shared.publish_idle(&state);
        }
        self.task = Self::spawn_loop(&self.shared, &self.bus, &self.reset, self.config);
        info!("Source restarted");
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.task.stop();
        self.bus.write(BusValue::NEUTRAL);
    }
}

/// State owned by the transmit loop
struct TxLoop {
    shared: Arc<TxShared>,
    bus: BusLine,
    reset: ResetMonitor,
    code: ManchesterType,
    half_bit: Duration,
}

impl TxLoop {
    async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = self.cycle() => {
                    if let Err(err) = result {
                        warn!("Source loop halted: {}", err);
                        break;
                    }
                }
            }
        }
    }

    /// Send at most one frame
    async fn cycle(&mut self) -> Result<()> {
        self.reset.released().await?;
        self.shared.frame_pending().await;

        // reset may have been asserted while the queue was empty
        if !self.reset.is_released() {
            return Ok(());
        }
        let Some(frame) = self.shared.start_frame() else {
            return Ok(());
        };

        info!(
            "Send {} : original word {:02X?} : encoded word {:02X?} : parity bit {}.",
            frame.sync(),
            frame.word().bytes(),
            frame.encoded_payload(self.code),
            frame.parity() as u8
        );

        frame.drive(&self.bus, self.code, self.half_bit).await;
        self.shared.finish_frame();
        Ok(())
    }
}
