//! CAN bus simulator.
//!
//! Stands in for the physical CAN transport so the controller can be
//! exercised without hardware. Two worker threads give it the same
//! concurrency shape as a real driver:
//!
//! ```text
//! ┌───────────┐  send_message   ┌──────────────┐   drain    ┌───────────┐
//! │ any thread │ ──────────────▶ │ TX queue     │ ─────────▶ │ TX worker │
//! └───────────┘   (≤ 1024)      │ (mutex + cv) │            │ (~100 µs/ │
//!                               └──────────────┘            │  frame)   │
//!                                                           └───────────┘
//! ┌───────────┐  synth frames   ┌──────────────┐  copy-out  ┌───────────┐
//! │ RX worker  │ ──────────────▶ │ handler table│ ─────────▶ │ handler   │
//! │ (100-500ms)│                │ (mutex)      │  + invoke  │ (RX thread)│
//! └───────────┘                └──────────────┘            └───────────┘
//! ```
//!
//! Dispatch never holds the handler-table lock across a handler call:
//! the handler `Arc` is cloned out under the lock, the lock is released,
//! and the clone is invoked. A handler may therefore call
//! [`CanBus::register_handler`] or [`CanBus::send_message`] on the same
//! bus without deadlocking.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::Rng;

/// Maximum payload of a classic CAN frame.
pub const MAX_FRAME_LEN: usize = 8;

/// Bounded TX queue capacity. Enqueues beyond this are refused and
/// counted as drops.
pub const TX_QUEUE_CAP: usize = 1024;

/// Simulated per-frame transmission time.
const TX_FRAME_DELAY: Duration = Duration::from_micros(100);

/// Randomized gap between synthesized RX frames (milliseconds).
const RX_INTERVAL_MS: std::ops::RangeInclusive<u64> = 100..=500;

// ───────────────────────────────────────────────────────────────
// Frame
// ───────────────────────────────────────────────────────────────

/// A single CAN frame: 11-bit identifier plus up to 8 payload bytes.
///
/// Bytes at indices `>= len` are zero-filled but carry no meaning.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub id: u16,
    pub data: [u8; MAX_FRAME_LEN],
    pub len: u8,
    /// Monotonic receive/enqueue timestamp.
    pub timestamp: Instant,
}

impl Frame {
    /// Build a frame from a payload slice.
    /// Returns `None` if the payload exceeds [`MAX_FRAME_LEN`].
    pub fn new(id: u16, payload: &[u8]) -> Option<Self> {
        if payload.len() > MAX_FRAME_LEN {
            return None;
        }
        let mut data = [0u8; MAX_FRAME_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id,
            data,
            len: payload.len() as u8,
            timestamp: Instant::now(),
        })
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

// ───────────────────────────────────────────────────────────────
// Bus
// ───────────────────────────────────────────────────────────────

/// Handlers execute on the RX worker thread.
pub type FrameHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Simulated CAN bus node.
///
/// `start` and `stop` are idempotent; the bus may be restarted after
/// `stop` (fresh workers are spawned). All methods take `&self`, so the
/// bus is shared as `Arc<CanBus>` between the supervisor, its handlers,
/// and the workers.
pub struct CanBus {
    node_id: u8,
    running: AtomicBool,
    /// RX worker synthesizes temperature traffic while set. Cleared by
    /// harnesses that feed fully scripted input via [`CanBus::inject`].
    synthetic_traffic: AtomicBool,

    tx_queue: Mutex<VecDeque<Frame>>,
    tx_wakeup: Condvar,

    handlers: Mutex<HashMap<u16, FrameHandler>>,
    workers: Mutex<Vec<JoinHandle<()>>>,

    tx_count: AtomicU64,
    rx_count: AtomicU64,
    drop_count: AtomicU64,
}

impl CanBus {
    pub fn new(node_id: u8) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            running: AtomicBool::new(false),
            synthetic_traffic: AtomicBool::new(true),
            tx_queue: Mutex::new(VecDeque::new()),
            tx_wakeup: Condvar::new(),
            handlers: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            tx_count: AtomicU64::new(0),
            rx_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        })
    }

    /// Start the RX and TX workers. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("CAN node 0x{:02X}: bus started", self.node_id);

        let rx_bus = Arc::clone(self);
        let tx_bus = Arc::clone(self);
        let mut workers = self.workers.lock().unwrap();
        workers.push(
            std::thread::Builder::new()
                .name("can-rx".into())
                .spawn(move || rx_bus.receive_worker())
                .expect("spawn can-rx"),
        );
        workers.push(
            std::thread::Builder::new()
                .name("can-tx".into())
                .spawn(move || tx_bus.transmit_worker())
                .expect("spawn can-tx"),
        );
    }

    /// Signal both workers and join them. No-op if already stopped.
    ///
    /// Frames still queued at shutdown are discarded without touching
    /// the drop counter — drops count capacity refusals only.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.tx_wakeup.notify_all();

        let joined = {
            let mut workers = self.workers.lock().unwrap();
            std::mem::take(&mut *workers)
        };
        for handle in joined {
            if handle.join().is_err() {
                warn!("CAN worker panicked during shutdown");
            }
        }
        self.tx_queue.lock().unwrap().clear();
        info!("CAN node 0x{:02X}: bus stopped", self.node_id);
    }

    /// Queue a frame for transmission.
    ///
    /// Returns `false` when the payload exceeds 8 bytes, the bus is not
    /// running, or the TX queue is at capacity (the last also bumps the
    /// drop counter). Never blocks beyond the queue lock.
    pub fn send_message(&self, id: u16, payload: &[u8]) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let Some(frame) = Frame::new(id, payload) else {
            return false;
        };

        {
            let mut queue = self.tx_queue.lock().unwrap();
            if queue.len() >= TX_QUEUE_CAP {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            queue.push_back(frame);
        }
        self.tx_wakeup.notify_one();
        true
    }

    /// Install or replace the handler for a frame identifier.
    ///
    /// Safe to call from any thread, including from inside another
    /// handler running on the RX worker.
    pub fn register_handler<F>(&self, id: u16, handler: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().insert(id, Arc::new(handler));
    }

    /// Deliver an externally built frame through the normal dispatch
    /// path, exactly as if the RX worker had received it.
    ///
    /// Used by the scripted scenario and by tests to feed sensor input.
    pub fn inject(&self, frame: Frame) {
        self.dispatch(&frame);
    }

    // ── Counter readouts ──────────────────────────────────────

    pub fn tx_count(&self) -> u64 {
        self.tx_count.load(Ordering::Relaxed)
    }

    pub fn rx_count(&self) -> u64 {
        self.rx_count.load(Ordering::Relaxed)
    }

    pub fn drop_count(&self) -> u64 {
        self.drop_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enable or disable the RX worker's synthesized sensor traffic.
    /// On by default; scripted harnesses turn it off so injected
    /// frames are the only input.
    pub fn set_synthetic_traffic(&self, enabled: bool) {
        self.synthetic_traffic.store(enabled, Ordering::Relaxed);
    }

    // ── Internal ──────────────────────────────────────────────

    /// Copy the handler out under the lock, release, then invoke.
    fn dispatch(&self, frame: &Frame) {
        let handler = {
            let handlers = self.handlers.lock().unwrap();
            handlers.get(&frame.id).cloned()
        };
        if let Some(handler) = handler {
            handler(frame);
            self.rx_count.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("RX frame 0x{:03X} has no handler", frame.id);
        }
    }

    /// Synthesize sensor traffic at randomized intervals.
    ///
    /// Models the temperature sensor node broadcasting readings in
    /// tenths of a degree (65.0–69.9 °C band).
    fn receive_worker(&self) {
        let mut rng = rand::thread_rng();
        while self.running.load(Ordering::SeqCst) {
            let interval = Duration::from_millis(rng.gen_range(RX_INTERVAL_MS));
            std::thread::sleep(interval);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if !self.synthetic_traffic.load(Ordering::Relaxed) {
                continue;
            }

            let tenths: u16 = rng.gen_range(650..=699);
            let payload = [(tenths >> 8) as u8, (tenths & 0xFF) as u8];
            if let Some(frame) = Frame::new(0x100, &payload) {
                self.dispatch(&frame);
            }
        }
    }

    /// Drain the TX queue one frame at a time.
    ///
    /// The queue lock is dropped for the duration of the simulated
    /// transmission so senders are never blocked on the wire delay.
    fn transmit_worker(&self) {
        let mut queue = self.tx_queue.lock().unwrap();
        loop {
            while queue.is_empty() && self.running.load(Ordering::SeqCst) {
                queue = self.tx_wakeup.wait(queue).unwrap();
            }
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let frame = queue.pop_front();
            drop(queue);

            if let Some(frame) = frame {
                std::thread::sleep(TX_FRAME_DELAY);
                self.tx_count.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "TX frame 0x{:03X} len={} after {:?} queued",
                    frame.id,
                    frame.len,
                    frame.timestamp.elapsed()
                );
            }

            queue = self.tx_queue.lock().unwrap();
        }
    }
}

impl Drop for CanBus {
    fn drop(&mut self) {
        self.stop();
    }
}
