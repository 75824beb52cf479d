//! Per-connection session state and its bounded outbox.
//!
//! The outbox is shared by the request path (responses) and the subscription
//! manager (notifications, events). Responses are never dropped. When the
//! queue is at capacity, a new push evicts the oldest queued push for the
//! same subscription, else the oldest push of any subscription; with no push
//! to evict, the new one is dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use rc_core::{SessionId, WireFormat};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::metrics::RC_NOTIFICATIONS_DROPPED_TOTAL;

/// A frame ready for the socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Encoded envelope; text frame for JSON, binary for CBOR.
    Data {
        /// Encoded bytes.
        bytes: Vec<u8>,
        /// Format the bytes are in.
        format: WireFormat,
    },
    /// Heartbeat ping.
    Ping,
}

#[derive(Debug)]
enum Slot {
    Response(Frame),
    Push { key: String, frame: Frame },
    Control(Frame),
}

impl Slot {
    fn into_frame(self) -> Frame {
        match self {
            Self::Response(f) | Self::Push { frame: f, .. } | Self::Control(f) => f,
        }
    }
}

/// A connected WebSocket client.
pub struct ClientSession {
    /// Session ID, sent to the client on connect.
    pub id: SessionId,
    outbox: Mutex<VecDeque<Slot>>,
    capacity: usize,
    ready: Notify,
    closed: AtomicBool,
    cancel: CancellationToken,
    format: Mutex<WireFormat>,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped: AtomicU64,
}

impl ClientSession {
    /// New session whose outbox holds at most `capacity` pushes.
    pub fn new(capacity: usize, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            id: SessionId::new(),
            outbox: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
            cancel,
            format: Mutex::new(WireFormat::Json),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a response. Returns `false` once the session is closed.
    pub fn push_response(&self, bytes: Vec<u8>, format: WireFormat) -> bool {
        self.enqueue(Slot::Response(Frame::Data { bytes, format }))
    }

    /// Queue a notification or event for subscription `key`.
    ///
    /// Returns `false` if the session is closed or the push was dropped.
    pub fn push_notification(&self, key: &str, bytes: Vec<u8>, format: WireFormat) -> bool {
        if self.is_closed() {
            return false;
        }
        let frame = Frame::Data { bytes, format };
        {
            let mut outbox = self.outbox.lock();
            let pushes = outbox.iter().filter(|s| matches!(s, Slot::Push { .. })).count();
            if pushes >= self.capacity || outbox.len() >= self.capacity {
                let victim = outbox
                    .iter()
                    .position(|s| matches!(s, Slot::Push { key: k, .. } if k == key))
                    .or_else(|| outbox.iter().position(|s| matches!(s, Slot::Push { .. })));
                match victim {
                    Some(idx) => {
                        let _ = outbox.remove(idx);
                        self.count_drop();
                    }
                    None => {
                        self.count_drop();
                        return false;
                    }
                }
            }
            outbox.push_back(Slot::Push {
                key: key.to_owned(),
                frame,
            });
        }
        self.ready.notify_one();
        true
    }

    /// Queue a heartbeat ping.
    pub fn push_ping(&self) -> bool {
        self.enqueue(Slot::Control(Frame::Ping))
    }

    /// Next frame to write. `None` once the session is closed.
    pub async fn recv(&self) -> Option<Frame> {
        loop {
            let notified = self.ready.notified();
            if self.is_closed() {
                return None;
            }
            if let Some(slot) = self.outbox.lock().pop_front() {
                return Some(slot.into_frame());
            }
            notified.await;
        }
    }

    /// Close the session: queued frames are discarded, later pushes refused.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.outbox.lock().clear();
        self.cancel.cancel();
        self.ready.notify_one();
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Token cancelled when the session closes.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Format of the last request received; used for pushes.
    pub fn format(&self) -> WireFormat {
        *self.format.lock()
    }

    /// Record the format of a received request.
    pub fn set_format(&self, format: WireFormat) {
        *self.format.lock() = format;
    }

    /// Frames waiting to be written.
    pub fn queued(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Pushes dropped by overflow so far.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Mark the client alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the client last showed activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Read and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Session age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    fn enqueue(&self, slot: Slot) -> bool {
        if self.is_closed() {
            return false;
        }
        self.outbox.lock().push_back(slot);
        self.ready.notify_one();
        true
    }

    fn count_drop(&self) {
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        counter!(RC_NOTIFICATIONS_DROPPED_TOTAL).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(capacity: usize) -> ClientSession {
        ClientSession::new(capacity, CancellationToken::new())
    }

    fn text(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    async fn drain(session: &ClientSession) -> Vec<String> {
        let mut out = Vec::new();
        while session.queued() > 0 {
            if let Some(Frame::Data { bytes, .. }) = session.recv().await {
                out.push(String::from_utf8(bytes).unwrap());
            }
        }
        out
    }

    #[test]
    fn new_session_defaults() {
        let s = session(4);
        assert!(!s.is_closed());
        assert_eq!(s.format(), WireFormat::Json);
        assert_eq!(s.queued(), 0);
        assert!(s.check_alive());
        assert!(!s.check_alive());
    }

    #[tokio::test]
    async fn frames_come_out_in_order() {
        let s = session(4);
        assert!(s.push_response(text("r1"), WireFormat::Json));
        assert!(s.push_notification("sub", text("n1"), WireFormat::Json));
        assert!(s.push_response(text("r2"), WireFormat::Json));
        assert_eq!(drain(&s).await, ["r1", "n1", "r2"]);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_for_same_subscription() {
        let s = session(3);
        assert!(s.push_notification("a", text("a1"), WireFormat::Json));
        assert!(s.push_notification("b", text("b1"), WireFormat::Json));
        assert!(s.push_notification("a", text("a2"), WireFormat::Json));
        assert!(s.push_notification("a", text("a3"), WireFormat::Json));
        assert_eq!(s.dropped_notifications(), 1);
        assert_eq!(drain(&s).await, ["b1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn overflow_falls_back_to_oldest_push() {
        let s = session(2);
        assert!(s.push_notification("a", text("a1"), WireFormat::Json));
        assert!(s.push_notification("b", text("b1"), WireFormat::Json));
        assert!(s.push_notification("c", text("c1"), WireFormat::Json));
        assert_eq!(drain(&s).await, ["b1", "c1"]);
    }

    #[tokio::test]
    async fn responses_are_never_dropped() {
        let s = session(2);
        for i in 0..4 {
            assert!(s.push_response(text(&format!("r{i}")), WireFormat::Json));
        }
        assert!(!s.push_notification("b", text("b1"), WireFormat::Json));
        assert_eq!(s.dropped_notifications(), 1);
        assert_eq!(drain(&s).await, ["r0", "r1", "r2", "r3"]);
    }

    #[tokio::test]
    async fn recv_waits_for_push() {
        let s = std::sync::Arc::new(session(4));
        let reader = s.clone();
        let handle = tokio::spawn(async move { reader.recv().await });
        tokio::task::yield_now().await;
        assert!(s.push_ping());
        assert_eq!(handle.await.unwrap(), Some(Frame::Ping));
    }

    #[tokio::test]
    async fn close_discards_and_refuses() {
        let s = session(4);
        assert!(s.push_response(text("r1"), WireFormat::Json));
        s.close();
        assert!(s.cancel_token().is_cancelled());
        assert!(!s.push_response(text("r2"), WireFormat::Json));
        assert!(!s.push_notification("a", text("n"), WireFormat::Json));
        assert_eq!(s.recv().await, None);
    }

    #[test]
    fn format_tracks_last_request() {
        let s = session(4);
        s.set_format(WireFormat::Cbor);
        assert_eq!(s.format(), WireFormat::Cbor);
    }

    #[test]
    fn mark_alive_resets_pong_timer() {
        let s = session(4);
        let _ = s.check_alive();
        s.mark_alive();
        assert!(s.check_alive());
        assert!(s.last_pong_elapsed() < Duration::from_secs(1));
        assert!(s.age() < Duration::from_secs(1));
    }
}
