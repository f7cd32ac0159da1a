//! Readiness-checked writers for the two legs of a call.

use axum::extract::ws::Message as CallMessage;
use bytes::Bytes;
use callbridge_core::Leg;
use futures_util::{Sink, SinkExt};
use std::{
    fmt::Display,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::tungstenite::Message as AgentMessage;
use tracing::{Instrument, debug, trace};

/// The control frames a leg writer needs from a WebSocket message type.
pub trait Frame: Send + 'static {
    fn text(text: String) -> Self;
    fn ping() -> Self;
    fn close() -> Self;
}

impl Frame for CallMessage {
    fn text(text: String) -> Self {
        CallMessage::Text(text.into())
    }
    fn ping() -> Self {
        CallMessage::Ping(Bytes::new())
    }
    fn close() -> Self {
        CallMessage::Close(None)
    }
}

impl Frame for AgentMessage {
    fn text(text: String) -> Self {
        AgentMessage::Text(text.into())
    }
    fn ping() -> Self {
        AgentMessage::Ping(Bytes::new())
    }
    fn close() -> Self {
        AgentMessage::Close(None)
    }
}

/// The write half of one leg.
///
/// Every send checks that the leg is still open; writing to a closed leg is a
/// no-op that returns `false`. A failed write marks the leg closed. `close`
/// may be called any number of times and only the first call sends a close frame.
pub struct LegWriter<S, M> {
    leg: Leg,
    sink: Mutex<S>,
    open: AtomicBool,
    _frame: PhantomData<fn(M)>,
}

impl<S, M> LegWriter<S, M> {
    pub fn new(leg: Leg, sink: S) -> Self {
        Self {
            leg,
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
            _frame: PhantomData,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl<S, M> LegWriter<S, M>
where
    S: Sink<M> + Unpin,
    S::Error: Display,
    M: Frame,
{
    pub async fn send_text(&self, text: String) -> bool {
        self.send(M::text(text)).await
    }

    pub async fn ping(&self) -> bool {
        self.send(M::ping()).await
    }

    async fn send(&self, frame: M) -> bool {
        if !self.is_open() {
            return false;
        }
        let mut guard = self.sink.lock().await;
        // Re-check: a close may have won the lock race.
        if !self.is_open() {
            return false;
        }
        let sink = &mut *guard;
        match sink.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                debug!(leg = ?self.leg, error = %e, "Write failed. Marking leg closed.");
                self.open.store(false, Ordering::Release);
                false
            }
        }
    }

    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut guard = self.sink.lock().await;
        let sink = &mut *guard;
        if let Err(e) = sink.send(M::close()).await {
            debug!(leg = ?self.leg, error = %e, "Close frame not delivered.");
        }
        let _ = sink.close().await;
        debug!(leg = ?self.leg, "Leg closed.");
    }
}

/// Pings `leg` every `period` until the returned handle is aborted. The first
/// ping goes out one period after the call is made. Ticks on a closed leg are
/// skipped.
pub fn spawn_keepalive<S, M>(leg: Arc<LegWriter<S, M>>, period: Duration) -> JoinHandle<()>
where
    S: Sink<M> + Unpin + Send + 'static,
    S::Error: Display,
    M: Frame,
{
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if leg.ping().await {
                    trace!("Keepalive ping sent.");
                } else {
                    trace!("Keepalive skipped, leg not open.");
                }
            }
        }
        .in_current_span(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    type TestWriter = LegWriter<mpsc::UnboundedSender<CallMessage>, CallMessage>;

    fn writer() -> (Arc<TestWriter>, mpsc::UnboundedReceiver<CallMessage>) {
        let (tx, rx) = mpsc::unbounded();
        (Arc::new(LegWriter::new(Leg::Call, tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<CallMessage>) -> Vec<CallMessage> {
        let mut out = Vec::new();
        while let Ok(Some(msg)) = rx.try_next() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_send_on_open_leg() {
        let (leg, mut rx) = writer();
        assert!(leg.is_open());
        assert!(leg.send_text("hello".to_string()).await);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            CallMessage::Text(text) => assert_eq!(text.as_str(), "hello"),
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_sends() {
        let (leg, mut rx) = writer();
        leg.close().await;
        leg.close().await;
        assert!(!leg.is_open());
        assert!(!leg.send_text("late".to_string()).await);
        assert!(!leg.ping().await);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], CallMessage::Close(None)));
    }

    #[tokio::test]
    async fn test_failed_write_marks_leg_closed() {
        let (leg, rx) = writer();
        drop(rx);
        assert!(!leg.send_text("lost".to_string()).await);
        assert!(!leg.is_open());
        // Closing afterwards stays quiet.
        leg.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_pings_until_aborted() {
        let (leg, mut rx) = writer();
        let handle = spawn_keepalive(leg.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(25)).await;
        tokio::task::yield_now().await;
        let pings = drain(&mut rx);
        assert_eq!(pings.len(), 2);
        assert!(pings.iter().all(|m| matches!(m, CallMessage::Ping(_))));

        handle.abort();
        let _ = handle.await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_skips_closed_leg() {
        let (leg, mut rx) = writer();
        let handle = spawn_keepalive(leg.clone(), Duration::from_secs(10));
        leg.close().await;

        tokio::time::sleep(Duration::from_secs(35)).await;
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], CallMessage::Close(None)));
        assert!(!handle.is_finished());
        handle.abort();
    }
}
