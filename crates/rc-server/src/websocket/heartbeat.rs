//! Heartbeat ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientSession;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Ping `session` every `interval` until it goes quiet or `cancel` fires.
///
/// A tick with no client activity since the previous tick counts as a miss.
/// After `timeout / interval` consecutive misses (at least one) the client is
/// considered dead.
pub async fn run_heartbeat(
    session: Arc<ClientSession>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    // the first tick completes immediately
    let _ = ticker.tick().await;
    let max_missed = u32::try_from(timeout.as_millis() / interval.as_millis().max(1))
        .unwrap_or(u32::MAX)
        .max(1);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if session.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
                if !session.push_ping() {
                    return HeartbeatResult::Cancelled;
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Frame;

    fn make_session() -> Arc<ClientSession> {
        Arc::new(ClientSession::new(16, CancellationToken::new()))
    }

    #[tokio::test]
    async fn cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_heartbeat(make_session(), Duration::from_secs(100), Duration::from_secs(300), cancel).await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let session = make_session();
        let _ = session.check_alive();
        let result = run_heartbeat(
            session,
            Duration::from_secs(1),
            Duration::from_secs(3),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn responsive_client_stays_connected() {
        let session = make_session();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            session.clone(),
            Duration::from_secs(1),
            Duration::from_secs(2),
            cancel.clone(),
        ));

        for _ in 0..5 {
            time::sleep(Duration::from_millis(500)).await;
            session.mark_alive();
            time::sleep(Duration::from_millis(500)).await;
        }
        assert!(!handle.is_finished());
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn pings_are_queued() {
        let session = make_session();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            session.clone(),
            Duration::from_secs(1),
            Duration::from_secs(10),
            cancel.clone(),
        ));
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(session.recv().await, Some(Frame::Ping));
        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn closed_session_ends_heartbeat() {
        let session = make_session();
        session.close();
        let result = run_heartbeat(
            session,
            Duration::from_millis(5),
            Duration::from_secs(10),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }
}
