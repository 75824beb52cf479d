//! The engine execution context: one thread that owns the object graph.
//!
//! Network tasks never touch the engine directly. They package the work as a
//! job, [`submit`](EngineContext::submit) it (synchronously, so jobs from one
//! caller keep their order), and await the [`Pending`] result with a timeout.
//! A job that outlives the timeout keeps running; only its result is dropped.
//!
//! Between jobs the thread calls [`Reflection::tick`] at a fixed period, so a
//! job never overlaps a simulation step.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use rc_core::{RcError, Result};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::reflection::Reflection;

/// Engine jobs executed (counter).
pub const ENGINE_JOBS_TOTAL: &str = "rc_engine_jobs_total";
/// Engine jobs abandoned by their caller after the request timeout (counter).
pub const ENGINE_TIMEOUTS_TOTAL: &str = "rc_engine_timeouts_total";

const THREAD_NAME: &str = "rc-engine";

type Job = Box<dyn FnOnce(&mut dyn Reflection) + Send>;

enum Message {
    Job(Job),
    Shutdown,
}

/// Engine context settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long a caller waits for a job.
    pub request_timeout: Duration,
    /// Simulation tick period; `None` disables ticking.
    pub tick_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            tick_interval: Some(Duration::from_millis(16)),
        }
    }
}

struct Inner {
    tx: mpsc::Sender<Message>,
    config: EngineConfig,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}

/// Cloneable handle to the engine thread.
#[derive(Clone)]
pub struct EngineContext {
    inner: Arc<Inner>,
}

impl EngineContext {
    /// Move `engine` onto a new dedicated thread.
    pub fn spawn(engine: impl Reflection, config: EngineConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let tick = config.tick_interval;
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || run_loop(Box::new(engine), &rx, tick))
            .map_err(|e| RcError::internal(format!("failed to start engine thread: {e}")))?;
        debug!(?config, "engine thread started");
        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                config,
                thread: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Configured request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.inner.config.request_timeout
    }

    /// Queue a job. Jobs run in the order they were submitted.
    ///
    /// A panic inside the job is caught and reported as `Internal`.
    pub fn submit<T, F>(&self, job: F) -> Pending<T>
    where
        F: FnOnce(&mut dyn Reflection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::new(move |engine| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(engine))).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!(%message, "engine job panicked");
                Err(RcError::internal(format!("engine job panicked: {message}")))
            });
            // the caller may have timed out or gone away
            let _ = tx.send(outcome);
        });
        if self.inner.tx.send(Message::Job(wrapped)).is_err() {
            warn!("engine thread is gone, job dropped");
        }
        Pending {
            rx,
            timeout: self.inner.config.request_timeout,
        }
    }

    /// Queue a job that needs the concrete engine type.
    pub fn submit_on<E, T, F>(&self, job: F) -> Pending<T>
    where
        E: Reflection,
        F: FnOnce(&mut E) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(move |engine| match engine.as_any_mut().downcast_mut::<E>() {
            Some(concrete) => job(concrete),
            None => Err(RcError::internal(format!(
                "engine is not a {}",
                std::any::type_name::<E>()
            ))),
        })
    }

    /// Submit and wait.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Reflection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(job).wait().await
    }

    /// Whether the caller is on the engine thread.
    pub fn on_engine_thread() -> bool {
        thread::current().name() == Some(THREAD_NAME)
    }

    /// Ask the engine thread to stop once the jobs already queued have run.
    pub fn shutdown(&self) {
        let _ = self.inner.tx.send(Message::Shutdown);
    }

    /// Block until the engine thread has exited. Call after [`shutdown`](Self::shutdown).
    pub fn join(&self) {
        let handle = self.inner.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("engine thread panicked");
            }
        }
    }
}

/// Result of a submitted job.
#[must_use = "a job result does nothing unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
    timeout: Duration,
}

impl<T> Pending<T> {
    /// Wait for the job, up to the request timeout.
    pub async fn wait(self) -> Result<T> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RcError::internal("engine thread stopped before the job ran")),
            Err(_) => {
                counter!(ENGINE_TIMEOUTS_TOTAL).increment(1);
                let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(after_ms, "engine job timed out, result will be discarded");
                Err(RcError::Timeout { after_ms })
            }
        }
    }
}

fn run_loop(mut engine: Box<dyn Reflection>, rx: &mpsc::Receiver<Message>, tick: Option<Duration>) {
    let mut last_tick = Instant::now();
    loop {
        let message = match tick {
            Some(period) => {
                let wait = (last_tick + period).saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            },
        };

        match message {
            Some(Message::Job(job)) => {
                counter!(ENGINE_JOBS_TOTAL).increment(1);
                job(engine.as_mut());
            }
            Some(Message::Shutdown) => break,
            None => {}
        }

        if let Some(period) = tick {
            let now = Instant::now();
            let dt = now.duration_since(last_tick);
            if dt >= period {
                last_tick = now;
                if panic::catch_unwind(AssertUnwindSafe(|| engine.tick(dt))).is_err() {
                    error!("engine tick panicked");
                }
            }
        }
    }
    debug!("engine thread stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
