//! Single-worker job scheduler.
//!
//! All provider access is funneled through one dedicated OS thread. The
//! provider types are not `Send`, so the only way to touch them is to run a
//! closure on the owning thread via this scheduler. Three submission shapes
//! exist, mirroring the needs of the RPC layer:
//!
//! * [`Scheduler::post`] — fire and forget; silently dropped once the
//!   scheduler has shut down.
//! * [`Scheduler::send`] — run synchronously and return the result; executes
//!   inline when already on the owning thread, so re-entrant submissions
//!   cannot deadlock.
//! * [`Scheduler::call`] — awaitable variant of `send` for async callers.
//!
//! Worker panics are captured and re-raised on the submitting side, never on
//! the pump, so one poisoned job cannot take the worker down.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;

use thiserror::Error;
use tracing::{debug, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("scheduler has shut down")]
pub struct SchedulerClosed;

struct Shared {
    accepting: AtomicBool,
    owner: OnceLock<ThreadId>,
}

/// Cloneable handle for submitting jobs.
pub struct Scheduler {
    tx: mpsc::Sender<Message>,
    shared: Arc<Shared>,
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The receiving half; consumed by [`SchedulerLoop::run`] on the thread that
/// becomes the owner.
pub struct SchedulerLoop {
    rx: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
}

/// Create a scheduler pair. The loop must be moved to the worker thread and
/// run there; handles may be cloned freely.
pub fn channel() -> (Scheduler, SchedulerLoop) {
    let (tx, rx) = mpsc::channel();
    let shared = Arc::new(Shared {
        accepting: AtomicBool::new(true),
        owner: OnceLock::new(),
    });
    (
        Scheduler {
            tx,
            shared: Arc::clone(&shared),
        },
        SchedulerLoop { rx, shared },
    )
}

impl SchedulerLoop {
    /// Pump jobs until shutdown. Records the current thread as the owner;
    /// must be called exactly once.
    pub fn run(self) {
        self.shared
            .owner
            .set(std::thread::current().id())
            .expect("scheduler loop started twice");
        debug!("scheduler loop started");
        while let Ok(message) = self.rx.recv() {
            match message {
                Message::Run(job) => {
                    // A panicking job already delivered its payload to the
                    // submitter through the reply channel; swallow it here to
                    // keep the pump alive.
                    let _ = catch_unwind(AssertUnwindSafe(job));
                }
                Message::Shutdown => break,
            }
        }
        self.shared.accepting.store(false, Ordering::SeqCst);
        debug!("scheduler loop stopped");
    }
}

impl Scheduler {
    fn on_owner_thread(&self) -> bool {
        self.shared.owner.get() == Some(&std::thread::current().id())
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Fire-and-forget submission. After shutdown the job is dropped without
    /// error, matching the semantics callers of `post` rely on during
    /// teardown.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if !self.is_accepting() {
            trace!("post after shutdown dropped");
            return;
        }
        if self.tx.send(Message::Run(Box::new(job))).is_err() {
            trace!("post after loop exit dropped");
        }
    }

    /// Run `job` on the owning thread and block for its result. Executes
    /// inline when called from the owning thread itself. A panic inside the
    /// job resumes on this side.
    pub fn send<R, F>(&self, job: F) -> Result<R, SchedulerClosed>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.on_owner_thread() {
            return Ok(job());
        }
        if !self.is_accepting() {
            return Err(SchedulerClosed);
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        let wrapped = move || {
            let outcome = catch_unwind(AssertUnwindSafe(job));
            let _ = reply_tx.send(outcome);
        };
        self.tx
            .send(Message::Run(Box::new(wrapped)))
            .map_err(|_| SchedulerClosed)?;

        match reply_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => resume_unwind(payload),
            Err(_) => Err(SchedulerClosed),
        }
    }

    /// Awaitable submission for async callers. A panic inside the job
    /// resumes at the await point.
    pub async fn call<R, F>(&self, job: F) -> Result<R, SchedulerClosed>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if !self.is_accepting() {
            return Err(SchedulerClosed);
        }

        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let wrapped = move || {
            let outcome = catch_unwind(AssertUnwindSafe(job));
            let _ = reply_tx.send(outcome);
        };
        self.tx
            .send(Message::Run(Box::new(wrapped)))
            .map_err(|_| SchedulerClosed)?;

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => resume_unwind(payload),
            Err(_) => Err(SchedulerClosed),
        }
    }

    /// Stop accepting work and let the loop drain what is already queued.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shared.accepting.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(Message::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn start() -> (Scheduler, std::thread::JoinHandle<()>) {
        let (scheduler, pump) = channel();
        let join = std::thread::spawn(move || pump.run());
        // Give the pump a moment to record its owner id.
        while scheduler.shared.owner.get().is_none() {
            std::thread::yield_now();
        }
        (scheduler, join)
    }

    #[test]
    fn send_runs_on_the_owning_thread() {
        let (scheduler, join) = start();
        let worker_id = scheduler.send(|| std::thread::current().id()).unwrap();
        assert_ne!(worker_id, std::thread::current().id());
        scheduler.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn send_from_owner_thread_executes_inline() {
        let (scheduler, join) = start();
        let inner = scheduler.clone();
        let nested = scheduler
            .send(move || {
                // Re-entrant submission must not deadlock.
                inner.send(|| 21 * 2).unwrap()
            })
            .unwrap();
        assert_eq!(nested, 42);
        scheduler.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn jobs_run_in_submission_order() {
        let (scheduler, join) = start();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..8 {
            let seen = Arc::clone(&seen);
            scheduler.post(move || seen.lock().unwrap().push(i));
        }
        // A blocking send behind the posts acts as a barrier.
        scheduler.send(|| ()).unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..8).collect::<Vec<_>>());
        scheduler.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn panics_resume_on_the_submitter_and_spare_the_pump() {
        let (scheduler, join) = start();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            scheduler.send(|| panic!("boom")).unwrap()
        }));
        assert!(result.is_err());
        // The pump survived the panic.
        assert_eq!(scheduler.send(|| 7).unwrap(), 7);
        scheduler.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn post_after_shutdown_is_dropped_silently() {
        let (scheduler, join) = start();
        scheduler.shutdown();
        join.join().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        scheduler.post(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn send_after_shutdown_reports_closed() {
        let (scheduler, join) = start();
        scheduler.shutdown();
        join.join().unwrap();
        assert_eq!(scheduler.send(|| 1), Err(SchedulerClosed));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (scheduler, join) = start();
        scheduler.shutdown();
        scheduler.shutdown();
        join.join().unwrap();
    }

    #[tokio::test]
    async fn call_bridges_to_async_callers() {
        let (scheduler, join) = start();
        let value = scheduler.call(|| 5 + 5).await.unwrap();
        assert_eq!(value, 10);
        scheduler.shutdown();
        join.join().unwrap();
    }
}
