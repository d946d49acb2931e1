//! Supervised background workers for slow monitoring checks.
//!
//! Each check cycle of a slow task runs on its own detached thread. The
//! worker only starts a new generation once the previous one has finished.
//! A generation still busy at the next check counts as a hang; past the
//! allowed number of consecutive hangs the worker cancels the stale
//! generation, abandons it without joining, and refuses further work.

use crate::log::Logger;
use crate::{log_error, log_warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of asking the worker to run another cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoll {
    /// A new generation was started.
    Started(u64),
    /// The previous generation is still running.
    Hanging(u32),
    /// The hang limit was just exceeded; the worker is now disabled.
    Disabled,
    /// The worker was disabled earlier.
    Inactive,
    /// The thread could not be spawned.
    SpawnFailed,
}

struct Generation {
    id: u64,
    cancel: CancellationToken,
    done: Arc<AtomicBool>,
}

/// Marks a generation done when the job returns or unwinds.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// One slow task's worker supervisor.
pub struct SupervisedWorker {
    name: &'static str,
    max_hangs: u32,
    generation: u64,
    hangs: u32,
    disabled: bool,
    current: Option<Generation>,
}

impl SupervisedWorker {
    pub fn new(name: &'static str, max_hangs: u32) -> Self {
        Self {
            name,
            max_hangs,
            generation: 0,
            hangs: 0,
            disabled: false,
            current: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn hangs(&self) -> u32 {
        self.hangs
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// True while the latest generation is still running.
    pub fn is_busy(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|g| !g.done.load(Ordering::SeqCst))
    }

    /// Starts `job` on a new generation unless the previous one is still
    /// running. The job receives a token cancelled when its generation is
    /// abandoned.
    pub fn poll<F>(&mut self, dashlog: &dyn Logger, job: F) -> WorkerPoll
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        if self.disabled {
            return WorkerPoll::Inactive;
        }

        if self.is_busy() {
            self.hangs += 1;
            if self.hangs <= self.max_hangs {
                log_warn!(dashlog, "{} thread is hanging (#{})", self.name, self.hangs);
                return WorkerPoll::Hanging(self.hangs);
            }
            log_error!(
                dashlog,
                "{} monitoring seems to be stuck, monitoring will not be done",
                self.name
            );
            self.abandon();
            self.disabled = true;
            return WorkerPoll::Disabled;
        }

        self.hangs = 0;
        self.generation += 1;
        let id = self.generation;
        let cancel = CancellationToken::new();
        let done = Arc::new(AtomicBool::new(false));

        let token = cancel.clone();
        let guard = DoneGuard(Arc::clone(&done));
        let spawned = std::thread::Builder::new()
            .name(format!("cnc-{}-{}", self.name.to_lowercase(), id))
            .spawn(move || {
                let _guard = guard;
                job(token);
            });

        match spawned {
            Ok(_) => {
                self.current = Some(Generation { id, cancel, done });
                WorkerPoll::Started(id)
            }
            Err(e) => {
                log_error!(dashlog, "Cannot start {} thread: {}", self.name, e);
                self.current = None;
                WorkerPoll::SpawnFailed
            }
        }
    }

    /// Clears the hang count.
    pub fn reset(&mut self) {
        self.hangs = 0;
    }

    /// Cancels the running generation, if any.
    pub fn close(&mut self) {
        self.abandon();
    }

    fn abandon(&mut self) {
        if let Some(generation) = self.current.take() {
            tracing::debug!(
                worker = self.name,
                generation = generation.id,
                "Abandoning worker generation"
            );
            generation.cancel.cancel();
        }
    }
}

impl Drop for SupervisedWorker {
    fn drop(&mut self) {
        self.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, MemoryLogger};
    use std::sync::mpsc;
    use std::time::Duration;

    fn wait_idle(worker: &SupervisedWorker) {
        for _ in 0..200 {
            if !worker.is_busy() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("worker never finished");
    }

    #[test]
    fn test_finished_generation_is_replaced() {
        let log = MemoryLogger::new();
        let mut worker = SupervisedWorker::new("TriggerCount", 3);
        let (tx, rx) = mpsc::channel();

        let tx1 = tx.clone();
        assert_eq!(worker.poll(&log, move |_| tx1.send(1).unwrap()), WorkerPoll::Started(1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 1);
        wait_idle(&worker);

        assert_eq!(worker.poll(&log, move |_| tx.send(2).unwrap()), WorkerPoll::Started(2));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_hangs_disable_after_limit() {
        let log = MemoryLogger::new();
        let mut worker = SupervisedWorker::new("Radar", 3);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (cancelled_tx, cancelled_rx) = mpsc::channel();

        worker.poll(&log, move |token| {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            cancelled_tx.send(token.is_cancelled()).unwrap();
        });

        for n in 1..=3 {
            assert_eq!(worker.poll(&log, |_| {}), WorkerPoll::Hanging(n));
        }
        assert_eq!(worker.poll(&log, |_| {}), WorkerPoll::Disabled);
        assert!(worker.is_disabled());
        assert_eq!(worker.poll(&log, |_| {}), WorkerPoll::Inactive);
        assert_eq!(worker.generation(), 1);

        assert_eq!(log.messages_at(LogLevel::Warn).len(), 3);
        assert!(log.contains("Radar thread is hanging (#1)"));
        assert_eq!(
            log.messages_at(LogLevel::Error),
            vec!["Radar monitoring seems to be stuck, monitoring will not be done"]
        );

        release_tx.send(()).unwrap();
        assert!(cancelled_rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_panicking_job_still_finishes() {
        let log = MemoryLogger::new();
        let mut worker = SupervisedWorker::new("TriggerCount", 3);
        worker.poll(&log, |_| panic!("job failed"));
        wait_idle(&worker);
        assert!(matches!(worker.poll(&log, |_| {}), WorkerPoll::Started(2)));
    }
}
