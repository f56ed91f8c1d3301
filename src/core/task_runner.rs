/*
 * A small fixed-size worker pool that runs profile operations off the
 * presentation thread. Every handle-acquiring user intent (create, rename,
 * delete, reorder, import, export, clone, switch) is submitted here as one
 * independent task.
 *
 * Tasks return `Result<(), ProfileError>`. A failing task is logged and dropped;
 * a panicking task is caught so the worker that ran it keeps serving the queue.
 * There is no ordering between tasks beyond what the store's critical section
 * gives each of them.
 */
use super::profiles::ProfileError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

pub const DEFAULT_WORKER_THREADS: usize = 2;

type Job = Box<dyn FnOnce() -> Result<(), ProfileError> + Send + 'static>;

struct Task {
    name: String,
    job: Job,
}

/* Count of submitted-but-unfinished tasks, used by `wait_idle`. */
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(|p| p.into_inner()) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

pub struct TaskRunner {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

impl TaskRunner {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(Pending::default());

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let pending = Arc::clone(&pending);
            let spawned = thread::Builder::new()
                .name(format!("profile-worker-{index}"))
                .spawn(move || Self::worker_loop(index, &receiver, &pending));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::error!("TaskRunner: Failed to spawn worker {index}: {e}"),
            }
        }
        log::debug!("TaskRunner: Started with {} workers.", workers.len());

        TaskRunner {
            sender: Some(sender),
            workers,
            pending,
        }
    }

    fn worker_loop(index: usize, receiver: &Mutex<Receiver<Task>>, pending: &Pending) {
        loop {
            // Only the dequeue is done under the lock; the task runs unlocked.
            let next = receiver
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .recv();
            let Ok(task) = next else {
                log::trace!("TaskRunner: Worker {index} shutting down.");
                return;
            };

            log::trace!("TaskRunner: Worker {index} running '{}'.", task.name);
            match panic::catch_unwind(AssertUnwindSafe(task.job)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("TaskRunner: Task '{}' failed: {e}", task.name),
                Err(_) => log::error!("TaskRunner: Task '{}' panicked.", task.name),
            }
            pending.decrement();
        }
    }

    /* Queues `job`; returns immediately. */
    pub fn execute<F>(&self, name: &str, job: F)
    where
        F: FnOnce() -> Result<(), ProfileError> + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            log::warn!("TaskRunner: Rejecting '{name}', runner is shut down.");
            return;
        };
        self.pending.increment();
        let task = Task {
            name: name.to_string(),
            job: Box::new(job),
        };
        if sender.send(task).is_err() {
            log::error!("TaskRunner: No worker left to run '{name}'.");
            self.pending.decrement();
        }
    }

    /* Blocks until every task submitted so far has finished. */
    pub fn wait_idle(&self) {
        let mut count = self
            .pending
            .count
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        while *count > 0 {
            count = self
                .pending
                .idle
                .wait(count)
                .unwrap_or_else(|p| p.into_inner());
        }
    }

    pub fn pending_tasks(&self) -> usize {
        *self
            .pending
            .count
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        TaskRunner::new(DEFAULT_WORKER_THREADS)
    }
}

impl Drop for TaskRunner {
    /* Lets the queue drain, then joins every worker. */
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("TaskRunner: A worker thread terminated abnormally.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_runs_all_submitted_tasks() {
        // Arrange
        let runner = TaskRunner::new(3);
        let counter = Arc::new(AtomicUsize::new(0));

        // Act
        for _ in 0..25 {
            let counter = Arc::clone(&counter);
            runner.execute("count", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        runner.wait_idle();

        // Assert
        assert_eq!(counter.load(Ordering::SeqCst), 25);
        assert_eq!(runner.pending_tasks(), 0);
        assert_eq!(runner.worker_count(), 3);
    }

    #[test]
    fn test_failing_and_panicking_tasks_do_not_stop_the_pool() {
        crate::initialize_logging();
        let runner = TaskRunner::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        runner.execute("fails", || {
            Err(ProfileError::Io(io::Error::other("disk on fire")))
        });
        runner.execute("panics", || panic!("task blew up"));
        let c = Arc::clone(&counter);
        runner.execute("after", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        runner.wait_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_drains_queue_before_joining() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let runner = TaskRunner::new(2);
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                runner.execute("late", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_zero_workers_is_clamped_to_one() {
        let runner = TaskRunner::new(0);
        assert_eq!(runner.worker_count(), 1);
    }

    #[test]
    fn test_wait_idle_with_nothing_queued_returns() {
        let runner = TaskRunner::default();
        runner.wait_idle();
        assert_eq!(runner.worker_count(), DEFAULT_WORKER_THREADS);
    }
}
