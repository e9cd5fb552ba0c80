//! Worker thread pool whose tasks remember their parent.
//!
//! Every task spawned through [`TaskPool`] carries a record naming the task
//! that spawned it and, for schedule marker tasks, the [`ScheduleID`] it
//! runs. The record of the task currently executing on a thread is kept in
//! thread-local storage for exactly as long as the task runs, so the chain
//! of records can be walked from anywhere inside the task.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on the shared queue; joins block on a
//!   `select!` over the task result and the shared queue
//! - **Help while waiting**: a thread joining a task executes other queued
//!   tasks instead of idling, so nested joins cannot starve the pool
//! - **One thread per schedule**: marker tasks never enter the shared
//!   queue; each runs on its own thread, so a helping thread can only pick
//!   up ordinary sub-tasks and every schedule keeps making progress
//! - **Panic isolation**: a panicking task is reported through its handle
//!   and the worker keeps running

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::{FrameworkError, ScheduleID};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
struct TaskRecord {
    id: u64,
    parent: Option<Arc<TaskRecord>>,
    schedule: Option<ScheduleID>,
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<TaskRecord>>> = const { RefCell::new(None) };
}

fn current_task() -> Option<Arc<TaskRecord>> {
    CURRENT_TASK.with(|current| current.borrow().clone())
}

/// Id of the pool task executing on this thread, if any.
pub fn current_task_id() -> Option<u64> {
    CURRENT_TASK.with(|current| current.borrow().as_ref().map(|record| record.id))
}

/// Walk from the executing task through its parents to the nearest
/// schedule marker.
pub(crate) fn current_schedule_marker() -> Option<ScheduleID> {
    CURRENT_TASK.with(|current| {
        let current = current.borrow();
        let mut record = current.as_deref();
        while let Some(task) = record {
            if let Some(sid) = task.schedule {
                return Some(sid);
            }
            record = task.parent.as_deref();
        }
        None
    })
}

/// Installs a task record for the running task, restoring the outer one on drop.
struct RunningTask {
    previous: Option<Arc<TaskRecord>>,
}

impl RunningTask {
    fn enter(record: Arc<TaskRecord>) -> Self {
        let previous = CURRENT_TASK.with(|current| current.borrow_mut().replace(record));
        Self { previous }
    }
}

impl Drop for RunningTask {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TASK.with(|current| *current.borrow_mut() = previous);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a spawned task's result.
#[derive(Debug)]
pub struct TaskHandle<R> {
    task_id: u64,
    result: Receiver<thread::Result<R>>,
    queue: Receiver<Job>,
}

impl<R> TaskHandle<R> {
    /// Id assigned to the task at spawn time.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.task_id
    }

    /// Wait for the task, executing other queued tasks meanwhile.
    ///
    /// # Errors
    ///
    /// `FrameworkError::TaskPanicked` if the task panicked or was dropped
    /// unexecuted by a pool shutdown.
    pub fn join(self) -> Result<R, FrameworkError> {
        loop {
            select! {
                recv(self.result) -> outcome => return Self::finish(outcome.ok()),
                recv(self.queue) -> job => match job {
                    Ok(job) => job(),
                    Err(_) => return Self::finish(self.result.recv().ok()),
                },
            }
        }
    }

    fn finish(outcome: Option<thread::Result<R>>) -> Result<R, FrameworkError> {
        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(payload)) => Err(FrameworkError::TaskPanicked(panic_message(payload.as_ref()))),
            None => Err(FrameworkError::TaskPanicked(
                "task was dropped before completion".into(),
            )),
        }
    }
}

/// Fixed-size pool of worker threads sharing one task queue.
pub struct TaskPool {
    num_threads: usize,
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    schedule_threads: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
    next_task_id: AtomicU64,
}

impl TaskPool {
    /// Start `num_threads` worker threads.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Configuration` if `num_threads` is zero or a worker
    /// thread cannot be spawned.
    pub fn new(num_threads: usize) -> Result<Self, FrameworkError> {
        if num_threads == 0 {
            return Err(FrameworkError::Configuration(
                "task pool needs at least one thread".into(),
            ));
        }
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let queue = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("schedules-worker-{worker_id}"))
                .spawn(move || {
                    debug!(worker_id, "worker thread started");
                    // Blocks until work arrives; exits once the sender is dropped.
                    while let Ok(job) = queue.recv() {
                        job();
                    }
                    debug!(worker_id, "worker thread exiting");
                })
                .map_err(|e| {
                    FrameworkError::Configuration(format!("failed to spawn worker thread: {e}"))
                })?;
            workers.push(worker);
        }
        info!(num_threads, "task pool started");
        Ok(Self {
            num_threads,
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(workers),
            schedule_threads: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
            next_task_id: AtomicU64::new(1),
        })
    }

    /// Number of worker threads running ordinary tasks.
    #[must_use]
    pub const fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Spawn an ordinary task. Its parent is the task calling `spawn`, if any.
    ///
    /// # Errors
    ///
    /// `FrameworkError::PoolShutdown` after [`TaskPool::shutdown`].
    pub fn spawn<F, R>(&self, f: F) -> Result<TaskHandle<R>, FrameworkError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (job, handle) = self.prepare(None, f)?;
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(FrameworkError::PoolShutdown);
        };
        sender.send(job).map_err(|_| FrameworkError::PoolShutdown)?;
        debug!(task_id = handle.task_id, "task spawned");
        Ok(handle)
    }

    /// Spawn the marker task for schedule `sid` on a thread of its own.
    ///
    /// # Errors
    ///
    /// `FrameworkError::Logic` if `sid` is invalid,
    /// `FrameworkError::PoolShutdown` after [`TaskPool::shutdown`],
    /// `FrameworkError::Configuration` if the thread cannot be spawned.
    pub fn spawn_schedule<F, R>(&self, sid: ScheduleID, f: F) -> Result<TaskHandle<R>, FrameworkError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if !sid.is_valid() {
            return Err(FrameworkError::Logic(
                "cannot spawn a schedule task for the invalid schedule id".into(),
            ));
        }
        let (job, handle) = self.prepare(Some(sid), f)?;
        let thread = thread::Builder::new()
            .name(format!("schedules-schedule-{sid}"))
            .spawn(job)
            .map_err(|e| FrameworkError::Configuration(format!("failed to spawn schedule thread: {e}")))?;
        let mut threads = self.schedule_threads.lock();
        threads.retain(|t| !t.is_finished());
        threads.push(thread);
        debug!(task_id = handle.task_id, schedule = %sid, "schedule task spawned");
        Ok(handle)
    }

    fn prepare<F, R>(&self, schedule: Option<ScheduleID>, f: F) -> Result<(Job, TaskHandle<R>), FrameworkError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(FrameworkError::PoolShutdown);
        }
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(TaskRecord {
            id: task_id,
            parent: current_task(),
            schedule,
        });
        let (result_tx, result_rx) = bounded(1);
        let job: Job = Box::new(move || {
            let _running = RunningTask::enter(record);
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            if outcome.is_err() {
                warn!(task_id, "task panicked");
            }
            let _ = result_tx.send(outcome);
        });
        let handle = TaskHandle {
            task_id,
            result: result_rx,
            queue: self.receiver.clone(),
        };
        Ok((job, handle))
    }

    /// Stop accepting tasks, wait for running schedule tasks, let queued
    /// tasks drain and join the workers.
    ///
    /// Must not be called from inside a pool task.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down task pool");
        let schedules: Vec<_> = self.schedule_threads.lock().drain(..).collect();
        for schedule in schedules {
            if schedule.join().is_err() {
                warn!("schedule thread panicked");
            }
        }
        self.sender.lock().take();
        let mut workers = self.workers.lock();
        for (worker_id, worker) in workers.drain(..).enumerate() {
            if worker.join().is_err() {
                warn!(worker_id, "worker thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("num_threads", &self.num_threads)
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            // Dropping the sender lets idle workers exit; they are not joined here.
            self.sender.lock().take();
            debug!("task pool dropped without explicit shutdown");
        }
    }
}
