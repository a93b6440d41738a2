//! A worker pool with per-thread persistent state.
//!
//! Jobs are pushed onto a FIFO queue by the producer; a fixed set of worker
//! threads pops and runs them. Each worker owns a state value built by a
//! factory when the thread starts and dropped when it exits, so a thread can
//! keep, for example, a random number generator and scratch buffers alive
//! across every job it runs without sharing them.
//!
//! One mutex guards the queue, the idle count and the accepting flag. Two
//! condvars signal the two directions: `wake_worker` when work arrives or
//! shutdown begins, `wake_main` when the last worker goes idle.

use demefit_error::{DemefitResult, demefit_err, ensure};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

struct QueueState<S> {
    todo: VecDeque<Job<S>>,
    accepting: bool,
    idle: usize,
    alive: usize,
}

struct Shared<S> {
    queue: Mutex<QueueState<S>>,
    wake_worker: Condvar,
    wake_main: Condvar,
}

pub struct WorkerPool<S> {
    shared: Arc<Shared<S>>,
    workers: Vec<JoinHandle<()>>,
}

impl<S: Send + 'static> WorkerPool<S> {
    /// Spawn `max_threads` workers. Each calls `state_factory` with its
    /// worker index once, on its own thread, to build its state.
    pub fn new<F>(max_threads: usize, state_factory: F) -> DemefitResult<Self>
    where
        F: Fn(usize) -> S + Send + Sync + 'static,
    {
        ensure!(max_threads > 0, InvalidConfig: "worker pool needs at least one thread");

        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                todo: VecDeque::new(),
                accepting: true,
                idle: 0,
                alive: max_threads,
            }),
            wake_worker: Condvar::new(),
            wake_main: Condvar::new(),
        });
        let factory = Arc::new(state_factory);

        let mut workers = Vec::with_capacity(max_threads);
        for id in 0..max_threads {
            let shared = Arc::clone(&shared);
            let factory = Arc::clone(&factory);
            let handle = thread::Builder::new()
                .name(format!("demefit-worker-{}", id))
                .spawn(move || worker_loop(shared, move || factory(id)))
                .map_err(|e| demefit_err!(ThreadPool: "failed to spawn worker: {}", e))?;
            workers.push(handle);
        }

        Ok(WorkerPool { shared, workers })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Panics if called after [WorkerPool::no_more_jobs]; that
    /// ordering is a bug in the caller, not a runtime condition.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let mut q = self.shared.queue.lock().unwrap();
        if !q.accepting {
            // release the lock before unwinding so shutdown can still run
            drop(q);
            panic!("job submitted to a worker pool that is no longer accepting jobs");
        }
        q.todo.push_back(Box::new(job));
        if q.idle > 0 {
            self.shared.wake_worker.notify_one();
        }
    }

    /// Close the queue. Workers drain remaining jobs and then exit; in-flight
    /// jobs run to completion.
    pub fn no_more_jobs(&self) {
        let mut q = self.shared.queue.lock().unwrap();
        q.accepting = false;
        self.shared.wake_worker.notify_all();
    }

    /// Block until the queue is empty and every worker is idle (or has
    /// exited). Publishes every job's effects to the caller.
    pub fn wait_idle(&self) {
        let mut q = self.shared.queue.lock().unwrap();
        while !q.todo.is_empty() || q.idle < q.alive {
            if q.idle > 0 {
                self.shared.wake_worker.notify_one();
            }
            q = self.shared.wake_main.wait(q).unwrap();
        }
        // If the queue has been closed, idle workers are waiting to hear it.
        if !q.accepting {
            self.shared.wake_worker.notify_all();
        }
    }

    /// Soft shutdown: close the queue, drain it, join every worker.
    pub fn join(&mut self) {
        self.no_more_jobs();
        self.wait_idle();
        for handle in self.workers.drain(..) {
            handle.join().unwrap();
        }
    }
}

impl<S> Drop for WorkerPool<S> {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        {
            let mut q = self.shared.queue.lock().unwrap();
            q.accepting = false;
            self.shared.wake_worker.notify_all();
        }
        for handle in self.workers.drain(..) {
            handle.join().unwrap();
        }
    }
}

fn worker_loop<S, F>(shared: Arc<Shared<S>>, make_state: F)
where
    F: FnOnce() -> S,
{
    let mut state = make_state();
    let mut q = shared.queue.lock().unwrap();
    loop {
        while q.todo.is_empty() && q.accepting {
            q.idle += 1;
            if q.idle == q.alive {
                shared.wake_main.notify_all();
            }
            q = shared.wake_worker.wait(q).unwrap();
            q.idle -= 1;
        }

        match q.todo.pop_front() {
            Some(job) => {
                drop(q);
                job(&mut state);
                q = shared.queue.lock().unwrap();
            }
            // queue empty and no longer accepting: terminate
            None => break,
        }
    }
    q.alive -= 1;
    if q.idle == q.alive {
        shared.wake_main.notify_all();
    }
}
