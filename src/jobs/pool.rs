//! Fixed-size worker pool.
//!
//! Workers are spawned on demand up to the limit and then reused. Items
//! wait in FIFO order while every worker is busy. Dropping the pool stops
//! idle workers; an item already handed to a worker runs to the end.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, warn};

type Handler<T> = Arc<dyn Fn(T) -> bool + Send + Sync>;

struct State<T> {
    queue: VecDeque<T>,
    spawned: usize,
    idle: usize,
    stopped: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) struct WorkerPool<T> {
    name: &'static str,
    max_workers: usize,
    shared: Arc<Shared<T>>,
    handler: Handler<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// `handler` runs each item on a worker thread. Returning false retires
    /// that worker.
    pub(crate) fn new(
        name: &'static str,
        max_workers: usize,
        handler: impl Fn(T) -> bool + Send + Sync + 'static,
    ) -> Self {
        WorkerPool {
            name,
            max_workers: max_workers.max(1),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    spawned: 0,
                    idle: 0,
                    stopped: false,
                }),
                available: Condvar::new(),
            }),
            handler: Arc::new(handler),
        }
    }

    /// Queue `item`. Fails only when no worker exists and none could be
    /// spawned; the item is not kept in that case.
    pub(crate) fn submit(&self, item: T) -> io::Result<()> {
        let mut state = self.shared.lock();
        state.queue.push_back(item);

        // Waiters stay counted as idle until they re-take the lock, so compare
        // against the whole backlog rather than just this item.
        self.shared.available.notify_one();
        if state.queue.len() <= state.idle || state.spawned >= self.max_workers {
            return Ok(());
        }

        let id = state.spawned;
        match self.spawn_worker(id) {
            Ok(()) => {
                state.spawned += 1;
                debug!("Spawned {}-{id}", self.name);
                Ok(())
            }
            Err(e) if state.spawned == 0 => {
                state.queue.pop_back();
                Err(e)
            }
            Err(e) => {
                warn!("Could not add {}-{id}, queueing instead: {e}", self.name);
                Ok(())
            }
        }
    }

    fn spawn_worker(&self, id: usize) -> io::Result<()> {
        let shared = Arc::clone(&self.shared);
        let handler = Arc::clone(&self.handler);
        thread::Builder::new()
            .name(format!("{}-{id}", self.name))
            .spawn(move || worker_loop(&shared, &handler))
            .map(|_| ())
    }
}

fn worker_loop<T>(shared: &Shared<T>, handler: &Handler<T>) {
    loop {
        let item = {
            let mut state = shared.lock();
            loop {
                if state.stopped {
                    state.spawned -= 1;
                    return;
                }
                if let Some(item) = state.queue.pop_front() {
                    break item;
                }
                state.idle += 1;
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                state.idle -= 1;
            }
        };

        if !handler(item) {
            shared.lock().spawned -= 1;
            return;
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shared.lock().stopped = true;
        self.shared.available.notify_all();
    }
}
