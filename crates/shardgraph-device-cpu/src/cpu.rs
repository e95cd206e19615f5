use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use shardgraph::device::{DeviceContext, DeviceWork, Place};
use shardgraph::error::{GatherError, GatherResult};

/// Completion bookkeeping shared between a context and its worker.
#[derive(Default)]
struct QueueState {
    in_flight: usize,
    first_error: Option<anyhow::Error>,
}

#[derive(Default)]
struct Completion {
    state: Mutex<QueueState>,
    drained: Condvar,
}

impl Completion {
    fn finish(&self, place: Place, result: Result<()>) {
        let mut state = self.state.lock().expect("cpu queue state poisoned");
        if let Err(err) = result {
            tracing::warn!(place = %place, error = ?err, "cpu device work failed");
            if state.first_error.is_none() {
                state.first_error = Some(err);
            }
        }
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.drained.notify_all();
        }
    }
}

/// Host device context backed by one worker thread.
///
/// Work runs in enqueue order. `wait` blocks until the queue is empty and reports the first
/// failure since the previous wait.
pub struct CpuDeviceContext {
    place: Place,
    tx: Option<mpsc::Sender<DeviceWork>>,
    completion: Arc<Completion>,
    worker: Option<JoinHandle<()>>,
}

impl CpuDeviceContext {
    pub fn new(place: Place) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<DeviceWork>();
        let completion = Arc::new(Completion::default());
        let worker_completion = Arc::clone(&completion);
        let worker = thread::Builder::new()
            .name(format!("shardgraph-{place}"))
            .spawn(move || {
                for work in rx {
                    let result = catch_unwind(AssertUnwindSafe(work))
                        .unwrap_or_else(|_| Err(anyhow!("device work panicked")));
                    worker_completion.finish(place, result);
                }
                tracing::trace!(place = %place, "cpu device worker stopped");
            })
            .with_context(|| format!("spawn cpu device worker for {place}"))?;
        Ok(Self {
            place,
            tx: Some(tx),
            completion,
            worker: Some(worker),
        })
    }
}

impl DeviceContext for CpuDeviceContext {
    fn place(&self) -> Place {
        self.place
    }

    fn enqueue(&self, work: DeviceWork) {
        self.completion
            .state
            .lock()
            .expect("cpu queue state poisoned")
            .in_flight += 1;
        let sent = match &self.tx {
            Some(tx) => tx.send(work).is_ok(),
            None => false,
        };
        if !sent {
            self.completion
                .finish(self.place, Err(anyhow!("cpu device worker is not running")));
        }
    }

    fn wait(&self) -> GatherResult<()> {
        let mut state = self.completion.state.lock().expect("cpu queue state poisoned");
        while state.in_flight > 0 {
            state = self
                .completion
                .drained
                .wait(state)
                .expect("cpu queue state poisoned");
        }
        match state.first_error.take() {
            Some(err) => Err(GatherError::device(self.place, format!("{err:#}"))),
            None => Ok(()),
        }
    }
}

impl Drop for CpuDeviceContext {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Builds `count` contexts bound to `Place::Cpu(0..count)`.
pub fn cpu_contexts(count: usize) -> Result<Vec<Arc<CpuDeviceContext>>> {
    (0..count)
        .map(|shard| CpuDeviceContext::new(Place::Cpu(shard)).map(Arc::new))
        .collect()
}
