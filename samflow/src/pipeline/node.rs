//! Pipeline stages: parallel, sequential, and ordered nodes.
//!
//! Grounded on `node.cpp`'s `node`/`parnode`/`seqnode`. The original dispatches
//! work through a TBB `task_group` (parallel) or a `concurrent_bounded_queue`
//! drained by one dedicated task (sequential/ordered, with the latter
//! stashing out-of-order batches until their turn comes up). This core plays
//! the same two roles with `rayon::spawn` for fan-out and a bounded
//! `crossbeam_channel` drained by one worker thread for the serialized
//! stages.

use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    thread::JoinHandle,
};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{Error, InternalError, Result};

use super::batch::Batch;

/// A fused, boxed filter stage: takes one batch, returns the transformed one.
pub type Stage = Arc<dyn Fn(Batch) -> Result<Batch> + Send + Sync>;

/// Composes two stages into one, applying `a` then `b`.
pub fn compose(a: Stage, b: Stage) -> Stage {
    Arc::new(move |batch| b(a(batch)?))
}

/// The concurrency discipline of one pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Every batch is processed by whichever worker happens to pick it up,
    /// with no ordering guarantee and no serialization between batches.
    Parallel,
    /// Batches are processed one at a time, in whatever order they arrive.
    Sequential,
    /// Batches are processed one at a time, in the order they were fed in.
    Ordered,
}

/// A counter of in-flight tasks that a caller can block on.
///
/// Grounded on the role `tbb::task_group::wait()` plays for `parnode`: let the
/// driver thread know when every task spawned for this node (and, by
/// construction, every downstream call those tasks made before returning) has
/// completed.
#[derive(Clone, Default)]
struct WaitGroup(Arc<(Mutex<usize>, Condvar)>);

impl WaitGroup {
    fn add(&self) {
        let (lock, _) = &*self.0;
        *lock.lock().unwrap() += 1;
    }

    fn done(&self) {
        let (lock, cvar) = &*self.0;
        let mut count = lock.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            cvar.notify_all();
        }
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.0;
        let mut count = lock.lock().unwrap();
        while *count > 0 {
            count = cvar.wait(count).unwrap();
        }
    }
}

/// The shared execution context a node's `feed` reaches back into to forward
/// a processed batch to the next node.
pub struct PipelineCtx {
    nodes: Vec<Box<dyn NodeRuntime>>,
    errors: Mutex<Vec<Error>>,
}

impl PipelineCtx {
    /// Builds the runtime context for a fixed sequence of compiled nodes.
    pub fn new(nodes: Vec<Box<dyn NodeRuntime>>) -> Arc<Self> {
        Arc::new(Self {
            nodes,
            errors: Mutex::new(Vec::new()),
        })
    }

    /// Starts every node's background worker, if it has one.
    pub fn begin(self: &Arc<Self>) {
        for (index, node) in self.nodes.iter().enumerate() {
            node.begin(self, index);
        }
    }

    /// Feeds `batch` into `nodes[0]`.
    pub fn feed(self: &Arc<Self>, seqno: usize, batch: Batch) {
        self.feed_forward(0, seqno, batch);
    }

    /// Feeds `batch` into `nodes[index]`, a no-op once `index` runs past the
    /// last stage.
    pub fn feed_forward(self: &Arc<Self>, index: usize, seqno: usize, batch: Batch) {
        if index < self.nodes.len() {
            self.nodes[index].feed(self, index, seqno, batch);
        }
    }

    /// Records a fatal error raised while processing a batch. The first
    /// recorded error wins.
    pub fn record_error(&self, err: Error) {
        self.errors.lock().unwrap().push(err);
    }

    /// Ends every node, in order, then returns the first error raised (if
    /// any). Ending in order matters: a node's `end` only returns once every
    /// task it spawned has made its downstream calls, so the next node's
    /// shutdown signal is guaranteed to arrive after all of that node's real
    /// batches.
    pub fn end(self: &Arc<Self>) -> Result<()> {
        for (index, node) in self.nodes.iter().enumerate() {
            node.end(self, index);
        }
        let mut errors = self.errors.lock().unwrap();
        match errors.drain(..).next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A compiled pipeline stage, ready to be driven by a [`PipelineCtx`].
pub trait NodeRuntime: Send + Sync {
    /// Starts this node's background worker, if any. Called once, in order,
    /// before any batch is fed.
    fn begin(&self, pipeline: &Arc<PipelineCtx>, index: usize);
    /// Accepts one batch, to be processed (possibly asynchronously).
    fn feed(&self, pipeline: &Arc<PipelineCtx>, index: usize, seqno: usize, batch: Batch);
    /// Signals no further batches are coming, waits for in-flight work to
    /// drain, then runs any finalizers.
    fn end(&self, pipeline: &Arc<PipelineCtx>, index: usize);
}

/// A node whose stage runs concurrently for every batch fed to it.
pub struct ParallelNode {
    stage: Stage,
    pending: WaitGroup,
}

impl ParallelNode {
    /// Creates a parallel node running `stage`.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            pending: WaitGroup::default(),
        }
    }
}

impl NodeRuntime for ParallelNode {
    fn begin(&self, _pipeline: &Arc<PipelineCtx>, _index: usize) {}

    fn feed(&self, pipeline: &Arc<PipelineCtx>, index: usize, seqno: usize, batch: Batch) {
        self.pending.add();
        let stage = Arc::clone(&self.stage);
        let pipeline = Arc::clone(pipeline);
        let wg = self.pending.clone();
        rayon::spawn(move || {
            match stage(batch) {
                Ok(result) => pipeline.feed_forward(index + 1, seqno, result),
                Err(err) => pipeline.record_error(err),
            }
            wg.done();
        });
    }

    fn end(&self, _pipeline: &Arc<PipelineCtx>, _index: usize) {
        self.pending.wait();
    }
}

enum Msg {
    Batch(usize, Batch),
    Stop,
}

/// A node that serializes its stage behind one worker thread, fed through a
/// bounded channel (so a slow consumer applies backpressure upstream). If
/// `ordered`, batches are stashed and released in `seqno` order; otherwise
/// they are processed as they arrive.
pub struct SequentialNode {
    stage: Stage,
    ordered: bool,
    capacity: usize,
    sender: Mutex<Option<Sender<Msg>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SequentialNode {
    /// Creates a sequential (or, if `ordered`, order-preserving) node running
    /// `stage`, with channel capacity `capacity`.
    pub fn new(stage: Stage, ordered: bool, capacity: usize) -> Self {
        Self {
            stage,
            ordered,
            capacity: capacity.max(1),
            sender: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }
}

impl NodeRuntime for SequentialNode {
    fn begin(&self, pipeline: &Arc<PipelineCtx>, index: usize) {
        let (sender, receiver) = bounded::<Msg>(self.capacity);
        *self.sender.lock().unwrap() = Some(sender);

        let stage = Arc::clone(&self.stage);
        let ordered = self.ordered;
        let pipeline = Arc::clone(pipeline);
        let handle = std::thread::spawn(move || {
            if ordered {
                run_ordered_worker(receiver, stage, pipeline, index);
            } else {
                run_sequential_worker(receiver, stage, pipeline, index);
            }
        });
        *self.worker.lock().unwrap() = Some(handle);
    }

    fn feed(&self, _pipeline: &Arc<PipelineCtx>, _index: usize, seqno: usize, batch: Batch) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(Msg::Batch(seqno, batch));
        }
    }

    fn end(&self, pipeline: &Arc<PipelineCtx>, _index: usize) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(Msg::Stop);
        }
        if let Some(handle) = self.worker.lock().unwrap().take() {
            if let Err(panic) = handle.join() {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker thread panicked".to_owned());
                pipeline.record_error(Error::Internal(InternalError::WorkerFailed(msg)));
            }
        }
    }
}

fn run_sequential_worker(
    receiver: Receiver<Msg>,
    stage: Stage,
    pipeline: Arc<PipelineCtx>,
    index: usize,
) {
    while let Ok(msg) = receiver.recv() {
        match msg {
            Msg::Stop => break,
            Msg::Batch(seqno, batch) => match stage(batch) {
                Ok(result) => pipeline.feed_forward(index + 1, seqno, result),
                Err(err) => pipeline.record_error(err),
            },
        }
    }
}

fn run_ordered_worker(
    receiver: Receiver<Msg>,
    stage: Stage,
    pipeline: Arc<PipelineCtx>,
    index: usize,
) {
    let mut stash: HashMap<usize, Batch> = HashMap::new();
    let mut run = 0usize;

    let mut apply = |seqno: usize, batch: Batch| match stage(batch) {
        Ok(result) => pipeline.feed_forward(index + 1, seqno, result),
        Err(err) => pipeline.record_error(err),
    };

    while let Ok(msg) = receiver.recv() {
        match msg {
            Msg::Stop => break,
            Msg::Batch(seqno, batch) => {
                if seqno > run {
                    stash.insert(seqno, batch);
                } else {
                    apply(seqno, batch);
                    loop {
                        run += 1;
                        match stash.remove(&run) {
                            Some(next) => apply(run, next),
                            None => break,
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_group_blocks_until_done() {
        let wg = WaitGroup::default();
        wg.add();
        wg.add();
        let wg2 = wg.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            wg2.done();
            wg2.done();
        });
        wg.wait();
    }

    #[test]
    fn test_compose_applies_in_order() {
        let a: Stage = Arc::new(|b: Batch| Ok(Batch::Text(format!("{}a", b.into_text()?))));
        let b: Stage = Arc::new(|b: Batch| Ok(Batch::Text(format!("{}b", b.into_text()?))));
        let ab = compose(a, b);
        let result = ab(Batch::Text(String::new())).unwrap();
        assert_eq!(result.into_text().unwrap(), "ab");
    }
}
