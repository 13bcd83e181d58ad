//! Drives a compiled node chain to completion over a [`Source`].
//!
//! Grounded on `pipeline.cpp`'s `pipeline`/`run`/`next_batch_size`/`feed_forward`.

use std::sync::Arc;

use crate::{error::Result, source::Source};

use super::{
    batch::Batch,
    node::{NodeKind, NodeRuntime, ParallelNode, PipelineCtx, SequentialNode, Stage},
};

/// One stage of the pipeline before compilation: its concurrency discipline
/// and the (possibly already-fused) transform it runs.
pub struct NodeSpec {
    /// This stage's concurrency discipline.
    pub kind: NodeKind,
    /// The transform this stage applies to each batch.
    pub stage: Stage,
}

impl NodeSpec {
    /// Creates a stage spec.
    pub fn new(kind: NodeKind, stage: Stage) -> Self {
        Self { kind, stage }
    }
}

/// Fuses adjacent, mergeable stages into single compiled nodes, matching the
/// original's `try_merge`: two `Parallel` specs fuse; a `Sequential`/`Ordered`
/// pair fuses into a single node whose stages run back to back, becoming
/// `Ordered` if either one was.
pub fn fuse(specs: Vec<NodeSpec>) -> Vec<NodeSpec> {
    let mut fused: Vec<NodeSpec> = Vec::with_capacity(specs.len());
    for spec in specs {
        let merged = match fused.last_mut() {
            Some(prev) if prev.kind == NodeKind::Parallel && spec.kind == NodeKind::Parallel => {
                prev.stage = super::node::compose(prev.stage.clone(), spec.stage);
                true
            }
            Some(prev) if prev.kind != NodeKind::Parallel && spec.kind != NodeKind::Parallel => {
                prev.stage = super::node::compose(prev.stage.clone(), spec.stage);
                if spec.kind == NodeKind::Ordered {
                    prev.kind = NodeKind::Ordered;
                }
                true
            }
            _ => false,
        };
        if !merged {
            fused.push(spec);
        }
    }
    fused
}

/// The channel capacity given to every sequential/ordered node: twice the
/// ambient worker-pool size, mirroring the original's use of
/// `2 * task_scheduler_init::default_num_threads()`.
pub fn channel_capacity() -> usize {
    2 * rayon::current_num_threads()
}

/// The default batch count for a source of known size, when the caller has
/// not overridden it.
pub fn default_nof_batches() -> usize {
    2 * rayon::current_num_threads()
}

const BATCH_INC: usize = 1024;
const MAX_BATCH_SIZE: usize = 0x0200_0000;

fn next_batch_size(batch_size: usize) -> usize {
    (batch_size + BATCH_INC).min(MAX_BATCH_SIZE)
}

fn compile(specs: Vec<NodeSpec>) -> Vec<Box<dyn NodeRuntime>> {
    let capacity = channel_capacity();
    specs
        .into_iter()
        .map(|spec| -> Box<dyn NodeRuntime> {
            match spec.kind {
                NodeKind::Parallel => Box::new(ParallelNode::new(spec.stage)),
                NodeKind::Sequential => Box::new(SequentialNode::new(spec.stage, false, capacity)),
                NodeKind::Ordered => Box::new(SequentialNode::new(spec.stage, true, capacity)),
            }
        })
        .collect()
}

/// Runs `source` through the fused, compiled `specs`, wrapping each fetched
/// chunk into a [`Batch`] via `wrap` before feeding it to the first stage.
///
/// Batch size is either a fixed fraction of a known-size source (so that
/// roughly `default_nof_batches()` batches are produced in total) or, for an
/// unbounded source, starts small and grows by `BATCH_INC` per fetch up to
/// `MAX_BATCH_SIZE` — avoiding both excessive per-batch overhead on a huge
/// input and excessive latency-to-first-output on a small one.
pub fn run<S: Source>(
    source: &mut S,
    wrap: impl Fn(Vec<S::Item>) -> Batch,
    specs: Vec<NodeSpec>,
) -> Result<()> {
    let specs = fuse(specs);
    if specs.is_empty() {
        while source.fetch(BATCH_INC)?.is_some() {}
        return Ok(());
    }

    let nodes = compile(specs);
    let pipeline = PipelineCtx::new(nodes);
    pipeline.begin();

    let data_size = source.prepare();
    if data_size < 0 {
        let mut seq_no = 0usize;
        let mut batch_size = BATCH_INC;
        while let Some(items) = source.fetch(batch_size)? {
            pipeline.feed(seq_no, wrap(items));
            seq_no += 1;
            batch_size = next_batch_size(batch_size);
        }
    } else {
        let batch_size = (((data_size as usize).saturating_sub(1)) / default_nof_batches()) + 1;
        let batch_size = batch_size.max(1);
        let mut seq_no = 0usize;
        while let Some(items) = source.fetch(batch_size)? {
            pipeline.feed(seq_no, wrap(items));
            seq_no += 1;
        }
    }

    pipeline.end()
}
