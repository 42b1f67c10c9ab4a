//! Shadow + main frame state machine (Section 4.I) and its work-sharding
//! across the recording job pool (Section 4.J).

use std::sync::Arc;

use log::warn;

use crate::jobs::WorkerPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    PrepareWork,
    RecordShadow,
    BarrierDepthToSample,
    RecordDepthPrepass,
    RecordViewQueries,
    RecordMain,
    End,
}

impl FrameState {
    pub fn next(self) -> Option<FrameState> {
        match self {
            FrameState::PrepareWork => Some(FrameState::RecordShadow),
            FrameState::RecordShadow => Some(FrameState::BarrierDepthToSample),
            FrameState::BarrierDepthToSample => Some(FrameState::RecordDepthPrepass),
            FrameState::RecordDepthPrepass => Some(FrameState::RecordViewQueries),
            FrameState::RecordViewQueries => Some(FrameState::RecordMain),
            FrameState::RecordMain => Some(FrameState::End),
            FrameState::End => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkRange {
    pub start: usize,
    pub end: usize,
}

impl WorkRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Splits `[0, draw_count)` into `W = min(worker_count, draw_count)`
/// contiguous, near-equal-sized ranges (Section 4.I).
pub fn split_into_ranges(draw_count: usize, worker_count: usize) -> Vec<WorkRange> {
    if draw_count == 0 || worker_count == 0 {
        return Vec::new();
    }
    let workers = worker_count.min(draw_count);
    let base = draw_count / workers;
    let extra = draw_count % workers;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for w in 0..workers {
        let size = base + if w < extra { 1 } else { 0 };
        let end = start + size;
        ranges.push(WorkRange { start, end });
        start = end;
    }
    ranges
}

/// Drives one secondary-buffer set's sharded recording attempt, falling
/// back to a single synchronous inline call over the whole range if any
/// shard reports failure.
pub fn record_sharded_or_inline(
    pool: &WorkerPool,
    total: usize,
    record_range: impl Fn(WorkRange) -> bool + Send + Sync + Clone + 'static,
) -> bool {
    let ranges = split_into_ranges(total, pool.worker_count());
    if ranges.is_empty() {
        return true;
    }
    for range in ranges {
        let f = record_range.clone();
        pool.submit(move || f(range));
    }
    if pool.wait() {
        return true;
    }
    warn!("frame: sharded recording set failed, falling back to inline recording");
    record_range(WorkRange { start: 0, end: total })
}

/// Per-frame record callbacks the application supplies; CORE owns only
/// the state sequencing, sharding, and failure fallback around these.
pub trait FrameRecordCallbacks {
    fn record_shadow(&self, shadow_visible_count: usize) -> bool;
    fn barrier_depth_to_sample(&self);
    fn record_depth_prepass(&self, range: WorkRange) -> bool;
    fn record_view_queries(&self, range: WorkRange) -> bool;
    fn record_main(&self, range: WorkRange) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameRecordStats {
    pub shadow_fell_back: bool,
    pub depth_prepass_fell_back: bool,
    pub view_queries_fell_back: bool,
    pub main_fell_back: bool,
}

/// Drives one full frame through the Section 4.I state machine, sharding
/// the three independent view-draw secondary-buffer sets across `pool`
/// and falling back to inline recording per-set on failure. Shadow pass
/// recording precedes the depth-to-sample barrier, which precedes depth
/// prepass, which precedes query draws, which precedes main draws
/// (Section 5 ordering guarantee).
pub fn drive_frame<C, F>(
    pool: &WorkerPool,
    callbacks: &Arc<C>,
    shadow_visible_count: usize,
    view_visible_count: usize,
    record_range_dispatch: F,
) -> FrameRecordStats
where
    C: FrameRecordCallbacks + Send + Sync + 'static,
    F: Fn(&C, FrameState, WorkRange) -> bool + Send + Sync + Clone + 'static,
{
    let mut state = FrameState::PrepareWork;
    let mut stats = FrameRecordStats::default();

    loop {
        state = match state.next() {
            Some(next) => next,
            None => break,
        };
        match state {
            FrameState::RecordShadow => {
                let ok = callbacks.record_shadow(shadow_visible_count);
                if !ok {
                    warn!("frame: shadow recording failed");
                }
                stats.shadow_fell_back = !ok;
            }
            FrameState::BarrierDepthToSample => {
                callbacks.barrier_depth_to_sample();
            }
            FrameState::RecordDepthPrepass => {
                let dispatch = record_range_dispatch.clone();
                let ok = record_sharded_stage(pool, view_visible_count, FrameState::RecordDepthPrepass, callbacks, dispatch);
                stats.depth_prepass_fell_back = !ok;
            }
            FrameState::RecordViewQueries => {
                let dispatch = record_range_dispatch.clone();
                let ok = record_sharded_stage(pool, view_visible_count, FrameState::RecordViewQueries, callbacks, dispatch);
                stats.view_queries_fell_back = !ok;
            }
            FrameState::RecordMain => {
                let dispatch = record_range_dispatch.clone();
                let ok = record_sharded_stage(pool, view_visible_count, FrameState::RecordMain, callbacks, dispatch);
                stats.main_fell_back = !ok;
            }
            FrameState::End | FrameState::PrepareWork => {}
        }
    }
    stats
}

/// Returns `true` when every shard succeeded on the first (sharded)
/// attempt; `false` when the fallback inline path had to run.
fn record_sharded_stage<C, F>(pool: &WorkerPool, total: usize, stage: FrameState, callbacks: &Arc<C>, dispatch: F) -> bool
where
    C: FrameRecordCallbacks + Send + Sync + 'static,
    F: Fn(&C, FrameState, WorkRange) -> bool + Send + Sync + Clone + 'static,
{
    let ranges = split_into_ranges(total, pool.worker_count());
    if ranges.is_empty() {
        return true;
    }
    for range in ranges {
        let dispatch = dispatch.clone();
        let callbacks = Arc::clone(callbacks);
        pool.submit(move || dispatch(&callbacks, stage, range));
    }
    if pool.wait() {
        return true;
    }
    warn!("frame: {stage:?} sharded recording failed, falling back to inline recording");
    dispatch(callbacks, stage, WorkRange { start: 0, end: total });
    false
}
