//! Occlusion query ring (Section 4.H): per-frame-slot query index tables
//! with explicit fence gating so a slot's results are never read before
//! the commands that produced them have retired.

use crate::error::{CoreError, CoreResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Pending,
}

pub struct QuerySlot {
    view_capacity: usize,
    shadow_capacity: usize,
    view_query_to_scene: Vec<usize>,
    shadow_query_to_scene: Vec<usize>,
    fence: FenceState,
}

impl QuerySlot {
    fn new(view_capacity: usize, shadow_capacity: usize) -> Self {
        Self {
            view_capacity,
            shadow_capacity,
            view_query_to_scene: Vec::with_capacity(view_capacity),
            shadow_query_to_scene: Vec::with_capacity(shadow_capacity),
            fence: FenceState::Signaled,
        }
    }

    fn reset(&mut self) {
        self.view_query_to_scene.clear();
        self.shadow_query_to_scene.clear();
    }

    /// Appends `scene_index` to the view query table, returning the query
    /// index the caller should begin/end its proxy draw under, or `None`
    /// once the pool's capacity is exhausted.
    pub fn append_view_query(&mut self, scene_index: usize) -> Option<u32> {
        if self.view_query_to_scene.len() >= self.view_capacity {
            return None;
        }
        let qi = self.view_query_to_scene.len() as u32;
        self.view_query_to_scene.push(scene_index);
        Some(qi)
    }

    pub fn append_shadow_query(&mut self, scene_index: usize) -> Option<u32> {
        if self.shadow_query_to_scene.len() >= self.shadow_capacity {
            return None;
        }
        let qi = self.shadow_query_to_scene.len() as u32;
        self.shadow_query_to_scene.push(scene_index);
        Some(qi)
    }

    pub fn view_query_count(&self) -> usize {
        self.view_query_to_scene.len()
    }

    pub fn shadow_query_count(&self) -> usize {
        self.shadow_query_to_scene.len()
    }

    pub fn view_capacity(&self) -> usize {
        self.view_capacity
    }

    pub fn shadow_capacity(&self) -> usize {
        self.shadow_capacity
    }

    pub fn view_scene_indices(&self) -> &[usize] {
        &self.view_query_to_scene
    }

    pub fn shadow_scene_indices(&self) -> &[usize] {
        &self.shadow_query_to_scene
    }
}

/// `F` parallel query pool slots, indexed by `frame_index mod F`.
pub struct QueryRing {
    slots: Vec<QuerySlot>,
}

impl QueryRing {
    pub fn new(slot_count: usize, view_capacity: usize, shadow_capacity: usize) -> CoreResult<Self> {
        if slot_count == 0 {
            return Err(CoreError::ConfigurationError("frame_ring must be > 0".into()));
        }
        Ok(Self {
            slots: (0..slot_count)
                .map(|_| QuerySlot::new(view_capacity, shadow_capacity))
                .collect(),
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot_index(&self, frame_index: u64) -> usize {
        (frame_index as usize) % self.slots.len()
    }

    pub fn slot(&self, frame_index: u64) -> &QuerySlot {
        &self.slots[self.slot_index(frame_index)]
    }

    /// Resets the slot for `frame_index` and returns it for appending this
    /// frame's queries. Fails if the slot's prior-use fence has not
    /// signaled yet — the CPU-side index tables would otherwise race the
    /// in-flight GPU read of the previous occupant.
    pub fn begin_frame(&mut self, frame_index: u64) -> CoreResult<&mut QuerySlot> {
        let idx = self.slot_index(frame_index);
        let slot = &mut self.slots[idx];
        if slot.fence == FenceState::Pending {
            return Err(CoreError::ResourceError(format!(
                "query ring slot {idx} reused before its fence signaled"
            )));
        }
        slot.reset();
        slot.fence = FenceState::Pending;
        Ok(slot)
    }

    /// Marks the slot that owned `frame_index` as safe to read back.
    pub fn mark_fence_signaled(&mut self, frame_index: u64) {
        let idx = self.slot_index(frame_index);
        self.slots[idx].fence = FenceState::Signaled;
    }

    /// Zips the view query table against freshly fetched raw sample
    /// counts, producing the `(scene_index, sample_count)` pairs that
    /// feed `SceneCullingContext::apply_occlusion_query_samples`.
    pub fn consume_view_results(&self, frame_index: u64, raw_samples: &[u64]) -> CoreResult<(Vec<usize>, Vec<u32>)> {
        self.consume(frame_index, raw_samples, |s| &s.view_query_to_scene)
    }

    pub fn consume_shadow_results(&self, frame_index: u64, raw_samples: &[u64]) -> CoreResult<(Vec<usize>, Vec<u32>)> {
        self.consume(frame_index, raw_samples, |s| &s.shadow_query_to_scene)
    }

    fn consume(
        &self,
        frame_index: u64,
        raw_samples: &[u64],
        select: impl Fn(&QuerySlot) -> &Vec<usize>,
    ) -> CoreResult<(Vec<usize>, Vec<u32>)> {
        let idx = self.slot_index(frame_index);
        let slot = &self.slots[idx];
        if slot.fence != FenceState::Signaled {
            return Err(CoreError::QueryError(format!(
                "query ring slot {idx} read before its fence signaled"
            )));
        }
        let indices = select(slot);
        if raw_samples.len() < indices.len() {
            return Err(CoreError::QueryError(
                "fewer raw query samples than queries appended this slot".into(),
            ));
        }
        let samples = raw_samples[..indices.len()]
            .iter()
            .map(|&s| s.min(u32::MAX as u64) as u32)
            .collect();
        Ok((indices.clone(), samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_caps_appended_queries() {
        let mut ring = QueryRing::new(2, 2, 1).unwrap();
        let slot = ring.begin_frame(0).unwrap();
        assert_eq!(slot.append_view_query(10), Some(0));
        assert_eq!(slot.append_view_query(11), Some(1));
        assert_eq!(slot.append_view_query(12), None);
        assert_eq!(slot.append_shadow_query(10), Some(0));
        assert_eq!(slot.append_shadow_query(11), None);
    }

    #[test]
    fn reading_before_fence_signals_is_an_error() {
        let mut ring = QueryRing::new(1, 4, 4).unwrap();
        ring.begin_frame(0).unwrap().append_view_query(0);
        assert!(ring.consume_view_results(0, &[7]).is_err());
        ring.mark_fence_signaled(0);
        let (indices, samples) = ring.consume_view_results(0, &[7]).unwrap();
        assert_eq!(indices, vec![0]);
        assert_eq!(samples, vec![7]);
    }

    #[test]
    fn reusing_a_pending_slot_fails() {
        let mut ring = QueryRing::new(1, 4, 4).unwrap();
        ring.begin_frame(0).unwrap();
        assert!(ring.begin_frame(1).is_err());
        ring.mark_fence_signaled(0);
        assert!(ring.begin_frame(1).is_ok());
    }

    #[test]
    fn slot_assignment_wraps_by_modulo() {
        let ring = QueryRing::new(3, 1, 1).unwrap();
        assert_eq!(ring.slot_count(), 3);
        // frame_index 0 and 3 share a slot.
        let _ = ring.slot(0);
        let _ = ring.slot(3);
    }

    #[test]
    fn index_table_length_matches_appended_count() {
        let mut ring = QueryRing::new(1, 4, 4).unwrap();
        let slot = ring.begin_frame(0).unwrap();
        slot.append_view_query(5);
        slot.append_view_query(6);
        assert_eq!(slot.view_query_count(), 2);
        assert_eq!(slot.view_scene_indices(), &[5, 6]);
    }

    #[test]
    fn fewer_raw_samples_than_queries_is_an_error() {
        let mut ring = QueryRing::new(1, 4, 4).unwrap();
        let slot = ring.begin_frame(0).unwrap();
        slot.append_view_query(0);
        slot.append_view_query(1);
        ring.mark_fence_signaled(0);
        assert!(ring.consume_view_results(0, &[1]).is_err());
    }
}
