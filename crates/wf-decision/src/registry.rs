//! Decision registry, §4.8. An ordered table of in-flight decision state
//! machines plus the event-id correlation table that lets a replayed
//! `ActivityTaskCompleted`/`TimerFired`/... find the machine it belongs to.
//!
//! Ordered via `indexmap::IndexMap` (pack-attested dependency — see
//! `alfredjeanlab-oddjobs/Cargo.toml`) rather than a plain `HashMap`: §4.8's
//! `Lookup` touches the entry to the tail of iteration order, which only an
//! ordered map can express without a separate LRU list.

use indexmap::IndexMap;
use std::collections::HashMap;

use wf_core::error::FatalReason;
use wf_core::ids::{DecisionId, IdAllocator};
use wf_core::wire::EventId;

use crate::machine::{DecisionKind, DecisionStateMachine};

pub struct DecisionRegistry {
    machines: IndexMap<DecisionId, DecisionStateMachine>,
    ids: IdAllocator,
    /// Maps a scheduling/initiating event's id to the machine it started,
    /// so a later correlating event (which carries that id, e.g.
    /// `ActivityTaskCompleted::scheduled_event_id`) can find it back.
    by_correlation_id: HashMap<EventId, DecisionId>,
    /// Maps a decision's own tag (timer id / child workflow id / ...) back
    /// to its machine, for operations a caller only ever names by that tag
    /// rather than by an event id — e.g. cancelling a timer by the same
    /// `timer_id` it was started with (§4.7).
    by_tag: HashMap<(DecisionKind, String), DecisionId>,
    /// The event id the *next* command-correlated event is predicted to
    /// land on, assuming no concurrent history anomalies — used to assign
    /// activity/timer ids deterministically before that event actually
    /// replays (the same trick real workflow SDKs use so activity ids don't
    /// depend on the orchestrator's own counters).
    predicted_next_event_id: EventId,
}

impl DecisionRegistry {
    pub fn new(predicted_next_event_id: EventId) -> Self {
        DecisionRegistry {
            machines: IndexMap::new(),
            ids: IdAllocator::new(),
            by_correlation_id: HashMap::new(),
            by_tag: HashMap::new(),
            predicted_next_event_id,
        }
    }

    pub fn add(&mut self, kind: DecisionKind) -> DecisionId {
        self.add_with_tag(kind, None)
    }

    /// Like [`DecisionRegistry::add`], but records the attribute (activity
    /// type / timer id / child workflow type) the machine's own correlating
    /// event will be checked against on replay (§4.9.3).
    pub fn add_with_tag(&mut self, kind: DecisionKind, tag: Option<String>) -> DecisionId {
        let id = DecisionId::from_raw(self.ids.alloc());
        if let Some(tag) = &tag {
            self.by_tag.insert((kind, tag.clone()), id);
        }
        self.machines.insert(id, DecisionStateMachine::new_with_tag(id, kind, tag));
        id
    }

    /// Finds the most recently registered machine of `kind` whose tag
    /// matches `tag` exactly (activity type / timer id / ... — whatever the
    /// caller passed to [`DecisionRegistry::add_with_tag`]). Used for
    /// operations that only name a decision by that tag, not by event id.
    pub fn find_by_tag(&self, kind: DecisionKind, tag: &str) -> Option<DecisionId> {
        self.by_tag.get(&(kind, tag.to_string())).copied()
    }

    /// Binds the id a correlating history event will reference back to this
    /// decision. Fatal if that id is already claimed (§7 "Fatal").
    pub fn bind_correlation_id(&mut self, event_id: EventId, decision: DecisionId) -> Result<(), FatalReason> {
        if self.by_correlation_id.contains_key(&event_id) {
            tracing::error!(%decision, event_id, "duplicate decision correlation id");
            return Err(FatalReason::DuplicateDecisionId(decision));
        }
        tracing::trace!(%decision, event_id, "decision correlation id bound");
        self.by_correlation_id.insert(event_id, decision);
        Ok(())
    }

    pub fn resolve_correlation_id(&self, event_id: EventId) -> Result<DecisionId, FatalReason> {
        self.by_correlation_id.get(&event_id).copied().ok_or(FatalReason::MissingIdMapping(event_id))
    }

    /// Looks a machine up and moves it to the tail of iteration order — the
    /// registry's recency ordering doubles as the deterministic order newer
    /// `RecordMarker`/search-attribute commands are emitted in relative to
    /// older still-pending ones (§4.8; see DESIGN.md's Open Question note
    /// on whether this tail-touch reordering is load-bearing).
    pub fn lookup_touch(&mut self, id: DecisionId) -> Option<&mut DecisionStateMachine> {
        if let Some(idx) = self.machines.get_index_of(&id) {
            let last = self.machines.len().saturating_sub(1);
            self.machines.move_index(idx, last);
        }
        self.machines.get_mut(&id)
    }

    pub fn get(&self, id: DecisionId) -> Option<&DecisionStateMachine> {
        self.machines.get(&id)
    }

    /// Removes a terminal machine from the registry entirely.
    pub fn extract(&mut self, id: DecisionId) -> Option<DecisionStateMachine> {
        self.by_correlation_id.retain(|_, v| *v != id);
        self.by_tag.retain(|_, v| *v != id);
        self.machines.shift_remove(&id)
    }

    pub fn predict_next_event_id(&self) -> EventId {
        self.predicted_next_event_id
    }

    pub fn advance_predicted_event_id(&mut self, by: EventId) {
        self.predicted_next_event_id += by;
    }

    /// Resyncs the prediction counter to ground truth as real history
    /// replays: the next command-correlated event can't land on an id
    /// already consumed by `event_id`, whether or not that event was itself
    /// decision-correlated.
    pub fn observe_event_id(&mut self, event_id: EventId) {
        self.predicted_next_event_id = event_id + 1;
    }

    pub fn iter_in_order(&self) -> impl Iterator<Item = &DecisionStateMachine> {
        self.machines.values()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_touch_moves_entry_to_tail() {
        let mut reg = DecisionRegistry::new(1);
        let a = reg.add(DecisionKind::Timer);
        let b = reg.add(DecisionKind::Timer);
        let order_before: Vec<_> = reg.iter_in_order().map(|m| m.id).collect();
        assert_eq!(order_before, vec![a, b]);

        reg.lookup_touch(a);
        let order_after: Vec<_> = reg.iter_in_order().map(|m| m.id).collect();
        assert_eq!(order_after, vec![b, a]);
    }

    #[test]
    fn duplicate_correlation_id_is_fatal() {
        let mut reg = DecisionRegistry::new(1);
        let a = reg.add(DecisionKind::Activity);
        let b = reg.add(DecisionKind::Activity);
        reg.bind_correlation_id(10, a).unwrap();
        assert!(reg.bind_correlation_id(10, b).is_err());
    }
}
