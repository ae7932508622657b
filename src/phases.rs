use crate::models::Phase;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Ordered phase list (creation order) with an explicit pointer to the one
/// open phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseTracker {
    phases: Vec<Phase>,
    current: Option<i64>,
    last_id: i64,
}

impl PhaseTracker {
    /// Rebuilds the tracker from persisted phases. If more than one phase is
    /// open the first one in stored order becomes current.
    pub fn from_phases(phases: Vec<Phase>) -> Self {
        let mut open = phases.iter().filter(|phase| phase.is_open());
        let current = open.next().map(|phase| phase.id);
        let extra_open = open.count();
        if extra_open > 0 {
            warn!(
                extra_open,
                current = ?current,
                "more than one open phase in stored data; using the first"
            );
        }
        let last_id = phases.iter().map(|phase| phase.id).max().unwrap_or(0);
        Self {
            phases,
            current,
            last_id,
        }
    }

    /// Appends a new open phase and makes it current. A phase that is still
    /// open is closed on the new phase's start date.
    pub fn add_phase(
        &mut self,
        now_millis: i64,
        name: impl Into<String>,
        start: impl Into<String>,
        goals: BTreeMap<String, String>,
    ) -> Phase {
        let start = start.into();
        if let Some(current) = self.current.take() {
            if let Some(open) = self.phases.iter_mut().find(|phase| phase.id == current) {
                debug!(id = open.id, end = %start, "closing open phase before starting a new one");
                open.end = start.clone();
            }
        }

        let id = now_millis.max(self.last_id + 1);
        self.last_id = id;
        let phase = Phase {
            id,
            name: name.into(),
            start,
            end: String::new(),
            goals,
        };
        self.phases.push(phase.clone());
        self.current = Some(id);
        phase
    }

    /// Sets `end` on the phase with `id`. Unknown ids and blank end dates are
    /// ignored.
    pub fn end_phase(&mut self, id: i64, end: impl Into<String>) -> bool {
        let end = end.into();
        if end.trim().is_empty() {
            return false;
        }
        let Some(phase) = self.phases.iter_mut().find(|phase| phase.id == id) else {
            return false;
        };
        phase.end = end;
        if self.current == Some(id) {
            self.current = None;
        }
        true
    }

    pub fn delete_phase(&mut self, id: i64) -> bool {
        let before = self.phases.len();
        self.phases.retain(|phase| phase.id != id);
        if self.current == Some(id) {
            self.current = None;
        }
        self.phases.len() != before
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        let id = self.current?;
        self.get(id)
    }

    pub fn get(&self, id: i64) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.id == id)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with_cut() -> (PhaseTracker, Phase) {
        let mut tracker = PhaseTracker::default();
        let phase = tracker.add_phase(1_000, "Cut", "2024-01-01", BTreeMap::new());
        (tracker, phase)
    }

    #[test]
    fn add_phase_appends_in_creation_order() {
        let (mut tracker, cut) = tracker_with_cut();
        let earlier = tracker.add_phase(2_000, "Base", "2023-06-01", BTreeMap::new());

        let names: Vec<&str> = tracker.phases().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Cut", "Base"]);
        assert!(earlier.id > cut.id);
    }

    #[test]
    fn ids_stay_unique_when_the_clock_repeats() {
        let mut tracker = PhaseTracker::default();
        let a = tracker.add_phase(5_000, "A", "2024-01-01", BTreeMap::new());
        let b = tracker.add_phase(5_000, "B", "2024-02-01", BTreeMap::new());
        let c = tracker.add_phase(4_000, "C", "2024-03-01", BTreeMap::new());
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn only_one_phase_is_ever_open() {
        let (mut tracker, cut) = tracker_with_cut();
        let bulk = tracker.add_phase(2_000, "Bulk", "2024-03-01", BTreeMap::new());

        assert_eq!(tracker.get(cut.id).unwrap().end, "2024-03-01");
        assert_eq!(tracker.current_phase().map(|p| p.id), Some(bulk.id));
        assert_eq!(tracker.phases().iter().filter(|p| p.is_open()).count(), 1);
    }

    #[test]
    fn ending_the_current_phase_clears_it() {
        let (mut tracker, cut) = tracker_with_cut();
        assert!(tracker.end_phase(cut.id, "2024-02-01"));
        assert!(tracker.current_phase().is_none());
        assert_eq!(tracker.get(cut.id).unwrap().end, "2024-02-01");
    }

    #[test]
    fn end_phase_does_not_validate_order() {
        let (mut tracker, cut) = tracker_with_cut();
        assert!(tracker.end_phase(cut.id, "2023-01-01"));
        assert_eq!(tracker.get(cut.id).unwrap().end, "2023-01-01");
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let (mut tracker, _) = tracker_with_cut();
        let before = tracker.clone();
        assert!(!tracker.end_phase(42, "2024-02-01"));
        assert!(!tracker.delete_phase(42));
        assert_eq!(tracker, before);
    }

    #[test]
    fn deleting_the_current_phase_clears_it() {
        let (mut tracker, cut) = tracker_with_cut();
        assert!(tracker.delete_phase(cut.id));
        assert!(tracker.is_empty());
        assert!(tracker.current_phase().is_none());
    }

    #[test]
    fn loaded_data_with_two_open_phases_uses_the_first() {
        let open = |id: i64, name: &str| Phase {
            id,
            name: name.to_string(),
            start: "2024-01-01".to_string(),
            end: String::new(),
            goals: BTreeMap::new(),
        };
        let tracker = PhaseTracker::from_phases(vec![open(9, "Later"), open(3, "Earlier")]);
        assert_eq!(tracker.current_phase().map(|p| p.id), Some(9));

        let mut tracker = tracker;
        let next = tracker.add_phase(1, "Next", "2024-05-01", BTreeMap::new());
        assert_eq!(next.id, 10);
    }
}
