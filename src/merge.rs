use crate::models::{MetricEntry, Phase, Snapshot};
use std::collections::BTreeMap;
use tracing::debug;

/// What startup reconciliation decided to do with the two replicas.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Nothing local is missing remotely: take the remote as-is.
    AdoptRemote,
    /// Local holds data the remote lacks: keep the union and push it back.
    PushMerged(Snapshot),
}

pub fn reconcile(local: &Snapshot, remote: &Snapshot) -> Reconciliation {
    if !has_local_divergence(local, remote) {
        return Reconciliation::AdoptRemote;
    }

    let mut entries = remote.entries.clone();
    entries.extend(local.entries.clone());

    Reconciliation::PushMerged(Snapshot {
        entries,
        phases: merge_phases(&local.phases, &remote.phases),
    })
}

/// True when some local date or phase is absent remotely or differs from
/// the remote copy.
pub fn has_local_divergence(local: &Snapshot, remote: &Snapshot) -> bool {
    let entries_diverge = local
        .entries
        .iter()
        .any(|(date, entry)| {
            remote.entries.get(date).cloned().map(MetricEntry::normalized).as_ref() != Some(entry)
        });
    let phases_diverge = local
        .phases
        .iter()
        .any(|phase| !remote.phases.iter().any(|other| other == phase));
    entries_diverge || phases_diverge
}

/// Union by id; the local copy wins on collision. Ids are creation
/// timestamps, so sorting by id keeps creation order.
fn merge_phases(local: &[Phase], remote: &[Phase]) -> Vec<Phase> {
    let mut by_id: BTreeMap<i64, Phase> =
        remote.iter().map(|phase| (phase.id, phase.clone())).collect();
    by_id.extend(local.iter().map(|phase| (phase.id, phase.clone())));
    let mut phases: Vec<Phase> = by_id.into_values().collect();
    close_superseded(&mut phases);
    phases
}

/// Leaves only the newest open phase open. An older open phase ends on the
/// start date of the phase that follows it.
fn close_superseded(phases: &mut [Phase]) {
    let Some(newest) = phases.iter().rposition(|phase| phase.is_open()) else {
        return;
    };
    for idx in 0..newest {
        if phases[idx].is_open() {
            let end = phases[idx + 1].start.clone();
            debug!(id = phases[idx].id, end = %end, "closing superseded open phase");
            phases[idx].end = end;
        }
    }
}
