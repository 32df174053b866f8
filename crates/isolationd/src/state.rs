//! Port state store: what the controller believes it has done.
//!
//! An entry exists iff the port is isolated (by us or externally) or has been
//! marked treated and is waiting for re-evaluation.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::types::{IssueCause, PortState, PortStateKind};

/// Outcome of reconciling local state against the remote isolated list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Remotely isolated ports we were not tracking.
    pub discovered: Vec<String>,
    /// Tracked ports that are no longer remotely isolated.
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PortStateStore {
    ports: HashMap<String, PortState>,
}

impl PortStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, port: &str) -> Option<&PortState> {
        self.ports.get(port)
    }

    pub fn contains(&self, port: &str) -> bool {
        self.ports.contains_key(port)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Creates or updates an entry, stamping `change_time`.
    pub fn upsert(
        &mut self,
        port: &str,
        state: PortStateKind,
        cause: IssueCause,
        now: DateTime<Utc>,
    ) -> &PortState {
        let entry = self
            .ports
            .entry(port.to_string())
            .or_insert_with(|| PortState::new(port, now));
        entry.update(state, cause, now);
        entry
    }

    pub fn remove(&mut self, port: &str) -> Option<PortState> {
        self.ports.remove(port)
    }

    /// Marks tracked ports whose requested state is treated. Untracked ports
    /// are ignored. Returns the ports that changed.
    pub fn mark_treated(
        &mut self,
        requested: &HashMap<String, PortStateKind>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut marked = Vec::new();

        for (port, kind) in requested {
            if *kind != PortStateKind::Treated {
                continue;
            }
            match self.ports.get_mut(port) {
                Some(entry) => {
                    let cause = entry.cause;
                    entry.update(PortStateKind::Treated, cause, now);
                    marked.push(port.clone());
                }
                None => debug!(port = %port, "Ignoring treated request for untracked port"),
            }
        }

        marked.sort();
        marked
    }

    /// Aligns local belief with the remote isolated set.
    ///
    /// Untracked remote ports become `{Isolated, Oonoc}`; tracked ports
    /// missing from the remote set are dropped.
    pub fn reconcile(
        &mut self,
        remote_isolated: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for port in remote_isolated {
            if !self.ports.contains_key(port) {
                self.upsert(port, PortStateKind::Isolated, IssueCause::Oonoc, now);
                summary.discovered.push(port.clone());
            }
        }

        self.ports.retain(|port, _| {
            let keep = remote_isolated.contains(port);
            if !keep {
                summary.dropped.push(port.clone());
            }
            keep
        });

        summary.discovered.sort();
        summary.dropped.sort();

        if !summary.discovered.is_empty() || !summary.dropped.is_empty() {
            info!(
                discovered = summary.discovered.len(),
                dropped = summary.dropped.len(),
                tracked = self.ports.len(),
                "Reconciled port state with UFM"
            );
        }
        summary
    }

    /// Tracked port names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ports.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted copy of every tracked entry.
    pub fn snapshot(&self) -> BTreeMap<String, PortState> {
        self.ports
            .iter()
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(ports: &[&str]) -> HashSet<String> {
        ports.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_upsert_creates_and_updates() {
        let mut store = PortStateStore::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::minutes(1);

        store.upsert("p1", PortStateKind::Isolated, IssueCause::Pdr, t0);
        let state = store.upsert("p1", PortStateKind::Isolated, IssueCause::Ber, t1);

        assert_eq!(state.cause, IssueCause::Ber);
        assert_eq!(state.change_time, t1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reconcile_discovers_and_drops() {
        let mut store = PortStateStore::new();
        let now = Utc::now();
        store.upsert("stale", PortStateKind::Isolated, IssueCause::Pdr, now);
        store.upsert("kept", PortStateKind::Treated, IssueCause::Ber, now);

        let summary = store.reconcile(&set(&["kept", "external"]), now);

        assert_eq!(summary.discovered, vec!["external".to_string()]);
        assert_eq!(summary.dropped, vec!["stale".to_string()]);
        assert_eq!(store.names(), vec!["external".to_string(), "kept".to_string()]);

        let external = store.get("external").unwrap();
        assert_eq!(external.state, PortStateKind::Isolated);
        assert_eq!(external.cause, IssueCause::Oonoc);

        let kept = store.get("kept").unwrap();
        assert_eq!(kept.state, PortStateKind::Treated);
    }

    #[test]
    fn test_reconcile_empty_remote_clears_everything() {
        let mut store = PortStateStore::new();
        let now = Utc::now();
        store.upsert("p1", PortStateKind::Isolated, IssueCause::Pdr, now);
        store.upsert("p2", PortStateKind::Isolated, IssueCause::Oonoc, now);

        let summary = store.reconcile(&HashSet::new(), now);

        assert_eq!(summary.dropped.len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_mark_treated_only_tracked_ports() {
        let mut store = PortStateStore::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::minutes(2);
        store.upsert("p1", PortStateKind::Isolated, IssueCause::Pdr, t0);
        store.upsert("p2", PortStateKind::Isolated, IssueCause::Ber, t0);

        let requested: HashMap<String, PortStateKind> = [
            ("p1".to_string(), PortStateKind::Treated),
            ("p2".to_string(), PortStateKind::Normal),
            ("unknown".to_string(), PortStateKind::Treated),
        ]
        .into_iter()
        .collect();

        let marked = store.mark_treated(&requested, t1);

        assert_eq!(marked, vec!["p1".to_string()]);
        let p1 = store.get("p1").unwrap();
        assert_eq!(p1.state, PortStateKind::Treated);
        assert_eq!(p1.cause, IssueCause::Pdr);
        assert_eq!(p1.change_time, t1);
        assert_eq!(store.get("p2").unwrap().state, PortStateKind::Isolated);
        assert!(!store.contains("unknown"));
    }
}
