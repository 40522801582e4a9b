//! Display ordering.
//!
//! Devices keep their position across refreshes; newcomers are appended at
//! the end so existing entries never jump around. A second, display-only
//! ranking by signal strength can be computed from the same snapshot.

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::store::DeviceSnapshot;
use crate::types::{DeviceId, DeviceView};

/// How a consumer wants the device list ordered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ViewOrder {
    /// Stable reconciled order: survivors first, newcomers appended.
    #[default]
    Discovery,
    /// Strongest signal first.
    Signal,
}

/// Compute the new display order.
///
/// Ids from `previous` that are still in `table` keep their relative order;
/// ids missing from `table` are dropped. Devices in `table` that were not in
/// `previous` follow, in discovery order. The result never contains an id
/// absent from `table` and never contains an id twice, even if `previous`
/// does.
#[must_use]
pub fn reconcile(previous: &[DeviceId], table: &DeviceSnapshot) -> Vec<DeviceId> {
    let mut placed: HashSet<&DeviceId> = HashSet::with_capacity(table.len());
    let mut order = Vec::with_capacity(table.len());

    for id in previous {
        if table.contains(id) && placed.insert(id) {
            order.push(id.clone());
        }
    }

    for device in table.in_discovery_order() {
        if placed.insert(&device.id) {
            order.push(device.id.clone());
        }
    }

    order
}

/// Sort key for the signal ranking: bars first, raw value as tie-break.
#[must_use]
pub const fn signal_rank(bars: u8, smoothed_signal: i16) -> (u8, i16) {
    (bars, smoothed_signal)
}

/// Ids ranked strongest first. Ties on both keys fall back to discovery order.
#[must_use]
pub fn rank_by_signal(table: &DeviceSnapshot) -> Vec<DeviceId> {
    let mut devices = table.in_discovery_order();
    devices.sort_by_key(|d| Reverse(signal_rank(d.signal_strength().bars(), d.smoothed_signal)));
    devices.into_iter().map(|d| d.id.clone()).collect()
}

/// Keeps the current display order between refreshes.
#[derive(Debug, Default)]
pub struct ViewReconciler {
    order: Vec<DeviceId>,
}

impl ViewReconciler {
    /// Start with an empty order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `table` into the stored order and return the views in that order.
    pub fn refresh(&mut self, table: &DeviceSnapshot) -> Vec<DeviceView> {
        self.order = reconcile(&self.order, table);
        views_for(&self.order, table)
    }

    /// Views for `table` in the requested order, without touching the stored order.
    #[must_use]
    pub fn view(&self, table: &DeviceSnapshot, order: ViewOrder) -> Vec<DeviceView> {
        match order {
            ViewOrder::Discovery => views_for(&reconcile(&self.order, table), table),
            ViewOrder::Signal => views_for(&rank_by_signal(table), table),
        }
    }

    /// The stored order.
    #[must_use]
    pub fn order(&self) -> &[DeviceId] {
        &self.order
    }

    /// Forget the stored order.
    pub fn clear(&mut self) {
        self.order.clear();
    }
}

fn views_for(order: &[DeviceId], table: &DeviceSnapshot) -> Vec<DeviceView> {
    order
        .iter()
        .filter_map(|id| table.get(id).map(crate::store::TrackedDevice::to_view))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::filter::AcceptedSighting;
    use crate::store::DeviceStore;

    fn table(entries: &[(&str, i16)]) -> DeviceSnapshot {
        let mut store = DeviceStore::default();
        let now = Instant::now();
        for (id, rssi) in entries {
            store.record_sighting(AcceptedSighting {
                id: DeviceId::from(*id),
                name: (*id).to_string(),
                rssi: *rssi,
                seen_at: now,
            });
        }
        store.snapshot()
    }

    fn ids(raw: &[&str]) -> Vec<DeviceId> {
        raw.iter().map(|s| DeviceId::from(*s)).collect()
    }

    #[test]
    fn test_drops_missing_and_appends_new() {
        let current = table(&[("B", -50), ("C", -50)]);
        assert_eq!(reconcile(&ids(&["A", "B"]), &current), ids(&["B", "C"]));
    }

    #[test]
    fn test_survivors_keep_relative_order() {
        let current = table(&[("A", -50), ("B", -50), ("C", -50), ("D", -50)]);
        let previous = ids(&["D", "B", "A"]);
        assert_eq!(reconcile(&previous, &current), ids(&["D", "B", "A", "C"]));
    }

    #[test]
    fn test_newcomers_follow_discovery_order() {
        let current = table(&[("zeta", -50), ("alpha", -50), ("mid", -50)]);
        assert_eq!(reconcile(&[], &current), ids(&["zeta", "alpha", "mid"]));
    }

    #[test]
    fn test_duplicate_previous_ids_collapse() {
        let current = table(&[("A", -50)]);
        assert_eq!(reconcile(&ids(&["A", "A"]), &current), ids(&["A"]));
    }

    #[test]
    fn test_empty_table_yields_empty_order() {
        assert!(reconcile(&ids(&["A", "B"]), &DeviceSnapshot::default()).is_empty());
    }

    #[test]
    fn test_rank_by_signal_uses_bars_then_raw_value() {
        let current = table(&[("far", -80), ("near", -40), ("closer", -30), ("mid", -60)]);
        assert_eq!(
            rank_by_signal(&current),
            ids(&["closer", "near", "mid", "far"])
        );
    }

    #[test]
    fn test_signal_view_does_not_disturb_stored_order() {
        let mut reconciler = ViewReconciler::new();
        let current = table(&[("weak", -69), ("strong", -41)]);
        reconciler.refresh(&current);

        let ranked: Vec<DeviceId> = reconciler
            .view(&current, ViewOrder::Signal)
            .into_iter()
            .map(|v| v.id)
            .collect();

        assert_eq!(ranked, ids(&["strong", "weak"]));
        assert_eq!(reconciler.order(), ids(&["weak", "strong"]).as_slice());
    }

    #[test]
    fn test_refresh_preserves_order_across_updates() {
        let mut store = DeviceStore::default();
        let mut reconciler = ViewReconciler::new();
        let t0 = Instant::now();
        let see = |store: &mut DeviceStore, id: &str, rssi: i16, at: Instant| {
            store.record_sighting(AcceptedSighting {
                id: DeviceId::from(id),
                name: id.to_string(),
                rssi,
                seen_at: at,
            });
        };

        see(&mut store, "A", -70, t0);
        see(&mut store, "B", -40, t0);
        reconciler.refresh(&store.snapshot());

        let t1 = t0 + Duration::from_secs(2);
        see(&mut store, "C", -30, t1);
        see(&mut store, "A", -30, t1);
        let views = reconciler.refresh(&store.snapshot());

        let order: Vec<&str> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(views[0].smoothed_signal, -50);
    }
}
