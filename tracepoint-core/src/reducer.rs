use indexmap::map::Entry;
use indexmap::IndexMap;

use tracepoint_types::DeviceSnapshot;

/// Keeps, per row key, the snapshot with the greatest partition key.
///
/// "Greatest" is plain lexicographic string order. Whether that equals "most recent"
/// depends on the uploading agent writing partition keys that sort chronologically;
/// nothing here checks it and no timestamp is consulted.
///
/// Results come out in the order each row key was first seen.
#[derive(Debug, Default)]
pub struct LatestStatus {
    by_device: IndexMap<String, DeviceSnapshot>,
}

impl LatestStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, snapshot: DeviceSnapshot) {
        match self.by_device.entry(snapshot.row_key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(snapshot);
            }
            Entry::Occupied(mut slot) => {
                if snapshot.partition_key > slot.get().partition_key {
                    slot.insert(snapshot);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }

    pub fn into_vec(self) -> Vec<DeviceSnapshot> {
        self.by_device.into_values().collect()
    }
}

/// One-shot form of [`LatestStatus`].
pub fn latest_by_device(snapshots: impl IntoIterator<Item = DeviceSnapshot>) -> Vec<DeviceSnapshot> {
    let mut latest = LatestStatus::new();
    for snapshot in snapshots {
        latest.observe(snapshot);
    }
    latest.into_vec()
}
