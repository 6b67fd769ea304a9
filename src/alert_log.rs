//! Grouping of the chronological alert log into collapsible clusters.
//!
//! The log panel shows a "recent burst" grouping: consecutive entries from
//! the same node collapse into one group, while the same node reappearing
//! later (non-adjacently) starts a fresh group. This is intentionally not a
//! per-node history fold.

use crate::AlertLogEntry;

/// One contiguous same-node run of the sorted log.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertGroup {
    pub door_num: u32,

    /// Entries of this run, most recent first.
    pub entries: Vec<AlertLogEntry>,
}

impl AlertGroup {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the newest entry in the run.
    pub fn latest(&self) -> Option<&AlertLogEntry> {
        self.entries.first()
    }
}

/// Cluster entries into contiguous same-node runs.
///
/// The input is re-sorted descending by timestamp first, so the contract
/// holds regardless of caller order. Concatenating the returned groups'
/// entries reproduces the sorted input exactly.
pub fn group_alerts(mut entries: Vec<AlertLogEntry>) -> Vec<AlertGroup> {
    // stable sort: entries sharing a timestamp keep their relative order
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut groups: Vec<AlertGroup> = Vec::new();
    for entry in entries {
        match groups.last_mut() {
            Some(group) if group.door_num == entry.door_num => group.entries.push(entry),
            _ => groups.push(AlertGroup {
                door_num: entry.door_num,
                entries: vec![entry],
            }),
        }
    }

    groups
}

/// The grouped log plus its expand/collapse flags.
///
/// Expansion is pure UI state keyed by group index and lives outside the
/// entries; toggling never mutates the underlying log. Groups with more
/// than one entry default to collapsed.
#[derive(Debug, Clone, Default)]
pub struct AlertLogView {
    groups: Vec<AlertGroup>,
    expanded: Vec<bool>,
}

impl AlertLogView {
    pub fn from_entries(entries: Vec<AlertLogEntry>) -> Self {
        let groups = group_alerts(entries);
        let expanded = groups.iter().map(|g| g.len() <= 1).collect();
        Self { groups, expanded }
    }

    pub fn groups(&self) -> &[AlertGroup] {
        &self.groups
    }

    pub fn is_expanded(&self, index: usize) -> bool {
        self.expanded.get(index).copied().unwrap_or(false)
    }

    /// Flip the expansion flag of one group. Out-of-range indices are a
    /// no-op.
    pub fn toggle(&mut self, index: usize) {
        if let Some(flag) = self.expanded.get_mut(index) {
            *flag = !*flag;
        }
    }

    /// Insert a freshly streamed entry.
    ///
    /// The stream normally delivers entries newest-first relative to the
    /// queried log, so the entry either joins the newest group (same node)
    /// or opens a new one at the front. A group growing past one entry
    /// falls back to the collapsed default.
    ///
    /// An entry older than the current head is out-of-order delivery; the
    /// view re-sorts and re-groups from scratch to keep the descending
    /// order invariant, resetting expansion flags to their defaults (group
    /// indices shift anyway).
    pub fn push_entry(&mut self, entry: AlertLogEntry) {
        if let Some(group) = self.groups.first()
            && let Some(latest) = group.latest()
            && entry.timestamp < latest.timestamp
        {
            let mut entries: Vec<AlertLogEntry> = std::mem::take(&mut self.groups)
                .into_iter()
                .flat_map(|g| g.entries)
                .collect();
            entries.push(entry);
            *self = Self::from_entries(entries);
            return;
        }

        match self.groups.first_mut() {
            Some(group) if group.door_num == entry.door_num => {
                group.entries.insert(0, entry);
                if group.len() == 2 {
                    self.expanded[0] = false;
                }
            }
            _ => {
                self.groups.insert(
                    0,
                    AlertGroup {
                        door_num: entry.door_num,
                        entries: vec![entry],
                    },
                );
                self.expanded.insert(0, true);
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(AlertGroup::len).sum()
    }
}
