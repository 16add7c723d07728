//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use crate::types::{Address, Eid, GroupId, IdRange, Key, RangeSpec, Replica};

/// One row of the store routing table: from `id` (inclusive) up to the
/// next id published for the same group, keys are served by the node at
/// `address`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RouteEntry {
    pub id: Key,
    pub group_id: GroupId,
    pub address: Address,
}

impl RouteEntry {
    pub fn new(id: Key, group_id: GroupId, address: Address) -> RouteEntry {
        RouteEntry {
            id,
            group_id,
            address,
        }
    }

    /// The endpoint id used to direct iterator requests at this node.
    pub fn eid(&self) -> Eid {
        Eid(self.id)
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{} -> {}", self.group_id, self.id, self.address)
    }
}

/// A snapshot of the store routing table.
///
/// Discovery (pulling the table from a live session) belongs to the
/// embedding application; this type answers the two questions the engine
/// asks: which group does an address belong to, and which key ranges does
/// it own, together with the replica of each range in every other group.
///
/// Tables are expected to start at [`Key::min_value`] per group, as the
/// store publishes them; ids below a group's first entry are not
/// attributed to anyone.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    explicit_ranges: Option<Vec<RangeSpec>>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> RouteTable {
        RouteTable {
            entries,
            explicit_ranges: None,
        }
    }

    /// Build a table from entries plus pre-computed range specs, for
    /// callers that run their own discovery.
    pub fn from_parts(entries: Vec<RouteEntry>, ranges: Vec<RangeSpec>) -> RouteTable {
        RouteTable {
            entries,
            explicit_ranges: Some(ranges),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries served by `address`, in table order.
    pub fn filter_by_address(&self, address: &Address) -> Vec<&RouteEntry> {
        self.entries
            .iter()
            .filter(|e| e.address == *address)
            .collect()
    }

    /// Group of the first entry served by `address`, if any.
    pub fn group_of(&self, address: &Address) -> Option<GroupId> {
        self.entries
            .iter()
            .find(|e| e.address == *address)
            .map(|e| e.group_id)
    }

    /// Enumerate the key ranges owned by `address` in its own group, each
    /// with the covering replica in every group of `groups` (the local
    /// group is always included). Ranges are derived from consecutive
    /// route ids; the last entry of a group extends to the end of the
    /// keyspace.
    pub fn ranges_by_address(&self, address: &Address, groups: &[GroupId]) -> Vec<RangeSpec> {
        if let Some(ranges) = &self.explicit_ranges {
            return ranges
                .iter()
                .filter(|r| r.replicas.values().any(|rep| rep.address == *address))
                .cloned()
                .collect();
        }

        let local_group = match self.group_of(address) {
            Some(g) => g,
            None => return Vec::new(),
        };
        let mut wanted: BTreeSet<GroupId> = groups.iter().copied().collect();
        wanted.insert(local_group);

        // per-group entries sorted by route id
        let mut per_group: BTreeMap<GroupId, Vec<&RouteEntry>> = BTreeMap::new();
        for e in &self.entries {
            if wanted.contains(&e.group_id) {
                per_group.entry(e.group_id).or_default().push(e);
            }
        }
        for list in per_group.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        let locals = match per_group.get(&local_group) {
            Some(l) => l.clone(),
            None => return Vec::new(),
        };

        let mut out = Vec::new();
        for (i, entry) in locals.iter().enumerate() {
            if entry.address != *address {
                continue;
            }
            let end = if i + 1 < locals.len() {
                locals[i + 1].id
            } else {
                Key::max_value()
            };
            if entry.id >= end {
                debug!("skipping degenerate route slice at {}", entry.id);
                continue;
            }
            let id_range = IdRange::new(entry.id, end);
            let mut replicas = BTreeMap::new();
            for (group, list) in &per_group {
                // covering entry: greatest route id <= range start
                let idx = list.partition_point(|e| e.id <= entry.id);
                if idx == 0 {
                    continue;
                }
                let cover = list[idx - 1];
                replicas.insert(
                    *group,
                    Replica {
                        eid: cover.eid(),
                        address: cover.address.clone(),
                    },
                );
            }
            out.push(RangeSpec { id_range, replicas });
        }
        out
    }
}
