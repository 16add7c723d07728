//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
// In-memory store cluster used by the scenario tests. One BTreeMap per
// (group, address) node, with per-address failure injection for
// iterators, bulk reads and writes.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::result::Result;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;

use crate::container::IteratorResult;
use crate::error::{RecoveryError, RecoveryErrorCode};
use crate::store::{IteratorSpec, StoreClient, StoreSession, WriteFuture};
use crate::types::{Address, ContainerRecord, GroupId, Key, ReadRecord, RecordMeta, Time};

#[derive(Clone, Debug)]
pub(crate) struct StoredRecord {
    pub timestamp: Time,
    pub user_flags: u64,
    pub data: Bytes,
}

#[derive(Default)]
struct ClusterState {
    nodes: HashMap<(GroupId, Address), BTreeMap<Key, StoredRecord>>,
    fail_iterators: HashSet<Address>,
    fail_bulk_reads: HashSet<Address>,
    fail_writes: HashSet<Address>,
    writes_seen: u64,
}

#[derive(Clone, Default)]
pub(crate) struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    pub fn new() -> MockCluster {
        MockCluster::default()
    }

    pub fn add_node(&self, group_id: GroupId, address: &Address) {
        let mut s = self.state.lock().unwrap();
        s.nodes.entry((group_id, address.clone())).or_default();
    }

    pub fn put(
        &self,
        group_id: GroupId,
        address: &Address,
        key: Key,
        timestamp: Time,
        data: &[u8],
    ) {
        let mut s = self.state.lock().unwrap();
        s.nodes.entry((group_id, address.clone())).or_default().insert(
            key,
            StoredRecord {
                timestamp,
                user_flags: 0,
                data: Bytes::copy_from_slice(data),
            },
        );
    }

    pub fn get(&self, group_id: GroupId, address: &Address, key: &Key) -> Option<StoredRecord> {
        let s = self.state.lock().unwrap();
        s.nodes
            .get(&(group_id, address.clone()))
            .and_then(|n| n.get(key))
            .cloned()
    }

    pub fn node_len(&self, group_id: GroupId, address: &Address) -> usize {
        let s = self.state.lock().unwrap();
        s.nodes
            .get(&(group_id, address.clone()))
            .map(|n| n.len())
            .unwrap_or(0)
    }

    pub fn fail_iterator(&self, address: &Address) {
        self.state
            .lock()
            .unwrap()
            .fail_iterators
            .insert(address.clone());
    }

    pub fn fail_bulk_read(&self, address: &Address) {
        self.state
            .lock()
            .unwrap()
            .fail_bulk_reads
            .insert(address.clone());
    }

    pub fn fail_writes(&self, address: &Address) {
        self.state
            .lock()
            .unwrap()
            .fail_writes
            .insert(address.clone());
    }

    pub fn write_count(&self) -> u64 {
        self.state.lock().unwrap().writes_seen
    }
}

#[async_trait]
impl StoreClient for MockCluster {
    type Session = MockSession;

    async fn start_iterator(
        &self,
        spec: IteratorSpec<'_>,
    ) -> Result<Option<IteratorResult>, RecoveryError> {
        let state = self.state.lock().unwrap();
        if state.fail_iterators.contains(spec.address) {
            return Err(RecoveryError::new(
                RecoveryErrorCode::IteratorFailed,
                &format!("injected iterator failure on {}", spec.address),
            ));
        }
        let node = match state.nodes.get(&(spec.group_id, spec.address.clone())) {
            Some(n) => n,
            None => return Ok(None),
        };
        let mut container = IteratorResult::create(
            spec.tmp_dir,
            spec.key_ranges[0],
            spec.group_id,
            spec.eid,
            spec.address.clone(),
        )?;
        for (key, rec) in node.iter() {
            if !spec.key_ranges.iter().any(|r| r.contains(key)) {
                continue;
            }
            if rec.timestamp < spec.timestamp_range.0 {
                continue;
            }
            container.push(&ContainerRecord {
                meta: RecordMeta {
                    key: *key,
                    timestamp: rec.timestamp,
                    user_flags: rec.user_flags,
                    size: rec.data.len() as u64,
                },
                group_id: spec.group_id,
            })?;
        }
        container.seal()?;
        if container.is_empty() {
            return Ok(None);
        }
        Ok(Some(container))
    }

    async fn direct_session(
        &self,
        address: &Address,
        group_id: GroupId,
    ) -> Result<MockSession, RecoveryError> {
        let state = self.state.lock().unwrap();
        if !state.nodes.contains_key(&(group_id, address.clone())) {
            return Err(RecoveryError::new(
                RecoveryErrorCode::StoreUnavailable,
                &format!("no node at {} in group {}", address, group_id),
            ));
        }
        Ok(MockSession {
            cluster: self.clone(),
            address: address.clone(),
            group_id,
        })
    }
}

pub(crate) struct MockSession {
    cluster: MockCluster,
    address: Address,
    group_id: GroupId,
}

#[async_trait]
impl StoreSession for MockSession {
    async fn bulk_read(&self, keys: &[Key]) -> Result<Vec<ReadRecord>, RecoveryError> {
        let state = self.cluster.state.lock().unwrap();
        if state.fail_bulk_reads.contains(&self.address) {
            return Err(RecoveryError::new(
                RecoveryErrorCode::BulkReadFailed,
                &format!("injected bulk read failure on {}", self.address),
            ));
        }
        let node = match state.nodes.get(&(self.group_id, self.address.clone())) {
            Some(n) => n,
            None => {
                return Err(RecoveryError::new(
                    RecoveryErrorCode::StoreUnavailable,
                    &format!("no node at {} in group {}", self.address, self.group_id),
                ))
            }
        };
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(rec) = node.get(key) {
                out.push(ReadRecord {
                    meta: RecordMeta {
                        key: *key,
                        timestamp: rec.timestamp,
                        user_flags: rec.user_flags,
                        size: rec.data.len() as u64,
                    },
                    data: rec.data.clone(),
                });
            }
        }
        Ok(out)
    }

    fn write_async(&self, meta: &RecordMeta, data: Bytes) -> WriteFuture {
        let cluster = self.cluster.clone();
        let address = self.address.clone();
        let group_id = self.group_id;
        let meta = *meta;
        async move {
            let mut state = cluster.state.lock().unwrap();
            if state.fail_writes.contains(&address) {
                return Err(RecoveryError::new(
                    RecoveryErrorCode::WriteFailed,
                    &format!("injected write failure on {}", address),
                ));
            }
            state.nodes.entry((group_id, address)).or_default().insert(
                meta.key,
                StoredRecord {
                    timestamp: meta.timestamp,
                    user_flags: meta.user_flags,
                    data,
                },
            );
            state.writes_seen += 1;
            Ok(())
        }
        .boxed()
    }
}
