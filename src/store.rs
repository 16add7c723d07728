//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::path::Path;
use std::result::Result;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::container::IteratorResult;
use crate::error::RecoveryError;
use crate::types::{Address, Eid, GroupId, IdRange, Key, ReadRecord, RecordMeta, Time};

/// Per-key write completion. `.await` waits for the write; `Ok` means the
/// store acknowledged it.
pub type WriteFuture = BoxFuture<'static, Result<(), RecoveryError>>;

/// Parameters of one server-side iteration: stream every record of the
/// given key ranges whose timestamp falls inside `timestamp_range` from
/// the node identified by `eid` at `address`, spooling the stream into an
/// [`IteratorResult`] under `tmp_dir`.
#[derive(Debug)]
pub struct IteratorSpec<'a> {
    pub eid: Eid,
    pub group_id: GroupId,
    pub timestamp_range: (Time, Time),
    pub key_ranges: &'a [IdRange],
    pub tmp_dir: &'a Path,
    pub address: &'a Address,
}

/// Client side of the store: the transport-level operations the recovery
/// engine needs. The embedding application supplies the implementation;
/// the engine never routes, resolves or retries on its own.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    type Session: StoreSession + Send + Sync;

    /// Run one iterator and spool its records into a sealed container.
    /// `Ok(None)` means the replica had nothing to return and is skipped;
    /// `Err` from the local replica abandons the range, from a remote it
    /// drops that remote.
    async fn start_iterator(
        &self,
        spec: IteratorSpec<'_>,
    ) -> Result<Option<IteratorResult>, RecoveryError>;

    /// Open a session pinned to a specific endpoint, bypassing routing.
    /// Recovery reads and writes must talk to exactly the intended
    /// replica.
    async fn direct_session(
        &self,
        address: &Address,
        group_id: GroupId,
    ) -> Result<Self::Session, RecoveryError>;
}

/// A direct session to one store node.
#[async_trait]
pub trait StoreSession {
    /// Batched multi-key read. One bulk is outstanding per chunk; a
    /// transport failure of the whole bulk is returned as `Err`.
    async fn bulk_read(&self, keys: &[Key]) -> Result<Vec<ReadRecord>, RecoveryError>;

    /// Enqueue an asynchronous write of `(key, timestamp, user_flags,
    /// data)` and return its completion.
    fn write_async(&self, meta: &RecordMeta, data: Bytes) -> WriteFuture;
}
