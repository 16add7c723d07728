//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::result::Result;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::container::IteratorResult;
use crate::engine::Context;
use crate::error::{RecoveryError, RecoveryErrorCode};
use crate::stats::{self, Stats};
use crate::store::{StoreClient, StoreSession, WriteFuture};
use crate::types::{ContainerRecord, Key};

/// Recover the per-source buckets of one range's recovery plan.
///
/// Opens one direct session to the local replica for writing and, per
/// bucket, a direct session to the bucket's source for reading, then
/// streams bulk-read-then-bulk-write batches of `batch_size` keys.
/// Returns `Ok(true)` iff every batch completed with zero failures;
/// partial failure is recorded and never aborts the range.
pub(crate) async fn recover<C: StoreClient>(
    ctx: &Context,
    client: &C,
    plan: &[IteratorResult],
    stats: &mut Stats,
    cancel: &watch::Receiver<bool>,
) -> Result<bool, RecoveryError> {
    let total: u64 = plan.iter().map(|d| d.len()).sum();
    info!("recovering {} keys", total);

    debug!("creating direct session: {}", ctx.config.address());
    let local_session = match client
        .direct_session(ctx.config.address(), ctx.group_id)
        .await
    {
        Ok(s) => s,
        Err(e) => {
            return Err(RecoveryError::new(
                RecoveryErrorCode::StoreUnavailable,
                &format!(
                    "can't create direct session to local node {}: {}",
                    ctx.config.address(),
                    e
                ),
            ))
        }
    };

    let mut result = true;
    for diff in plan {
        debug!("creating direct session: {}", diff.address());
        let remote_session = match client.direct_session(diff.address(), diff.group_id()).await {
            Ok(s) => s,
            Err(e) => {
                // the whole bucket goes unread: count every key as failed
                error!("can't create direct session to {}: {}", diff.address(), e);
                let failed = diff.len() as i64;
                stats.add(stats::RECOVERED_KEYS, -failed);
                ctx.monitor.add_counter(stats::RECOVERED_KEYS, -failed);
                result = false;
                continue;
            }
        };

        let mut records = diff.records()?;
        let mut done: u64 = 0;
        loop {
            if *cancel.borrow() {
                return Err(RecoveryError::new(
                    RecoveryErrorCode::Interrupted,
                    "recovery interrupted",
                ));
            }
            let mut chunk: Vec<ContainerRecord> = Vec::with_capacity(ctx.config.batch_size());
            while chunk.len() < ctx.config.batch_size() {
                match records.next_record()? {
                    Some(rec) => chunk.push(rec),
                    None => break,
                }
            }
            if chunk.is_empty() {
                break;
            }
            let keys: Vec<Key> = chunk.iter().map(|r| r.meta.key).collect();
            let (successes, failures) =
                recover_keys(ctx, &keys, &local_session, &remote_session, stats).await;
            stats.add(stats::RECOVERED_KEYS, successes);
            ctx.monitor.add_counter(stats::RECOVERED_KEYS, successes);
            stats.add(stats::RECOVERED_KEYS, -failures);
            ctx.monitor.add_counter(stats::RECOVERED_KEYS, -failures);
            result &= failures == 0;
            done += keys.len() as u64;
            debug!(
                "recovered batch: {}/{} of size: {}/{}",
                done,
                diff.len(),
                successes,
                failures
            );
        }
    }

    Ok(result)
}

/// Bulk recovery of one chunk of keys: one outstanding bulk read, then an
/// asynchronous write per returned record, all awaited before returning.
/// Returns `(successes, failures)`.
async fn recover_keys<S: StoreSession, T: StoreSession>(
    ctx: &Context,
    keys: &[Key],
    local_session: &S,
    remote_session: &T,
    stats: &mut Stats,
) -> (i64, i64) {
    let key_num = keys.len() as i64;

    debug!("reading {} keys", key_num);
    let batch = match remote_session.bulk_read(keys).await {
        Ok(b) => b,
        Err(e) => {
            debug!("bulk read failed: {} keys: {}", key_num, e);
            return (0, key_num);
        }
    };

    let mut writes: Vec<WriteFuture> = Vec::with_capacity(batch.len());
    let mut sizes: Vec<u64> = Vec::with_capacity(batch.len());
    let mut size: u64 = 0;
    for b in batch {
        let data_len = b.data.len() as u64;
        writes.push(local_session.write_async(&b.meta, b.data));
        sizes.push(data_len);
        size += data_len;
    }

    debug!("writing {} keys: {} bytes", sizes.len(), size);
    let results = futures::future::join_all(writes).await;

    let (mut successes, mut failures) = (0i64, 0i64);
    let (mut successes_size, mut failures_size) = (0i64, 0i64);
    for (res, bsize) in results.iter().zip(sizes) {
        if res.is_ok() {
            successes_size += bsize as i64;
            successes += 1;
        } else {
            failures_size += bsize as i64;
            failures += 1;
        }
    }

    // net byte accounting: failed writes reduce the recovered figure
    stats.add(stats::RECOVERED_BYTES, successes_size - failures_size);
    ctx.monitor
        .add_counter(stats::RECOVERED_BYTES, successes_size - failures_size);
    (successes, failures)
}
