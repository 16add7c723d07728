//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::result::Result;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::container::IteratorResult;
use crate::engine::Context;
use crate::error::{RecoveryError, RecoveryErrorCode};
use crate::executor;
use crate::stats::{self, Monitor, Stats};
use crate::store::{IteratorSpec, StoreClient};
use crate::types::{RangeSpec, Time};

/// Reconcile one range end to end: iterate every replica, sort, diff,
/// merge-split, recover. Pure function of `(context, range)`; errors never
/// escape, they become `(false, stats)` (or a logged skip for a local
/// iterator failure). The boolean goes into the pool driver's logical AND.
pub(crate) async fn process_range<C: StoreClient>(
    ctx: &Context,
    client: &C,
    range: &RangeSpec,
    dry_run: bool,
    cancel: &watch::Receiver<bool>,
) -> (bool, Stats) {
    let stats_name = format!("range_{}", range.id_range);
    let mut stats = Stats::new(&stats_name);
    ctx.monitor.add_timer(&stats_name, "started");
    stats.checkpoint("started");

    info!("running iterators");
    ctx.monitor.add_timer(&stats_name, "iterator");
    stats.checkpoint("iterator");
    let (local, remotes) = match run_iterators(ctx, client, range, &mut stats).await {
        Ok(v) => v,
        Err(e) => {
            error!("iteration failed for: {}: {}", range.id_range, e);
            finish(ctx, &stats_name, &mut stats);
            return (true, stats);
        }
    };
    if *cancel.borrow() {
        finish(ctx, &stats_name, &mut stats);
        return (false, stats);
    }

    if remotes.is_empty() {
        warn!("iterator results are empty, skipping");
        finish(ctx, &stats_name, &mut stats);
        return (true, stats);
    }

    ctx.monitor.add_timer(&stats_name, "sort");
    stats.checkpoint("sort");
    let (local, remotes) =
        match sort_results(range, &ctx.monitor, local, remotes, &mut stats).await {
            Some(v) => v,
            None => {
                finish(ctx, &stats_name, &mut stats);
                return (false, stats);
            }
        };
    if *cancel.borrow() {
        finish(ctx, &stats_name, &mut stats);
        return (false, stats);
    }

    info!("computing diff local vs remotes");
    ctx.monitor.add_timer(&stats_name, "diff");
    stats.checkpoint("diff");
    let diffs = compute_diffs(ctx, range, &local, remotes, &mut stats);
    if diffs.is_empty() {
        warn!("diff results are empty, skipping");
        finish(ctx, &stats_name, &mut stats);
        return (true, stats);
    }
    if *cancel.borrow() {
        finish(ctx, &stats_name, &mut stats);
        return (false, stats);
    }

    info!("computing merge and splitting by node all remote results");
    ctx.monitor.add_timer(&stats_name, "merge and split");
    stats.checkpoint("merge and split");
    let plan = match IteratorResult::merge(&diffs, ctx.config.tmp_dir()) {
        Ok(p) => p,
        Err(e) => {
            error!("merge of {} failed: {}", range.id_range, e);
            finish(ctx, &stats_name, &mut stats);
            return (false, stats);
        }
    };
    if *cancel.borrow() {
        finish(ctx, &stats_name, &mut stats);
        return (false, stats);
    }

    ctx.monitor.add_timer(&stats_name, "recover");
    stats.checkpoint("recover");
    let mut result = true;
    if !dry_run {
        result = match executor::recover(ctx, client, &plan, &mut stats, cancel).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("recovery of {} failed: {}", range.id_range, e);
                false
            }
        };
    }
    finish(ctx, &stats_name, &mut stats);
    (result, stats)
}

fn finish(ctx: &Context, stats_name: &str, stats: &mut Stats) {
    stats.checkpoint("finished");
    ctx.monitor.add_timer(stats_name, "finished");
}

// Runs the local iterator and one iterator per remote group. A local
// failure abandons the whole range (Err); a failed or empty remote is
// dropped and the others proceed.
async fn run_iterators<C: StoreClient>(
    ctx: &Context,
    client: &C,
    range: &RangeSpec,
    stats: &mut Stats,
) -> Result<(Option<IteratorResult>, Vec<IteratorResult>), RecoveryError> {
    let timestamp_range = (ctx.config.timestamp(), Time::max_value());
    let key_ranges = [range.id_range];

    let local_replica = match range.replica(ctx.group_id) {
        Some(r) => r,
        None => {
            return Err(RecoveryError::new(
                RecoveryErrorCode::IllegalState,
                &format!(
                    "range {} has no replica in local group {}",
                    range.id_range, ctx.group_id
                ),
            ))
        }
    };
    debug!(
        "running local iterator on: {} on node: {}",
        range.id_range, local_replica.address
    );
    let local = client
        .start_iterator(IteratorSpec {
            eid: local_replica.eid,
            group_id: ctx.group_id,
            timestamp_range,
            key_ranges: &key_ranges,
            tmp_dir: ctx.config.tmp_dir(),
            address: &local_replica.address,
        })
        .await?;

    let local_len = local.as_ref().map(|c| c.len()).unwrap_or(0) as i64;
    stats.add(stats::LOCAL_RECORDS, local_len);
    ctx.monitor.add_counter(stats::LOCAL_RECORDS, local_len);
    stats.add(stats::ITERATED_KEYS, local_len);
    ctx.monitor.add_counter(stats::ITERATED_KEYS, local_len);
    stats.add(stats::ITERATIONS, 1);
    ctx.monitor.add_counter(stats::ITERATIONS, 1);
    debug!("local iterator obtained: {} record(s)", local_len);

    let mut remotes = Vec::new();
    for (group_id, replica) in &range.replicas {
        if *group_id == ctx.group_id {
            continue;
        }
        debug!(
            "running remote iterator on: {} on node: {}",
            range.id_range, replica.address
        );
        let it_result = match client
            .start_iterator(IteratorSpec {
                eid: replica.eid,
                group_id: *group_id,
                timestamp_range,
                key_ranges: &key_ranges,
                tmp_dir: ctx.config.tmp_dir(),
                address: &replica.address,
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    "remote iterator failed on {}: {}, skipping",
                    replica.address, e
                );
                continue;
            }
        };
        let it_result = match it_result {
            Some(r) if !r.is_empty() => r,
            _ => {
                warn!("remote iterator result is empty, skipping");
                continue;
            }
        };
        let remote_len = it_result.len() as i64;
        debug!("remote obtained: {} record(s)", remote_len);
        stats.add(stats::REMOTE_RECORDS, remote_len);
        ctx.monitor.add_counter(stats::REMOTE_RECORDS, remote_len);
        stats.add(stats::ITERATED_KEYS, remote_len);
        ctx.monitor.add_counter(stats::ITERATED_KEYS, remote_len);
        stats.add(stats::ITERATIONS, 1);
        ctx.monitor.add_counter(stats::ITERATIONS, 1);
        remotes.push(it_result);
    }

    Ok((local, remotes))
}

// Sorts the local and every remote container in place on the blocking
// pool. On failure the range is abandoned and the sort counts already
// added for this range are reversed.
async fn sort_results(
    range: &RangeSpec,
    monitor: &Monitor,
    local: Option<IteratorResult>,
    remotes: Vec<IteratorResult>,
    stats: &mut Stats,
) -> Option<(Option<IteratorResult>, Vec<IteratorResult>)> {
    if remotes.is_empty() {
        debug!("sort skipped, remote iterator results are empty");
        return Some((local, remotes));
    }
    let id_range = range.id_range;
    let mon = monitor.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut local = local;
        let mut remotes = remotes;
        let mut completed: i64 = 0;
        if let Some(l) = local.as_mut() {
            info!("processing sorting local range: {}", id_range);
            if let Err(e) = l.sort() {
                return (local, remotes, completed, Some(e));
            }
            completed += 1;
            mon.add_counter(stats::SORT, 1);
        }
        for r in remotes.iter_mut() {
            info!("processing sorting remote range: {}", r.id_range());
            if let Err(e) = r.sort() {
                return (local, remotes, completed, Some(e));
            }
            completed += 1;
            mon.add_counter(stats::SORT, 1);
        }
        (local, remotes, completed, None)
    })
    .await;

    match joined {
        Ok((local, remotes, completed, None)) => {
            stats.add(stats::SORT, completed);
            Some((local, remotes))
        }
        Ok((_, _, completed, Some(e))) => {
            error!("sort of {} failed: {}", id_range, e);
            monitor.add_counter(stats::SORT, -completed);
            None
        }
        Err(e) => {
            error!("sort of {} failed: {}", id_range, e);
            None
        }
    }
}

// Computes one diff per remote. Per-remote failures are logged and
// skipped; an empty local turns the whole remote container into the diff.
fn compute_diffs(
    ctx: &Context,
    range: &RangeSpec,
    local: &Option<IteratorResult>,
    remotes: Vec<IteratorResult>,
    stats: &mut Stats,
) -> Vec<IteratorResult> {
    let mut diffs = Vec::new();
    let mut total: u64 = 0;
    for r in remotes {
        if r.is_empty() {
            info!("remote container is empty, skipping");
            continue;
        }
        let result = match local {
            Some(l) if !l.is_empty() => {
                info!("computing differences for: {}", range.id_range);
                match l.diff(&r) {
                    Ok(d) => d,
                    Err(e) => {
                        error!("diff of {} failed: {}", range.id_range, e);
                        continue;
                    }
                }
            }
            _ => {
                info!(
                    "local container is empty, recovering full range: {}",
                    range.id_range
                );
                r
            }
        };
        if result.is_empty() {
            info!("resulting diff is empty, skipping");
            continue;
        }
        let len = result.len();
        stats.add(stats::DIFFS, len as i64);
        ctx.monitor.add_counter(stats::DIFFS, len as i64);
        total += len;
        diffs.push(result);
    }
    info!("found {} differences with remote nodes", total);
    diffs
}
