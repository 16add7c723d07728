//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::result::Result;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{Config, StatMode};
use crate::error::{RecoveryError, RecoveryErrorCode};
use crate::reconciler;
use crate::routes::RouteTable;
use crate::stats::Monitor;
use crate::store::StoreClient;
use crate::types::{GroupId, RangeSpec};

// Per-run state shared read-only with every worker. Workers get it by
// explicit Arc, never through a process global.
pub(crate) struct Context {
    pub(crate) config: Config,
    pub(crate) group_id: GroupId,
    pub(crate) monitor: Monitor,
}

/// **The cross-datacenter recovery engine.**
///
/// Reconciles the replica group pinned to the configured local address
/// with its peer groups: every key present on any peer with a timestamp at
/// or above the configured floor ends up on the local replica, newest copy
/// winning. Ranges are processed concurrently on a worker pool; the whole
/// run is driven by one call to [`DcRecovery::run`].
///
/// Note: there is no need to enclose this struct in an `Rc` or [`Arc`], as
/// it uses an [`Arc`] internally, so calling `.clone()` on this struct
/// will always return the same underlying engine.
pub struct DcRecovery<C: StoreClient> {
    inner: Arc<EngineRef<C>>,
}

impl<C: StoreClient> Clone for DcRecovery<C> {
    // clone shares the inner engine; C itself need not be Clone
    fn clone(&self) -> Self {
        DcRecovery {
            inner: self.inner.clone(),
        }
    }
}

struct EngineRef<C: StoreClient> {
    config: Config,
    client: C,
    routes: RouteTable,
    monitor: Monitor,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

/// Handle used to cancel a running recovery from outside, equivalent to an
/// operator interrupt.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request orderly shutdown: dispatch stops and in-flight range work
    /// aborts at its next suspension point.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The outcome of one recovery run.
#[derive(Debug)]
pub struct RunReport {
    ok: bool,
    interrupted: bool,
    stat: StatMode,
    monitor: Monitor,
}

impl RunReport {
    /// Overall success: the logical AND of every per-range result. False
    /// if any range reported failures or the operator cancelled.
    pub fn ok(&self) -> bool {
        self.ok
    }

    /// True when the run was cut short by an operator interrupt.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// The stats sink the run fed; counters stay readable after the run.
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Render the statistics in the configured output format. `None` when
    /// the run was configured with `stat = none`.
    pub fn render_stats(&self) -> Option<String> {
        match self.stat {
            StatMode::None => None,
            StatMode::Text => Some(self.monitor.render_text()),
        }
    }
}

impl<C: StoreClient> DcRecovery<C> {
    /// Create an engine over a validated [`Config`], a store client and a
    /// routing table snapshot.
    pub fn new(config: Config, client: C, routes: RouteTable) -> DcRecovery<C> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        DcRecovery {
            inner: Arc::new(EngineRef {
                config,
                client,
                routes,
                monitor: Monitor::new(),
                cancel_tx: Arc::new(cancel_tx),
                cancel_rx,
            }),
        }
    }

    /// The engine's stats sink, readable at any time.
    pub fn monitor(&self) -> &Monitor {
        &self.inner.monitor
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.inner.cancel_tx.clone(),
        }
    }

    /// Run the recovery to completion (or interruption).
    ///
    /// Fatal configuration/routing conditions return `Err` before any
    /// worker starts; everything after that is reported through the
    /// [`RunReport`], per-range failures included.
    pub async fn run(&self) -> Result<RunReport, RecoveryError> {
        let inner = &self.inner;
        let monitor = inner.monitor.clone();
        monitor.add_timer("main", "started");

        debug!("groups: {:?}", inner.config.groups());

        let group_id = match inner.routes.group_of(inner.config.address()) {
            Some(g) => g,
            None => {
                monitor.add_timer("main", "finished");
                return Err(RecoveryError::new(
                    RecoveryErrorCode::Routing,
                    &format!(
                        "local address {} not found in routing table",
                        inner.config.address()
                    ),
                ));
            }
        };

        info!("searching for ranges that {} store", inner.config.address());
        let mut ranges = inner
            .routes
            .ranges_by_address(inner.config.address(), inner.config.groups());
        // the invariant every worker relies on: the local group is mapped
        ranges.retain(|r| {
            if r.replicas.contains_key(&group_id) {
                return true;
            }
            error!(
                "dropping range {}: no replica in local group {}",
                r.id_range, group_id
            );
            false
        });
        debug!("recovery ranges: {}", ranges.len());
        if ranges.is_empty() {
            warn!(
                "no ranges to recover for address {}",
                inner.config.address()
            );
            monitor.add_timer("main", "finished");
            return Ok(RunReport {
                ok: true,
                interrupted: false,
                stat: inner.config.stat(),
                monitor,
            });
        }

        let nworkers = inner.config.nprocess().min(ranges.len());
        debug!("created pool of workers: {}", nworkers);

        // operator interrupt converts into the same orderly shutdown the
        // ShutdownHandle triggers
        let mut signal_task = None;
        if inner.config.handle_signals {
            let tx = inner.cancel_tx.clone();
            signal_task = Some(tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    error!("caught interrupt, terminating");
                    let _ = tx.send(true);
                }
            }));
        }

        let ctx = Arc::new(Context {
            config: inner.config.clone(),
            group_id,
            monitor: monitor.clone(),
        });
        let queue: Arc<Mutex<Vec<RangeSpec>>> = Arc::new(Mutex::new(ranges));
        let dry_run = inner.config.dry_run();

        let mut workers = Vec::with_capacity(nworkers);
        for _ in 0..nworkers {
            let inner = self.inner.clone();
            let ctx = ctx.clone();
            let queue = queue.clone();
            let cancel = inner.cancel_rx.clone();
            workers.push(tokio::spawn(async move {
                let mut ok = true;
                loop {
                    if *cancel.borrow() {
                        break;
                    }
                    let range = {
                        let mut q = queue.lock().unwrap();
                        q.pop()
                    };
                    let range = match range {
                        Some(r) => r,
                        None => break,
                    };
                    let (res, stats) =
                        reconciler::process_range(&ctx, &inner.client, &range, dry_run, &cancel)
                            .await;
                    ctx.monitor.absorb(stats);
                    ok &= res;
                }
                ok
            }));
        }

        let joined = futures::future::join_all(workers).await;
        if let Some(t) = signal_task {
            t.abort();
        }

        let interrupted = *inner.cancel_rx.borrow();
        let mut ok = !interrupted;
        for res in joined {
            match res {
                Ok(worker_ok) => ok &= worker_ok,
                Err(e) => {
                    error!("worker failed: {}", e);
                    ok = false;
                }
            }
        }
        if interrupted {
            error!("recovery interrupted, terminated worker pool");
        } else {
            info!("closing pool, joining workers");
        }
        monitor.add_timer("main", "finished");
        Ok(RunReport {
            ok,
            interrupted,
            stat: inner.config.stat(),
            monitor,
        })
    }
}
