//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Cross-datacenter replica recovery engine
//!
//! This crate reconciles one replica group of a distributed
//! content-addressed key-value store with the copies held by its peer
//! groups. The keyspace is partitioned into contiguous id ranges, every
//! range replicated on one node per group; for each range owned by the
//! configured local node the engine iterates all replicas, sorts the
//! resulting key streams, computes per-remote diffs, merges them into a
//! per-source recovery plan and streams the recovery reads and writes in
//! bounded batches. Recovery is strictly additive: missing or stale keys
//! are pulled back and written through, newest timestamp winning; nothing
//! is ever deleted.
//!
//! The engine drives, the store talks: transport-level operations
//! (iterators, direct sessions, bulk reads, asynchronous writes) live
//! behind the [`StoreClient`]/[`StoreSession`] traits and are supplied by
//! the embedding application, as is the routing-table discovery that
//! produces the [`RouteTable`] snapshot.
//!
//! The general flow for an application:
//! - build a [`Config`] with [`Config::builder()`]
//! - create a [`DcRecovery`] from the config, a store client and a
//!   [`RouteTable`]
//! - call [`DcRecovery::run`] and inspect the returned [`RunReport`]
//!
//! ```no_run
//! use dc_recovery::{Config, DcRecovery, RouteTable};
//! # async fn run<C: dc_recovery::StoreClient>(client: C, routes: RouteTable)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder()
//!     .address("127.0.0.1:1025:2")?
//!     .groups(&[1, 2, 3])?
//!     .batch_size(1024)?
//!     .tmp_dir("/var/tmp")
//!     .nprocess(4)?
//!     .from_environment()?
//!     .build()?;
//! let engine = DcRecovery::new(config, client, routes);
//! let report = engine.run().await?;
//! if let Some(text) = report.render_stats() {
//!     println!("{}", text);
//! }
//! std::process::exit(if report.ok() { 0 } else { 1 });
//! # }
//! ```
//!
//! Concurrency model: ranges are reconciled in parallel on a pool of
//! `min(nprocess, ranges)` workers, each range sequentially end to end,
//! one bulk chunk outstanding per range. An operator interrupt (SIGINT, or
//! [`ShutdownHandle::shutdown`]) stops dispatch and aborts in-flight work
//! at the next suspension point; iterator spill files are removed with
//! their containers in every exit path.

pub(crate) mod config;
pub use crate::config::{Config, ConfigBuilder, LogConfig, StatMode};

pub(crate) mod engine;
pub use crate::engine::{DcRecovery, RunReport, ShutdownHandle};

pub(crate) mod error;
pub use crate::error::{RecoveryError, RecoveryErrorCode};

pub(crate) mod codec;

pub(crate) mod container;
pub use crate::container::{IteratorResult, Records};

#[cfg(test)]
pub(crate) mod codec_tests;

#[cfg(test)]
pub(crate) mod container_tests;

pub(crate) mod executor;

pub mod logging;

#[cfg(test)]
pub(crate) mod mock_store;

pub(crate) mod reconciler;


pub(crate) mod routes;
pub use crate::routes::{RouteEntry, RouteTable};


pub mod stats;
pub use crate::stats::{Monitor, Stats};

pub(crate) mod store;
pub use crate::store::{IteratorSpec, StoreClient, StoreSession, WriteFuture};

pub mod types;

#[cfg(test)]
pub(crate) mod types_tests;
