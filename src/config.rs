//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Builder for the per-run recovery [`Config`]
//!

use std::env;
use std::path::{Path, PathBuf};
use std::result::Result;

use serde_derive::Deserialize;
use tracing::info;

use crate::error::{cfg_err, ia_err, RecoveryError};
use crate::types::{Address, GroupId, Time};

/// Statistics output format.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatMode {
    /// Emit nothing.
    None,
    /// Human-readable dump of all named counters and timers.
    #[default]
    Text,
}

impl StatMode {
    pub fn from_name(s: &str) -> Result<StatMode, RecoveryError> {
        match s {
            "none" => Ok(StatMode::None),
            "text" => Ok(StatMode::Text),
            _ => ia_err!("unknown stats output format: '{}', allowed: none/text", s),
        }
    }
}

/// Log destination and verbosity, consumed by [`crate::logging::init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log file; `None` logs to stderr.
    pub file: Option<PathBuf>,
    /// A `tracing` filter directive, e.g. `"info"` or `"dc_recovery=debug"`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            file: None,
            level: "info".to_string(),
        }
    }
}

/// Immutable per-run configuration, broadcast read-only to workers.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) address: Address,
    pub(crate) groups: Vec<GroupId>,
    pub(crate) timestamp: Time,
    pub(crate) batch_size: usize,
    pub(crate) tmp_dir: PathBuf,
    pub(crate) nprocess: usize,
    pub(crate) dry_run: bool,
    pub(crate) stat: StatMode,
    pub(crate) log: LogConfig,
    pub(crate) handle_signals: bool,
}

impl Config {
    /// Create a new [`ConfigBuilder`].
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    pub fn timestamp(&self) -> Time {
        self.timestamp
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn nprocess(&self) -> usize {
        self.nprocess
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn stat(&self) -> StatMode {
        self.stat
    }

    pub fn log(&self) -> &LogConfig {
        &self.log
    }
}

// File-based configuration, all fields optional; anything set in code
// afterwards overrides the file.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    remote: Option<String>,
    groups: Option<String>,
    timestamp: Option<String>,
    batch_size: Option<usize>,
    tmp_dir: Option<String>,
    nprocess: Option<usize>,
    dry_run: Option<bool>,
    stat: Option<String>,
    log: Option<String>,
    log_level: Option<String>,
}

/// Builder used to set all the parameters of a recovery run.
///
/// Setters validate their input at the call site and return
/// `Result<Self, RecoveryError>`; later calls override earlier ones, so
/// defaults can be set first and then overridden by, for example,
/// [`ConfigBuilder::from_environment()`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    address: Option<Address>,
    groups: Vec<GroupId>,
    timestamp: Time,
    batch_size: Option<usize>,
    tmp_dir: Option<PathBuf>,
    nprocess: Option<usize>,
    dry_run: bool,
    stat: StatMode,
    log: LogConfig,
    handle_signals: Option<bool>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder {
            ..Default::default()
        }
    }

    /// The local node: `host:port:family`. Recovery pulls keys *to* the
    /// replica at this address.
    pub fn address(mut self, s: &str) -> Result<Self, RecoveryError> {
        self.address = Some(Address::from_host_port_family(s)?);
        Ok(self)
    }

    /// Participating replication groups.
    pub fn groups(mut self, groups: &[u32]) -> Result<Self, RecoveryError> {
        if groups.is_empty() {
            return ia_err!("group list is empty");
        }
        self.groups = groups.iter().map(|g| GroupId(*g)).collect();
        Ok(self)
    }

    /// Comma separated group list, e.g. `"1,2,3"`.
    pub fn groups_from_str(mut self, s: &str) -> Result<Self, RecoveryError> {
        let mut groups = Vec::new();
        for part in s.split(',') {
            match part.trim().parse::<u32>() {
                Ok(g) => groups.push(GroupId(g)),
                Err(_) => return ia_err!("can't parse group list: '{}'", s),
            }
        }
        if groups.is_empty() {
            return ia_err!("group list is empty");
        }
        self.groups = groups;
        Ok(self)
    }

    /// Only records created or modified at or after this time are
    /// considered for recovery. Defaults to the epoch.
    pub fn timestamp(mut self, t: Time) -> Self {
        self.timestamp = t;
        self
    }

    /// Timestamp floor from whole epoch seconds.
    pub fn timestamp_from_epoch(mut self, secs: &str) -> Result<Self, RecoveryError> {
        self.timestamp = Time::from_epoch(secs)?;
        Ok(self)
    }

    /// Number of keys per bulk read/bulk write batch. Default 1024.
    pub fn batch_size(mut self, n: usize) -> Result<Self, RecoveryError> {
        if n == 0 {
            return ia_err!("batch size must be at least 1");
        }
        self.batch_size = Some(n);
        Ok(self)
    }

    /// Temporary directory for iterator results. Default `/var/tmp`.
    pub fn tmp_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.tmp_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Number of concurrent range workers. Default 1; the pool never
    /// exceeds the number of ranges to recover.
    pub fn nprocess(mut self, n: usize) -> Result<Self, RecoveryError> {
        if n == 0 {
            return ia_err!("nprocess must be at least 1");
        }
        self.nprocess = Some(n);
        Ok(self)
    }

    /// Compute and count diffs but perform no recovery writes.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Statistics output format: `none` or `text`.
    pub fn stat(mut self, s: &str) -> Result<Self, RecoveryError> {
        self.stat = StatMode::from_name(s)?;
        Ok(self)
    }

    /// Log messages to this file instead of stderr.
    pub fn log_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.log.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Logging verbosity as a `tracing` filter directive.
    pub fn log_level(mut self, level: &str) -> Self {
        self.log.level = level.to_string();
        self
    }

    /// Whether [`run()`](crate::DcRecovery::run) installs its own SIGINT
    /// listener. Default true; embedders that manage signals themselves
    /// use the [`ShutdownHandle`](crate::ShutdownHandle) instead.
    pub fn handle_signals(mut self, on: bool) -> Self {
        self.handle_signals = Some(on);
        self
    }

    /// Gather configuration settings from the current environment.
    ///
    /// The following variables are used, each optional:
    ///
    /// | variable | description |
    /// | -------- | ----------- |
    /// | `DC_RECOVERY_REMOTE` | local node `host:port:family` |
    /// | `DC_RECOVERY_GROUPS` | comma separated group list |
    /// | `DC_RECOVERY_TIMESTAMP` | recover keys modified since (epoch seconds) |
    /// | `DC_RECOVERY_BATCH_SIZE` | keys per bulk batch |
    /// | `DC_RECOVERY_TMP_DIR` | temp directory for iterator results |
    /// | `DC_RECOVERY_NPROCESS` | number of range workers |
    /// | `DC_RECOVERY_DRY_RUN` | `true`/`false` |
    /// | `DC_RECOVERY_STAT` | `none`/`text` |
    /// | `DC_RECOVERY_LOG` | log file path |
    /// | `DC_RECOVERY_LOG_LEVEL` | `tracing` filter directive |
    pub fn from_environment(mut self) -> Result<Self, RecoveryError> {
        if let Ok(v) = env::var("DC_RECOVERY_REMOTE") {
            self = self.address(&v)?;
        }
        if let Ok(v) = env::var("DC_RECOVERY_GROUPS") {
            self = self.groups_from_str(&v)?;
        }
        if let Ok(v) = env::var("DC_RECOVERY_TIMESTAMP") {
            self = self.timestamp_from_epoch(&v)?;
        }
        if let Ok(v) = env::var("DC_RECOVERY_BATCH_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self = self.batch_size(n)?,
                Err(_) => return ia_err!("can't parse DC_RECOVERY_BATCH_SIZE: '{}'", v),
            }
        }
        if let Ok(v) = env::var("DC_RECOVERY_TMP_DIR") {
            self = self.tmp_dir(&v);
        }
        if let Ok(v) = env::var("DC_RECOVERY_NPROCESS") {
            match v.parse::<usize>() {
                Ok(n) => self = self.nprocess(n)?,
                Err(_) => return ia_err!("can't parse DC_RECOVERY_NPROCESS: '{}'", v),
            }
        }
        if let Ok(v) = env::var("DC_RECOVERY_DRY_RUN") {
            match v.parse::<bool>() {
                Ok(b) => self = self.dry_run(b),
                Err(_) => return ia_err!("can't parse DC_RECOVERY_DRY_RUN: '{}'", v),
            }
        }
        if let Ok(v) = env::var("DC_RECOVERY_STAT") {
            self = self.stat(&v)?;
        }
        if let Ok(v) = env::var("DC_RECOVERY_LOG") {
            self = self.log_file(&v);
        }
        if let Ok(v) = env::var("DC_RECOVERY_LOG_LEVEL") {
            self = self.log_level(&v);
        }
        Ok(self)
    }

    /// Read settings from a JSON config file; anything already set by
    /// later builder calls overrides the file contents.
    pub fn from_json_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, RecoveryError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::error::ia_error!("can't read config file {}: {}", path.as_ref().display(), e)
        })?;
        let file: ConfigFile = serde_json::from_str(&raw)?;
        if let Some(v) = file.remote {
            self = self.address(&v)?;
        }
        if let Some(v) = file.groups {
            self = self.groups_from_str(&v)?;
        }
        if let Some(v) = file.timestamp {
            self = self.timestamp_from_epoch(&v)?;
        }
        if let Some(v) = file.batch_size {
            self = self.batch_size(v)?;
        }
        if let Some(v) = file.tmp_dir {
            self = self.tmp_dir(v);
        }
        if let Some(v) = file.nprocess {
            self = self.nprocess(v)?;
        }
        if let Some(v) = file.dry_run {
            self = self.dry_run(v);
        }
        if let Some(v) = file.stat {
            self = self.stat(&v)?;
        }
        if let Some(v) = file.log {
            self = self.log_file(v);
        }
        if let Some(v) = file.log_level {
            self = self.log_level(&v);
        }
        Ok(self)
    }

    /// Validate the combined settings and produce the run [`Config`].
    ///
    /// Fails before any worker starts on a missing address, an empty
    /// group list, or a temp directory that is absent or not writable.
    pub fn build(self) -> Result<Config, RecoveryError> {
        let address = match self.address {
            Some(a) => a,
            None => return cfg_err!("no local address given: call ConfigBuilder::address()"),
        };
        if self.groups.is_empty() {
            return cfg_err!("no groups given: call ConfigBuilder::groups()");
        }
        let tmp_dir = self.tmp_dir.unwrap_or_else(|| PathBuf::from("/var/tmp"));
        if !tmp_dir.is_dir() {
            return cfg_err!("temp directory {} does not exist", tmp_dir.display());
        }
        // probe for write access the same way the iterators will use it
        if let Err(e) = tempfile::tempfile_in(&tmp_dir) {
            return cfg_err!("no write access to {}: {}", tmp_dir.display(), e);
        }
        let config = Config {
            address,
            groups: self.groups,
            timestamp: self.timestamp,
            batch_size: self.batch_size.unwrap_or(1024),
            tmp_dir,
            nprocess: self.nprocess.unwrap_or(1),
            dry_run: self.dry_run,
            stat: self.stat,
            log: self.log,
            handle_signals: self.handle_signals.unwrap_or(true),
        };
        info!(
            "using address: {}, groups: {:?}, batch_size: {}, nprocess: {}, tmp dir: {}",
            config.address,
            config.groups,
            config.batch_size,
            config.nprocess,
            config.tmp_dir.display()
        );
        Ok(config)
    }
}
