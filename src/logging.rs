//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::result::Result;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::{cfg_err, RecoveryError};

/// Install a global `tracing` subscriber from the run's [`LogConfig`].
///
/// `RUST_LOG` in the environment overrides the configured level.
/// Applications that already manage their own subscriber simply skip this
/// call; installing a second subscriber is reported as a configuration
/// error.
pub fn init(cfg: &LogConfig) -> Result<(), RecoveryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match EnvFilter::try_new(&cfg.level) {
            Ok(f) => f,
            Err(e) => return cfg_err!("invalid log level '{}': {}", cfg.level, e),
        },
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .compact();
    let res = match &cfg.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    crate::error::ia_error!("can't open log file {}: {}", path.display(), e)
                })?;
            builder.with_writer(Arc::new(file)).try_init()
        }
        None => builder.try_init(),
    };
    match res {
        Ok(()) => Ok(()),
        Err(e) => cfg_err!("can't install tracing subscriber: {}", e),
    }
}
