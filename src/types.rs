//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::collections::BTreeMap;
use std::fmt;
use std::result::Result;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{ia_err, RecoveryError};

/// Width in bytes of a store key. Keys are content addresses: opaque,
/// fixed-width identifiers compared as big-endian byte strings.
pub const KEY_LEN: usize = 64;

/// An opaque fixed-width key identifying one record in the keyspace.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Key {
        Key(bytes)
    }

    /// Build a key from up to [`KEY_LEN`] bytes; shorter input is
    /// zero-padded on the right, the way route ids are published.
    pub fn from_slice(bytes: &[u8]) -> Result<Key, RecoveryError> {
        if bytes.len() > KEY_LEN {
            return ia_err!("key length {} exceeds {} bytes", bytes.len(), KEY_LEN);
        }
        let mut buf = [0u8; KEY_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Key(buf))
    }

    pub fn from_hex(s: &str) -> Result<Key, RecoveryError> {
        if s.len() % 2 != 0 || s.len() > KEY_LEN * 2 {
            return ia_err!("invalid key hex string '{}'", s);
        }
        let mut buf = [0u8; KEY_LEN];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = match std::str::from_utf8(chunk) {
                Ok(p) => p,
                Err(_) => return ia_err!("invalid key hex string '{}'", s),
            };
            buf[i] = match u8::from_str_radix(pair, 16) {
                Ok(b) => b,
                Err(_) => return ia_err!("invalid key hex string '{}'", s),
            };
        }
        Ok(Key(buf))
    }

    pub fn min_value() -> Key {
        Key([0u8; KEY_LEN])
    }

    pub fn max_value() -> Key {
        Key([0xffu8; KEY_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for Key {
    // keys are long; print an abbreviated prefix, enough to eyeball logs
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0[..6] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "...")
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

/// Store-provided record modification time, seconds + nanoseconds since
/// the epoch. Ordering is `(tsec, tnsec)`; newer means strictly greater.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Time {
    pub tsec: u64,
    pub tnsec: u32,
}

impl Time {
    pub fn new(tsec: u64, tnsec: u32) -> Time {
        Time { tsec, tnsec }
    }

    /// Parse whole epoch seconds, the format the operator passes for the
    /// recovery timestamp floor.
    pub fn from_epoch(secs: &str) -> Result<Time, RecoveryError> {
        match secs.parse::<u64>() {
            Ok(s) => Ok(Time { tsec: s, tnsec: 0 }),
            Err(_) => ia_err!("can't parse timestamp: '{}'", secs),
        }
    }

    /// Upper bound used for iterator time ranges.
    pub fn max_value() -> Time {
        Time {
            tsec: u64::MAX,
            tnsec: u32::MAX,
        }
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.tsec as i64, self.tnsec).single()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}.{:09}", self.tsec, self.tnsec),
        }
    }
}

/// Transport endpoint of one store node, `host:port:family`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Address {
    pub host: String,
    pub port: u16,
    pub family: u32,
}

impl Address {
    /// Parse the `host:port:family` form used throughout the store
    /// tooling, e.g. `"127.0.0.1:1025:2"`.
    pub fn from_host_port_family(s: &str) -> Result<Address, RecoveryError> {
        let mut parts = s.rsplitn(3, ':');
        let family = parts.next();
        let port = parts.next();
        let host = parts.next();
        match (host, port, family) {
            (Some(h), Some(p), Some(f)) if !h.is_empty() => {
                let port = match p.parse::<u16>() {
                    Ok(v) => v,
                    Err(_) => return ia_err!("can't parse port in '{}'", s),
                };
                let family = match f.parse::<u32>() {
                    Ok(v) => v,
                    Err(_) => return ia_err!("can't parse family in '{}'", s),
                };
                Ok(Address {
                    host: h.to_string(),
                    port,
                    family,
                })
            }
            _ => ia_err!("can't parse host:port:family: '{}'", s),
        }
    }
}

impl FromStr for Address {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_host_port_family(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.family)
    }
}

/// Identifier of a replication group. Every group holds a full copy of the
/// keyspace, partitioned across its nodes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Endpoint id directing an iterator request to the right node within a
/// group.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Eid(pub Key);

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous half-open `[start, end)` slice of the keyspace.
///
/// `end == Key::max_value()` closes the keyspace; that last sliver of ids
/// is included by [`IdRange::contains`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct IdRange {
    pub start: Key,
    pub end: Key,
}

impl IdRange {
    pub fn new(start: Key, end: Key) -> IdRange {
        IdRange { start, end }
    }

    pub fn contains(&self, key: &Key) -> bool {
        if self.end == Key::max_value() {
            return *key >= self.start;
        }
        *key >= self.start && *key < self.end
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Metadata of one replicated record, without its payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RecordMeta {
    pub key: Key,
    pub timestamp: Time,
    pub user_flags: u64,
    pub size: u64,
}

/// One fixed-layout entry in an iterator result container: record metadata
/// plus the group the record was iterated from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ContainerRecord {
    pub meta: RecordMeta,
    pub group_id: GroupId,
}

impl ContainerRecord {
    /// Container sort order: key ascending, then newest timestamp first,
    /// so the first record seen for a key is the freshest copy.
    pub fn sort_cmp(&self, other: &ContainerRecord) -> std::cmp::Ordering {
        self.meta
            .key
            .cmp(&other.meta.key)
            .then(other.meta.timestamp.cmp(&self.meta.timestamp))
    }
}

/// A record materialized by a bulk read: metadata plus payload bytes.
#[derive(Clone, Debug)]
pub struct ReadRecord {
    pub meta: RecordMeta,
    pub data: Bytes,
}

/// One replica of a range inside a particular group.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Replica {
    pub eid: Eid,
    pub address: Address,
}

/// A keyspace range together with the node holding it in every
/// participating group.
///
/// Invariant: the local group id appears in `replicas` for every range the
/// pool driver hands to a worker.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RangeSpec {
    pub id_range: IdRange,
    pub replicas: BTreeMap<GroupId, Replica>,
}

impl RangeSpec {
    pub fn replica(&self, group_id: GroupId) -> Option<&Replica> {
        self.replicas.get(&group_id)
    }
}
