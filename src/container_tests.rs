//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::container::IteratorResult;
use crate::types::{Address, ContainerRecord, Eid, GroupId, IdRange, Key, RecordMeta, Time};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::error::Error;
use std::result::Result;
use tempfile::TempDir;

fn whole_keyspace() -> IdRange {
    IdRange::new(Key::min_value(), Key::max_value())
}

fn addr(port: u16) -> Address {
    Address::from_host_port_family(&format!("127.0.0.1:{}:2", port)).unwrap()
}

fn rec(key: &[u8], tsec: u64, group: u32) -> ContainerRecord {
    ContainerRecord {
        meta: RecordMeta {
            key: Key::from_slice(key).unwrap(),
            timestamp: Time::new(tsec, 0),
            user_flags: 0,
            size: 100,
        },
        group_id: GroupId(group),
    }
}

fn container(
    tmp: &TempDir,
    group: u32,
    port: u16,
    recs: &[ContainerRecord],
) -> Result<IteratorResult, Box<dyn Error>> {
    let mut c = IteratorResult::create(
        tmp.path(),
        whole_keyspace(),
        GroupId(group),
        Eid(Key::min_value()),
        addr(port),
    )?;
    for r in recs {
        c.push(r)?;
    }
    c.seal()?;
    Ok(c)
}

fn collect(c: &IteratorResult) -> Result<Vec<ContainerRecord>, Box<dyn Error>> {
    let mut out = Vec::new();
    let mut records = c.records()?;
    while let Some(r) = records.next_record()? {
        out.push(r);
    }
    Ok(out)
}

#[test]
fn test_push_len_iterate() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let recs = [rec(&[3], 1, 1), rec(&[1], 2, 1), rec(&[2], 3, 1)];
    let c = container(&tmp, 1, 1025, &recs)?;
    assert_eq!(c.len(), 3);
    // file order before sorting
    assert_eq!(collect(&c)?, recs.to_vec());
    Ok(())
}

#[test]
fn test_sort_orders_keys_and_timestamps() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let mut c = container(
        &tmp,
        1,
        1025,
        &[
            rec(&[3], 1, 1),
            rec(&[1], 2, 1),
            rec(&[1], 9, 1),
            rec(&[2], 3, 1),
            rec(&[1], 4, 1),
        ],
    )?;
    c.sort()?;
    let sorted = collect(&c)?;
    assert_eq!(sorted.len(), 5);
    // keys ascending, and within key 1 the newest timestamp leads
    assert_eq!(sorted[0], rec(&[1], 9, 1));
    assert_eq!(sorted[1], rec(&[1], 4, 1));
    assert_eq!(sorted[2], rec(&[1], 2, 1));
    assert_eq!(sorted[3], rec(&[2], 3, 1));
    assert_eq!(sorted[4], rec(&[3], 1, 1));
    Ok(())
}

#[test]
fn test_external_sort_large_container() -> Result<(), Box<dyn Error>> {
    // enough records to force several sorted runs plus the k-way merge
    let tmp = TempDir::new()?;
    let mut rng = StdRng::seed_from_u64(7);
    let mut c = IteratorResult::create(
        tmp.path(),
        whole_keyspace(),
        GroupId(1),
        Eid(Key::min_value()),
        addr(1025),
    )?;
    const N: usize = 150_000;
    for _ in 0..N {
        let raw: [u8; 8] = rng.gen();
        c.push(&rec(&raw, rng.gen_range(0..1000), 1))?;
    }
    c.seal()?;
    c.sort()?;
    assert_eq!(c.len(), N as u64);

    let mut records = c.records()?;
    let mut count = 0usize;
    let mut prev: Option<ContainerRecord> = None;
    while let Some(r) = records.next_record()? {
        if let Some(p) = &prev {
            assert!(p.sort_cmp(&r).is_le(), "records out of order after sort");
        }
        prev = Some(r);
        count += 1;
    }
    assert_eq!(count, N);
    Ok(())
}

#[test]
fn test_diff_missing_and_stale_keys() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let mut local = container(&tmp, 1, 1025, &[rec(&[1], 10, 1), rec(&[2], 5, 1)])?;
    let mut remote = container(
        &tmp,
        2,
        1026,
        &[rec(&[1], 5, 2), rec(&[2], 9, 2), rec(&[3], 7, 2)],
    )?;
    local.sort()?;
    remote.sort()?;

    let diff = local.diff(&remote)?;
    assert_eq!(diff.group_id(), GroupId(2));
    assert_eq!(*diff.address(), addr(1026));
    let recs = collect(&diff)?;
    // key 1 is older remotely (skipped); key 2 newer; key 3 missing
    assert_eq!(recs, vec![rec(&[2], 9, 2), rec(&[3], 7, 2)]);
    Ok(())
}

#[test]
fn test_diff_equal_timestamps_not_pulled() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let mut local = container(&tmp, 1, 1025, &[rec(&[1], 10, 1)])?;
    let mut remote = container(&tmp, 2, 1026, &[rec(&[1], 10, 2)])?;
    local.sort()?;
    remote.sort()?;
    let diff = local.diff(&remote)?;
    assert!(diff.is_empty());
    Ok(())
}

#[test]
fn test_diff_range_mismatch() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let local = container(&tmp, 1, 1025, &[])?;
    let mut other = IteratorResult::create(
        tmp.path(),
        IdRange::new(Key::min_value(), Key::from_slice(&[8])?),
        GroupId(2),
        Eid(Key::min_value()),
        addr(1026),
    )?;
    other.seal()?;
    assert!(local.diff(&other).is_err());
    Ok(())
}

#[test]
fn test_merge_routes_each_key_to_one_source() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let mut b = container(&tmp, 2, 1026, &[rec(&[1], 5, 2), rec(&[2], 3, 2)])?;
    let mut c = container(&tmp, 3, 1027, &[rec(&[1], 3, 3), rec(&[3], 4, 3)])?;
    b.sort()?;
    c.sort()?;

    let plan = IteratorResult::merge(&[b, c], tmp.path())?;
    assert_eq!(plan.len(), 2);

    // buckets come back in address order: 1026 then 1027
    assert_eq!(*plan[0].address(), addr(1026));
    assert_eq!(collect(&plan[0])?, vec![rec(&[1], 5, 2), rec(&[2], 3, 2)]);
    assert_eq!(*plan[1].address(), addr(1027));
    assert_eq!(collect(&plan[1])?, vec![rec(&[3], 4, 3)]);

    // each key appears in exactly one bucket
    let mut seen = std::collections::BTreeSet::new();
    for bucket in &plan {
        for r in collect(bucket)? {
            assert!(seen.insert(r.meta.key), "key routed to two sources");
        }
    }
    Ok(())
}

#[test]
fn test_merge_timestamp_tie_breaks_by_address() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let mut b = container(&tmp, 2, 1026, &[rec(&[1], 5, 2)])?;
    let mut c = container(&tmp, 3, 1027, &[rec(&[1], 5, 3)])?;
    b.sort()?;
    c.sort()?;

    // pass the higher address first: the tie must still go to 1026
    let plan = IteratorResult::merge(&[c, b], tmp.path())?;
    assert_eq!(plan.len(), 1);
    assert_eq!(*plan[0].address(), addr(1026));
    assert_eq!(plan[0].len(), 1);
    Ok(())
}

#[test]
fn test_temp_files_removed_on_drop() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    {
        let mut c = container(&tmp, 1, 1025, &[rec(&[1], 1, 1), rec(&[2], 2, 1)])?;
        c.sort()?;
        assert!(std::fs::read_dir(tmp.path())?.next().is_some());
    }
    assert!(std::fs::read_dir(tmp.path())?.next().is_none());
    Ok(())
}
