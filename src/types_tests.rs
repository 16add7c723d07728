//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::types::{Address, ContainerRecord, GroupId, IdRange, Key, RecordMeta, Time, KEY_LEN};
use std::error::Error;
use std::result::Result;

#[test]
fn test_address_parse() -> Result<(), Box<dyn Error>> {
    let a = Address::from_host_port_family("127.0.0.1:1025:2")?;
    assert_eq!(a.host, "127.0.0.1");
    assert_eq!(a.port, 1025);
    assert_eq!(a.family, 2);
    assert_eq!(a.to_string(), "127.0.0.1:1025:2");

    // hosts may contain colons (ipv6); the port and family are the last
    // two segments
    let b = Address::from_host_port_family("::1:1025:10")?;
    assert_eq!(b.host, "::1");
    assert_eq!(b.port, 1025);
    assert_eq!(b.family, 10);

    assert!(Address::from_host_port_family("localhost").is_err());
    assert!(Address::from_host_port_family("localhost:badport:2").is_err());
    assert!(Address::from_host_port_family(":1025:2").is_err());
    Ok(())
}

#[test]
fn test_address_ordering() -> Result<(), Box<dyn Error>> {
    let a = Address::from_host_port_family("hosta:1025:2")?;
    let b = Address::from_host_port_family("hostb:1025:2")?;
    let a2 = Address::from_host_port_family("hosta:1026:2")?;
    assert!(a < b);
    assert!(a < a2);
    Ok(())
}

#[test]
fn test_key_ordering_and_hex() -> Result<(), Box<dyn Error>> {
    assert!(Key::min_value() < Key::max_value());
    let k1 = Key::from_slice(&[1, 2, 3])?;
    let k2 = Key::from_slice(&[1, 2, 4])?;
    assert!(k1 < k2);

    let h = Key::from_hex("0102ff")?;
    assert_eq!(&h.as_bytes()[..3], &[0x01, 0x02, 0xff]);
    assert_eq!(&h.as_bytes()[3..], &[0u8; KEY_LEN - 3]);
    assert!(Key::from_hex("0zz0").is_err());
    assert!(Key::from_hex("012").is_err());
    assert!(Key::from_slice(&[0u8; KEY_LEN + 1]).is_err());
    Ok(())
}

#[test]
fn test_time_ordering() {
    assert!(Time::new(5, 0) > Time::new(4, 999_999_999));
    assert!(Time::new(5, 1) > Time::new(5, 0));
    assert_eq!(Time::from_epoch("120").unwrap(), Time::new(120, 0));
    assert!(Time::from_epoch("12 monkeys").is_err());
    assert!(Time::max_value() > Time::new(u64::MAX, 0));
}

#[test]
fn test_id_range_contains() -> Result<(), Box<dyn Error>> {
    let lo = Key::from_slice(&[10])?;
    let hi = Key::from_slice(&[20])?;
    let range = IdRange::new(lo, hi);
    assert!(range.contains(&Key::from_slice(&[10])?));
    assert!(range.contains(&Key::from_slice(&[15, 0xff])?));
    assert!(!range.contains(&Key::from_slice(&[20])?));
    assert!(!range.contains(&Key::from_slice(&[9, 0xff])?));

    // a range closing the keyspace includes the max key itself
    let tail = IdRange::new(hi, Key::max_value());
    assert!(tail.contains(&Key::max_value()));
    Ok(())
}

#[test]
fn test_container_record_sort_order() -> Result<(), Box<dyn Error>> {
    let rec = |key: u8, tsec: u64| ContainerRecord {
        meta: RecordMeta {
            key: Key::from_slice(&[key]).unwrap(),
            timestamp: Time::new(tsec, 0),
            user_flags: 0,
            size: 0,
        },
        group_id: GroupId(1),
    };
    // key ascending first
    assert!(rec(1, 5).sort_cmp(&rec(2, 50)).is_lt());
    // same key: newest timestamp first
    assert!(rec(1, 50).sort_cmp(&rec(1, 5)).is_lt());
    assert!(rec(1, 5).sort_cmp(&rec(1, 5)).is_eq());
    Ok(())
}
