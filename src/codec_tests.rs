//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::codec::{decode_record, encode_record, RecordReader, RecordWriter, RECORD_LEN};
use crate::error::RecoveryErrorCode;
use crate::types::{ContainerRecord, GroupId, Key, RecordMeta, Time};
use std::error::Error;
use std::io::Write;
use std::result::Result;

fn record(first_byte: u8, tsec: u64, flags: u64, size: u64, group: u32) -> ContainerRecord {
    let mut key = [0u8; crate::types::KEY_LEN];
    key[0] = first_byte;
    ContainerRecord {
        meta: RecordMeta {
            key: Key::from_bytes(key),
            timestamp: Time::new(tsec, 500),
            user_flags: flags,
            size,
        },
        group_id: GroupId(group),
    }
}

#[test]
fn test_record_encode_decode() {
    let recs = [
        record(0, 0, 0, 0, 0),
        record(1, 1234567, 98765432198765, 4096, 2),
        record(0xff, u64::MAX, u64::MAX, u64::MAX, u32::MAX),
    ];
    for rec in &recs {
        let mut buf = [0u8; RECORD_LEN];
        encode_record(rec, &mut buf);
        assert_eq!(decode_record(&buf), *rec);
    }
}

#[test]
fn test_file_rw() -> Result<(), Box<dyn Error>> {
    let file = tempfile::tempfile()?;
    let mut writer = RecordWriter::new(file.try_clone()?);
    let recs: Vec<ContainerRecord> = (0u8..100)
        .map(|i| record(i, i as u64 * 10, i as u64, i as u64 * 3, 1))
        .collect();
    for rec in &recs {
        writer.write_record(rec)?;
    }
    writer.finish()?;

    let mut read_side = file.try_clone()?;
    use std::io::Seek;
    read_side.rewind()?;
    let mut reader = RecordReader::new(read_side);
    for rec in &recs {
        assert_eq!(reader.read_record()?, Some(*rec));
    }
    assert_eq!(reader.read_record()?, None);
    Ok(())
}

#[test]
fn test_truncated_record() -> Result<(), Box<dyn Error>> {
    let mut file = tempfile::tempfile()?;
    let mut buf = [0u8; RECORD_LEN];
    encode_record(&record(7, 7, 7, 7, 7), &mut buf);
    // a record and a half: the trailing half must be reported as corruption
    file.write_all(&buf)?;
    file.write_all(&buf[..RECORD_LEN / 2])?;
    use std::io::Seek;
    file.rewind()?;

    let mut reader = RecordReader::new(file);
    assert!(reader.read_record()?.is_some());
    let err = reader.read_record().unwrap_err();
    assert_eq!(err.code, RecoveryErrorCode::CorruptContainer);
    Ok(())
}
