//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::result::Result;

use crate::error::{RecoveryError, RecoveryErrorCode};
use crate::types::{ContainerRecord, GroupId, Key, RecordMeta, Time, KEY_LEN};

// RecordWriter encodes container records into the fixed on-disk layout of
// iterator result files and writes them through a buffer. The layout is
// big-endian throughout:
//
//   key            KEY_LEN bytes
//   tsec           8 bytes
//   tnsec          4 bytes
//   user_flags     8 bytes
//   size           8 bytes
//   group_id       4 bytes
pub(crate) const RECORD_LEN: usize = KEY_LEN + 8 + 4 + 8 + 8 + 4;

pub(crate) fn encode_record(rec: &ContainerRecord, buf: &mut [u8; RECORD_LEN]) {
    let mut off = 0;
    buf[off..off + KEY_LEN].copy_from_slice(rec.meta.key.as_bytes());
    off += KEY_LEN;
    buf[off..off + 8].copy_from_slice(&rec.meta.timestamp.tsec.to_be_bytes());
    off += 8;
    buf[off..off + 4].copy_from_slice(&rec.meta.timestamp.tnsec.to_be_bytes());
    off += 4;
    buf[off..off + 8].copy_from_slice(&rec.meta.user_flags.to_be_bytes());
    off += 8;
    buf[off..off + 8].copy_from_slice(&rec.meta.size.to_be_bytes());
    off += 8;
    buf[off..off + 4].copy_from_slice(&rec.group_id.0.to_be_bytes());
}

pub(crate) fn decode_record(buf: &[u8; RECORD_LEN]) -> ContainerRecord {
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&buf[..KEY_LEN]);
    let mut off = KEY_LEN;
    let tsec = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
    off += 8;
    let tnsec = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
    off += 4;
    let user_flags = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
    off += 8;
    let size = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
    off += 8;
    let group_id = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
    ContainerRecord {
        meta: RecordMeta {
            key: Key::from_bytes(key),
            timestamp: Time::new(tsec, tnsec),
            user_flags,
            size,
        },
        group_id: GroupId(group_id),
    }
}

pub(crate) struct RecordWriter {
    w: BufWriter<File>,
}

impl RecordWriter {
    pub fn new(file: File) -> RecordWriter {
        RecordWriter {
            w: BufWriter::new(file),
        }
    }

    pub fn write_record(&mut self, rec: &ContainerRecord) -> Result<(), RecoveryError> {
        let mut buf = [0u8; RECORD_LEN];
        encode_record(rec, &mut buf);
        self.w.write_all(&buf)?;
        Ok(())
    }

    /// Flush buffered records and hand the file back for reading.
    pub fn finish(self) -> Result<File, RecoveryError> {
        match self.w.into_inner() {
            Ok(f) => Ok(f),
            Err(e) => Err(RecoveryError::from(e.into_error())),
        }
    }
}

// RecordReader decodes the byte stream written by RecordWriter. A short
// read in the middle of a record means the file was truncated or written
// by something else entirely; both surface as CorruptContainer and are
// fatal for the affected range.
pub(crate) struct RecordReader {
    r: BufReader<File>,
}

impl RecordReader {
    pub fn new(file: File) -> RecordReader {
        RecordReader {
            r: BufReader::new(file),
        }
    }

    /// Read the next record, or `None` at a clean end of file.
    pub fn read_record(&mut self) -> Result<Option<ContainerRecord>, RecoveryError> {
        let mut buf = [0u8; RECORD_LEN];
        let mut filled = 0;
        while filled < RECORD_LEN {
            let n = self.r.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < RECORD_LEN {
            return Err(RecoveryError::new(
                RecoveryErrorCode::CorruptContainer,
                &format!(
                    "truncated record: {} of {} bytes at end of container file",
                    filled, RECORD_LEN
                ),
            ));
        }
        Ok(Some(decode_record(&buf)))
    }
}
