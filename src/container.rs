//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::path::{Path, PathBuf};
use std::result::Result;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::codec::{RecordReader, RecordWriter};
use crate::error::{ia_err, RecoveryError, RecoveryErrorCode};
use crate::types::{Address, ContainerRecord, Eid, GroupId, IdRange};

// Number of records sorted in memory per run. Containers larger than one
// run are sorted externally: sorted run files plus a k-way merge.
const SORT_RUN_RECORDS: usize = 1 << 16;

/// An iterator result: an append-then-sort file of fixed-layout records
/// produced by iterating one replica over one key range.
///
/// The container is the sole owner of its temp file (created under the
/// run's temp directory, unique per worker per range); dropping the
/// container removes the file, on success, failure and cancellation alike.
/// `diff` and `merge` produce new containers; the originals stay valid
/// until the reconciler drops them at range end.
pub struct IteratorResult {
    file: NamedTempFile,
    writer: Option<RecordWriter>,
    tmp_dir: PathBuf,
    len: u64,
    id_range: IdRange,
    group_id: GroupId,
    eid: Eid,
    address: Address,
}

impl IteratorResult {
    /// Create an empty container under `tmp_dir`, tagged with the source
    /// replica it was (or will be) filled from.
    pub fn create(
        tmp_dir: &Path,
        id_range: IdRange,
        group_id: GroupId,
        eid: Eid,
        address: Address,
    ) -> Result<IteratorResult, RecoveryError> {
        let file = NamedTempFile::new_in(tmp_dir)?;
        let writer = RecordWriter::new(file.reopen()?);
        Ok(IteratorResult {
            file,
            writer: Some(writer),
            tmp_dir: tmp_dir.to_path_buf(),
            len: 0,
            id_range,
            group_id,
            eid,
            address,
        })
    }

    /// Count of records in the container.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn id_range(&self) -> IdRange {
        self.id_range
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn eid(&self) -> Eid {
        self.eid
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Append one record. Only valid before [`IteratorResult::seal`].
    pub fn push(&mut self, rec: &ContainerRecord) -> Result<(), RecoveryError> {
        match self.writer.as_mut() {
            Some(w) => {
                w.write_record(rec)?;
                self.len += 1;
                Ok(())
            }
            None => Err(RecoveryError::new(
                RecoveryErrorCode::IllegalState,
                "push into a sealed container",
            )),
        }
    }

    /// Flush appended records to disk and switch the container to the
    /// read side of its lifecycle. Idempotent.
    pub fn seal(&mut self) -> Result<(), RecoveryError> {
        if let Some(w) = self.writer.take() {
            w.finish()?;
        }
        Ok(())
    }

    /// Iterate records in file order; after [`IteratorResult::sort`] that
    /// is key order.
    pub fn records(&self) -> Result<Records, RecoveryError> {
        if self.writer.is_some() {
            return Err(RecoveryError::new(
                RecoveryErrorCode::IllegalState,
                "container must be sealed before reading",
            ));
        }
        Ok(Records {
            reader: RecordReader::new(self.file.reopen()?),
        })
    }

    /// Sort the container in place: key ascending, newer timestamp first
    /// within a key. External-sort-capable; the file may exceed memory.
    pub fn sort(&mut self) -> Result<(), RecoveryError> {
        self.seal()?;
        if self.len == 0 {
            return Ok(());
        }

        // Cut the file into sorted runs.
        let mut runs: Vec<NamedTempFile> = Vec::new();
        let mut reader = RecordReader::new(self.file.reopen()?);
        loop {
            let mut chunk: Vec<ContainerRecord> = Vec::with_capacity(4096);
            while chunk.len() < SORT_RUN_RECORDS {
                match reader.read_record()? {
                    Some(rec) => chunk.push(rec),
                    None => break,
                }
            }
            if chunk.is_empty() {
                break;
            }
            chunk.sort_unstable_by(|a, b| a.sort_cmp(b));
            let run = NamedTempFile::new_in(&self.tmp_dir)?;
            let mut w = RecordWriter::new(run.reopen()?);
            for rec in &chunk {
                w.write_record(rec)?;
            }
            w.finish()?;
            runs.push(run);
        }
        debug!(
            "sorting container for {}: {} record(s) in {} run(s)",
            self.id_range,
            self.len,
            runs.len()
        );

        // Merge the runs back into a fresh backing file.
        let out = NamedTempFile::new_in(&self.tmp_dir)?;
        let mut w = RecordWriter::new(out.reopen()?);
        let mut heap: BinaryHeap<RunEntry> = BinaryHeap::with_capacity(runs.len());
        let mut readers: Vec<RecordReader> = Vec::with_capacity(runs.len());
        for (src, run) in runs.iter().enumerate() {
            let mut r = RecordReader::new(run.reopen()?);
            if let Some(rec) = r.read_record()? {
                heap.push(RunEntry { rec, src });
            }
            readers.push(r);
        }
        while let Some(entry) = heap.pop() {
            w.write_record(&entry.rec)?;
            if let Some(rec) = readers[entry.src].read_record()? {
                heap.push(RunEntry { rec, src: entry.src });
            }
        }
        w.finish()?;
        self.file = out;
        Ok(())
    }

    /// Diff two sorted containers over the same id range: emit the records
    /// of `other` whose key is missing here, or present here only with an
    /// older timestamp. The output inherits `other`'s source metadata.
    pub fn diff(&self, other: &IteratorResult) -> Result<IteratorResult, RecoveryError> {
        if self.id_range != other.id_range {
            return ia_err!(
                "diff inputs cover different ranges: {} vs {}",
                self.id_range,
                other.id_range
            );
        }
        let mut out = IteratorResult::create(
            &other.tmp_dir,
            other.id_range,
            other.group_id,
            other.eid,
            other.address.clone(),
        )?;
        let mut local = NewestPerKey::new(self.records()?);
        let mut remote = NewestPerKey::new(other.records()?);
        let mut l = local.next_record()?;
        let mut r = remote.next_record()?;
        while let Some(rrec) = r {
            match &l {
                None => {
                    out.push(&rrec)?;
                    r = remote.next_record()?;
                }
                Some(lrec) => match lrec.meta.key.cmp(&rrec.meta.key) {
                    Ordering::Less => {
                        l = local.next_record()?;
                    }
                    Ordering::Greater => {
                        out.push(&rrec)?;
                        r = remote.next_record()?;
                    }
                    Ordering::Equal => {
                        if rrec.meta.timestamp > lrec.meta.timestamp {
                            out.push(&rrec)?;
                        }
                        l = local.next_record()?;
                        r = remote.next_record()?;
                    }
                },
            }
        }
        out.seal()?;
        Ok(out)
    }

    /// Merge per-remote diffs into the recovery plan: an N-way merge over
    /// key order where, for each key, the record with the greatest
    /// timestamp wins (ties broken by source address order) and is routed
    /// into the output bucket of the winning source. One sorted container
    /// per distinct source address comes back, in address order.
    pub fn merge(
        diffs: &[IteratorResult],
        tmp_dir: &Path,
    ) -> Result<Vec<IteratorResult>, RecoveryError> {
        let mut sources: Vec<&IteratorResult> = diffs.iter().collect();
        // stable winner selection: sources ordered by (address, group)
        sources.sort_by(|a, b| {
            a.address
                .cmp(&b.address)
                .then(a.group_id.cmp(&b.group_id))
        });

        let mut readers: Vec<NewestPerKey> = Vec::with_capacity(sources.len());
        let mut heap: BinaryHeap<RunEntry> = BinaryHeap::with_capacity(sources.len());
        for (src, d) in sources.iter().enumerate() {
            let mut r = NewestPerKey::new(d.records()?);
            if let Some(rec) = r.next_record()? {
                heap.push(RunEntry { rec, src });
            }
            readers.push(r);
        }

        let mut buckets: BTreeMap<Address, IteratorResult> = BTreeMap::new();
        let mut last_key = None;
        while let Some(entry) = heap.pop() {
            // the first record popped for a key is the winner; later ones
            // for the same key are stale copies from other sources
            if last_key != Some(entry.rec.meta.key) {
                last_key = Some(entry.rec.meta.key);
                let src = sources[entry.src];
                if !buckets.contains_key(&src.address) {
                    let bucket = IteratorResult::create(
                        tmp_dir,
                        src.id_range,
                        src.group_id,
                        src.eid,
                        src.address.clone(),
                    )?;
                    buckets.insert(src.address.clone(), bucket);
                }
                match buckets.get_mut(&src.address) {
                    Some(b) => b.push(&entry.rec)?,
                    None => {
                        return Err(RecoveryError::new(
                            RecoveryErrorCode::MergeFailed,
                            "merge bucket vanished",
                        ))
                    }
                }
            }
            if let Some(rec) = readers[entry.src].next_record()? {
                heap.push(RunEntry { rec, src: entry.src });
            }
        }

        let mut plan: Vec<IteratorResult> = Vec::with_capacity(buckets.len());
        for (_, mut bucket) in buckets {
            bucket.seal()?;
            plan.push(bucket);
        }
        Ok(plan)
    }
}

/// Streaming iteration over a container's records.
pub struct Records {
    reader: RecordReader,
}

impl Records {
    pub fn next_record(&mut self) -> Result<Option<ContainerRecord>, RecoveryError> {
        self.reader.read_record()
    }
}

impl Iterator for Records {
    type Item = Result<ContainerRecord, RecoveryError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

// Reads a sorted record stream, keeping only the first (newest) record of
// every key. Iterators can legitimately return several versions of a key;
// after sorting the freshest one leads.
struct NewestPerKey {
    inner: Records,
    last_key: Option<crate::types::Key>,
}

impl NewestPerKey {
    fn new(inner: Records) -> NewestPerKey {
        NewestPerKey {
            inner,
            last_key: None,
        }
    }

    fn next_record(&mut self) -> Result<Option<ContainerRecord>, RecoveryError> {
        while let Some(rec) = self.inner.next_record()? {
            if self.last_key == Some(rec.meta.key) {
                continue;
            }
            self.last_key = Some(rec.meta.key);
            return Ok(Some(rec));
        }
        Ok(None)
    }
}

// Heap entry for the k-way merges. BinaryHeap is a max-heap, so the
// ordering is inverted on key and source index: the smallest key pops
// first, the freshest timestamp leads within a key, and the lowest source
// index breaks timestamp ties.
struct RunEntry {
    rec: ContainerRecord,
    src: usize,
}

impl PartialEq for RunEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RunEntry {}

impl PartialOrd for RunEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RunEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rec
            .meta
            .key
            .cmp(&self.rec.meta.key)
            .then(self.rec.meta.timestamp.cmp(&other.rec.meta.timestamp))
            .then(other.src.cmp(&self.src))
    }
}
