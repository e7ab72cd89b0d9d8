use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{CommitBatch, Versioned};
use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryKeyedStore;
use crate::traits::{KeyedStore, VersionedStore};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Flush/sync strategy for the commit log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every commit (safest, highest latency).
    EveryCommit,
    /// Flush to the OS and rely on page-cache buffering.
    #[default]
    OsDefault,
}

/// Configuration for the [`CommitLogStore`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogConfig {
    pub sync_mode: SyncMode,
}

/// One committed transaction as it appears on disk.
///
/// On-disk frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct LogRecord {
    seq: u64,
    writes: Vec<(String, Vec<u8>)>,
}

struct LogWriter {
    writer: BufWriter<File>,
    next_seq: u64,
}

/// Durable keyed store backed by an append-only commit log.
///
/// Every commit appends one framed record holding all of its writes. On
/// open the log is replayed front-to-back into an in-memory index (last
/// writer wins per key). A torn frame at the tail, left by a crash during
/// append, is logged and truncated away; everything before it is kept.
pub struct CommitLogStore {
    path: PathBuf,
    config: LogConfig,
    index: InMemoryKeyedStore,
    writer: Mutex<LogWriter>,
}

impl CommitLogStore {
    /// Open (or create) the commit log at `path` and replay it.
    pub fn open(path: &Path, config: LogConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let index = InMemoryKeyedStore::new();
        let (records, valid_len) = if path.exists() {
            recover(path)?
        } else {
            (Vec::new(), 0)
        };

        let next_seq = records.last().map_or(1, |r| r.seq + 1);
        for record in &records {
            index.apply(&CommitBatch {
                reads: Vec::new(),
                writes: record.writes.clone(),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        if file.metadata()?.len() > valid_len {
            warn!(
                path = %path.display(),
                valid_len,
                "truncating torn commit log tail"
            );
            file.set_len(valid_len)?;
        }

        info!(
            path = %path.display(),
            records = records.len(),
            keys = index.len()?,
            "commit log opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            config,
            index,
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                next_seq,
            }),
        })
    }

    /// Path of the log segment.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> StoreResult<MutexGuard<'_, LogWriter>> {
        self.writer.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn append(&self, log: &mut LogWriter, writes: &[(String, Vec<u8>)]) -> StoreResult<u64> {
        let record = LogRecord {
            seq: log.next_seq,
            writes: writes.to_vec(),
        };
        let payload =
            bincode::serialize(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("commit record exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        log.writer.write_all(&length.to_le_bytes())?;
        log.writer.write_all(&crc.to_le_bytes())?;
        log.writer.write_all(&payload)?;
        log.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryCommit {
            log.writer.get_ref().sync_all()?;
        }

        log.next_seq += 1;
        debug!(seq = record.seq, writes = writes.len(), len = payload.len(), "commit log append");
        Ok(record.seq)
    }
}

/// Read every intact record, returning them with the byte length of the
/// intact prefix.
fn recover(path: &Path) -> StoreResult<(Vec<LogRecord>, u64)> {
    let mut file = BufReader::new(File::open(path)?);
    let file_len = file.get_ref().metadata()?.len();
    let mut records = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let frame_end = offset + HEADER_SIZE as u64 + u64::from(length);
        if length == 0 || frame_end > file_len {
            warn!(offset, length, file_len, "incomplete commit log frame; stopping recovery");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        file.read_exact(&mut payload)?;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            if frame_end == file_len {
                warn!(offset, "torn commit log frame at tail; stopping recovery");
                break;
            }
            return Err(StoreError::CorruptLog {
                path: path.to_path_buf(),
                offset,
                reason: format!("crc mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"),
            });
        }

        let record: LogRecord = bincode::deserialize(&payload).map_err(|e| StoreError::CorruptLog {
            path: path.to_path_buf(),
            offset,
            reason: e.to_string(),
        })?;
        debug!(offset, seq = record.seq, "replayed commit record");
        records.push(record);
        offset = frame_end;
    }

    Ok((records, offset))
}

impl KeyedStore for CommitLogStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.index.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.commit(&CommitBatch::single(key, value))
    }

    fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.index.scan(prefix)
    }
}

impl VersionedStore for CommitLogStore {
    fn get_versioned(&self, key: &str) -> StoreResult<Option<Versioned>> {
        self.index.get_versioned(key)
    }

    fn commit(&self, batch: &CommitBatch) -> StoreResult<()> {
        // Holding the writer serializes commits; readers keep using the index.
        let mut log = self.writer()?;
        self.index.validate(batch)?;
        if batch.is_read_only() {
            return Ok(());
        }
        self.append(&mut log, &batch.writes)?;
        self.index.apply(batch)
    }
}

impl std::fmt::Debug for CommitLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLogStore")
            .field("path", &self.path)
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;

    fn open(dir: &tempfile::TempDir) -> CommitLogStore {
        CommitLogStore::open(&dir.path().join("ledger.log"), LogConfig::default()).unwrap()
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(&dir);
            store.put("B1", b"[1]").unwrap();
            store.put("B2", b"[2]").unwrap();
            store.put("B1", b"[1,3]").unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.get("B1").unwrap().as_deref(), Some(&b"[1,3]"[..]));
        assert_eq!(store.get("B2").unwrap().as_deref(), Some(&b"[2]"[..]));
        assert_eq!(store.version("B1").unwrap(), 2);
        assert_eq!(store.scan("").unwrap().len(), 2);
    }

    #[test]
    fn multi_key_commit_is_one_record() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(&dir);
            let batch = CommitBatch {
                reads: vec![("A".into(), 0), ("B".into(), 0)],
                writes: vec![("A".into(), b"a".to_vec()), ("B".into(), b"b".to_vec())],
            };
            store.commit(&batch).unwrap();
        }
        let (records, _) = recover(&dir.path().join("ledger.log")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].writes.len(), 2);
        assert_eq!(records[0].seq, 1);
    }

    #[test]
    fn conflicting_commit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.put("B1", b"v1").unwrap();

        let stale = CommitBatch {
            reads: vec![("B1".into(), 0)],
            writes: vec![("B1".into(), b"v2".to_vec())],
        };
        assert!(matches!(
            store.commit(&stale),
            Err(StoreError::VersionConflict { .. })
        ));
        drop(store);

        let (records, _) = recover(&dir.path().join("ledger.log")).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn torn_tail_is_truncated_and_appends_continue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        {
            let store = open(&dir);
            store.put("B1", b"v1").unwrap();
        }
        let intact_len = fs::metadata(&path).unwrap().len();
        {
            // Simulate a crash halfway through the next frame.
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&40u32.to_le_bytes()).unwrap();
            file.write_all(&[0u8; 10]).unwrap();
        }

        let store = open(&dir);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
        assert_eq!(store.get("B1").unwrap().as_deref(), Some(&b"v1"[..]));
        store.put("B2", b"v2").unwrap();
        drop(store);

        let store = open(&dir);
        assert_eq!(store.get("B2").unwrap().as_deref(), Some(&b"v2"[..]));
    }

    #[test]
    fn corruption_before_tail_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.log");
        {
            let store = open(&dir);
            store.put("B1", b"v1").unwrap();
            store.put("B2", b"v2").unwrap();
        }
        {
            // Flip a payload byte of the first frame.
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(io::SeekFrom::Start(HEADER_SIZE as u64 + 2)).unwrap();
            file.write_all(&[0xff]).unwrap();
        }

        let err = CommitLogStore::open(&path, LogConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::CorruptLog { offset: 0, .. }));
    }
}
