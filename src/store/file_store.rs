//! Single-file node store with atomic batch commits
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("SMT_TREE")
//!   - version: 4 bytes (u32 LE)
//!   - reserved: 52 bytes
//!
//! [RECORDS: variable]
//!   - [len: u32 LE][checksum: 32 bytes][payload], one per committed batch
//! ```
//!
//! The whole node set is held in memory and rebuilt by replaying the
//! records on open. A final record that is cut short or fails its checksum
//! is the tail of an interrupted commit; it is dropped and the file is
//! truncated back to the last complete record. A bad record with more log
//! after it is reported as corruption and the file is left as it is.

use super::memory::Namespaces;
use super::record::{Record, RecordKind, FRAME_HEADER_SIZE};
use super::{NodeStore, WriteBatch};
use crate::config::StoreConfig;
use crate::model::Hash;
use crate::smt::{LeafEntry, TreeNode};
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

const HEADER_SIZE: u64 = 64;

/// The append end of the log
struct LogFile {
    file: File,
    end: u64,
}

impl LogFile {
    fn append(&mut self, framed: &[u8], sync: bool) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(framed)?;
        if sync {
            self.file.sync_data()?;
        }
        self.end += framed.len() as u64;
        Ok(())
    }
}

/// A node store backed by a single append-only file
pub struct FileStore {
    /// Path to the database file
    path: PathBuf,
    /// Serializes writers; held across append and apply
    log: Mutex<LogFile>,
    /// Materialized nodes and roots of every tree
    state: RwLock<Namespaces>,
    /// Set when a failed append could not be rolled back
    poisoned: AtomicBool,
    options: StoreConfig,
}

fn header_bytes() -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&VERSION.to_le_bytes());
    header
}

impl FileStore {
    /// Create a new database file, replacing any existing one
    pub fn create(path: impl AsRef<Path>, options: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&header_bytes())?;
        file.sync_all()?;

        info!(path = %path.display(), "Created node store");

        Ok(FileStore {
            path,
            log: Mutex::new(LogFile {
                file,
                end: HEADER_SIZE,
            }),
            state: RwLock::new(Namespaces::new()),
            poisoned: AtomicBool::new(false),
            options,
        })
    }

    /// Open an existing database file and replay its records
    pub fn open(path: impl AsRef<Path>, options: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("File too short for header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&header[8..12]);
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let (state, end, records) = replay(&mut file, file_len)?;

        if end < file_len {
            warn!(
                path = %path.display(),
                dropped_bytes = file_len - end,
                "Dropping incomplete record at end of log"
            );
            file.set_len(end)?;
            file.sync_all()?;
        }

        info!(
            path = %path.display(),
            records,
            nodes = state.node_count(),
            "Opened node store"
        );

        Ok(FileStore {
            path,
            log: Mutex::new(LogFile { file, end }),
            state: RwLock::new(state),
            poisoned: AtomicBool::new(false),
            options,
        })
    }

    /// Open or create a database file
    pub fn open_or_create(path: impl AsRef<Path>, options: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path, options)
        } else {
            Self::create(path, options)
        }
    }

    /// Rewrite the log as a single snapshot of the live state
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&self) -> Result<u64> {
        let mut log = self.log.lock();
        self.check_poisoned()?;

        let batches: Vec<WriteBatch> = {
            let state = self.state.read();
            state
                .iter()
                .map(|(name, space)| space.to_batch(name))
                .collect()
        };
        let framed = Record::snapshot(batches).encode(self.options.compression_level)?;

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(&header_bytes())?;
            tmp.write_all(&framed)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        let before = log.end;
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        *log = LogFile {
            file,
            end: HEADER_SIZE + framed.len() as u64,
        };

        let reclaimed = before.saturating_sub(log.end);
        info!(
            path = %self.path.display(),
            bytes_before = before,
            bytes_after = log.end,
            "Compacted node store"
        );
        Ok(reclaimed)
    }

    /// Flush the log to disk
    pub fn sync(&self) -> Result<()> {
        self.log.lock().file.sync_all()?;
        Ok(())
    }

    /// Total number of nodes across all trees
    pub fn node_count(&self) -> usize {
        self.state.read().node_count()
    }

    /// Current size of the log in bytes
    pub fn log_size(&self) -> u64 {
        self.log.lock().end
    }

    /// Whether a failed commit left the log in an unknown state
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.is_poisoned() {
            return Err(Error::Commit(format!(
                "{} is poisoned by an earlier failed commit; reopen it",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// Replay every complete record, returning the state, the end offset of the
/// last complete record and the number of records applied
fn replay(file: &mut File, file_len: u64) -> Result<(Namespaces, u64, usize)> {
    file.seek(SeekFrom::Start(HEADER_SIZE))?;
    let mut reader = BufReader::new(file);

    let mut state = Namespaces::new();
    let mut offset = HEADER_SIZE;
    let mut records = 0;

    while offset + (FRAME_HEADER_SIZE as u64) <= file_len {
        let mut frame = [0u8; FRAME_HEADER_SIZE];
        reader.read_exact(&mut frame)?;
        let (len, checksum) = Record::parse_frame_header(&frame);

        let record_end = offset + (FRAME_HEADER_SIZE + len) as u64;
        if record_end > file_len {
            break;
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        if Hash::digest(&payload) != checksum {
            // Only the final record can be a torn write; anything after a bad
            // record is committed data that truncation would destroy.
            if record_end == file_len {
                break;
            }
            return Err(Error::Corruption(format!(
                "record at offset {} fails its checksum with {} bytes of log after it",
                offset,
                file_len - record_end
            )));
        }

        // A checksummed record that does not decode was written by
        // something else entirely; refuse to guess.
        let record = Record::decode(&payload)?;
        if record.kind == RecordKind::Snapshot {
            state = Namespaces::new();
        }
        for batch in &record.batches {
            state.apply(batch);
        }

        offset = record_end;
        records += 1;
    }

    Ok((state, offset, records))
}

impl NodeStore for FileStore {
    fn get_internal(&self, tree: &str, digest: &Hash) -> Result<Option<(Hash, Hash)>> {
        Ok(self.state.read().get_internal(tree, digest))
    }

    fn get_leaf(&self, tree: &str, digest: &Hash) -> Result<Option<LeafEntry>> {
        Ok(self.state.read().get_leaf(tree, digest))
    }

    fn get_root(&self, tree: &str) -> Result<Option<Hash>> {
        Ok(self.state.read().get_root(tree))
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.len();
        let record = Record::batch(batch);
        let framed = record.encode(self.options.compression_level)?;

        let mut log = self.log.lock();
        self.check_poisoned()?;

        let start = log.end;
        if let Err(e) = log.append(&framed, self.options.sync_on_commit) {
            if let Err(rollback) = log.file.set_len(start) {
                self.poisoned.store(true, Ordering::Release);
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Could not roll back failed commit; store poisoned"
                );
            }
            return Err(Error::Commit(format!("{}: {}", self.path.display(), e)));
        }

        let mut state = self.state.write();
        for batch in &record.batches {
            state.apply(batch);
        }

        debug!(
            tree = record.batches[0].tree(),
            ops,
            bytes = framed.len(),
            "Committed batch"
        );
        Ok(())
    }

    fn nodes(&self, tree: &str) -> Result<Vec<(Hash, TreeNode)>> {
        Ok(self.state.read().nodes(tree))
    }

    fn trees(&self) -> Result<Vec<String>> {
        Ok(self.state.read().names())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.log.get_mut().file.sync_all();
    }
}
