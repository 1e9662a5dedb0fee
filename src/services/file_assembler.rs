//! src/services/file_assembler.rs
//!
//! FileAssembler — turns the chunks of one upload into a single cataloged file.
//!
//! A merge walks the session through `Pending -> Assembling -> Complete | Failed`:
//! 1. Short-circuit if the identifier is already cataloged as a content hash.
//! 2. Reset the target file under `files_root`.
//! 3. Append chunks `1..=total_chunks` strictly in order.
//! 4. Re-hash the assembled file and compare it against the identifier.
//! 5. Register the file in the catalog.
//!
//! Failed merges leave the partially written target on disk; the next attempt
//! resets it in step 2. At most one merge runs per identifier at a time, and
//! callers that queued behind it get its record through the short-circuit.

use crate::{
    models::{chunk::ChunkDescriptor, file_record::FileRecord},
    services::{
        chunk_store::{ChunkStore, ensure_identifier_safe},
        error::{StorageError, StorageResult},
        file_catalog::FileCatalog,
        hasher::ContentHasher,
    },
};
use lru::LruCache;
use serde::Serialize;
use std::{
    collections::HashMap,
    io::ErrorKind,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::{Mutex, OwnedMutexGuard},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How many failure reasons are remembered before the oldest is forgotten.
const TRACKED_FAILURES: usize = 1024;

/// Longest file name most filesystems accept.
const MAX_FILE_NAME_LEN: usize = 255;

/// Observable state of one upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MergeState {
    /// No record yet; chunks may still be arriving.
    Pending,
    /// A merge is running or queued for this identifier.
    Assembling,
    /// The content is cataloged.
    Complete { file_id: Uuid },
    /// The last merge attempt failed and nothing was registered.
    Failed { reason: String },
}

#[derive(Clone)]
pub struct FileAssembler {
    inner: Arc<AssemblerInner>,
}

struct AssemblerInner {
    chunks: ChunkStore,
    catalog: FileCatalog,

    /// Base directory for assembled files.
    files_root: PathBuf,

    /// Delete an upload's chunks once its merge succeeds.
    reclaim_chunks: bool,

    /// One slot per identifier with a merge running or waiting.
    leases: StdMutex<HashMap<String, LeaseSlot>>,

    /// Reason of the last failed merge, for the most recent identifiers.
    failures: StdMutex<LruCache<String, String>>,
}

struct LeaseSlot {
    mutex: Arc<Mutex<()>>,
    /// Holders plus waiters. The slot is removed when this reaches zero.
    users: usize,
}

impl FileAssembler {
    pub fn new(
        chunks: ChunkStore,
        catalog: FileCatalog,
        files_root: impl Into<PathBuf>,
        reclaim_chunks: bool,
    ) -> Self {
        Self::with_failure_capacity(chunks, catalog, files_root, reclaim_chunks, TRACKED_FAILURES)
    }

    fn with_failure_capacity(
        chunks: ChunkStore,
        catalog: FileCatalog,
        files_root: impl Into<PathBuf>,
        reclaim_chunks: bool,
        failure_capacity: usize,
    ) -> Self {
        let failure_capacity = NonZeroUsize::new(failure_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(AssemblerInner {
                chunks,
                catalog,
                files_root: files_root.into(),
                reclaim_chunks,
                leases: StdMutex::new(HashMap::new()),
                failures: StdMutex::new(LruCache::new(failure_capacity)),
            }),
        }
    }

    pub fn files_root(&self) -> &Path {
        &self.inner.files_root
    }

    /// `files_root/{identifier}`, plus `.{extension}` when the original name has one.
    pub fn target_path(&self, descriptor: &ChunkDescriptor) -> PathBuf {
        let name = match descriptor.extension() {
            Some(ext) => format!("{}.{}", descriptor.identifier, ext),
            None => descriptor.identifier.clone(),
        };
        self.inner.files_root.join(name)
    }

    /// Assemble, verify and register the upload named by `descriptor.identifier`.
    ///
    /// The identifier doubles as the expected MD5 of the assembled bytes. If that
    /// hash is already cataloged the existing record is returned without touching
    /// any chunk.
    pub async fn merge_chunks(&self, descriptor: &ChunkDescriptor) -> StorageResult<FileRecord> {
        let identifier = descriptor.identifier.as_str();
        ensure_identifier_safe(identifier)?;
        ensure_target_name_usable(descriptor)?;

        if let Some(record) = self.existing(identifier).await? {
            debug!(identifier, id = %record.id, "content already cataloged, skipping merge");
            return Ok(record);
        }
        if descriptor.total_chunks == 0 {
            return Err(StorageError::InvalidDescriptor(
                "an upload has at least one chunk".into(),
            ));
        }

        let _lease = self.acquire_lease(identifier).await;
        if let Some(record) = self.existing(identifier).await? {
            debug!(identifier, id = %record.id, "merge finished by a concurrent caller");
            return Ok(record);
        }

        lock(&self.inner.failures).pop(identifier);
        let result = self.assemble(descriptor).await;
        if let Err(err) = &result {
            lock(&self.inner.failures).put(identifier.to_string(), err.to_string());
        }
        result
    }

    /// Where the upload named by `identifier` currently stands.
    pub async fn state(&self, identifier: &str) -> StorageResult<MergeState> {
        ensure_identifier_safe(identifier)?;
        if let Some(record) = self.existing(identifier).await? {
            return Ok(MergeState::Complete { file_id: record.id });
        }
        let held = lock(&self.inner.leases)
            .get(identifier)
            .is_some_and(|slot| slot.mutex.try_lock().is_err());
        if held {
            return Ok(MergeState::Assembling);
        }
        if let Some(reason) = lock(&self.inner.failures).peek(identifier).cloned() {
            return Ok(MergeState::Failed { reason });
        }
        Ok(MergeState::Pending)
    }

    async fn existing(&self, hash: &str) -> StorageResult<Option<FileRecord>> {
        match self.inner.catalog.find_by_hash(hash).await {
            Ok(record) => Ok(Some(record)),
            Err(StorageError::RecordNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn assemble(&self, descriptor: &ChunkDescriptor) -> StorageResult<FileRecord> {
        let identifier = descriptor.identifier.as_str();
        let target = self.target_path(descriptor);
        info!(
            identifier,
            total_chunks = descriptor.total_chunks,
            target = %target.display(),
            "merging chunks"
        );

        fs::create_dir_all(&self.inner.files_root).await?;
        if self.inner.catalog.reclaim_path(&target).await {
            debug!(identifier, "target was queued for deletion, kept for reuse");
        }
        match fs::remove_file(&target).await {
            Ok(_) => debug!("reset previous output {}", target.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }

        let mut output = File::create(&target).await?;
        let mut size_bytes: u64 = 0;
        for chunk_number in 1..=descriptor.total_chunks {
            let mut chunk = self.inner.chunks.read(identifier, chunk_number).await?;
            let copied = tokio::io::copy(&mut chunk, &mut output).await?;
            output.flush().await?;
            size_bytes += copied;
            debug!(identifier, chunk_number, bytes = copied, "appended chunk");
        }
        output.sync_all().await?;
        drop(output);

        let actual = ContentHasher::hash_file(&target).await?;
        if actual != identifier {
            warn!(
                identifier,
                actual = %actual,
                target = %target.display(),
                "assembled file failed integrity check"
            );
            return Err(StorageError::IntegrityMismatch {
                expected: identifier.to_string(),
                actual,
            });
        }

        let record = match self.inner.catalog.register(&target, identifier).await {
            Ok(record) => record,
            Err(StorageError::DuplicateContent(_)) => {
                debug!(identifier, "registration lost to another writer, returning its record");
                self.inner.catalog.find_by_hash(identifier).await?
            }
            Err(err) => return Err(err),
        };

        if self.inner.reclaim_chunks {
            if let Err(err) = self.inner.chunks.remove_session(identifier).await {
                warn!(identifier, error = %err, "failed to reclaim chunks after merge");
            }
        }

        info!(identifier, id = %record.id, size_bytes, "merge complete");
        Ok(record)
    }

    async fn acquire_lease(&self, identifier: &str) -> MergeLease {
        let mutex = {
            let mut leases = lock(&self.inner.leases);
            let slot = leases
                .entry(identifier.to_string())
                .or_insert_with(|| LeaseSlot {
                    mutex: Arc::default(),
                    users: 0,
                });
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        // Registered before waiting so a cancelled waiter still releases its slot.
        let mut lease = MergeLease {
            inner: Arc::clone(&self.inner),
            identifier: identifier.to_string(),
            guard: None,
        };
        lease.guard = Some(mutex.lock_owned().await);
        lease
    }
}

/// Exclusive right to merge one identifier, or a place in line for it. The
/// map entry is dropped with the last holder or waiter.
struct MergeLease {
    inner: Arc<AssemblerInner>,
    identifier: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MergeLease {
    fn drop(&mut self) {
        self.guard.take();
        let mut leases = lock(&self.inner.leases);
        if let Some(slot) = leases.get_mut(&self.identifier) {
            slot.users -= 1;
            if slot.users == 0 {
                leases.remove(&self.identifier);
            }
        }
    }
}

/// The assembled file is named `{identifier}.{extension}`; refuse extensions
/// that cannot appear in such a name.
fn ensure_target_name_usable(descriptor: &ChunkDescriptor) -> StorageResult<()> {
    let Some(extension) = descriptor.extension() else {
        return Ok(());
    };
    let too_long = descriptor.identifier.len() + 1 + extension.len() > MAX_FILE_NAME_LEN;
    if too_long || extension.chars().any(char::is_control) {
        return Err(StorageError::InvalidDescriptor(format!(
            "unusable file extension in `{}`",
            descriptor.filename.escape_debug()
        )));
    }
    Ok(())
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
