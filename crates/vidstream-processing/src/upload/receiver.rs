//! Fragmented upload sessions.
//!
//! Each session keeps its fragments as one file per start offset under
//! `{fragment_root}/{video_id}.{n}/{offset}`, where `n` is unique per session,
//! and reassembles them into
//! `{assembled_root}/{video_id}` once every declared byte has arrived. The session
//! map lock is only held to look up, insert or remove sessions, never across
//! filesystem calls; fragment writes and the completion check run under a
//! per-session lock.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use vidstream_core::models::UploadSession;
use vidstream_core::{UploadError, VideoId};

/// Metadata recorded with a session at initiation.
#[derive(Debug, Clone)]
pub struct UploadHint {
    pub filename: String,
    pub title: String,
    pub owner: String,
}

/// A fully reassembled source file, handed to the transcode stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledUpload {
    pub video_id: VideoId,
    pub path: PathBuf,
    pub size: u64,
    pub filename: String,
    pub title: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    Partial { received: u64, total: u64 },
    Complete(AssembledUpload),
}

struct SessionState {
    session: UploadSession,
    /// Accepted fragments: start offset -> length.
    fragments: BTreeMap<u64, u64>,
    /// Set once the session is reassembled or torn down; later calls see it as gone.
    closed: bool,
}

struct SessionSlot {
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

pub struct ChunkReceiver {
    fragment_root: PathBuf,
    assembled_root: PathBuf,
    session_timeout: Duration,
    sessions: RwLock<HashMap<VideoId, Arc<SessionSlot>>>,
    next_dir: AtomicU64,
}

impl ChunkReceiver {
    pub fn new(
        fragment_root: impl Into<PathBuf>,
        assembled_root: impl Into<PathBuf>,
        session_timeout: Duration,
    ) -> Self {
        Self {
            fragment_root: fragment_root.into(),
            assembled_root: assembled_root.into(),
            session_timeout,
            sessions: RwLock::new(HashMap::new()),
            next_dir: AtomicU64::new(0),
        }
    }

    #[tracing::instrument(skip(self, hint), fields(video_id = %video_id))]
    pub async fn begin(
        &self,
        video_id: VideoId,
        declared_size: u64,
        hint: UploadHint,
    ) -> Result<UploadSession, UploadError> {
        if declared_size == 0 {
            return Err(UploadError::InvalidSize(
                "declared size must be greater than zero".to_string(),
            ));
        }

        if self.sessions.read().await.contains_key(&video_id) {
            return Err(UploadError::DuplicateSession(video_id));
        }

        let seq = self.next_dir.fetch_add(1, Ordering::Relaxed);
        let fragment_dir = self
            .fragment_root
            .join(format!("{}.{}", video_id.as_str(), seq));
        // Leftovers from an earlier process can share the name.
        if fs::try_exists(&fragment_dir).await? {
            fs::remove_dir_all(&fragment_dir).await?;
        }
        fs::create_dir_all(&fragment_dir).await?;

        let created_at = Utc::now();
        let session = UploadSession {
            video_id: video_id.clone(),
            filename: hint.filename,
            title: hint.title,
            owner: hint.owner,
            declared_size,
            received_bytes: 0,
            fragment_dir,
            created_at,
        };

        {
            let mut sessions = self.sessions.write().await;
            // Another begin for the same id may have won while the directory was created.
            if !sessions.contains_key(&video_id) {
                sessions.insert(
                    video_id.clone(),
                    Arc::new(SessionSlot {
                        created_at,
                        state: Mutex::new(SessionState {
                            session: session.clone(),
                            fragments: BTreeMap::new(),
                            closed: false,
                        }),
                    }),
                );
            } else {
                drop(sessions);
                remove_dir_logged(&session.fragment_dir).await;
                return Err(UploadError::DuplicateSession(video_id));
            }
        }

        tracing::info!(declared_size, "Upload session started");
        Ok(session)
    }

    async fn slot(&self, video_id: &VideoId) -> Result<Arc<SessionSlot>, UploadError> {
        self.sessions
            .read()
            .await
            .get(video_id)
            .cloned()
            .ok_or_else(|| UploadError::UnknownSession(video_id.clone()))
    }

    /// Store one fragment. Re-sending an offset replaces the earlier fragment.
    ///
    /// `declared_total`, when the sender supplies it, must match the size given at
    /// initiation.
    pub async fn accept(
        &self,
        video_id: &VideoId,
        offset: u64,
        declared_total: Option<u64>,
        data: &[u8],
    ) -> Result<FragmentOutcome, UploadError> {
        let slot = self.slot(video_id).await?;
        let mut state = slot.state.lock().await;
        if state.closed {
            return Err(UploadError::UnknownSession(video_id.clone()));
        }

        let len = data.len() as u64;
        validate_fragment(&state, offset, declared_total, len)?;

        let fragment_path = state.session.fragment_dir.join(offset.to_string());
        fs::write(&fragment_path, data).await?;

        let previous = state.fragments.insert(offset, len).unwrap_or(0);
        state.session.received_bytes = state.session.received_bytes - previous + len;

        let received = state.session.received_bytes;
        let total = state.session.declared_size;
        tracing::debug!(video_id = %video_id, offset, len, received, total, "Fragment accepted");

        if received < total {
            return Ok(FragmentOutcome::Partial { received, total });
        }

        let assembled = self.reassemble(&mut state).await;
        drop(state);
        self.remove_slot(video_id).await;
        assembled.map(FragmentOutcome::Complete)
    }

    /// Declare that the sender is done. Fails with `IncompleteUpload`, tearing the
    /// session down, unless every declared byte arrived.
    pub async fn finish(&self, video_id: &VideoId) -> Result<AssembledUpload, UploadError> {
        let slot = self.slot(video_id).await?;
        let mut state = slot.state.lock().await;
        if state.closed {
            return Err(UploadError::UnknownSession(video_id.clone()));
        }

        let result = if state.session.received_bytes == state.session.declared_size {
            self.reassemble(&mut state).await
        } else {
            state.closed = true;
            remove_dir_logged(&state.session.fragment_dir).await;
            Err(UploadError::IncompleteUpload {
                video_id: video_id.clone(),
                expected: state.session.declared_size,
                received: state.session.received_bytes,
            })
        };

        drop(state);
        self.remove_slot(video_id).await;
        result
    }

    /// Drop a session and reclaim its fragment storage.
    pub async fn abort(&self, video_id: &VideoId) -> Result<(), UploadError> {
        let slot = self
            .sessions
            .write()
            .await
            .remove(video_id)
            .ok_or_else(|| UploadError::UnknownSession(video_id.clone()))?;

        let mut state = slot.state.lock().await;
        if !state.closed {
            state.closed = true;
            remove_dir_logged(&state.session.fragment_dir).await;
        }

        tracing::info!(video_id = %video_id, "Upload session aborted");
        Ok(())
    }

    /// Abort every session older than the session timeout. Returns the aborted ids.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Vec<VideoId> {
        let timeout = chrono::Duration::from_std(self.session_timeout)
            .unwrap_or_else(|_| chrono::Duration::MAX);

        let expired: Vec<VideoId> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, slot)| now.signed_duration_since(slot.created_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let mut reaped = Vec::with_capacity(expired.len());
        for video_id in expired {
            if self.abort(&video_id).await.is_ok() {
                tracing::warn!(video_id = %video_id, "Upload session expired");
                reaped.push(video_id);
            }
        }
        reaped
    }

    pub async fn snapshot(&self, video_id: &VideoId) -> Option<UploadSession> {
        let slot = self.slot(video_id).await.ok()?;
        let state = slot.state.lock().await;
        (!state.closed).then(|| state.session.clone())
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn remove_slot(&self, video_id: &VideoId) {
        self.sessions.write().await.remove(video_id);
    }

    /// Concatenate fragments in offset order. Runs at most once per session: the
    /// caller holds the session lock and `closed` is set before any I/O.
    async fn reassemble(&self, state: &mut SessionState) -> Result<AssembledUpload, UploadError> {
        state.closed = true;
        let session = &state.session;
        let start = std::time::Instant::now();

        fs::create_dir_all(&self.assembled_root).await?;
        let output_path = self.assembled_root.join(session.video_id.as_str());

        let written = match concat_fragments(&session.fragment_dir, &state.fragments, &output_path)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                remove_dir_logged(&session.fragment_dir).await;
                let _ = fs::remove_file(&output_path).await;
                return Err(e.into());
            }
        };
        remove_dir_logged(&session.fragment_dir).await;

        if written != session.declared_size {
            let _ = fs::remove_file(&output_path).await;
            return Err(UploadError::IncompleteUpload {
                video_id: session.video_id.clone(),
                expected: session.declared_size,
                received: written,
            });
        }

        tracing::info!(
            video_id = %session.video_id,
            size_bytes = written,
            fragments = state.fragments.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload reassembled"
        );

        Ok(AssembledUpload {
            video_id: session.video_id.clone(),
            path: output_path,
            size: written,
            filename: session.filename.clone(),
            title: session.title.clone(),
            owner: session.owner.clone(),
        })
    }
}

fn validate_fragment(
    state: &SessionState,
    offset: u64,
    declared_total: Option<u64>,
    len: u64,
) -> Result<(), UploadError> {
    let session = &state.session;
    let reject = |reason: String| UploadError::FragmentRejected {
        video_id: session.video_id.clone(),
        offset,
        reason,
    };

    if len == 0 {
        return Err(reject("fragment is empty".to_string()));
    }
    if let Some(total) = declared_total {
        if total != session.declared_size {
            return Err(reject(format!(
                "total {} does not match declared size {}",
                total, session.declared_size
            )));
        }
    }
    let end = offset
        .checked_add(len)
        .ok_or_else(|| reject("offset overflow".to_string()))?;
    if end > session.declared_size {
        return Err(reject(format!(
            "fragment ends at {} past declared size {}",
            end, session.declared_size
        )));
    }

    if let Some((&prev_offset, &prev_len)) = state.fragments.range(..offset).next_back() {
        if prev_offset + prev_len > offset {
            return Err(reject(format!(
                "overlaps fragment at offset {}",
                prev_offset
            )));
        }
    }
    if let Some((&next_offset, _)) = state.fragments.range(offset + 1..).next() {
        if next_offset < end {
            return Err(reject(format!(
                "overlaps fragment at offset {}",
                next_offset
            )));
        }
    }

    Ok(())
}

async fn concat_fragments(
    fragment_dir: &Path,
    fragments: &BTreeMap<u64, u64>,
    output_path: &Path,
) -> std::io::Result<u64> {
    let mut output = fs::File::create(output_path).await?;
    let mut written = 0u64;
    for offset in fragments.keys() {
        let mut fragment = fs::File::open(fragment_dir.join(offset.to_string())).await?;
        written += tokio::io::copy(&mut fragment, &mut output).await?;
    }
    output.flush().await?;
    output.sync_all().await?;
    Ok(written)
}

async fn remove_dir_logged(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %dir.display(), "Failed to remove fragment directory");
        }
    }
}
