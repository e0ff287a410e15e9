//! Vocabulary refresh policy and the single-flight download.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::api::VocabularySource;
use crate::config::{RefreshConfig, FORMAT_VERSION};
use crate::error::{Result, KanifyError};
use crate::storage::{RefreshState, StateStore, StoredState};
use crate::ui::UserInterface;
use crate::vocab::{build_vocab_map, parse_response, VocabMap};

/// Who asked for the refresh. Chained refreshes (part of a substitution run)
/// do not bother the user with "updated"/"up to date" messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Manual,
    Chained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDownloading,
    MissingApiKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New vocabulary stored and its content differs from before
    Updated(VocabMap),
    /// New vocabulary stored but identical to the previous one
    Unchanged(VocabMap),
    /// Nothing was downloaded
    Skipped(SkipReason),
}

/// Minute clock, replaceable in tests
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp() / 60)
}

/// Whether the stored vocabulary must be downloaded again
pub fn refresh_due(
    state: &RefreshState,
    has_vocab: bool,
    force_first: bool,
    now_minute: i64,
    max_age_minutes: i64,
) -> bool {
    if force_first || state.force_refresh || !has_vocab {
        return true;
    }
    if state.format_version != Some(FORMAT_VERSION) {
        return true;
    }
    match state.last_refresh_minute {
        None => true,
        Some(last) => now_minute - last >= max_age_minutes,
    }
}

/// Process-wide "download in flight" flag.
///
/// Every acquisition gets its own ticket and only the holder of the current
/// ticket can release it, so a guard outliving a `reset` cannot free the
/// lock of a newer download.
#[derive(Debug, Default)]
pub struct DownloadLock {
    holder: AtomicU64,
    next_ticket: AtomicU64,
}

impl DownloadLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Option<DownloadGuard<'_>> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        self.holder
            .compare_exchange(0, ticket, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DownloadGuard { lock: self, ticket })
    }

    pub fn is_held(&self) -> bool {
        self.holder.load(Ordering::Acquire) != 0
    }

    /// Forget the current holder. Returns whether the lock was held.
    pub fn reset(&self) -> bool {
        self.holder.swap(0, Ordering::AcqRel) != 0
    }
}

/// Held for the duration of one download; releases its own ticket on drop
pub struct DownloadGuard<'a> {
    lock: &'a DownloadLock,
    ticket: u64,
}

impl Drop for DownloadGuard<'_> {
    fn drop(&mut self) {
        let _ = self.lock.holder.compare_exchange(
            self.ticket,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

pub struct RefreshCoordinator {
    source: Arc<dyn VocabularySource>,
    store: Arc<dyn StateStore>,
    ui: Arc<dyn UserInterface>,
    config: RefreshConfig,
    clock: Clock,
    downloading: DownloadLock,
}

impl RefreshCoordinator {
    pub fn new(
        source: Arc<dyn VocabularySource>,
        store: Arc<dyn StateStore>,
        ui: Arc<dyn UserInterface>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            source,
            store,
            ui,
            config,
            clock: system_clock(),
            downloading: DownloadLock::new(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.is_held()
    }

    /// Drop a lock left behind by an abandoned download
    pub fn reset_lock(&self) {
        if self.downloading.reset() {
            debug!("Discarding stale download lock");
        }
    }

    /// Decide whether a run has to refresh first. Consumes the one-shot
    /// force flag whatever the answer is.
    pub fn decide_refresh(&self, force_first: bool) -> Result<bool> {
        let state = StoredState::load(self.store.as_ref())?;
        if state.refresh.force_refresh {
            StoredState::save_force_refresh(self.store.as_ref(), false)?;
        }

        let due = refresh_due(
            &state.refresh,
            state.has_vocab(),
            force_first,
            (self.clock)(),
            self.config.max_age_minutes,
        );
        debug!(
            "Refresh decision: due={} (force_first={}, flag={}, has_vocab={}, format={:?}, last={:?})",
            due, force_first, state.refresh.force_refresh, state.has_vocab(),
            state.refresh.format_version, state.refresh.last_refresh_minute
        );
        Ok(due)
    }

    /// Download, rebuild and persist the vocabulary.
    ///
    /// At most one download runs at a time; a second request while one is in
    /// flight is skipped. Failures are reported to the user and leave the
    /// stored state untouched.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<RefreshOutcome> {
        let Some(_guard) = self.downloading.acquire() else {
            info!("Attempted to download WaniKani data while already downloading");
            return Ok(RefreshOutcome::Skipped(SkipReason::AlreadyDownloading));
        };

        let previous = StoredState::load(self.store.as_ref())?;
        let Some(api_key) = previous.api_key.clone() else {
            warn!("No API key configured, skipping vocabulary download");
            return Ok(RefreshOutcome::Skipped(SkipReason::MissingApiKey));
        };

        info!("Downloading new vocab data...");
        let body = match self.source.fetch_vocabulary(&api_key).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Vocabulary download failed: {}", e);
                self.ui.alert("Error while downloading WaniKani data. Please try again later.");
                return Err(match e {
                    KanifyError::NetworkFailure(_) => e,
                    other => KanifyError::NetworkFailure(other.to_string()),
                });
            }
        };

        let parsed = match parse_response(&body) {
            Ok(parsed) => parsed,
            Err(KanifyError::RemoteApi(message)) => {
                warn!("WaniKani API reported an error: {}", message);
                self.ui.alert(&format!("WaniKani reported an error: {}", message));
                return Err(KanifyError::RemoteApi(message));
            }
            Err(e) => {
                warn!("Unable to process vocabulary response: {}", e);
                self.ui.alert("Unable to process WaniKani data. Please try again later.");
                return Err(e);
            }
        };
        if !parsed.skipped.is_empty() {
            warn!("Skipped {} malformed vocabulary items", parsed.skipped.len());
        }

        let map = build_vocab_map(&parsed.entries);
        let hash = map.content_hash()?;
        let refresh = RefreshState {
            format_version: Some(FORMAT_VERSION),
            last_refresh_minute: Some((self.clock)()),
            vocab_hash: Some(hash),
            force_refresh: false,
        };
        StoredState::save_refresh(self.store.as_ref(), &map.to_json()?, &refresh)?;

        let changed = previous.refresh.vocab_hash != Some(hash);
        info!(
            "Successfully updated vocab! ({} surface forms, {})",
            map.len(),
            if changed { "changed" } else { "unchanged" }
        );

        if trigger == RefreshTrigger::Manual {
            if changed {
                self.ui.alert("WaniKani vocabulary updated.");
            } else {
                self.ui.alert("WaniKani vocabulary is already up to date.");
            }
        }

        Ok(if changed {
            RefreshOutcome::Updated(map)
        } else {
            RefreshOutcome::Unchanged(map)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state(now: i64) -> RefreshState {
        RefreshState {
            format_version: Some(FORMAT_VERSION),
            last_refresh_minute: Some(now - 5),
            vocab_hash: Some(1),
            force_refresh: false,
        }
    }

    #[test]
    fn test_recent_refresh_is_not_due() {
        assert!(!refresh_due(&fresh_state(1000), true, false, 1000, 10080));
    }

    #[test]
    fn test_format_mismatch_forces_refresh() {
        let mut state = fresh_state(1000);
        state.format_version = Some(FORMAT_VERSION - 1);
        assert!(refresh_due(&state, true, false, 1000, 10080));
        state.format_version = None;
        assert!(refresh_due(&state, true, false, 1000, 10080));
    }

    #[test]
    fn test_missing_vocab_or_history_forces_refresh() {
        assert!(refresh_due(&fresh_state(1000), false, false, 1000, 10080));

        let mut state = fresh_state(1000);
        state.last_refresh_minute = None;
        assert!(refresh_due(&state, true, false, 1000, 10080));
    }

    #[test]
    fn test_age_threshold() {
        let mut state = fresh_state(0);
        state.last_refresh_minute = Some(0);
        assert!(!refresh_due(&state, true, false, 10079, 10080));
        assert!(refresh_due(&state, true, false, 10080, 10080));
    }

    #[test]
    fn test_force_sources() {
        assert!(refresh_due(&fresh_state(1000), true, true, 1000, 10080));
        let mut state = fresh_state(1000);
        state.force_refresh = true;
        assert!(refresh_due(&state, true, false, 1000, 10080));
    }

    #[test]
    fn test_guard_releases_lock() {
        let lock = DownloadLock::new();
        {
            let guard = lock.acquire();
            assert!(guard.is_some());
            assert!(lock.acquire().is_none());
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_stale_guard_does_not_release_newer_lock() {
        let lock = DownloadLock::new();
        let stale = lock.acquire().unwrap();
        assert!(lock.reset());

        let current = lock.acquire().unwrap();
        drop(stale);
        assert!(lock.is_held());
        assert!(lock.acquire().is_none());

        drop(current);
        assert!(!lock.is_held());
        assert!(!lock.reset());
    }
}
