//! services/api/src/web/persist_task.rs
//!
//! The background task that writes the session bundle back to storage. Changes
//! are coalesced: one write happens once no change has arrived for the configured
//! debounce interval, and pending changes are flushed on shutdown.

use crate::web::{protocol::ServerMessage, state::AppState};
use companion_core::session::PERSISTENCE_BANNER;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Runs until `app_state.shutdown` is cancelled.
pub async fn persistence_process(app_state: Arc<AppState>) {
    let debounce = app_state.config.save_debounce;
    let mut saved_revision = None;
    info!(?debounce, "Persistence task started");

    loop {
        tokio::select! {
            _ = app_state.changes.notified() => {}
            _ = app_state.shutdown.cancelled() => break,
        }

        // Every further change restarts the quiet period.
        loop {
            tokio::select! {
                _ = app_state.changes.notified() => continue,
                _ = tokio::time::sleep(debounce) => break,
                _ = app_state.shutdown.cancelled() => break,
            }
        }

        saved_revision = flush(&app_state, saved_revision).await;
        if app_state.shutdown.is_cancelled() {
            break;
        }
    }

    flush(&app_state, saved_revision).await;
    info!("Persistence task stopped");
}

/// Saves the bundle if it changed since `saved_revision`, returning the revision
/// now on disk. The session lock is held for the write so that a concurrent
/// logout cannot be overwritten by an older bundle.
async fn flush(app_state: &AppState, saved_revision: Option<u64>) -> Option<u64> {
    let mut session = app_state.session.lock().await;
    let revision = session.revision();
    if saved_revision == Some(revision) {
        return saved_revision;
    }
    let Some(bundle) = session.to_bundle() else {
        debug!(revision, "No profile, nothing to save");
        return Some(revision);
    };

    match app_state.bundle_store.save(&bundle).await {
        Ok(()) => {
            debug!(revision, "Session bundle saved");
            Some(revision)
        }
        Err(e) => {
            error!("Failed to save the session bundle: {:?}", e);
            session.report_persistence_failure();
            app_state.publish(ServerMessage::Error {
                message: PERSISTENCE_BANNER.to_string(),
            });
            saved_revision
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{app_state_with_store, ana, FakeGeneration, MemoryStore};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_are_coalesced_into_one_write() {
        let store = Arc::new(MemoryStore::default());
        let app_state = app_state_with_store(FakeGeneration::replying("ok"), store.clone());
        let task = tokio::spawn(persistence_process(app_state.clone()));

        for notes in ["a", "ab", "abc"] {
            {
                let mut session = app_state.session.lock().await;
                if session.profile().is_none() {
                    session.start(ana());
                }
                session.save_notes(notes);
                app_state.after_change(&mut session);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert!(store.saved().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].notes, "abc");

        app_state.shutdown.cancel();
        task.await.unwrap();
        assert_eq!(store.saved().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_changes_are_flushed_on_shutdown() {
        let store = Arc::new(MemoryStore::default());
        let app_state = app_state_with_store(FakeGeneration::replying("ok"), store.clone());
        let task = tokio::spawn(persistence_process(app_state.clone()));
        tokio::task::yield_now().await;

        {
            let mut session = app_state.session.lock().await;
            session.start(ana());
            app_state.after_change(&mut session);
        }
        app_state.shutdown.cancel();
        task.await.unwrap();

        assert_eq!(store.saved().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_raises_the_banner() {
        let store = Arc::new(MemoryStore::failing());
        let app_state = app_state_with_store(FakeGeneration::replying("ok"), store.clone());
        let task = tokio::spawn(persistence_process(app_state.clone()));

        {
            let mut session = app_state.session.lock().await;
            session.start(ana());
            app_state.after_change(&mut session);
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(app_state.session.lock().await.banner(), Some(PERSISTENCE_BANNER));
        app_state.shutdown.cancel();
        task.await.unwrap();
    }
}
