// Message removal: per-user soft delete with an undo window, and
// delete-for-everyone tombstones.

use super::*;

/// After a delete-for-me the messages stay recoverable for this long.
pub(crate) const UNDO_WINDOW_MS: i64 = 5_000;

/// Tracks the most recent delete-for-me batch so it can be undone as a unit.
#[derive(Default)]
pub(super) struct UndoLedger {
    message_ids: Vec<String>,
    removed_at: i64,
}

impl UndoLedger {
    pub(super) fn record(&mut self, message_ids: Vec<String>, now: i64) {
        self.message_ids = message_ids;
        self.removed_at = now;
    }

    /// Take the batch back if the window has not elapsed.
    pub(super) fn take_if_open(&mut self, now: i64) -> Option<Vec<String>> {
        if self.message_ids.is_empty() || now - self.removed_at >= UNDO_WINDOW_MS {
            return None;
        }
        Some(std::mem::take(&mut self.message_ids))
    }
}

/// Per-item outcome tally for a bulk operation.
pub(super) struct BatchProgress {
    pub(super) remaining: usize,
    pub(super) failed: usize,
}

impl BatchProgress {
    pub(super) fn new(total: usize) -> Self {
        Self {
            remaining: total,
            failed: 0,
        }
    }

    /// Returns the failure count once every item has reported.
    pub(super) fn settle(&mut self, ok: bool) -> Option<usize> {
        if !ok {
            self.failed += 1;
        }
        self.remaining = self.remaining.saturating_sub(1);
        (self.remaining == 0).then_some(self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_window_is_exclusive_at_five_seconds() {
        let mut ledger = UndoLedger::default();
        ledger.record(vec!["m1".to_string()], 10_000);

        // At exactly the window edge the undo no longer applies.
        assert!(ledger.take_if_open(10_000 + UNDO_WINDOW_MS).is_none());
        assert!(ledger.take_if_open(10_000 + UNDO_WINDOW_MS + 1).is_none());
    }

    #[test]
    fn undo_inside_the_window_returns_the_batch_once() {
        let mut ledger = UndoLedger::default();
        ledger.record(vec!["m1".to_string(), "m2".to_string()], 10_000);

        let ids = ledger.take_if_open(10_000 + UNDO_WINDOW_MS - 1).unwrap();
        assert_eq!(ids, vec!["m1".to_string(), "m2".to_string()]);
        // Taken means taken; a second undo has nothing to restore.
        assert!(ledger.take_if_open(10_000 + 100).is_none());
    }

    #[test]
    fn empty_ledger_never_opens() {
        let mut ledger = UndoLedger::default();
        assert!(ledger.take_if_open(0).is_none());
    }
}

impl AppCore {
    pub(super) fn delete_for_me(&mut self, conversation_id: &str, message_ids: Vec<String>) {
        let network = self.network_enabled();
        let now = now_ms();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        let message_ids: Vec<String> = message_ids
            .into_iter()
            .filter(|id| !sess.removed.contains(id))
            .collect();
        if message_ids.is_empty() {
            return;
        }

        // Hide immediately; the store keeps the messages so undo is local.
        sess.removed.extend(message_ids.iter().cloned());
        sess.undo.record(message_ids.clone(), now);
        let removed = sess.removed.clone();
        storage::save_removed(&self.data_dir, conversation_id, &removed);

        if network {
            if let Some(sess) = self.session_for(conversation_id) {
                sess.delete_batch = Some(BatchProgress::new(message_ids.len()));
            }
            for message_id in message_ids {
                let rest = self.rest.clone();
                let tx = self.core_sender.clone();
                let conversation_id = conversation_id.to_string();
                self.runtime.spawn(async move {
                    let result = rest.delete_for_me(&conversation_id, &message_id).await;
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::DeleteForMeResult {
                            conversation_id,
                            message_id,
                            result,
                        },
                    )));
                });
            }
        }
        self.rebuild_view();
    }

    pub(super) fn handle_delete_for_me_result(
        &mut self,
        conversation_id: String,
        message_id: String,
        result: Result<(), ApiError>,
    ) {
        if let Err(e) = &result {
            // The local hide stands; the server ledger catches up via the
            // next removed_for_user push or snapshot.
            tracing::warn!(%conversation_id, %message_id, %e, "delete for me failed");
        }
        let mut toast = None;
        if let Some(sess) = self.session_for(&conversation_id) {
            if let Some(batch) = sess.delete_batch.as_mut() {
                if let Some(failed) = batch.settle(result.is_ok()) {
                    sess.delete_batch = None;
                    if failed > 0 {
                        toast = Some(format!("{failed} message(s) could not be removed"));
                    }
                }
            }
        }
        if let Some(t) = toast {
            self.toast(t);
        }
    }

    pub(super) fn undo_delete_for_me(&mut self, conversation_id: &str) {
        let now = now_ms();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        let Some(ids) = sess.undo.take_if_open(now) else {
            return;
        };
        for id in &ids {
            sess.removed.remove(id);
        }
        let removed = sess.removed.clone();
        storage::save_removed(&self.data_dir, conversation_id, &removed);
        self.rebuild_view();
    }

    pub(super) fn delete_for_everyone(&mut self, conversation_id: &str, message_ids: Vec<String>) {
        // Only own messages can be retracted.
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        let message_ids: Vec<String> = message_ids
            .into_iter()
            .filter(|id| {
                sess.store
                    .get(id)
                    .map(|m| m.sender_id == sess.store.self_id() && !m.deleted_for_everyone)
                    .unwrap_or(false)
            })
            .collect();
        if message_ids.is_empty() {
            return;
        }

        if !self.network_enabled() {
            tracing::debug!(%conversation_id, "delete for everyone skipped offline");
            return;
        }
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = rest.delete_for_everyone(&conversation_id, &message_ids).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::DeleteForEveryoneResult {
                    conversation_id,
                    result,
                },
            )));
        });
    }

    pub(super) fn handle_delete_for_everyone_result(
        &mut self,
        conversation_id: String,
        result: Result<Vec<Message>, ApiError>,
    ) {
        match result {
            Ok(tombstones) => {
                if let Some(sess) = self.session_for(&conversation_id) {
                    for m in tombstones {
                        sess.store.apply_server_message(m);
                    }
                }
                self.rebuild_view();
            }
            Err(e) => {
                tracing::warn!(%conversation_id, %e, "delete for everyone failed");
                self.toast(format!("Could not delete: {e}"));
            }
        }
    }
}
