// Read-receipt marking with a single-flight guard.

use super::*;

impl AppCore {
    /// Mark every visible unread incoming message as read, locally at once
    /// and remotely at most one request at a time. Triggers that arrive while
    /// a request is in flight set a dirty bit and are coalesced into one
    /// follow-up pass.
    pub(super) fn trigger_mark_read(&mut self, conversation_id: &str) {
        let network = self.network_enabled();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        if sess.lock.timeline_hidden() {
            return;
        }
        if sess.mark_read_in_flight {
            sess.mark_read_dirty = true;
            return;
        }

        let unread = sess.store.unread_incoming_ids(&sess.removed);
        if unread.is_empty() {
            return;
        }
        let changed = sess.store.mark_read_local(&unread);
        if changed.is_empty() {
            return;
        }

        if !network {
            self.rebuild_view();
            return;
        }

        sess.mark_read_in_flight = true;
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = rest.mark_read(&conversation_id, &changed).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::MarkReadResult {
                    conversation_id,
                    message_ids: changed,
                    result,
                },
            )));
        });
        self.rebuild_view();
    }

    pub(super) fn handle_mark_read_result(
        &mut self,
        conversation_id: String,
        message_ids: Vec<String>,
        result: Result<(), ApiError>,
    ) {
        let mut rerun = false;
        if let Some(sess) = self.session_for(&conversation_id) {
            sess.mark_read_in_flight = false;
            match result {
                Ok(()) => {
                    rerun = std::mem::take(&mut sess.mark_read_dirty);
                }
                Err(e) => {
                    // Roll back so the messages count as unread again and a
                    // later trigger retries them.
                    sess.store.unmark_read_local(&message_ids);
                    sess.mark_read_dirty = false;
                    tracing::warn!(%conversation_id, %e, "mark read failed");
                }
            }
        }
        if rerun {
            self.trigger_mark_read(&conversation_id);
        }
        self.rebuild_view();
    }
}
