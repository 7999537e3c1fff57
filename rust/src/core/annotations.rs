// Star, pin and unpin. All optimistic: the local change lands first, a
// failed REST call rolls back exactly what it changed.

use super::*;
use crate::state::PinDuration;

impl AppCore {
    pub(super) fn set_starred(&mut self, conversation_id: &str, message_id: &str, starred: bool) {
        let network = self.network_enabled();
        let self_id = self.self_id.clone();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        if !sess.store.set_star_local(message_id, &self_id, starred) {
            // No change means a duplicate toggle; nothing to sync.
            return;
        }
        self.rebuild_view();

        if !network {
            return;
        }
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();
        self.runtime.spawn(async move {
            let result = rest
                .set_starred(&conversation_id, &message_id, starred)
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::StarResult {
                conversation_id,
                message_id,
                starred,
                result,
            })));
        });
    }

    pub(super) fn handle_star_result(
        &mut self,
        conversation_id: String,
        message_id: String,
        starred: bool,
        result: Result<(), ApiError>,
    ) {
        let Err(e) = result else {
            return;
        };
        tracing::warn!(%conversation_id, %message_id, %e, "star update failed");
        let self_id = self.self_id.clone();
        if let Some(sess) = self.session_for(&conversation_id) {
            sess.store.set_star_local(&message_id, &self_id, !starred);
        }
        self.toast(format!("Could not update star: {e}"));
        self.rebuild_view();
    }

    pub(super) fn pin_messages(
        &mut self,
        conversation_id: &str,
        message_ids: Vec<String>,
        duration: PinDuration,
    ) {
        let network = self.network_enabled();
        let self_id = self.self_id.clone();
        let now = now_ms();
        let expires_at = now + duration.as_ms();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };

        let mut applied = Vec::new();
        for id in message_ids {
            if let Some(prior) =
                sess.store
                    .set_pin_local(&id, Some(self_id.clone()), Some(expires_at))
            {
                sess.pending_pins.insert(id.clone(), prior);
                applied.push(id);
            }
        }
        if applied.is_empty() {
            return;
        }
        self.rebuild_view();

        if !network {
            return;
        }
        if let Some(sess) = self.session_for(conversation_id) {
            sess.pin_batch = Some(BatchProgress::new(applied.len()));
        }
        for message_id in applied {
            let rest = self.rest.clone();
            let tx = self.core_sender.clone();
            let conversation_id = conversation_id.to_string();
            let hours = duration.as_hours();
            self.runtime.spawn(async move {
                let result = rest.pin_message(&conversation_id, &message_id, hours).await;
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::PinResult {
                    conversation_id,
                    message_id,
                    result,
                })));
            });
        }
    }

    pub(super) fn handle_pin_result(
        &mut self,
        conversation_id: String,
        message_id: String,
        result: Result<Message, ApiError>,
    ) {
        let ok = result.is_ok();
        let mut toast = None;
        if let Some(sess) = self.session_for(&conversation_id) {
            match result {
                Ok(server) => {
                    sess.pending_pins.remove(&message_id);
                    // Server-stamped expiry wins over our local estimate.
                    sess.store.apply_server_message(server);
                }
                Err(e) => {
                    tracing::warn!(%conversation_id, %message_id, %e, "pin failed");
                    if let Some(prior) = sess.pending_pins.remove(&message_id) {
                        sess.store.revert_local_pin(&message_id, prior);
                    }
                }
            }
            if let Some(batch) = sess.pin_batch.as_mut() {
                if let Some(failed) = batch.settle(ok) {
                    sess.pin_batch = None;
                    if failed > 0 {
                        toast = Some(format!("{failed} message(s) could not be pinned"));
                    }
                }
            }
        }
        if let Some(t) = toast {
            self.toast(t);
        }
        self.rebuild_view();
    }

    pub(super) fn unpin_message(&mut self, conversation_id: &str, message_id: &str) {
        let network = self.network_enabled();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        let Some(prior) = sess.store.set_pin_local(message_id, None, None) else {
            return;
        };
        sess.pending_pins.insert(message_id.to_string(), prior);
        self.rebuild_view();

        if !network {
            return;
        }
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();
        self.runtime.spawn(async move {
            let result = rest.unpin_message(&conversation_id, &message_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::UnpinResult {
                conversation_id,
                message_id,
                result,
            })));
        });
    }

    pub(super) fn handle_unpin_result(
        &mut self,
        conversation_id: String,
        message_id: String,
        result: Result<Message, ApiError>,
    ) {
        let mut toast = None;
        if let Some(sess) = self.session_for(&conversation_id) {
            match result {
                Ok(server) => {
                    sess.pending_pins.remove(&message_id);
                    sess.store.apply_server_message(server);
                }
                Err(e) => {
                    tracing::warn!(%conversation_id, %message_id, %e, "unpin failed");
                    if let Some(prior) = sess.pending_pins.remove(&message_id) {
                        sess.store.revert_local_pin(&message_id, prior);
                    }
                    toast = Some(format!("Could not unpin: {e}"));
                }
            }
        }
        if let Some(t) = toast {
            self.toast(t);
        }
        self.rebuild_view();
    }
}
