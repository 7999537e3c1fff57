// Chat access lock: per-conversation password gate over the timeline.

use super::*;
use sha2::{Digest, Sha256};

fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl AppCore {
    pub(super) fn fetch_lock_status(&mut self, conversation_id: &str) {
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = rest.fetch_lock_status(&conversation_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::LockStateFetched {
                    conversation_id,
                    result,
                },
            )));
        });
    }

    pub(super) fn handle_lock_state_fetched(
        &mut self,
        conversation_id: String,
        result: Result<LockStatus, ApiError>,
    ) {
        match result {
            Ok(status) => {
                if let Some(sess) = self.session_for(&conversation_id) {
                    sess.lock = ChatLockState {
                        locked: status.locked,
                        access_granted: !status.locked || status.access_granted,
                    };
                }
                self.rebuild_view();
            }
            Err(e) => {
                // Leave the default-open lock in place rather than hiding a
                // timeline we cannot verify is locked.
                tracing::warn!(%conversation_id, %e, "lock status fetch failed");
            }
        }
    }

    pub(super) fn unlock_chat(&mut self, conversation_id: &str, password: &str) {
        if !self.network_enabled() {
            tracing::warn!(%conversation_id, "unlock requested offline");
            return;
        }
        if self.session_for(conversation_id).is_none() {
            return;
        }
        self.set_busy(|b| b.unlocking_chat = true);
        let digest = password_digest(password);
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = rest
                .unlock_conversation(&conversation_id, &digest)
                .await
                .map(|r| r.access_granted);
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::UnlockResult {
                conversation_id,
                result,
            })));
        });
    }

    pub(super) fn handle_unlock_result(
        &mut self,
        conversation_id: String,
        result: Result<bool, ApiError>,
    ) {
        self.set_busy(|b| b.unlocking_chat = false);
        match result {
            Ok(true) => {
                if let Some(sess) = self.session_for(&conversation_id) {
                    sess.lock.access_granted = true;
                }
                self.rebuild_view();
            }
            Ok(false) => {
                self.toast("Incorrect password".to_string());
            }
            Err(e) => {
                tracing::warn!(%conversation_id, %e, "unlock failed");
                self.toast(format!("Could not unlock: {e}"));
            }
        }
    }

    /// Forgot-password resets the lock at the cost of wiping the history.
    /// Refused unless the caller confirmed the wipe.
    pub(super) fn forgot_chat_password(&mut self, conversation_id: &str, confirm_wipe: bool) {
        if !confirm_wipe {
            self.toast("Resetting the password erases this chat's history".to_string());
            return;
        }
        if !self.network_enabled() {
            tracing::warn!(%conversation_id, "forgot password requested offline");
            return;
        }
        if self.session_for(conversation_id).is_none() {
            return;
        }
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = rest.forgot_lock_password(&conversation_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HistoryWiped {
                conversation_id,
                result,
            })));
        });
    }

    pub(super) fn handle_history_wiped(
        &mut self,
        conversation_id: String,
        result: Result<(), ApiError>,
    ) {
        match result {
            Ok(()) => {
                let self_id = self.self_id.clone();
                if let Some(sess) = self.session_for(&conversation_id) {
                    sess.store = ConversationStore::new(&self_id);
                    sess.removed.clear();
                    sess.lock = ChatLockState::open();
                    sess.hidden_older = None;
                    sess.unread_divider_at = None;
                    sess.scroll_target = None;
                }
                storage::save_removed(&self.data_dir, &conversation_id, &HashSet::new());
                storage::save_cleared_at(&self.data_dir, &conversation_id, 0);
                self.rebuild_view();
            }
            Err(e) => {
                tracing::warn!(%conversation_id, %e, "history wipe failed");
                self.toast(format!("Could not reset password: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::password_digest;

    #[test]
    fn digest_is_stable_hex() {
        let d = password_digest("hunter2");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(d, password_digest("hunter2"));
        assert_ne!(d, password_digest("hunter3"));
    }
}
