mod access;
mod annotations;
pub(crate) mod config;
mod payment;
mod receipts;
mod removal;
mod session;
pub(crate) mod storage;
pub(crate) mod store;
mod viewport;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::events::PushEvent;
use crate::rest::{ApiError, ConversationSnapshot, LockStatus, PaymentLockStatus, RestClient};
use crate::state::{
    now_ms, AppointmentSummary, AppState, ChatLockState, ConversationViewState, DeliveryState,
    Message,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use removal::{BatchProgress, UndoLedger};
use session::ConversationSession;
use store::{ConversationStore, PriorEdit, PriorPin};

/// Single-threaded actor owning all conversation and checkout state. Every
/// mutation happens on the actor thread; REST calls run on the embedded tokio
/// runtime and report back as internal events.
pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    data_dir: String,
    self_id: String,
    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    rest: RestClient,

    /// Identifies this app instance in payment lock records. Fresh per
    /// process, so two windows of the same user still conflict.
    payment_owner_token: String,

    session: Option<ConversationSession>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        self_id: String,
        shared_state: Arc<RwLock<AppState>>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let rest = RestClient::new(config::api_base_url(&config));

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            data_dir,
            self_id,
            config,
            runtime,
            rest,
            payment_owner_token: uuid::Uuid::new_v4().to_string(),
            session: None,
        };

        // Ensure CallaApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    pub(crate) fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a rev-gap
        // resync via state() still shows it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut crate::state::BusyState)) {
        f(&mut self.state.busy);
        self.emit_state();
    }

    /// The open session, but only if it is the addressed conversation.
    /// Results for a conversation closed in the meantime fall through.
    fn session_for(&mut self, conversation_id: &str) -> Option<&mut ConversationSession> {
        self.session
            .as_mut()
            .filter(|s| s.conversation_id == conversation_id)
    }

    /// Mutating a conversation whose timeline is still behind the access
    /// lock is refused outright; a locked chat is read-nothing, write-nothing
    /// until the grant lands.
    fn timeline_writable(&mut self, conversation_id: &str) -> bool {
        match self.session_for(conversation_id) {
            Some(sess) if sess.lock.timeline_hidden() => {
                tracing::warn!(%conversation_id, "write refused while chat is locked");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: bodies, drafts and passwords
                // ride inside.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => {
                tracing::debug!(event = internal.tag(), "internal");
                self.handle_internal(*internal);
            }
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::OpenConversation {
                conversation_id,
                peer_id,
            } => self.open_conversation(&conversation_id, &peer_id),
            AppAction::CloseConversation => self.close_conversation(),

            AppAction::SendMessage {
                conversation_id,
                body,
                attachments,
                reply_to,
            } => self.send_message(&conversation_id, body, attachments, reply_to),
            AppAction::RetryMessage {
                conversation_id,
                message_id,
            } => self.retry_message(&conversation_id, &message_id),
            AppAction::EditMessage {
                conversation_id,
                message_id,
                body,
            } => self.edit_message(&conversation_id, &message_id, &body),
            AppAction::ToggleReaction {
                conversation_id,
                message_id,
                emoji,
            } => self.toggle_reaction(&conversation_id, &message_id, &emoji),

            AppAction::SetStarred {
                conversation_id,
                message_id,
                starred,
            } => self.set_starred(&conversation_id, &message_id, starred),
            AppAction::PinMessages {
                conversation_id,
                message_ids,
                duration,
            } => self.pin_messages(&conversation_id, message_ids, duration),
            AppAction::UnpinMessage {
                conversation_id,
                message_id,
            } => self.unpin_message(&conversation_id, &message_id),

            AppAction::DeleteForMe {
                conversation_id,
                message_ids,
            } => self.delete_for_me(&conversation_id, message_ids),
            AppAction::UndoDeleteForMe { conversation_id } => {
                self.undo_delete_for_me(&conversation_id)
            }
            AppAction::DeleteForEveryone {
                conversation_id,
                message_ids,
            } => self.delete_for_everyone(&conversation_id, message_ids),
            AppAction::ClearConversation { conversation_id } => {
                self.clear_conversation(&conversation_id)
            }

            AppAction::ViewportChanged {
                conversation_id,
                scroll_height,
                scroll_top,
                client_height,
                user_initiated,
            } => self.viewport_changed(
                &conversation_id,
                scroll_height,
                scroll_top,
                client_height,
                user_initiated,
            ),
            AppAction::LoadOlderMessages { conversation_id } => {
                self.load_older_messages(&conversation_id)
            }

            AppAction::SetDraft {
                conversation_id,
                text,
            } => self.set_draft(&conversation_id, text),

            AppAction::UnlockChat {
                conversation_id,
                password,
            } => self.unlock_chat(&conversation_id, &password),
            AppAction::ForgotChatPassword {
                conversation_id,
                confirm_wipe,
            } => self.forgot_chat_password(&conversation_id, confirm_wipe),

            AppAction::BeginCheckout { appointment_id } => self.begin_checkout(&appointment_id),
            AppAction::DismissCheckout => self.dismiss_checkout(),

            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::SnapshotFetched {
                conversation_id,
                result,
            } => self.handle_snapshot_fetched(conversation_id, result),
            InternalEvent::LockStateFetched {
                conversation_id,
                result,
            } => self.handle_lock_state_fetched(conversation_id, result),

            InternalEvent::SendResult {
                conversation_id,
                temp_id,
                result,
            } => self.handle_send_result(conversation_id, temp_id, result),
            InternalEvent::EditResult {
                conversation_id,
                message_id,
                result,
            } => self.handle_edit_result(conversation_id, message_id, result),
            InternalEvent::ReactionResult {
                conversation_id,
                message_id,
                emoji,
                result,
            } => self.handle_reaction_result(conversation_id, message_id, emoji, result),
            InternalEvent::MarkReadResult {
                conversation_id,
                message_ids,
                result,
            } => self.handle_mark_read_result(conversation_id, message_ids, result),

            InternalEvent::DeleteForEveryoneResult {
                conversation_id,
                result,
            } => self.handle_delete_for_everyone_result(conversation_id, result),
            InternalEvent::DeleteForMeResult {
                conversation_id,
                message_id,
                result,
            } => self.handle_delete_for_me_result(conversation_id, message_id, result),
            InternalEvent::ClearResult {
                conversation_id,
                result,
            } => self.handle_clear_result(conversation_id, result),

            InternalEvent::StarResult {
                conversation_id,
                message_id,
                starred,
                result,
            } => self.handle_star_result(conversation_id, message_id, starred, result),
            InternalEvent::PinResult {
                conversation_id,
                message_id,
                result,
            } => self.handle_pin_result(conversation_id, message_id, result),
            InternalEvent::UnpinResult {
                conversation_id,
                message_id,
                result,
            } => self.handle_unpin_result(conversation_id, message_id, result),

            InternalEvent::UnlockResult {
                conversation_id,
                result,
            } => self.handle_unlock_result(conversation_id, result),
            InternalEvent::HistoryWiped {
                conversation_id,
                result,
            } => self.handle_history_wiped(conversation_id, result),

            InternalEvent::PaymentLockChecked {
                appointment_id,
                result,
            } => self.handle_payment_lock_checked(appointment_id, result),

            InternalEvent::Push(event) => self.handle_push(event),

            InternalEvent::Toast(msg) => self.toast(msg),
        }
    }

    // Messaging.

    fn send_message(
        &mut self,
        conversation_id: &str,
        body: String,
        attachments: Vec<crate::state::Attachment>,
        reply_to: Option<String>,
    ) {
        if body.trim().is_empty() && attachments.is_empty() {
            self.toast("Cannot send an empty message".to_string());
            return;
        }
        if !self.timeline_writable(conversation_id) {
            return;
        }

        let temp_id = crate::state::new_temp_id();
        let timestamp = now_ms();
        let msg = Message {
            id: temp_id.clone(),
            conversation_id: conversation_id.to_string(),
            sender_id: self.self_id.clone(),
            body: body.clone(),
            attachments: attachments.clone(),
            timestamp,
            delivery: DeliveryState::Sending,
            read_by: BTreeSet::new(),
            starred_by: BTreeSet::new(),
            pinned: false,
            pinned_by: None,
            pin_expires_at: None,
            reactions: Vec::new(),
            reply_to: reply_to.clone(),
            deleted_for_everyone: false,
            deleted_for: BTreeSet::new(),
            edited: false,
            edited_at: None,
        };

        let network = self.network_enabled();
        if let Some(sess) = self.session_for(conversation_id) {
            sess.store.insert_local(msg);
            // Own sends snap the viewport to the bottom.
            let total = sess.store.visible_timeline(&sess.removed).len();
            let hidden = sess.hidden_older.unwrap_or(0).min(total);
            sess.scroll_target = (total - hidden).checked_sub(1).map(|i| i as u32);
            sess.is_at_bottom = true;
        }
        self.rebuild_view();

        if !network {
            // Stays in Sending until connectivity returns.
            return;
        }
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let new = crate::rest::NewMessage {
                body,
                attachments,
                reply_to,
                timestamp,
            };
            let result = rest.create_message(&conversation_id, &new).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendResult {
                conversation_id,
                temp_id,
                result,
            })));
        });
    }

    fn handle_send_result(
        &mut self,
        conversation_id: String,
        temp_id: String,
        result: Result<Message, ApiError>,
    ) {
        match result {
            Ok(server) => {
                if let Some(sess) = self.session_for(&conversation_id) {
                    sess.store.confirm_send(&temp_id, server);
                }
            }
            Err(e) => {
                tracing::warn!(%conversation_id, %temp_id, %e, "send failed");
                if let Some(sess) = self.session_for(&conversation_id) {
                    sess.store.fail_send(&temp_id, &e.to_string());
                }
                self.toast(format!("Message not sent: {e}"));
            }
        }
        self.rebuild_view();
    }

    /// A failed send is retried as a brand-new send under a fresh temp id,
    /// so a late ack for the old attempt can never double-apply.
    fn retry_message(&mut self, conversation_id: &str, message_id: &str) {
        if !self.timeline_writable(conversation_id) {
            return;
        }
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        let Some(failed) = sess.store.remove_failed(message_id) else {
            return;
        };
        self.send_message(
            conversation_id,
            failed.body,
            failed.attachments,
            failed.reply_to,
        );
    }

    fn edit_message(&mut self, conversation_id: &str, message_id: &str, body: &str) {
        if body.trim().is_empty() {
            self.toast("Cannot save an empty message".to_string());
            return;
        }
        if !self.timeline_writable(conversation_id) {
            return;
        }
        let network = self.network_enabled();
        let now = now_ms();
        let self_id = self.self_id.clone();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        // Only own confirmed messages can be edited.
        let editable = sess
            .store
            .get(message_id)
            .map(|m| m.sender_id == self_id && m.delivery.is_confirmed() && !m.deleted_for_everyone)
            .unwrap_or(false);
        if !editable {
            return;
        }
        let Some(prior) = sess.store.apply_local_edit(message_id, body, now) else {
            return;
        };
        sess.pending_edits.insert(message_id.to_string(), prior);
        self.rebuild_view();

        if !network {
            return;
        }
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        let message_id = message_id.to_string();
        let body = body.to_string();
        self.runtime.spawn(async move {
            let result = rest.edit_message(&conversation_id, &message_id, &body).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::EditResult {
                conversation_id,
                message_id,
                result,
            })));
        });
    }

    fn handle_edit_result(
        &mut self,
        conversation_id: String,
        message_id: String,
        result: Result<Message, ApiError>,
    ) {
        let mut toast = None;
        if let Some(sess) = self.session_for(&conversation_id) {
            match result {
                Ok(server) => {
                    sess.pending_edits.remove(&message_id);
                    sess.store.apply_server_message(server);
                }
                Err(e) => {
                    tracing::warn!(%conversation_id, %message_id, %e, "edit failed");
                    if let Some(prior) = sess.pending_edits.remove(&message_id) {
                        sess.store.revert_local_edit(&message_id, prior);
                    }
                    toast = Some(format!("Could not edit: {e}"));
                }
            }
        }
        if let Some(t) = toast {
            self.toast(t);
        }
        self.rebuild_view();
    }

    fn toggle_reaction(&mut self, conversation_id: &str, message_id: &str, emoji: &str) {
        if !self.timeline_writable(conversation_id) {
            return;
        }
        let network = self.network_enabled();
        let self_id = self.self_id.clone();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        if sess
            .store
            .toggle_reaction_local(message_id, &self_id, emoji)
            .is_none()
        {
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
        let emoji = emoji.to_string();
        self.runtime.spawn(async move {
            let result = rest
                .toggle_reaction(&conversation_id, &message_id, &emoji)
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ReactionResult {
                conversation_id,
                message_id,
                emoji,
                result,
            })));
        });
    }

    fn handle_reaction_result(
        &mut self,
        conversation_id: String,
        message_id: String,
        emoji: String,
        result: Result<Message, ApiError>,
    ) {
        let self_id = self.self_id.clone();
        let mut toast = None;
        if let Some(sess) = self.session_for(&conversation_id) {
            match result {
                Ok(server) => sess.store.apply_server_message(server),
                Err(e) => {
                    tracing::warn!(%conversation_id, %message_id, %e, "reaction failed");
                    // Toggling back is the rollback.
                    sess.store
                        .toggle_reaction_local(&message_id, &self_id, &emoji);
                    toast = Some(format!("Could not react: {e}"));
                }
            }
        }
        if let Some(t) = toast {
            self.toast(t);
        }
        self.rebuild_view();
    }
}
