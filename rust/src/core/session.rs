// Conversation session lifecycle + push routing.

use super::*;

/// Everything the open conversation owns: the store, lock flags, removal and
/// undo bookkeeping, and viewport state. Constructed per conversation and
/// destroyed on close.
pub(super) struct ConversationSession {
    pub(super) conversation_id: String,
    pub(super) peer_id: String,
    pub(super) store: ConversationStore,
    pub(super) removed: HashSet<String>,
    pub(super) undo: UndoLedger,
    pub(super) lock: ChatLockState,
    pub(super) draft: String,

    // Viewport bookkeeping. `hidden_older` is how many visible entries fall
    // before the rendered window; None until the first view build.
    pub(super) hidden_older: Option<usize>,
    pub(super) is_at_bottom: bool,
    pub(super) unread_divider_at: Option<u32>,
    pub(super) scroll_target: Option<u32>,
    pub(super) prepended_count: u32,

    // Single-flight read marking (duplicate triggers collapse into one call).
    pub(super) mark_read_in_flight: bool,
    pub(super) mark_read_dirty: bool,

    // Rollback stashes for optimistic edits/pins keyed by message id.
    pub(super) pending_edits: HashMap<String, PriorEdit>,
    pub(super) pending_pins: HashMap<String, PriorPin>,

    // Bulk operations report per-item outcomes; these tally them.
    pub(super) delete_batch: Option<BatchProgress>,
    pub(super) pin_batch: Option<BatchProgress>,

    pub(super) typing_peers: BTreeSet<String>,
    pub(super) peer_online: Option<bool>,
    pub(super) latest_appointment: Option<AppointmentSummary>,
}

impl ConversationSession {
    pub(super) fn new(
        conversation_id: &str,
        peer_id: &str,
        self_id: &str,
        data_dir: &str,
    ) -> Self {
        let mut store = ConversationStore::new(self_id);
        store.set_cleared_at(storage::load_cleared_at(data_dir, conversation_id));
        Self {
            conversation_id: conversation_id.to_string(),
            peer_id: peer_id.to_string(),
            store,
            removed: storage::load_removed(data_dir, conversation_id),
            undo: UndoLedger::default(),
            lock: ChatLockState::open(),
            draft: storage::load_draft(data_dir, conversation_id),
            hidden_older: None,
            is_at_bottom: true,
            unread_divider_at: None,
            scroll_target: None,
            prepended_count: 0,
            mark_read_in_flight: false,
            mark_read_dirty: false,
            pending_edits: HashMap::new(),
            pending_pins: HashMap::new(),
            delete_batch: None,
            pin_batch: None,
            typing_peers: BTreeSet::new(),
            peer_online: None,
            latest_appointment: None,
        }
    }

    /// Project the session into what the render layer should show. The store
    /// stays authoritative; this derives, never mutates message state.
    pub(super) fn build_view(&mut self, page_size: usize, now_ms: i64) -> ConversationViewState {
        let timeline = self.store.visible_timeline(&self.removed);
        let total = timeline.len();

        let hidden = match self.hidden_older {
            Some(h) => h.min(total),
            None => {
                let h = total.saturating_sub(page_size);
                self.hidden_older = Some(h);
                h
            }
        };

        let timeline_hidden = self.lock.timeline_hidden();
        let entries = if timeline_hidden {
            Vec::new()
        } else {
            timeline[hidden..].to_vec()
        };
        let pinned = if timeline_hidden {
            Vec::new()
        } else {
            self.store.pinned_view(&self.removed, now_ms)
        };

        ConversationViewState {
            conversation_id: self.conversation_id.clone(),
            peer_id: self.peer_id.clone(),
            entries,
            pinned,
            unread_count: self.store.unread_count(&self.removed),
            unread_divider_at: self.unread_divider_at,
            scroll_target: self.scroll_target,
            is_at_bottom: self.is_at_bottom,
            can_load_older: !timeline_hidden && hidden > 0,
            prepended_count: std::mem::take(&mut self.prepended_count),
            draft: self.draft.clone(),
            lock: self.lock.clone(),
            typing_peers: self.typing_peers.iter().cloned().collect(),
            peer_online: self.peer_online,
            latest_appointment: self.latest_appointment.clone(),
        }
    }
}

impl AppCore {
    pub(super) fn open_conversation(&mut self, conversation_id: &str, peer_id: &str) {
        // Reopening the same conversation is a refresh, not a reset.
        if self
            .session
            .as_ref()
            .map(|s| s.conversation_id != conversation_id)
            .unwrap_or(false)
        {
            self.close_conversation();
        }
        if self.session.is_none() {
            self.session = Some(ConversationSession::new(
                conversation_id,
                peer_id,
                &self.self_id,
                &self.data_dir,
            ));
        }

        if !self.network_enabled() {
            self.rebuild_view();
            return;
        }

        self.set_busy(|b| b.opening_conversation = true);
        self.fetch_snapshot(conversation_id);
        self.fetch_lock_status(conversation_id);
        self.rebuild_view();
    }

    pub(super) fn close_conversation(&mut self) {
        let Some(sess) = self.session.take() else {
            return;
        };
        storage::save_draft(&self.data_dir, &sess.conversation_id, &sess.draft);

        // The access grant is session-scoped; tell the server to reset it.
        if self.network_enabled() && sess.lock.locked {
            let rest = self.rest.clone();
            let conversation_id = sess.conversation_id.clone();
            self.runtime.spawn(async move {
                if let Err(e) = rest.reset_access(&conversation_id).await {
                    tracing::debug!(%conversation_id, %e, "access reset failed");
                }
            });
        }

        self.state.conversation = None;
        self.emit_state();
    }

    fn fetch_snapshot(&mut self, conversation_id: &str) {
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = rest.fetch_conversation(&conversation_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SnapshotFetched {
                conversation_id,
                result,
            })));
        });
    }

    pub(super) fn handle_snapshot_fetched(
        &mut self,
        conversation_id: String,
        result: Result<ConversationSnapshot, ApiError>,
    ) {
        self.set_busy(|b| b.opening_conversation = false);
        let snapshot = match result {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%conversation_id, %e, "snapshot fetch failed");
                self.toast(format!("Could not load conversation: {e}"));
                return;
            }
        };
        let page_size = self.page_size();
        let Some(sess) = self.session_for(&conversation_id) else {
            return;
        };

        if let Some(cleared_at) = snapshot.cleared_at {
            sess.store.set_cleared_at(cleared_at);
        }
        sess.store.apply_snapshot(snapshot.messages, snapshot.calls);

        // Opening with unread scrolls to the first unread entry and shows a
        // one-shot divider; both die on the first manual scroll.
        let unread = sess.store.unread_count(&sess.removed) as usize;
        let total = sess.store.visible_timeline(&sess.removed).len();
        if unread > 0 {
            let divider_global = total.saturating_sub(unread);
            let hidden = divider_global.min(total.saturating_sub(page_size));
            sess.hidden_older = Some(hidden);
            let idx = (divider_global - hidden) as u32;
            sess.unread_divider_at = Some(idx);
            sess.scroll_target = Some(idx);
            sess.is_at_bottom = false;
        } else {
            // Fresh paging window over the new snapshot, pinned to the end.
            sess.hidden_older = None;
            let window = total.min(page_size);
            sess.scroll_target = window.checked_sub(1).map(|i| i as u32);
        }

        self.rebuild_view();
    }

    /// Route a validated push event. Everything here must tolerate
    /// redelivery: each handler is an upsert, a set-union, or a max-merge.
    pub(super) fn handle_push(&mut self, event: PushEvent) {
        tracing::debug!(event = event.tag(), "push");

        if let PushEvent::OnlineStatus { user_id, online } = &event {
            if let Some(sess) = self.session.as_mut() {
                if sess.peer_id == *user_id {
                    sess.peer_online = Some(*online);
                    self.rebuild_view();
                }
            }
            return;
        }

        // Conversation-scoped events only matter for the open conversation;
        // anything else would be list-level plumbing outside the engine.
        let Some(conversation_id) = event.conversation_id().map(String::from) else {
            return;
        };
        if self.session_for(&conversation_id).is_none() {
            return;
        }

        match event {
            PushEvent::CommentUpdated { message, .. } => {
                let from_self = message.sender_id == self.self_id;
                let at_bottom = self
                    .session
                    .as_ref()
                    .map(|s| s.is_at_bottom)
                    .unwrap_or(false);
                if let Some(sess) = self.session.as_mut() {
                    sess.store.apply_server_message(message);
                    if from_self || at_bottom {
                        let total = sess.store.visible_timeline(&sess.removed).len();
                        let hidden = sess.hidden_older.unwrap_or(0).min(total);
                        sess.scroll_target = (total - hidden).checked_sub(1).map(|i| i as u32);
                    }
                }
                if !from_self && at_bottom {
                    self.trigger_mark_read(&conversation_id);
                }
                self.rebuild_view();
            }
            PushEvent::MessageDelivered {
                message_ids,
                user_id,
                ..
            } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.store
                        .advance_delivery(&message_ids, DeliveryState::Delivered, &user_id);
                }
                self.rebuild_view();
            }
            PushEvent::MessageRead {
                message_ids,
                user_id,
                ..
            } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.store
                        .advance_delivery(&message_ids, DeliveryState::Read, &user_id);
                    if user_id == self.self_id {
                        // Another session of ours read these.
                        sess.store.mark_read_local(&message_ids);
                    }
                }
                self.rebuild_view();
            }
            PushEvent::ClearedForUser {
                user_id, cleared_at, ..
            } => {
                if user_id == self.self_id {
                    if let Some(sess) = self.session.as_mut() {
                        sess.store.set_cleared_at(cleared_at);
                        sess.hidden_older = None;
                    }
                    storage::save_cleared_at(&self.data_dir, &conversation_id, cleared_at);
                    self.rebuild_view();
                }
            }
            PushEvent::RemovedForUser {
                user_id,
                message_ids,
                ..
            } => {
                if user_id == self.self_id {
                    if let Some(sess) = self.session.as_mut() {
                        sess.removed.extend(message_ids);
                        let removed = sess.removed.clone();
                        storage::save_removed(&self.data_dir, &conversation_id, &removed);
                    }
                    self.rebuild_view();
                }
            }
            PushEvent::AppointmentCreated {
                appointment_id,
                status,
                ..
            }
            | PushEvent::AppointmentUpdated {
                appointment_id,
                status,
                ..
            } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.latest_appointment = Some(AppointmentSummary {
                        appointment_id,
                        status,
                    });
                }
                self.rebuild_view();
            }
            PushEvent::CallEnded { call, .. } => {
                if let Some(sess) = self.session.as_mut() {
                    sess.store.upsert_call(call);
                }
                self.rebuild_view();
            }
            PushEvent::Typing {
                user_id, is_typing, ..
            } => {
                if let Some(sess) = self.session.as_mut() {
                    if is_typing {
                        sess.typing_peers.insert(user_id);
                    } else {
                        sess.typing_peers.remove(&user_id);
                    }
                }
                self.rebuild_view();
            }
            PushEvent::OnlineStatus { .. } => unreachable!("handled above"),
        }
    }

    pub(super) fn clear_conversation(&mut self, conversation_id: &str) {
        if self.session_for(conversation_id).is_none() {
            return;
        }
        if !self.network_enabled() {
            self.apply_clear(conversation_id, now_ms());
            return;
        }
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let conversation_id = conversation_id.to_string();
        self.runtime.spawn(async move {
            let result = rest
                .clear_conversation(&conversation_id)
                .await
                .map(|r| r.cleared_at);
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ClearResult {
                conversation_id,
                result,
            })));
        });
    }

    pub(super) fn handle_clear_result(
        &mut self,
        conversation_id: String,
        result: Result<i64, ApiError>,
    ) {
        match result {
            Ok(cleared_at) => self.apply_clear(&conversation_id, cleared_at),
            Err(e) => {
                tracing::warn!(%conversation_id, %e, "clear failed");
                self.toast(format!("Could not clear conversation: {e}"));
            }
        }
    }

    fn apply_clear(&mut self, conversation_id: &str, cleared_at: i64) {
        if let Some(sess) = self.session_for(conversation_id) {
            sess.store.set_cleared_at(cleared_at);
            sess.hidden_older = None;
            sess.unread_divider_at = None;
        }
        storage::save_cleared_at(&self.data_dir, conversation_id, cleared_at);
        self.rebuild_view();
    }

    pub(super) fn set_draft(&mut self, conversation_id: &str, text: String) {
        if let Some(sess) = self.session_for(conversation_id) {
            sess.draft = text.clone();
        }
        storage::save_draft(&self.data_dir, conversation_id, &text);
        // Draft edits are high-frequency; skip the state emit, the host
        // already owns the input field.
    }
}
