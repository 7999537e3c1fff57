//! Per-conversation message store and reconciliation engine.
//!
//! Merges three inputs into one canonical ordered log: authoritative REST
//! snapshots, locally-issued optimistic entries not yet confirmed, and push
//! events that may arrive out of order or more than once. Ordering is a
//! stable sort by timestamp ascending with arrival order breaking ties.

use std::collections::HashSet;

use crate::state::{Call, DeliveryState, Message, TimelineEntry, is_temp_id};

/// How far apart a server echo and an outstanding temp send may be and still
/// be considered the same logical message. The match is a heuristic; it goes
/// away once the backend accepts a client-supplied idempotency key.
pub const TEMP_MATCH_WINDOW_MS: i64 = 15_000;

#[derive(Clone, Debug)]
struct Entry {
    msg: Message,
    arrival: u64,
}

/// Pre-edit fields stashed for rollback of an optimistic edit.
#[derive(Clone, Debug)]
pub struct PriorEdit {
    pub body: String,
    pub edited: bool,
    pub edited_at: Option<i64>,
}

/// Pre-pin fields stashed for rollback of an optimistic pin.
#[derive(Clone, Debug)]
pub struct PriorPin {
    pub pinned: bool,
    pub pinned_by: Option<String>,
    pub pin_expires_at: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct ConversationStore {
    self_id: String,
    entries: Vec<Entry>,
    calls: Vec<Call>,
    arrival_seq: u64,
    /// Everything at or before this instant is hidden for this user.
    cleared_at: i64,
}

impl ConversationStore {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            entries: Vec::new(),
            calls: Vec::new(),
            arrival_seq: 0,
            cleared_at: 0,
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn cleared_at(&self) -> i64 {
        self.cleared_at
    }

    pub fn set_cleared_at(&mut self, at: i64) {
        if at > self.cleared_at {
            self.cleared_at = at;
        }
    }

    fn next_arrival(&mut self) -> u64 {
        self.arrival_seq += 1;
        self.arrival_seq
    }

    fn resort(&mut self) {
        self.entries
            .sort_by(|a, b| a.msg.timestamp.cmp(&b.msg.timestamp).then(a.arrival.cmp(&b.arrival)));
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.entries.iter().map(|e| &e.msg).find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.entries.iter_mut().map(|e| &mut e.msg).find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a locally-issued optimistic entry (state `Sending`).
    pub fn insert_local(&mut self, msg: Message) {
        debug_assert!(is_temp_id(&msg.id));
        let arrival = self.next_arrival();
        self.entries.push(Entry { msg, arrival });
        self.resort();
    }

    /// Server ack of a local send: swap the temp id for the canonical one in
    /// place, atomically. The entry keeps any delivery rank already advanced
    /// past the echo (a read receipt can beat the ack).
    pub fn confirm_send(&mut self, temp_id: &str, mut server: Message) -> bool {
        if server.delivery.rank() < DeliveryState::Sent.rank() {
            server.delivery = DeliveryState::Sent;
        }
        let Some(idx) = self.entries.iter().position(|e| e.msg.id == temp_id) else {
            // Ack for an entry we no longer hold (e.g. snapshot already
            // carried the confirmed message). Upsert keeps this idempotent.
            self.apply_server_message(server);
            return false;
        };
        let entry = &mut self.entries[idx];
        server.delivery = entry.msg.delivery.merged_with(&server.delivery);
        entry.msg = server;
        self.resort();
        true
    }

    pub fn fail_send(&mut self, temp_id: &str, reason: &str) {
        if let Some(m) = self.get_mut(temp_id) {
            if matches!(m.delivery, DeliveryState::Sending) {
                m.delivery = DeliveryState::Failed {
                    reason: reason.to_string(),
                };
            }
        }
    }

    /// Drop a failed optimistic entry (explicit user retry re-issues it).
    pub fn remove_failed(&mut self, temp_id: &str) -> Option<Message> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.msg.id == temp_id && matches!(e.msg.delivery, DeliveryState::Failed { .. }))?;
        Some(self.entries.remove(idx).msg)
    }

    /// Upsert from a push event or server echo.
    ///
    /// Known id: field-wise merge that never regresses delivery rank and only
    /// unions read receipts. Unseen id from self within the match window of an
    /// outstanding temp entry: treated as the echo of that send (temp swap).
    /// Anything else: append.
    pub fn apply_server_message(&mut self, incoming: Message) {
        if self.get(&incoming.id).is_some() {
            self.merge_known(incoming);
            return;
        }

        if incoming.sender_id == self.self_id {
            if let Some(temp_id) = self.match_outstanding_temp(&incoming) {
                self.confirm_send(&temp_id, incoming);
                return;
            }
        }

        let arrival = self.next_arrival();
        self.entries.push(Entry {
            msg: incoming,
            arrival,
        });
        self.resort();
    }

    fn match_outstanding_temp(&self, incoming: &Message) -> Option<String> {
        let candidates: Vec<&Message> = self
            .entries
            .iter()
            .map(|e| &e.msg)
            .filter(|m| {
                is_temp_id(&m.id)
                    && m.sender_id == incoming.sender_id
                    && matches!(m.delivery, DeliveryState::Sending)
                    && (incoming.timestamp - m.timestamp).abs() <= TEMP_MATCH_WINDOW_MS
            })
            .collect();
        // Prefer an exact body match; fall back to the oldest candidate.
        candidates
            .iter()
            .find(|m| m.body == incoming.body)
            .or_else(|| candidates.first())
            .map(|m| m.id.clone())
    }

    fn merge_known(&mut self, incoming: Message) {
        let Some(current) = self.get_mut(&incoming.id) else {
            return;
        };
        let delivery = current.delivery.merged_with(&incoming.delivery);
        let mut merged = incoming;
        merged.delivery = delivery;
        // Read receipts are additive; a stale event must not un-read.
        merged.read_by.extend(current.read_by.iter().cloned());
        merged.deleted_for.extend(current.deleted_for.iter().cloned());
        // Likewise stars: an echo raced by an in-flight star request must not
        // drop the optimistic star (StarResult carries no message to re-apply).
        merged.starred_by.extend(current.starred_by.iter().cloned());
        *current = merged;
        self.resort();
    }

    /// Delivery/read advancement for our outgoing messages, driven by scoped
    /// push events. Idempotent: replaying the same event is a no-op.
    pub fn advance_delivery(&mut self, message_ids: &[String], to: DeliveryState, by_user: &str) {
        for id in message_ids {
            if let Some(m) = self.get_mut(id) {
                m.delivery = m.delivery.merged_with(&to);
                if matches!(to, DeliveryState::Read) {
                    m.read_by.insert(by_user.to_string());
                }
            }
        }
    }

    /// Local optimistic read-marking for incoming messages. Returns the ids
    /// actually changed so a failed REST call can roll exactly those back.
    pub fn mark_read_local(&mut self, message_ids: &[String]) -> Vec<String> {
        let self_id = self.self_id.clone();
        let mut changed = Vec::new();
        for id in message_ids {
            if let Some(m) = self.get_mut(id) {
                if m.read_by.insert(self_id.clone()) {
                    changed.push(id.clone());
                }
            }
        }
        changed
    }

    pub fn unmark_read_local(&mut self, message_ids: &[String]) {
        let self_id = self.self_id.clone();
        for id in message_ids {
            if let Some(m) = self.get_mut(id) {
                m.read_by.remove(&self_id);
            }
        }
    }

    /// Incoming messages this user has not read yet (visible ones only).
    pub fn unread_incoming_ids(&self, removed: &HashSet<String>) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| &e.msg)
            .filter(|m| {
                m.sender_id != self.self_id
                    && !m.read_by.contains(&self.self_id)
                    && m.visible_to(&self.self_id)
                    && !removed.contains(&m.id)
                    && m.timestamp > self.cleared_at
            })
            .map(|m| m.id.clone())
            .collect()
    }

    /// Derived on every read; never cached, so it cannot drift.
    pub fn unread_count(&self, removed: &HashSet<String>) -> u32 {
        self.unread_incoming_ids(removed).len() as u32
    }

    /// Full REST refresh: server truth replaces all confirmed entries, then
    /// still-pending temp entries are re-attached so in-flight sends are not
    /// lost mid-flight. Locally-held delivery rank and read receipts survive
    /// a snapshot that has not caught up yet.
    pub fn apply_snapshot(&mut self, messages: Vec<Message>, calls: Vec<Call>) {
        let previous: Vec<Entry> = std::mem::take(&mut self.entries);
        let mut prior_confirmed: std::collections::HashMap<String, Message> =
            std::collections::HashMap::new();

        for entry in previous {
            if is_temp_id(&entry.msg.id) && !entry.msg.delivery.is_confirmed() {
                self.entries.push(entry);
            } else {
                prior_confirmed.insert(entry.msg.id.clone(), entry.msg);
            }
        }

        for mut msg in messages {
            // Locally-held delivery rank and read receipts survive a snapshot
            // the server produced before they landed.
            if let Some(old) = prior_confirmed.get(&msg.id) {
                msg.delivery = old.delivery.merged_with(&msg.delivery);
                msg.read_by.extend(old.read_by.iter().cloned());
            }
            self.apply_server_message(msg);
        }
        self.calls = calls;
        self.resort();
    }

    /// Optimistic local edit. Returns the prior body/edit fields so a failed
    /// REST call can revert exactly what it changed.
    pub fn apply_local_edit(&mut self, id: &str, body: &str, now_ms: i64) -> Option<PriorEdit> {
        let m = self.get_mut(id)?;
        let prior = PriorEdit {
            body: std::mem::replace(&mut m.body, body.to_string()),
            edited: m.edited,
            edited_at: m.edited_at,
        };
        m.edited = true;
        m.edited_at = Some(now_ms);
        Some(prior)
    }

    pub fn revert_local_edit(&mut self, id: &str, prior: PriorEdit) {
        if let Some(m) = self.get_mut(id) {
            m.body = prior.body;
            m.edited = prior.edited;
            m.edited_at = prior.edited_at;
        }
    }

    /// Toggle a reaction optimistically. Returns whether the reaction is now
    /// present (re-toggling reverts, which doubles as the rollback path).
    pub fn toggle_reaction_local(&mut self, id: &str, user_id: &str, emoji: &str) -> Option<bool> {
        let m = self.get_mut(id)?;
        if let Some(idx) = m
            .reactions
            .iter()
            .position(|r| r.user_id == user_id && r.emoji == emoji)
        {
            m.reactions.remove(idx);
            Some(false)
        } else {
            m.reactions.push(crate::state::Reaction {
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
            });
            Some(true)
        }
    }

    /// Star membership is purely additive/subtractive; returns true when the
    /// set actually changed (duplicate toggles are conflicts upstream).
    pub fn set_star_local(&mut self, id: &str, user_id: &str, starred: bool) -> bool {
        let Some(m) = self.get_mut(id) else {
            return false;
        };
        if starred {
            m.starred_by.insert(user_id.to_string())
        } else {
            m.starred_by.remove(user_id)
        }
    }

    /// Optimistic pin application; returns prior pin fields for rollback.
    pub fn set_pin_local(
        &mut self,
        id: &str,
        pinned_by: Option<String>,
        expires_at: Option<i64>,
    ) -> Option<PriorPin> {
        let m = self.get_mut(id)?;
        let prior = PriorPin {
            pinned: m.pinned,
            pinned_by: m.pinned_by.clone(),
            pin_expires_at: m.pin_expires_at,
        };
        m.pinned = expires_at.is_some();
        m.pinned_by = pinned_by;
        m.pin_expires_at = expires_at;
        Some(prior)
    }

    pub fn revert_local_pin(&mut self, id: &str, prior: PriorPin) {
        if let Some(m) = self.get_mut(id) {
            m.pinned = prior.pinned;
            m.pinned_by = prior.pinned_by;
            m.pin_expires_at = prior.pin_expires_at;
        }
    }

    /// Idempotent call upsert (push redelivery safe).
    pub fn upsert_call(&mut self, call: Call) {
        if let Some(existing) = self.calls.iter_mut().find(|c| c.id == call.id) {
            *existing = call;
        } else {
            self.calls.push(call);
        }
    }

    /// Visible timeline for this user: delete-for-me and cleared history are
    /// filtered out, tombstones stay, calls interleave by timestamp.
    pub fn visible_timeline(&self, removed: &HashSet<String>) -> Vec<TimelineEntry> {
        let mut out: Vec<TimelineEntry> = self
            .entries
            .iter()
            .map(|e| &e.msg)
            .filter(|m| {
                m.visible_to(&self.self_id)
                    && !removed.contains(&m.id)
                    && m.timestamp > self.cleared_at
            })
            .cloned()
            .map(TimelineEntry::Message)
            .collect();
        out.extend(
            self.calls
                .iter()
                .filter(|c| c.started_at > self.cleared_at)
                .cloned()
                .map(TimelineEntry::Call),
        );
        out.sort_by_key(|e| e.timestamp());
        out
    }

    /// Currently pinned messages: a pure TTL filter, nothing is deleted on
    /// expiry and no network call is involved.
    pub fn pinned_view(&self, removed: &HashSet<String>, now_ms: i64) -> Vec<Message> {
        self.entries
            .iter()
            .map(|e| &e.msg)
            .filter(|m| {
                m.pin_active(now_ms)
                    && m.visible_to(&self.self_id)
                    && !removed.contains(&m.id)
                    && m.timestamp > self.cleared_at
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{new_temp_id, test_message};

    fn store() -> ConversationStore {
        ConversationStore::new("buyer")
    }

    fn local_sending(ts: i64, body: &str) -> Message {
        let mut m = test_message(&new_temp_id(), "buyer", ts);
        m.body = body.to_string();
        m.delivery = DeliveryState::Sending;
        m
    }

    #[test]
    fn ordering_is_timestamp_then_arrival() {
        let mut s = store();
        s.apply_server_message(test_message("m2", "seller", 2_000));
        s.apply_server_message(test_message("m1", "seller", 1_000));
        // Tie on timestamp: arrival order wins.
        s.apply_server_message(test_message("m3", "seller", 2_000));

        let timeline = s.visible_timeline(&HashSet::new());
        let ids: Vec<&str> = timeline.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn server_echo_swaps_temp_id_without_duplication() {
        let mut s = store();
        let local = local_sending(1_000, "Hello");
        let temp_id = local.id.clone();
        s.insert_local(local);

        let mut echo = test_message("m1", "buyer", 1_050);
        echo.body = "Hello".to_string();
        s.apply_server_message(echo);

        assert_eq!(s.len(), 1);
        assert!(s.get(&temp_id).is_none());
        let confirmed = s.get("m1").unwrap();
        assert_eq!(confirmed.body, "Hello");
        assert_eq!(confirmed.delivery, DeliveryState::Sent);
    }

    #[test]
    fn echo_outside_window_appends_instead_of_swapping() {
        let mut s = store();
        s.insert_local(local_sending(1_000, "Hello"));

        let mut echo = test_message("m1", "buyer", 1_000 + TEMP_MATCH_WINDOW_MS + 1);
        echo.body = "Hello".to_string();
        s.apply_server_message(echo);

        assert_eq!(s.len(), 2);
    }

    #[test]
    fn echo_from_peer_never_matches_our_temp() {
        let mut s = store();
        s.insert_local(local_sending(1_000, "Hello"));
        let mut echo = test_message("m1", "seller", 1_010);
        echo.body = "Hello".to_string();
        s.apply_server_message(echo);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn body_match_is_preferred_when_several_temps_qualify() {
        let mut s = store();
        s.insert_local(local_sending(1_000, "first"));
        let second = local_sending(1_001, "second");
        let second_id = second.id.clone();
        s.insert_local(second);

        let mut echo = test_message("m9", "buyer", 1_005);
        echo.body = "second".to_string();
        s.apply_server_message(echo);

        assert!(s.get(&second_id).is_none());
        assert_eq!(s.len(), 2);
        assert_eq!(s.get("m9").unwrap().body, "second");
    }

    #[test]
    fn delivery_never_regresses() {
        let mut s = store();
        let mut m = test_message("m1", "buyer", 1_000);
        m.delivery = DeliveryState::Read;
        s.apply_server_message(m);

        // A late `delivered` event must not downgrade `read`.
        s.advance_delivery(&["m1".into()], DeliveryState::Delivered, "seller");
        assert_eq!(s.get("m1").unwrap().delivery, DeliveryState::Read);

        // Neither may a full-message echo carrying a lower rank.
        let mut stale = test_message("m1", "buyer", 1_000);
        stale.delivery = DeliveryState::Delivered;
        s.apply_server_message(stale);
        assert_eq!(s.get("m1").unwrap().delivery, DeliveryState::Read);
    }

    #[test]
    fn advance_delivery_is_idempotent() {
        let mut s = store();
        s.apply_server_message(test_message("m1", "buyer", 1_000));
        s.advance_delivery(&["m1".into()], DeliveryState::Read, "seller");
        let once = s.get("m1").unwrap().clone();
        s.advance_delivery(&["m1".into()], DeliveryState::Read, "seller");
        assert_eq!(s.get("m1").unwrap(), &once);
    }

    #[test]
    fn merge_keeps_optimistic_star_over_a_racing_echo() {
        let mut s = store();
        s.apply_server_message(test_message("m1", "seller", 1_000));
        assert!(s.set_star_local("m1", "buyer", true));

        // Echo produced before the star request landed server-side.
        let stale = test_message("m1", "seller", 1_000);
        assert!(stale.starred_by.is_empty());
        s.apply_server_message(stale);

        assert!(s.get("m1").unwrap().starred_by.contains("buyer"));
    }

    #[test]
    fn mark_read_local_reports_changes_and_rolls_back() {
        let mut s = store();
        s.apply_server_message(test_message("m1", "seller", 1_000));
        s.apply_server_message(test_message("m2", "seller", 2_000));

        let changed = s.mark_read_local(&["m1".into(), "m2".into()]);
        assert_eq!(changed.len(), 2);
        assert_eq!(s.unread_count(&HashSet::new()), 0);

        // Second marking is a no-op.
        assert!(s.mark_read_local(&["m1".into()]).is_empty());

        s.unmark_read_local(&changed);
        assert_eq!(s.unread_count(&HashSet::new()), 2);
    }

    #[test]
    fn unread_count_honors_the_invariant() {
        let mut s = store();
        s.apply_server_message(test_message("m1", "seller", 1_000));
        s.apply_server_message(test_message("m2", "seller", 2_000));
        s.apply_server_message(test_message("m3", "buyer", 3_000)); // own message
        let mut read = test_message("m4", "seller", 4_000);
        read.read_by.insert("buyer".to_string());
        s.apply_server_message(read);
        let mut hidden = test_message("m5", "seller", 5_000);
        hidden.deleted_for.insert("buyer".to_string());
        s.apply_server_message(hidden);

        assert_eq!(s.unread_count(&HashSet::new()), 2);

        // Removed-for-me set excludes.
        let removed: HashSet<String> = ["m2".to_string()].into_iter().collect();
        assert_eq!(s.unread_count(&removed), 1);

        // Cleared history excludes.
        s.set_cleared_at(1_500);
        assert_eq!(s.unread_count(&HashSet::new()), 1);
    }

    #[test]
    fn snapshot_replaces_confirmed_but_reattaches_pending() {
        let mut s = store();
        s.apply_server_message(test_message("m1", "seller", 1_000));
        let pending = local_sending(2_000, "in flight");
        let pending_id = pending.id.clone();
        s.insert_local(pending);

        s.apply_snapshot(
            vec![test_message("m1", "seller", 1_000), test_message("m2", "seller", 1_500)],
            vec![],
        );

        assert_eq!(s.len(), 3);
        assert!(s.get(&pending_id).is_some());
        assert_eq!(s.get(&pending_id).unwrap().delivery, DeliveryState::Sending);
    }

    #[test]
    fn snapshot_can_confirm_a_pending_send_by_echo() {
        let mut s = store();
        let pending = local_sending(2_000, "in flight");
        let pending_id = pending.id.clone();
        s.insert_local(pending);

        let mut echo = test_message("m2", "buyer", 2_010);
        echo.body = "in flight".to_string();
        s.apply_snapshot(vec![echo], vec![]);

        assert_eq!(s.len(), 1);
        assert!(s.get(&pending_id).is_none());
        assert_eq!(s.get("m2").unwrap().delivery, DeliveryState::Sent);
    }

    #[test]
    fn tombstone_merge_preserves_local_read_state() {
        let mut s = store();
        let mut m = test_message("m1", "buyer", 1_000);
        m.delivery = DeliveryState::Read;
        m.read_by.insert("seller".to_string());
        s.apply_server_message(m);

        // Tombstone produced before the read receipt caught up server-side.
        let mut tomb = test_message("m1", "buyer", 1_000);
        tomb.delivery = DeliveryState::Delivered;
        tomb.deleted_for_everyone = true;
        tomb.body = String::new();
        s.apply_server_message(tomb);

        assert_eq!(s.get("m1").unwrap().delivery, DeliveryState::Read);
        assert!(s.get("m1").unwrap().read_by.contains("seller"));
        assert!(s.get("m1").unwrap().deleted_for_everyone);
        assert!(s.get("m1").unwrap().body.is_empty());
    }

    #[test]
    fn failed_send_flags_and_retry_removes() {
        let mut s = store();
        let local = local_sending(1_000, "oops");
        let id = local.id.clone();
        s.insert_local(local);
        s.fail_send(&id, "network down");

        assert!(matches!(
            s.get(&id).unwrap().delivery,
            DeliveryState::Failed { .. }
        ));

        let removed = s.remove_failed(&id).unwrap();
        assert_eq!(removed.body, "oops");
        assert!(s.is_empty());
    }

    #[test]
    fn tombstone_stays_visible_while_delete_for_me_hides() {
        let mut s = store();
        let mut tomb = test_message("m1", "seller", 1_000);
        tomb.deleted_for_everyone = true;
        s.apply_server_message(tomb);
        let mut mine_hidden = test_message("m2", "seller", 2_000);
        mine_hidden.deleted_for.insert("buyer".to_string());
        s.apply_server_message(mine_hidden);

        let timeline = s.visible_timeline(&HashSet::new());
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].id(), "m1");
    }

    #[test]
    fn calls_interleave_by_timestamp() {
        let mut s = store();
        s.apply_server_message(test_message("m1", "seller", 1_000));
        s.apply_server_message(test_message("m2", "seller", 3_000));
        s.upsert_call(Call {
            id: "call1".to_string(),
            caller_id: "seller".to_string(),
            receiver_id: "buyer".to_string(),
            call_type: "video".to_string(),
            status: "ended".to_string(),
            duration_secs: 60,
            started_at: 2_000,
        });
        // Redelivered call event is an upsert, not a duplicate.
        s.upsert_call(Call {
            id: "call1".to_string(),
            caller_id: "seller".to_string(),
            receiver_id: "buyer".to_string(),
            call_type: "video".to_string(),
            status: "ended".to_string(),
            duration_secs: 61,
            started_at: 2_000,
        });

        let timeline = s.visible_timeline(&HashSet::new());
        let ids: Vec<&str> = timeline.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["m1", "call1", "m2"]);
    }

    #[test]
    fn pinned_view_filters_by_ttl_without_mutation() {
        let mut s = store();
        let mut pinned = test_message("m1", "seller", 1_000);
        pinned.pinned = true;
        pinned.pinned_by = Some("seller".to_string());
        // Pinned for 24 hours at T = 10_000.
        pinned.pin_expires_at = Some(10_000 + 24 * 3_600_000);
        s.apply_server_message(pinned);

        let t = 10_000;
        let none = HashSet::new();
        // Present at T + 23h59m.
        assert_eq!(s.pinned_view(&none, t + 23 * 3_600_000 + 59 * 60_000).len(), 1);
        // Absent at T + 24h01m, with the metadata untouched.
        assert!(s.pinned_view(&none, t + 24 * 3_600_000 + 60_000).is_empty());
        assert!(s.get("m1").unwrap().pinned);
    }
}
