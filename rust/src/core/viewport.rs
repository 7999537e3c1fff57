// Scroll position tracking and history paging.

use super::*;

/// Within this many pixels of the end counts as "at the bottom".
const AT_BOTTOM_THRESHOLD_PX: f64 = 10.0;

impl AppCore {
    pub(super) fn viewport_changed(
        &mut self,
        conversation_id: &str,
        scroll_height: f64,
        scroll_top: f64,
        client_height: f64,
        user_initiated: bool,
    ) {
        let at_bottom = scroll_height - scroll_top - client_height < AT_BOTTOM_THRESHOLD_PX;
        let mut became_bottom = false;
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        if at_bottom && !sess.is_at_bottom {
            became_bottom = true;
        }
        sess.is_at_bottom = at_bottom;
        if user_initiated {
            // The divider and scroll request are one-shot; any manual scroll
            // dismisses both.
            sess.unread_divider_at = None;
            sess.scroll_target = None;
        }
        if at_bottom && (became_bottom || user_initiated) {
            self.trigger_mark_read(conversation_id);
        }
        self.rebuild_view();
    }

    pub(super) fn load_older_messages(&mut self, conversation_id: &str) {
        let page_size = self.page_size();
        let Some(sess) = self.session_for(conversation_id) else {
            return;
        };
        let Some(hidden) = sess.hidden_older else {
            return;
        };
        if hidden == 0 {
            return;
        }
        let new_hidden = hidden.saturating_sub(page_size);
        let delta = (hidden - new_hidden) as u32;
        sess.hidden_older = Some(new_hidden);
        sess.prepended_count += delta;
        // Indices into the window shift down by what was prepended.
        if let Some(idx) = sess.unread_divider_at.as_mut() {
            *idx += delta;
        }
        if let Some(idx) = sess.scroll_target.as_mut() {
            *idx += delta;
        }
        self.rebuild_view();
    }

    /// Rebuild the conversation projection and emit a fresh state snapshot.
    pub(super) fn rebuild_view(&mut self) {
        let page_size = self.page_size();
        let now = now_ms();
        self.state.conversation = self
            .session
            .as_mut()
            .map(|sess| sess.build_view(page_size, now));
        self.emit_state();
    }
}
