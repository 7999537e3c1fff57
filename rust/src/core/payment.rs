// Cross-session payment lock: a local marker file catches same-device
// double-opens without a round trip, the server lock covers other devices.
// Both tiers expire by TTL only; there is no explicit release.

use super::*;
use crate::core::storage::PaymentMarker;
use crate::state::CheckoutState;

impl AppCore {
    pub(super) fn begin_checkout(&mut self, appointment_id: &str) {
        if self.state.checkout.is_some() {
            return;
        }
        let now = now_ms();
        let ttl = self.payment_lock_ttl_ms();

        // Tier one: the marker file another session on this device wrote.
        if let Some(marker) = storage::load_payment_marker(&self.data_dir, appointment_id) {
            let foreign = marker.owner_token != self.payment_owner_token;
            if foreign && now < marker.acquired_at + ttl {
                tracing::info!(%appointment_id, "payment lock held by another local session");
                self.toast_checkout_conflict();
                return;
            }
        }

        if !self.network_enabled() {
            self.acquire_checkout(appointment_id, now);
            return;
        }

        // Tier two: the server lock.
        self.set_busy(|b| b.checking_payment_lock = true);
        let rest = self.rest.clone();
        let tx = self.core_sender.clone();
        let appointment_id = appointment_id.to_string();
        let owner_token = self.payment_owner_token.clone();
        self.runtime.spawn(async move {
            let result = match rest.payment_lock_status(&appointment_id).await {
                Ok(status) if Self::lock_held_by_other(&status, &owner_token) => Ok(status),
                Ok(_) => {
                    rest.payment_lock_initialize(&appointment_id, &owner_token, ttl)
                        .await
                }
                Err(e) => Err(e),
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::PaymentLockChecked {
                    appointment_id,
                    result,
                },
            )));
        });
    }

    fn lock_held_by_other(status: &PaymentLockStatus, owner_token: &str) -> bool {
        match (&status.owner_token, status.expires_at) {
            (Some(owner), Some(expires_at)) => {
                owner != owner_token && now_ms() < expires_at
            }
            _ => false,
        }
    }

    pub(super) fn handle_payment_lock_checked(
        &mut self,
        appointment_id: String,
        result: Result<PaymentLockStatus, ApiError>,
    ) {
        self.set_busy(|b| b.checking_payment_lock = false);
        match result {
            Ok(status) => {
                if Self::lock_held_by_other(&status, &self.payment_owner_token) {
                    self.toast_checkout_conflict();
                } else {
                    self.acquire_checkout(&appointment_id, now_ms());
                }
            }
            // A 409 from initialize means another device won the race after
            // our status check saw the lock free. That is the lock working,
            // not the lock service failing.
            Err(ApiError::Conflict(_)) => {
                tracing::info!(%appointment_id, "payment lock won by another session");
                self.toast_checkout_conflict();
            }
            Err(e) => {
                // A reachable-but-broken lock service must not block payment.
                // Fail open and let the backend's own idempotency guards catch
                // a true double charge.
                tracing::warn!(%appointment_id, %e, "payment lock check failed, proceeding");
                self.acquire_checkout(&appointment_id, now_ms());
            }
        }
    }

    fn acquire_checkout(&mut self, appointment_id: &str, now: i64) {
        storage::save_payment_marker(
            &self.data_dir,
            appointment_id,
            &PaymentMarker {
                owner_token: self.payment_owner_token.clone(),
                acquired_at: now,
            },
        );
        self.state.checkout = Some(CheckoutState {
            appointment_id: appointment_id.to_string(),
            owner_token: self.payment_owner_token.clone(),
            opened_at: now,
        });
        self.emit_state();
    }

    /// Closing checkout drops the view only. The marker and server lock are
    /// left to expire; releasing early would let a second session slip in
    /// while this one's payment request is still settling.
    pub(super) fn dismiss_checkout(&mut self) {
        if self.state.checkout.take().is_some() {
            self.emit_state();
        }
    }

    fn toast_checkout_conflict(&mut self) {
        self.toast("This appointment is being paid in another window".to_string());
    }
}
