mod actions;
mod core;
mod events;
mod logging;
mod rest;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use events::PushEvent;
pub use rest::{ApiError, ConversationSnapshot, LockStatus, PaymentLockStatus};
pub use state::*;
pub use updates::*;

/// Host-side listener for the update stream. Implemented by the render layer;
/// `reconcile` is called from a dedicated thread, never the actor thread.
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle to the conversation engine. Cheap to clone via `Arc`; all methods
/// are non-blocking. One actor thread owns the state, `dispatch` enqueues
/// intents, `listen_for_updates` streams snapshots back.
pub struct CallaApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl CallaApp {
    /// `self_user_id` is the authenticated user; auth itself happens in the
    /// host shell before the engine is constructed.
    pub fn new(data_dir: String, self_user_id: String) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "CallaApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                self_user_id,
                shared_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Feed one raw frame from the host's push transport into the engine.
    /// Unknown or malformed frames are dropped here, at the boundary; nothing
    /// downstream ever sees an unvalidated event.
    pub fn ingest_push_frame(&self, raw: &str) {
        match events::parse_push_frame(raw) {
            Ok(event) => {
                let _ = self
                    .core_tx
                    .send(CoreMsg::Internal(Box::new(InternalEvent::Push(event))));
            }
            Err(e) => {
                tracing::warn!(%e, "dropping unparseable push frame");
            }
        }
    }
}

impl CallaApp {
    /// Test seam: feed the actor an internal event as if a spawned side
    /// effect had produced it.
    #[doc(hidden)]
    pub fn inject_internal_for_tests(&self, event: InternalEvent) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(event)));
    }
}
