//! Local persisted state: per-conversation removed-message-id sets, clear
//! timestamps, draft text, and the same-device payment-lock marker. All
//! best-effort JSON side files in the data dir; a missing or corrupt file
//! degrades to the empty default, never an error.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const REMOVED_FILE: &str = "removed_messages.json";
const CLEARED_FILE: &str = "cleared_at.json";
const DRAFTS_FILE: &str = "drafts.json";
const PAYMENT_MARKER_FILE: &str = "payment_locks.json";

/// Same-device payment-lock fast path: every app handle sharing a data dir
/// sees this marker and can refuse contended checkouts without a round trip.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentMarker {
    pub owner_token: String,
    pub acquired_at: i64,
}

fn path(data_dir: &str, file: &str) -> PathBuf {
    Path::new(data_dir).join(file)
}

fn load_json<T: serde::de::DeserializeOwned + Default>(data_dir: &str, file: &str) -> T {
    let Ok(data) = std::fs::read_to_string(path(data_dir, file)) else {
        return T::default();
    };
    serde_json::from_str(&data).unwrap_or_default()
}

fn save_json<T: Serialize>(data_dir: &str, file: &str, value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        let _ = std::fs::write(path(data_dir, file), json);
    }
}

pub fn load_removed(data_dir: &str, conversation_id: &str) -> HashSet<String> {
    let all: HashMap<String, HashSet<String>> = load_json(data_dir, REMOVED_FILE);
    all.get(conversation_id).cloned().unwrap_or_default()
}

pub fn save_removed(data_dir: &str, conversation_id: &str, removed: &HashSet<String>) {
    let mut all: HashMap<String, HashSet<String>> = load_json(data_dir, REMOVED_FILE);
    if removed.is_empty() {
        all.remove(conversation_id);
    } else {
        all.insert(conversation_id.to_string(), removed.clone());
    }
    save_json(data_dir, REMOVED_FILE, &all);
}

pub fn load_cleared_at(data_dir: &str, conversation_id: &str) -> i64 {
    let all: HashMap<String, i64> = load_json(data_dir, CLEARED_FILE);
    all.get(conversation_id).copied().unwrap_or(0)
}

pub fn save_cleared_at(data_dir: &str, conversation_id: &str, cleared_at: i64) {
    let mut all: HashMap<String, i64> = load_json(data_dir, CLEARED_FILE);
    all.insert(conversation_id.to_string(), cleared_at);
    save_json(data_dir, CLEARED_FILE, &all);
}

pub fn load_draft(data_dir: &str, conversation_id: &str) -> String {
    let all: HashMap<String, String> = load_json(data_dir, DRAFTS_FILE);
    all.get(conversation_id).cloned().unwrap_or_default()
}

pub fn save_draft(data_dir: &str, conversation_id: &str, draft: &str) {
    let mut all: HashMap<String, String> = load_json(data_dir, DRAFTS_FILE);
    if draft.is_empty() {
        all.remove(conversation_id);
    } else {
        all.insert(conversation_id.to_string(), draft.to_string());
    }
    save_json(data_dir, DRAFTS_FILE, &all);
}

pub fn load_payment_marker(data_dir: &str, appointment_id: &str) -> Option<PaymentMarker> {
    let all: HashMap<String, PaymentMarker> = load_json(data_dir, PAYMENT_MARKER_FILE);
    all.get(appointment_id).cloned()
}

pub fn save_payment_marker(data_dir: &str, appointment_id: &str, marker: &PaymentMarker) {
    let mut all: HashMap<String, PaymentMarker> = load_json(data_dir, PAYMENT_MARKER_FILE);
    all.insert(appointment_id.to_string(), marker.clone());
    save_json(data_dir, PAYMENT_MARKER_FILE, &all);
}
