//! WASM bindings for browser environment
//!
//! This module provides:
//! - StorageBackend implementation over the browser's `localStorage`
//! - Seal / open / digest operations exposed to JavaScript
//! - Local mail store API (save, inbox, outbox, lookup by hash)
//!
//! Directory lookups and registration stay in the JS host, which talks to the
//! chain through the wallet provider and passes identifiers in.

use std::cell::RefCell;

use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use crate::backend::{StorageBackend, StorageError};
use crate::codec::Message;
use crate::config::{format_ether, MailConfig};
use crate::envelope::{open, seal_with_limits};
use crate::identifier::Identifier;
use crate::mailer::{format_age, MailView};
use crate::store::{EncryptedRecord, MailStore};

// ============================================================
// LOCAL STORAGE BACKEND (JS Imports)
// ============================================================

#[wasm_bindgen]
extern "C" {
    /// Read a value, null if absent
    #[wasm_bindgen(js_namespace = localStorage, js_name = "getItem", catch)]
    fn js_get_item(key: &str) -> Result<Option<String>, JsValue>;

    /// Replace a value; throws QuotaExceededError when full
    #[wasm_bindgen(js_namespace = localStorage, js_name = "setItem", catch)]
    fn js_set_item(key: &str, value: &str) -> Result<(), JsValue>;

    /// Log to console (for debugging)
    #[wasm_bindgen(js_namespace = console, js_name = "log")]
    fn js_log(s: &str);
}

/// Public log function for debugging from other modules
pub fn log(s: &str) {
    js_log(s);
}

fn storage_error(e: JsValue) -> StorageError {
    let text = format!("{:?}", e);
    if text.contains("QuotaExceeded") {
        StorageError::QuotaExceeded
    } else {
        StorageError::Unavailable(text)
    }
}

/// `localStorage`-backed StorageBackend
#[derive(Clone, Copy, Default)]
pub struct JsLocalStorage;

impl StorageBackend for JsLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        js_get_item(key).map_err(storage_error)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        js_set_item(key, value).map_err(storage_error)
    }
}

// ============================================================
// GLOBAL MAIL STORE
// ============================================================

thread_local! {
    static CONFIG: RefCell<MailConfig> = RefCell::new(MailConfig::default());
    static MAIL_STORE: RefCell<Option<MailStore<JsLocalStorage>>> = RefCell::new(None);
}

fn ensure_store() {
    MAIL_STORE.with(|cell| {
        if cell.borrow().is_none() {
            let key = CONFIG.with(|c| c.borrow().storage_key.clone());
            *cell.borrow_mut() = Some(MailStore::new(JsLocalStorage, key));
        }
    });
}

fn with_store<T>(f: impl FnOnce(&mut MailStore<JsLocalStorage>) -> T) -> Option<T> {
    ensure_store();
    MAIL_STORE.with(|cell| cell.borrow_mut().as_mut().map(f))
}

fn view_to_json(view: &MailView) -> Value {
    match view {
        MailView::Opened { digest, created_at, message } => json!({
            "hash": digest,
            "timestamp": created_at,
            "from": message.sender,
            "to": message.recipient,
            "subject": message.subject,
            "body": message.body,
            "decrypted": true,
        }),
        MailView::Undecryptable { digest, created_at, sender, recipient, error } => json!({
            "hash": digest,
            "timestamp": created_at,
            "from": sender,
            "to": recipient,
            "subject": view.subject(),
            "body": view.body(),
            "decrypted": false,
            "error": error.to_string(),
        }),
    }
}

fn views_to_json(records: Vec<EncryptedRecord>) -> String {
    let views: Vec<Value> = records
        .into_iter()
        .map(|record| view_to_json(&MailView::from_record(record)))
        .collect();
    Value::Array(views).to_string()
}

// ============================================================
// WASM EXPORTS - SETUP
// ============================================================

/// Initialize panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "wasm")]
    console_error_panic_hook::set_once();
}

/// Apply a JSON configuration (limits, storage key, ...)
/// Returns false if the JSON is invalid; the previous config stays active
#[wasm_bindgen(js_name = "configure")]
pub fn configure(config_json: &str) -> bool {
    match MailConfig::from_json(config_json) {
        Ok(config) => {
            let key = config.storage_key.clone();
            CONFIG.with(|c| *c.borrow_mut() = config);
            MAIL_STORE.with(|cell| *cell.borrow_mut() = Some(MailStore::new(JsLocalStorage, key)));
            log("[WASM] Mail config applied");
            true
        }
        Err(e) => {
            log(&format!("[WASM] Invalid mail config: {}", e));
            false
        }
    }
}

// ============================================================
// WASM EXPORTS - SEAL / OPEN
// ============================================================

/// Seal a mail and return its record JSON
/// `{hash, ciphertext, timestamp, from, to}`, or undefined on invalid input
#[wasm_bindgen(js_name = "sealMail")]
pub fn seal_mail(subject: &str, body: &str, from: &str, to: &str, timestamp: f64) -> Option<String> {
    let (sender, recipient) = match (Identifier::parse(from), Identifier::parse(to)) {
        (Ok(s), Ok(r)) => (s, r),
        (Err(e), _) | (_, Err(e)) => {
            log(&format!("[WASM] Invalid identifier: {}", e));
            return None;
        }
    };
    let created_at = timestamp as u64;
    let message = Message::new(sender.clone(), recipient.clone(), subject, body, created_at);
    let limits = CONFIG.with(|c| c.borrow().limits);

    match seal_with_limits(&message, &limits) {
        Ok(sealed) => serde_json::to_string(&sealed.into_record(sender, recipient, created_at)).ok(),
        Err(e) => {
            log(&format!("[WASM] Failed to seal mail: {}", e));
            None
        }
    }
}

/// Open a record JSON and return the message JSON
/// `{subject, body, from, to, timestamp}`, or undefined if it cannot be opened
#[wasm_bindgen(js_name = "openMail")]
pub fn open_mail(record_json: &str) -> Option<String> {
    let record: EncryptedRecord = serde_json::from_str(record_json).ok()?;
    match open(&record) {
        Ok(message) => serde_json::to_string(&message).ok(),
        Err(e) => {
            log(&format!("[WASM] Failed to open mail {}: {}", record.digest, e));
            None
        }
    }
}

// ============================================================
// WASM EXPORTS - MAIL STORE
// ============================================================

/// Append a sealed record to the local store
/// Returns false on invalid JSON or when storage refuses the write
#[wasm_bindgen(js_name = "saveEncryptedMail")]
pub fn save_encrypted_mail(record_json: &str) -> bool {
    let record: EncryptedRecord = match serde_json::from_str(record_json) {
        Ok(record) => record,
        Err(e) => {
            log(&format!("[WASM] Invalid record: {}", e));
            return false;
        }
    };
    match with_store(|store| store.append(record)) {
        Some(Ok(())) => true,
        Some(Err(e)) => {
            log(&format!("[WASM] Failed to save mail: {}", e));
            false
        }
        None => false,
    }
}

/// Opened inbox of `identifier` as a JSON array (oldest first)
#[wasm_bindgen(js_name = "inboxFor")]
pub fn inbox_for(identifier: &str) -> String {
    let Ok(me) = Identifier::parse(identifier) else {
        return "[]".to_string();
    };
    with_store(|store| views_to_json(store.query_by_recipient(&me))).unwrap_or_else(|| "[]".to_string())
}

/// Opened outbox of `identifier` as a JSON array (oldest first)
#[wasm_bindgen(js_name = "outboxFor")]
pub fn outbox_for(identifier: &str) -> String {
    let Ok(me) = Identifier::parse(identifier) else {
        return "[]".to_string();
    };
    with_store(|store| views_to_json(store.query_by_sender(&me))).unwrap_or_else(|| "[]".to_string())
}

/// Stored record with the given hash, as JSON
#[wasm_bindgen(js_name = "findMailByHash")]
pub fn find_mail_by_hash(hash: &str) -> Option<String> {
    with_store(|store| store.find_by_digest(hash))
        .flatten()
        .and_then(|record| serde_json::to_string(&record).ok())
}

// ============================================================
// WASM EXPORTS - HELPERS
// ============================================================

/// Whether `input` is a valid `<name>@zamail.com` identifier
#[wasm_bindgen(js_name = "isValidIdentifier")]
pub fn is_valid_identifier(input: &str) -> bool {
    Identifier::parse(input).is_ok()
}

/// Normalise a chosen name into a full identifier
#[wasm_bindgen(js_name = "normalizeIdentifier")]
pub fn normalize_identifier(name: &str) -> Option<String> {
    Identifier::from_local_part(name).ok().map(|id| id.to_string())
}

/// Relative age label ("Just now", "5m ago", ...)
#[wasm_bindgen(js_name = "formatAge")]
pub fn format_age_js(now: f64, then: f64) -> String {
    format_age(now as u64, then as u64)
}

/// Registration fee in ether, for display
#[wasm_bindgen(js_name = "registrationFee")]
pub fn registration_fee() -> String {
    CONFIG.with(|c| format_ether(c.borrow().fees.register_wei))
}

/// Get WASM module version (for verification)
#[wasm_bindgen(js_name = "getWasmVersion")]
pub fn get_wasm_version() -> String {
    concat!("zamail-core-v", env!("CARGO_PKG_VERSION")).to_string()
}
