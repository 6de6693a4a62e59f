//! Scripted in-memory mailbox.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use alertsync::email::error::Result;
use alertsync::{EmailError, MailboxConnector, MailboxSession};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

pub const ALERT_SENDER: &str = "alerts-no-reply@tracking-update.com";

/// Builds a raw alert email as the tracking service sends it.
pub fn alert_email(alert_type: &str, tracker: &str) -> Vec<u8> {
    format!(
        "From: {ALERT_SENDER}\r\n\
         Subject: Tracker alert\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Alert type: {alert_type}\r\n\
         Time: 10:00 (UTC)\r\n\
         Latitude, Longitude: 12.34, -56.78\r\n\
         Device Serial Number: SN-{tracker}\r\n\
         Tracker Name: {tracker}\r\n\
         Account name: Acme\r\n"
    )
    .into_bytes()
}

#[derive(Default)]
struct State {
    /// `(id, sender, raw)` in arrival order.
    messages: Vec<(String, String, Vec<u8>)>,
    failing_ids: HashSet<String>,
    rejected_addresses: HashSet<String>,
    password: Option<String>,
    fail_search: bool,
    logins: usize,
    logouts: usize,
    fetched: Vec<String>,
}

/// Cloneable handle; every clone sees the same mailbox.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<State>>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Appends a message with the next numeric id from the alert sender.
    pub fn push_alert(&self, alert_type: &str, tracker: &str) -> String {
        let mut state = self.state();
        let id = (state.messages.len() + 1).to_string();
        state
            .messages
            .push((id.clone(), ALERT_SENDER.to_string(), alert_email(alert_type, tracker)));
        id
    }

    /// Appends `count` motion alerts, returning their ids.
    pub fn push_alerts(&self, count: usize) -> Vec<String> {
        (0..count).map(|i| self.push_alert("Motion", &format!("Bike{}", i))).collect()
    }

    pub fn push_raw(&self, sender: &str, raw: &[u8]) -> String {
        let mut state = self.state();
        let id = (state.messages.len() + 1).to_string();
        state.messages.push((id.clone(), sender.to_string(), raw.to_vec()));
        id
    }

    /// Removes a message, as if the server pruned it.
    pub fn remove(&self, id: &str) {
        self.state().messages.retain(|(m, _, _)| m != id);
    }

    pub fn fail_fetch(&self, id: &str) {
        self.state().failing_ids.insert(id.to_string());
    }

    pub fn reject_login(&self, address: &str) {
        self.state().rejected_addresses.insert(address.to_string());
    }

    /// Only this password is accepted from now on.
    pub fn require_password(&self, password: &str) {
        self.state().password = Some(password.to_string());
    }

    pub fn fail_search(&self, fail: bool) {
        self.state().fail_search = fail;
    }

    pub fn logins(&self) -> usize {
        self.state().logins
    }

    pub fn logouts(&self) -> usize {
        self.state().logouts
    }

    /// Every fetch attempt so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.state().fetched.clone()
    }
}

#[async_trait]
impl MailboxConnector for FakeMailbox {
    async fn connect(
        &self,
        address: &str,
        secret: &SecretString,
    ) -> Result<Box<dyn MailboxSession>> {
        let mut state = self.state();
        if state.rejected_addresses.contains(address) {
            return Err(EmailError::AuthenticationFailed(format!(
                "invalid credentials for {}",
                address
            )));
        }
        if let Some(expected) = &state.password {
            if expected != secret.expose_secret() {
                return Err(EmailError::AuthenticationFailed("wrong password".to_string()));
            }
        }
        state.logins += 1;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn select_inbox(&mut self) -> Result<()> {
        Ok(())
    }

    async fn search_from(&mut self, sender: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.fail_search {
            return Err(EmailError::ProtocolError("search rejected".to_string()));
        }
        Ok(state
            .messages
            .iter()
            .filter(|(_, from, _)| from == sender)
            .map(|(id, _, _)| id.clone())
            .collect())
    }

    async fn fetch_raw(&mut self, id: &str) -> Result<Vec<u8>> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.fetched.push(id.to_string());
        if state.failing_ids.contains(id) {
            return Err(EmailError::FetchFailed {
                id: id.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        state
            .messages
            .iter()
            .find(|(m, _, _)| m == id)
            .map(|(_, _, raw)| raw.clone())
            .ok_or_else(|| EmailError::FetchFailed {
                id: id.to_string(),
                reason: "no such message".to_string(),
            })
    }

    async fn logout(&mut self) -> Result<()> {
        self.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}
