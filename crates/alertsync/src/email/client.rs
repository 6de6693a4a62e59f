//! IMAP client for connecting to mail servers.
//!
//! [`MailboxConnector`] and [`MailboxSession`] are the seam the sync
//! orchestrator works against; [`ImapConnector`] is the production
//! implementation over `async-imap`.

use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ImapConfig;

use super::error::{EmailError, Result};

/// Type alias for the underlying async stream (using async-std compatible TcpStream).
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// Opens authenticated mailbox sessions.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Logs in as `address`. Login rejection is [`EmailError::AuthenticationFailed`].
    async fn connect(&self, address: &str, secret: &SecretString)
        -> Result<Box<dyn MailboxSession>>;
}

/// One authenticated mailbox session.
///
/// Callers must call [`MailboxSession::logout`] on every exit path.
#[async_trait]
pub trait MailboxSession: Send {
    /// Selects the configured inbox folder.
    async fn select_inbox(&mut self) -> Result<()>;

    /// Returns the ids of every message from `sender`, ascending in arrival order.
    async fn search_from(&mut self, sender: &str) -> Result<Vec<String>>;

    /// Fetches the raw RFC 5322 bytes of one message without marking it read.
    async fn fetch_raw(&mut self, id: &str) -> Result<Vec<u8>>;

    /// Closes the session. Calling it twice is a no-op.
    async fn logout(&mut self) -> Result<()>;
}

/// Connects to the configured IMAP server over TLS.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: ImapConfig,
}

impl ImapConnector {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(
        &self,
        address: &str,
        secret: &SecretString,
    ) -> Result<Box<dyn MailboxSession>> {
        if address.trim().is_empty() {
            return Err(EmailError::ConfigError(
                "mailbox address must not be empty".to_string(),
            ));
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Connecting to IMAP server at {}", addr);

        // Establish TCP connection using std::net and wrap with async-io
        let std_stream = std::net::TcpStream::connect(&addr)
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?;
        let tcp_stream = async_io::Async::new(std_stream)
            .map_err(|e| EmailError::ConnectionFailed(e.to_string()))?;

        let tls_stream = TlsConnector::new()
            .connect(&self.config.host, tcp_stream)
            .await?;

        let client = async_imap::Client::new(tls_stream);
        let session = client
            .login(address, secret.expose_secret())
            .await
            .map_err(|(e, _)| EmailError::AuthenticationFailed(e.to_string()))?;

        info!("Authenticated to IMAP server as {}", address);
        Ok(Box::new(ImapSession {
            session: Some(session),
            folder: self.config.folder.clone(),
        }))
    }
}

/// A live IMAP session.
pub struct ImapSession {
    session: Option<Session<TlsStream>>,
    folder: String,
}

impl ImapSession {
    fn session_mut(&mut self) -> Result<&mut Session<TlsStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| EmailError::ConnectionFailed("Not connected".to_string()))
    }
}

/// Builds the IMAP SEARCH criterion for a sender address.
fn from_query(sender: &str) -> String {
    let escaped = sender.replace('\\', "\\\\").replace('"', "\\\"");
    format!("FROM \"{}\"", escaped)
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn select_inbox(&mut self) -> Result<()> {
        let folder = self.folder.clone();
        let session = self.session_mut()?;

        debug!("Selecting folder: {}", folder);
        session.select(&folder).await.map_err(|e| {
            let message = e.to_string();
            if message.contains("doesn't exist") || message.contains("NO") {
                EmailError::FolderNotFound(folder.clone())
            } else {
                EmailError::ProtocolError(message)
            }
        })?;
        Ok(())
    }

    async fn search_from(&mut self, sender: &str) -> Result<Vec<String>> {
        let session = self.session_mut()?;

        let query = from_query(sender);
        debug!("Searching with query: {}", query);

        let uids = session
            .uid_search(&query)
            .await
            .map_err(|e| EmailError::ProtocolError(e.to_string()))?;

        // UIDs grow with arrival; the server returns an unordered set.
        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        debug!("Found {} messages matching search", uid_list.len());
        Ok(uid_list.into_iter().map(|uid| uid.to_string()).collect())
    }

    async fn fetch_raw(&mut self, id: &str) -> Result<Vec<u8>> {
        let fetch_failed = |reason: String| EmailError::FetchFailed {
            id: id.to_string(),
            reason,
        };
        let uid: u32 = id
            .parse()
            .map_err(|_| fetch_failed("not a UID".to_string()))?;
        let session = self.session_mut()?;

        debug!("Fetching message with UID {}", uid);

        // BODY.PEEK[] leaves the \Seen flag untouched.
        // Drain the stream so the session is ready for the next command.
        let messages: Vec<_> = session
            .uid_fetch(uid.to_string(), "BODY.PEEK[]")
            .await
            .map_err(|e| fetch_failed(e.to_string()))?
            .collect()
            .await;

        let message = messages
            .into_iter()
            .next()
            .ok_or_else(|| fetch_failed("message not found".to_string()))?
            .map_err(|e| fetch_failed(e.to_string()))?;

        let body = message
            .body()
            .ok_or_else(|| fetch_failed("message has no body".to_string()))?;
        Ok(body.to_vec())
    }

    async fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from IMAP server");
            session
                .logout()
                .await
                .map_err(|e| EmailError::ProtocolError(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapSession dropped without explicit logout - session will be closed");
        }
    }
}
