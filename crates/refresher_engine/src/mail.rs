use refresher_core::{extract_message_links, ImapConfig};
use refresher_logging::{refresh_debug, refresh_info};
use thiserror::Error;

const UNREAD_QUERY: &str = "UNSEEN";
const BODY_QUERY: &str = "BODY.PEEK[]";
const MARK_SEEN: &str = "+FLAGS (\\Seen)";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("tls setup failed: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("imap error: {0}")]
    Imap(#[from] imap::error::Error),
}

/// Source of "story updated" notifications.
pub trait MailSource {
    /// Story links seen in notifications since the last check, unnormalized.
    fn updated_story_urls(&mut self) -> Result<Vec<String>, MailError>;
}

/// Reads unread notification mails from an IMAP folder over TLS.
#[derive(Debug, Clone)]
pub struct ImapMailSource {
    config: ImapConfig,
}

impl ImapMailSource {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

impl MailSource for ImapMailSource {
    fn updated_story_urls(&mut self) -> Result<Vec<String>, MailError> {
        let server = self.config.server.as_str();
        let tls = native_tls::TlsConnector::builder().build()?;
        let client = imap::connect((server, self.config.port), server, &tls)?;
        let mut session = client
            .login(&self.config.email, &self.config.password)
            .map_err(|(err, _client)| err)?;

        session.select(&self.config.folder)?;
        let mut unseen: Vec<u32> = session.search(UNREAD_QUERY)?.into_iter().collect();
        unseen.sort_unstable();
        refresh_debug!(
            "{} unread messages in {}",
            unseen.len(),
            self.config.folder
        );

        let mut links: Vec<String> = Vec::new();
        if !unseen.is_empty() {
            let sequence = unseen
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let messages = session.fetch(&sequence, BODY_QUERY)?;
            for message in messages.iter() {
                let Some(body) = message.body() else {
                    continue;
                };
                for link in extract_message_links(body) {
                    if !links.contains(&link) {
                        links.push(link);
                    }
                }
            }

            if self.config.mark_read {
                session.store(&sequence, MARK_SEEN)?;
                refresh_info!("Marked {} update emails as read.", unseen.len());
            }
        }

        session.logout()?;
        Ok(links)
    }
}
