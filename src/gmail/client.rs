//! Gmail API client
//!
//! High-level facade over the Gmail REST API. Every call first obtains
//! fresh credentials for the target user from the [`TokenManager`].

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Response;
use serde::Serialize;

use crate::auth::TokenManager;
use crate::config::gmail::{labels, API_BASE_URL, USER_ID};
use crate::error::{AuthError, GatewayError, GmailApiError, Result, ValidationError};
use crate::gmail::query::parse_natural_language_query;
use crate::gmail::types::*;
use crate::gmail::utils::{
    create_email_message, encode_raw_message, extract_body, find_header, reply_subject,
    validate_email, OutgoingEmail,
};

/// Headers requested when listing messages
const METADATA_HEADERS: &[&str] = &["From", "To", "Subject", "Date"];

/// Default page size for listings and searches
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Metadata requests in flight at once while listing
const METADATA_CONCURRENCY: usize = 10;

/// Options for listing messages
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Gmail search query
    pub query: Option<String>,
    pub max_results: u32,
    pub page_token: Option<String>,
    pub include_spam_trash: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            query: None,
            max_results: DEFAULT_MAX_RESULTS,
            page_token: None,
            include_spam_trash: false,
        }
    }
}

/// Gmail operations on behalf of any authorized user
pub struct GmailService {
    /// HTTP client
    http_client: reqwest::Client,

    tokens: Arc<TokenManager>,

    api_base: String,
}

impl GmailService {
    /// Create a service talking to the public Gmail API
    pub fn new(tokens: Arc<TokenManager>, timeout: Duration) -> Result<Self> {
        Self::with_base_url(tokens, timeout, API_BASE_URL)
    }

    /// Create a service against a different API base (used by tests)
    pub fn with_base_url(
        tokens: Arc<TokenManager>,
        timeout: Duration,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            tokens,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Get a valid access token for the user
    async fn access_token(&self, email: &str) -> Result<String> {
        if email.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "email".to_string(),
            }
            .into());
        }
        if !validate_email(email) {
            return Err(ValidationError::InvalidEmail {
                email: email.to_string(),
            }
            .into());
        }
        Ok(self.tokens.get_valid_client(email).await?.access_token)
    }

    /// Base URL for messages
    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.api_base, USER_ID)
    }

    fn message_url(&self, message_id: &str) -> String {
        format!("{}/{}", self.messages_url(), urlencoding::encode(message_id))
    }

    /// Turn a non-success response into an error
    async fn check(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(GatewayError::Gmail(GmailApiError::RequestFailed {
            message: format!("Failed to {} ({}): {}", action, status, text),
        }))
    }

    async fn post_json<B: Serialize>(&self, token: &str, url: &str, body: &B, action: &str) -> Result<Response> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| gmail_error(e, action))?;
        Self::check(response, action).await
    }

    // ==================== Message Operations ====================

    /// List messages, with From/To/Subject/Date metadata for each
    ///
    /// A message whose metadata cannot be fetched is reported in place as
    /// `{id, error}` instead of failing the whole page.
    pub async fn list_emails(&self, email: &str, options: &ListOptions) -> Result<ListEmailsResult> {
        let token = self.access_token(email).await?;

        let mut params = vec![
            ("maxResults", options.max_results.to_string()),
            ("includeSpamTrash", options.include_spam_trash.to_string()),
        ];
        if let Some(query) = options.query.as_deref().filter(|q| !q.is_empty()) {
            params.push(("q", query.to_string()));
        }
        if let Some(ref page_token) = options.page_token {
            params.push(("pageToken", page_token.clone()));
        }

        let response = self
            .http_client
            .get(self.messages_url())
            .bearer_auth(&token)
            .query(&params)
            .send()
            .await
            .map_err(|e| gmail_error(e, "list messages"))?;
        let list: MessageList = Self::check(response, "list messages").await?.json().await?;

        // `buffered` yields in listing order.
        let messages = stream::iter(list.messages)
            .map(|msg_ref| {
                let token = &token;
                async move {
                    match self.get_metadata(token, &msg_ref.id).await {
                        Ok(message) => ListedMessage::Message(message),
                        Err(e) => {
                            tracing::warn!("Failed to fetch details for message {}: {}", msg_ref.id, e);
                            ListedMessage::Failed {
                                id: msg_ref.id.clone(),
                                error: "Failed to fetch details".to_string(),
                            }
                        }
                    }
                }
            })
            .buffered(METADATA_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        Ok(ListEmailsResult {
            messages,
            next_page_token: list.next_page_token,
            result_size_estimate: list.result_size_estimate,
        })
    }

    async fn get_metadata(&self, token: &str, message_id: &str) -> Result<Message> {
        let mut params = vec![("format", "metadata")];
        params.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", *h)));

        let response = self
            .http_client
            .get(self.message_url(message_id))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .map_err(|e| gmail_error(e, "get message metadata"))?;
        Ok(Self::check(response, "get message metadata").await?.json().await?)
    }

    async fn get_message(&self, token: &str, message_id: &str) -> Result<Message> {
        let response = self
            .http_client
            .get(self.message_url(message_id))
            .bearer_auth(token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| gmail_error(e, "get message"))?;

        if response.status().as_u16() == 404 {
            return Err(GatewayError::Gmail(GmailApiError::MessageNotFound {
                message_id: message_id.to_string(),
            }));
        }
        Ok(Self::check(response, "get message").await?.json().await?)
    }

    /// Read a message with its headers and body decoded
    pub async fn read_email(&self, email: &str, message_id: &str) -> Result<ParsedMessage> {
        let token = self.access_token(email).await?;
        let message = self.get_message(&token, message_id).await?;
        Ok(parse_message(message))
    }

    /// Send an HTML email
    pub async fn send_email(&self, email: &str, outgoing: &OutgoingEmail) -> Result<Message> {
        let token = self.access_token(email).await?;
        self.send_raw(&token, outgoing, None).await
    }

    async fn send_raw(&self, token: &str, outgoing: &OutgoingEmail, thread_id: Option<String>) -> Result<Message> {
        let request = SendMessageRequest {
            raw: encode_raw_message(&create_email_message(outgoing)?),
            thread_id,
        };

        let url = format!("{}/send", self.messages_url());
        let response = self.post_json(token, &url, &request, "send email").await?;
        Ok(response.json().await?)
    }

    /// Reply to a message in its thread
    ///
    /// The reply goes to the original sender and copies the original recipients.
    pub async fn reply_email(&self, email: &str, message_id: &str, subject: &str, body: &str) -> Result<Message> {
        let token = self.access_token(email).await?;
        let original = self.get_message(&token, message_id).await?;

        let header = |name: &str| {
            original
                .payload
                .as_ref()
                .and_then(|p| find_header(p, name))
                .map(str::to_string)
        };

        let outgoing = OutgoingEmail {
            to: header("From").unwrap_or_default(),
            cc: header("To"),
            bcc: None,
            subject: reply_subject(subject),
            body: body.to_string(),
            in_reply_to: header("Message-ID"),
        };

        let thread_id = original
            .thread_id
            .clone()
            .unwrap_or_else(|| message_id.to_string());

        tracing::debug!("Replying to {} in thread {}", message_id, thread_id);
        self.send_raw(&token, &outgoing, Some(thread_id)).await
    }

    /// Mark messages read (moves them to the inbox) or unread
    pub async fn mark_as_read(&self, email: &str, message_ids: &[String], read: bool) -> Result<()> {
        require_ids(message_ids)?;
        let token = self.access_token(email).await?;

        let request = if read {
            BatchModifyRequest {
                ids: message_ids.to_vec(),
                add_label_ids: vec![labels::INBOX.to_string()],
                remove_label_ids: vec![labels::UNREAD.to_string()],
            }
        } else {
            BatchModifyRequest {
                ids: message_ids.to_vec(),
                add_label_ids: vec![labels::UNREAD.to_string()],
                remove_label_ids: vec![],
            }
        };

        let url = format!("{}/batchModify", self.messages_url());
        self.post_json(&token, &url, &request, "modify messages").await?;
        Ok(())
    }

    /// Permanently delete messages
    pub async fn delete_emails(&self, email: &str, message_ids: &[String]) -> Result<()> {
        require_ids(message_ids)?;
        let token = self.access_token(email).await?;

        let request = BatchDeleteRequest {
            ids: message_ids.to_vec(),
        };

        let url = format!("{}/batchDelete", self.messages_url());
        self.post_json(&token, &url, &request, "delete messages").await?;
        Ok(())
    }

    /// Search with a natural-language query
    pub async fn search_emails(
        &self,
        email: &str,
        natural_query: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<SearchResult> {
        let parsed_query = parse_natural_language_query(natural_query);
        tracing::debug!("Translated query '{}' to '{}'", natural_query, parsed_query);

        let options = ListOptions {
            query: Some(parsed_query.clone()),
            max_results,
            page_token,
            include_spam_trash: false,
        };
        let listing = self.list_emails(email, &options).await?;

        Ok(SearchResult {
            query: natural_query.to_string(),
            parsed_query,
            listing,
        })
    }
}

/// Map a transport failure; timeouts are retryable
fn gmail_error(err: reqwest::Error, action: &str) -> GatewayError {
    if err.is_timeout() {
        tracing::warn!("Gmail request timed out: {}", action);
        AuthError::Transient {
            operation: format!("Gmail {}", action),
        }
        .into()
    } else {
        err.into()
    }
}

fn require_ids(message_ids: &[String]) -> Result<()> {
    if message_ids.is_empty() {
        return Err(ValidationError::MissingField {
            field: "messageIds".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Flatten a full message into headers and decoded body
pub fn parse_message(message: Message) -> ParsedMessage {
    let header = |name: &str| {
        message
            .payload
            .as_ref()
            .and_then(|p| find_header(p, name))
            .unwrap_or_default()
            .to_string()
    };

    ParsedMessage {
        from: header("From"),
        to: header("To"),
        subject: header("Subject"),
        date: header("Date"),
        body: message.payload.as_ref().map(extract_body).unwrap_or_default(),
        id: message.id,
        thread_id: message.thread_id,
        label_ids: message.label_ids,
        snippet: message.snippet,
        size_estimate: message.size_estimate,
    }
}
