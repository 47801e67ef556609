//! Gmail utility functions
//!
//! Email creation, validation, and content extraction utilities.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::{GatewayError, Result, ValidationError};
use crate::gmail::types::MessagePart;

/// Validate an email address
pub fn validate_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }
    let (local, domain) = (parts[0], parts[1]);

    !local.is_empty()
        && !domain.is_empty()
        && !local.contains(' ')
        && !domain.contains(' ')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Encode text for MIME header (RFC 2047)
pub fn encode_mime_header(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && c != '\r' && c != '\n') {
        return text.to_string();
    }

    format!(
        "=?UTF-8?B?{}?=",
        base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
    )
}

/// Encode a raw email message for Gmail API (base64url, no padding)
pub fn encode_raw_message(message: &str) -> String {
    URL_SAFE_NO_PAD.encode(message.as_bytes())
}

/// Decode base64url data from Gmail API
/// Handles both padded and non-padded base64url encoding
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(data))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(data))
        .map_err(|e| {
            GatewayError::Validation(ValidationError::InvalidParameter {
                name: "base64 data".to_string(),
                message: e.to_string(),
            })
        })
}

/// Decode base64url data to text, replacing invalid UTF-8
pub fn decode_base64url_string(data: &str) -> Result<String> {
    let bytes = decode_base64url(data)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Find header value by name (case-insensitive)
pub fn find_header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn part_text(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    match decode_base64url_string(data) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!("Failed to decode message part: {}", e);
            None
        }
    }
}

/// Extract the readable body of a message
///
/// Body data on the part itself wins. Otherwise the first `text/plain`
/// child is used, then the last `text/html` child, then whatever a nested
/// multipart child yields.
pub fn extract_body(payload: &MessagePart) -> String {
    if let Some(text) = part_text(payload) {
        return text;
    }

    let mut html = None;
    let mut nested = None;
    for part in &payload.parts {
        match part.mime_type.as_deref() {
            Some("text/plain") => {
                if let Some(text) = part_text(part) {
                    return text;
                }
            }
            Some("text/html") => {
                if let Some(text) = part_text(part) {
                    html = Some(text);
                }
            }
            Some(mime) if mime.starts_with("multipart/") && nested.is_none() => {
                let body = extract_body(part);
                if !body.is_empty() {
                    nested = Some(body);
                }
            }
            _ => {}
        }
    }

    html.or(nested).unwrap_or_default()
}

/// An email to be sent through the Gmail API
#[derive(Debug, Clone, Default)]
pub struct OutgoingEmail {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    /// HTML body
    pub body: String,
    /// Message-ID of the email being replied to
    pub in_reply_to: Option<String>,
}

/// Reject header values that would start a new header line
fn header_value<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    if value.contains(|c: char| c == '\r' || c == '\n') {
        return Err(ValidationError::InvalidParameter {
            name: name.to_string(),
            message: "must not contain line breaks".to_string(),
        }
        .into());
    }
    Ok(value)
}

/// Build the RFC 822 text of an HTML email
pub fn create_email_message(email: &OutgoingEmail) -> Result<String> {
    let mut lines = Vec::new();

    lines.push(format!("To: {}", header_value("to", &email.to)?));

    if let Some(cc) = email.cc.as_deref().filter(|cc| !cc.is_empty()) {
        lines.push(format!("Cc: {}", header_value("cc", cc)?));
    }

    if let Some(bcc) = email.bcc.as_deref().filter(|bcc| !bcc.is_empty()) {
        lines.push(format!("Bcc: {}", header_value("bcc", bcc)?));
    }

    // Line breaks in the subject end up inside the encoded word.
    lines.push(format!("Subject: {}", encode_mime_header(&email.subject)));

    if let Some(ref in_reply_to) = email.in_reply_to {
        let in_reply_to = header_value("inReplyTo", in_reply_to)?;
        lines.push(format!("In-Reply-To: {}", in_reply_to));
        lines.push(format!("References: {}", in_reply_to));
    }

    lines.push("MIME-Version: 1.0".to_string());
    lines.push("Content-Type: text/html; charset=utf-8".to_string());
    lines.push(String::new());
    lines.push(email.body.clone());

    Ok(lines.join("\r\n"))
}

/// Subject line for a reply, without doubling the prefix
pub fn reply_subject(subject: &str) -> String {
    if subject.starts_with("Re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::types::{Header, MessagePartBody};

    fn text_part(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessagePartBody {
                data: Some(encode_raw_message(text)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("test@example.com"));
        assert!(validate_email("user.name@domain.co.uk"));
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(!validate_email("not-an-email"));
        assert!(!validate_email("@domain.com"));
        assert!(!validate_email("user@"));
        assert!(!validate_email("user@domain."));
    }

    #[test]
    fn test_encode_mime_header_unicode() {
        let encoded = encode_mime_header("未讀郵件");
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert!(encoded.ends_with("?="));
        assert_eq!(encode_mime_header("Hello"), "Hello");
    }

    #[test]
    fn test_decode_base64url() {
        let decoded = decode_base64url_string("SGVsbG8gV29ybGQ").unwrap();
        assert_eq!(decoded, "Hello World");
    }

    #[test]
    fn test_find_header_is_case_insensitive() {
        let part = MessagePart {
            headers: vec![Header {
                name: "Subject".to_string(),
                value: "Hi".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(find_header(&part, "subject"), Some("Hi"));
        assert_eq!(find_header(&part, "from"), None);
    }

    #[test]
    fn test_extract_body_prefers_plain_text() {
        let payload = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            parts: vec![text_part("text/html", "<p>html</p>"), text_part("text/plain", "plain")],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "plain");
    }

    #[test]
    fn test_extract_body_falls_back_to_html_and_nested() {
        let html_only = MessagePart {
            parts: vec![text_part("text/html", "<p>only</p>")],
            ..Default::default()
        };
        assert_eq!(extract_body(&html_only), "<p>only</p>");

        let nested = MessagePart {
            mime_type: Some("multipart/mixed".to_string()),
            parts: vec![MessagePart {
                mime_type: Some("multipart/alternative".to_string()),
                parts: vec![text_part("text/plain", "deep")],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(extract_body(&nested), "deep");
    }

    #[test]
    fn test_extract_body_top_level_data() {
        assert_eq!(extract_body(&text_part("text/plain", "direct")), "direct");
        assert_eq!(extract_body(&MessagePart::default()), "");
    }

    #[test]
    fn test_create_email_message() {
        let email = OutgoingEmail {
            to: "test@example.com".to_string(),
            cc: Some("cc@example.com".to_string()),
            bcc: Some(String::new()),
            subject: "Test Subject".to_string(),
            body: "<b>Test body</b>".to_string(),
            in_reply_to: None,
        };
        let message = create_email_message(&email).unwrap();
        assert!(message.starts_with("To: test@example.com\r\n"));
        assert!(message.contains("Cc: cc@example.com"));
        assert!(!message.contains("Bcc:"));
        assert!(message.contains("Content-Type: text/html; charset=utf-8"));
        assert!(message.ends_with("\r\n\r\n<b>Test body</b>"));
    }

    #[test]
    fn test_create_email_message_rejects_header_injection() {
        let email = OutgoingEmail {
            to: "bob@example.com\r\nBcc: evil@example.com".to_string(),
            subject: "Hi".to_string(),
            ..Default::default()
        };
        let err = create_email_message(&email).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::InvalidParameter { ref name, .. }) if name == "to"
        ));

        let email = OutgoingEmail {
            to: "bob@example.com".to_string(),
            cc: Some("carol@example.com\nX-Injected: 1".to_string()),
            ..Default::default()
        };
        assert!(create_email_message(&email).is_err());

        // A multi-line subject is encoded, not rejected.
        let email = OutgoingEmail {
            to: "bob@example.com".to_string(),
            subject: "Hi\r\nBcc: evil@example.com".to_string(),
            ..Default::default()
        };
        let message = create_email_message(&email).unwrap();
        assert!(!message.contains("Bcc:"));
        assert!(message.contains("Subject: =?UTF-8?B?"));
    }

    #[test]
    fn test_reply_subject() {
        assert_eq!(reply_subject("Lunch"), "Re: Lunch");
        assert_eq!(reply_subject("Re: Lunch"), "Re: Lunch");
    }
}
