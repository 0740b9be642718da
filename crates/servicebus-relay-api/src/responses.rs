//! Response types and the HTML index page.

use serde::{Deserialize, Serialize};
use servicebus_relay_core::Timestamp;
use std::collections::HashMap;

#[cfg(test)]
#[path = "responses_tests.rs"]
mod tests;

/// Form field carrying the payload to send
pub const SEND_FIELD: &str = "message_to_send";

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /send`
#[derive(Debug, Default, Deserialize)]
pub struct SendForm {
    #[serde(default)]
    pub message_to_send: String,
}

/// Query parameters of `GET /`
#[derive(Debug, Default, Deserialize)]
pub struct IndexParams {
    pub error: Option<String>,
}

// ============================================================================
// Index page
// ============================================================================

/// Content of the index page
#[derive(Debug, Default, Clone)]
pub struct IndexPage {
    /// Queue the page sends to and receives from
    pub queue_name: String,

    /// Text produced by the last receive, if this page answers one
    pub received: Option<String>,

    /// Notice shown above the form
    pub notice: Option<String>,
}

impl IndexPage {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    pub fn with_received(mut self, text: impl Into<String>) -> Self {
        self.received = Some(text.into());
        self
    }

    /// Show the notice matching an `error` query value
    pub fn with_error_code(mut self, code: Option<&str>) -> Self {
        self.notice = match code {
            Some("empty") => Some("Enter a message before sending.".to_string()),
            Some(_) => Some("The last request could not be completed.".to_string()),
            None => None,
        };
        self
    }

    pub fn render(&self) -> String {
        let notice = self
            .notice
            .as_deref()
            .map(|n| format!("    <p class=\"notice\">{}</p>\n", escape_html(n)))
            .unwrap_or_default();

        let received = self
            .received
            .as_deref()
            .map(|r| format!("    <pre id=\"received\">{}</pre>\n", escape_html(r)))
            .unwrap_or_default();

        format!(
            concat!(
                "<!DOCTYPE html>\n",
                "<html>\n",
                "  <head>\n",
                "    <meta charset=\"utf-8\">\n",
                "    <title>Service Bus relay</title>\n",
                "  </head>\n",
                "  <body>\n",
                "    <h1>Queue: {queue}</h1>\n",
                "{notice}",
                "    <form method=\"post\" action=\"/send\">\n",
                "      <input type=\"text\" name=\"{field}\" autofocus>\n",
                "      <button type=\"submit\">Send</button>\n",
                "    </form>\n",
                "    <form method=\"get\" action=\"/receive\">\n",
                "      <button type=\"submit\">Receive</button>\n",
                "    </form>\n",
                "{received}",
                "  </body>\n",
                "</html>\n",
            ),
            queue = escape_html(&self.queue_name),
            notice = notice,
            field = SEND_FIELD,
            received = received,
        )
    }
}

/// Escape text for inclusion in HTML element content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub checks: HashMap<String, HealthCheckResult>,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: Timestamp,
}

/// Health check result for individual components
#[derive(Debug, Serialize, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Overall health status
#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub checks: HashMap<String, HealthCheckResult>,
}
