//! Callback verification
//!
//! Two confirmation flows are supported:
//!
//! - **PDT**: the customer returns with a one-time transaction token; the
//!   token is posted back to the gateway, which answers with a status line
//!   followed by `key=value` lines describing the transaction.
//! - **IPN**: the gateway posts a notification; the untouched body is echoed
//!   back and the gateway answers `VERIFIED` or `INVALID`.
//!
//! Neither flow retries. A transport failure is an error, never a success.

use crate::error::{AppError, AppResult};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::{form_urlencoded, Url};

pub const PDT_COMMAND: &str = "_notify-synch";
pub const IPN_COMMAND: &str = "_notify-validate";
pub const PDT_SUCCESS: &str = "SUCCESS";
pub const IPN_VERIFIED: &str = "VERIFIED";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Key/value pairs with case-insensitive keys
///
/// Keys keep the spelling they first arrived with. A repeated key replaces
/// the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackFields {
    entries: IndexMap<String, (String, String)>,
}

impl CallbackFields {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.get_mut(&key.to_lowercase()) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(key.to_lowercase(), (key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl Serialize for CallbackFields {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Outcome of a callback confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    pub fields: CallbackFields,
    /// Decoded response text returned by the gateway
    pub raw: String,
}

/// Decode a form-encoded response body (`+` as space, `%XX` escapes).
pub fn url_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Parse a decoded PDT response.
///
/// The first non-empty line is the status; `SUCCESS` in any case means the
/// transaction is confirmed. Later lines are split on the first `=`. A first
/// line that is itself a `key=value` pair means the status line is missing:
/// the result is unsuccessful and the pair is kept.
pub fn parse_pdt_response(response: &str) -> CallbackResponse {
    let mut fields = CallbackFields::default();
    let mut success = None;

    for line in response.split('\n').map(str::trim) {
        if success.is_none() {
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case(PDT_SUCCESS) {
                success = Some(true);
                continue;
            }
            success = Some(false);
            if !line.contains('=') {
                continue;
            }
        }

        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key, value);
        }
    }

    CallbackResponse {
        success: success.unwrap_or(false),
        fields,
        raw: response.to_string(),
    }
}

/// Split a form body on `&`, then each segment on its first `=`.
///
/// Values are kept exactly as posted.
pub fn parse_form_body(form: &str) -> CallbackFields {
    let mut fields = CallbackFields::default();
    for segment in form.split('&').map(str::trim) {
        if let Some((key, value)) = segment.split_once('=') {
            fields.insert(key, value);
        }
    }
    fields
}

/// Whether a decoded IPN validation response confirms the notification.
pub fn is_verified(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case(IPN_VERIFIED)
}

/// Talks to the gateway's confirmation endpoints
#[derive(Debug, Clone)]
pub struct CallbackVerifier {
    client: Client,
    pdt_url: Url,
    ipn_url: Url,
    timeout: Duration,
}

impl CallbackVerifier {
    pub fn new(client: Client, pdt_url: Url, ipn_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            pdt_url,
            ipn_url,
            timeout,
        }
    }

    /// Confirm a PDT transaction token.
    pub async fn verify_pdt(
        &self,
        identity_token: &SecretString,
        transaction_token: &str,
        user_agent: Option<&str>,
    ) -> AppResult<CallbackResponse> {
        if identity_token.expose_secret().trim().is_empty() {
            return Err(AppError::configuration("MOLPay PDT identity token is required"));
        }

        info!("Requesting MOLPay PDT confirmation: tx={}", transaction_token);

        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("cmd", PDT_COMMAND)
            .append_pair("at", identity_token.expose_secret())
            .append_pair("tx", transaction_token)
            .finish();

        let response = self.post(&self.pdt_url, body, user_agent).await?;
        let parsed = parse_pdt_response(&response);

        if parsed.success {
            info!("MOLPay PDT confirmed: tx={}", transaction_token);
        } else {
            warn!(
                "MOLPay PDT not confirmed: tx={}, fields={}",
                transaction_token,
                parsed.fields.len()
            );
        }

        Ok(parsed)
    }

    /// Validate an IPN body by echoing it to the gateway.
    pub async fn verify_ipn(
        &self,
        form_body: &str,
        user_agent: Option<&str>,
    ) -> AppResult<CallbackResponse> {
        debug!("Requesting MOLPay IPN validation ({} bytes)", form_body.len());

        let body = format!("cmd={}&{}", IPN_COMMAND, form_body);
        let response = self.post(&self.ipn_url, body, user_agent).await?;
        let success = is_verified(&response);

        if success {
            info!("MOLPay IPN verified");
        } else {
            warn!("MOLPay IPN rejected: {}", response.trim());
        }

        Ok(CallbackResponse {
            success,
            fields: parse_form_body(form_body),
            raw: response,
        })
    }

    async fn post(&self, url: &Url, body: String, user_agent: Option<&str>) -> AppResult<String> {
        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .timeout(self.timeout)
            .body(body);

        // The gateway answers 403 to requests without a user agent.
        if let Some(agent) = user_agent.filter(|agent| !agent.trim().is_empty()) {
            request = request.header(USER_AGENT, agent);
        }

        let response = request.send().await.map_err(|e| {
            error!("MOLPay confirmation request failed: {}", e);
            self.transport_error(e)
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            error!("MOLPay confirmation endpoint returned HTTP {}", status);
            return Err(AppError::gateway(
                format!("HTTP {}: {}", status, text.trim()),
                status.is_server_error(),
            ));
        }

        Ok(url_decode(&text))
    }

    /// Timeouts carry the configured limit; other failures go through `From<reqwest::Error>`.
    fn transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::timeout(self.timeout.as_secs())
        } else {
            AppError::from(err)
        }
    }
}
