//! Direct status API probe.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use super::LiveProbe;
use crate::domain::{Handle, ProbeOutcome};
use crate::stream::websocket::HANDLE_PLACEHOLDER;
use crate::utils::install_rustls_provider;
use crate::{Error, Result};

/// Probes a JSON status endpoint.
///
/// The URL template contains `{handle}`; the live flag is read from the
/// response body at `field`, a JSON pointer (`/data/is_live`) or a dotted
/// path (`data.is_live`).
pub struct HttpStatusProbe {
    client: reqwest::Client,
    url_template: String,
    field_pointer: String,
}

impl HttpStatusProbe {
    pub fn new(url_template: impl Into<String>, field: &str, timeout: Duration) -> Result<Self> {
        install_rustls_provider();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, url_template, field))
    }

    pub fn with_client(
        client: reqwest::Client,
        url_template: impl Into<String>,
        field: &str,
    ) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            field_pointer: to_pointer(field),
        }
    }

    fn url_for(&self, handle: &Handle) -> String {
        self.url_template
            .replace(HANDLE_PLACEHOLDER, &urlencoding::encode(handle.as_str()))
    }

    /// Resolve the outcome from a decoded response body.
    fn interpret(&self, body: &Value) -> ProbeOutcome {
        match body.pointer(&self.field_pointer) {
            Some(Value::Bool(true)) => ProbeOutcome::Live,
            Some(Value::Bool(false)) => ProbeOutcome::Offline,
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "live" | "online" | "true" => ProbeOutcome::Live,
                "offline" | "ended" | "false" => ProbeOutcome::Offline,
                _ => ProbeOutcome::Unknown,
            },
            _ => ProbeOutcome::Unknown,
        }
    }
}

fn to_pointer(field: &str) -> String {
    let field = field.trim();
    if field.starts_with('/') {
        field.to_string()
    } else {
        field
            .split('.')
            .filter(|segment| !segment.is_empty())
            .fold(String::new(), |mut pointer, segment| {
                pointer.push('/');
                pointer.push_str(segment);
                pointer
            })
    }
}

#[async_trait]
impl LiveProbe for HttpStatusProbe {
    fn name(&self) -> &str {
        "status_api"
    }

    async fn probe(&self, handle: &Handle) -> Result<ProbeOutcome> {
        let response = self.client.get(self.url_for(handle)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ProbeInconclusive(format!(
                "status API returned {} for {}",
                status, handle
            )));
        }

        let outcome = match response.json::<Value>().await {
            Ok(body) => self.interpret(&body),
            Err(e) => {
                trace!(handle = %handle, "Malformed status body: {}", e);
                ProbeOutcome::Unknown
            }
        };
        Ok(outcome)
    }
}
