//! UFM REST client.
//!
//! Thin `reqwest` wrapper implementing [`FabricManager`]. Retries are left to
//! the caller's polling cadence: every failure is reported once and the next
//! cycle asks again.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::api::{
    ActionResponse, FabricManager, IsolatedPorts, PortMetadata, PortStatistics,
    TelemetrySnapshot,
};
use crate::endpoints::{self, fields};
use crate::error::{Result, UfmError};

/// Connection settings for [`UfmClient`].
#[derive(Debug, Clone)]
pub struct UfmClientConfig {
    /// UFM REST base URL, e.g. `https://ufm.local`.
    pub base_url: String,
    /// Absolute URL of the telemetry endpoint.
    pub telemetry_url: String,
    /// Basic-auth user; empty disables authentication.
    pub username: String,
    pub password: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// UFM REST API client.
pub struct UfmClient {
    base_url: String,
    telemetry_url: String,
    credentials: Option<(String, String)>,
    client: Client,
}

impl UfmClient {
    /// Creates a client from connection settings.
    pub fn new(config: UfmClientConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(UfmError::Config("base_url must not be empty".to_string()));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        let credentials = if config.username.is_empty() {
            None
        } else {
            Some((config.username, config.password))
        };

        Ok(Self {
            base_url,
            telemetry_url: config.telemetry_url,
            credentials,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);

        let response = self.authorized(self.client.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UfmError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(UfmError::Empty(url.to_string()));
        }

        serde_json::from_str(&body).map_err(|e| UfmError::decode(url, e.to_string()))
    }

    async fn set_ports_policy(
        &self,
        builder: RequestBuilder,
        body: Value,
    ) -> Result<ActionResponse> {
        let response = self.authorized(builder).json(&body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(ActionResponse { status, body })
    }

    fn parse_metadata(url: &str, value: Value) -> Result<Vec<PortMetadata>> {
        let records = match value {
            Value::Array(items) => items,
            Value::Object(_) => vec![value],
            Value::Null => Vec::new(),
            other => {
                return Err(UfmError::decode(
                    url,
                    format!("expected port records, got {}", other),
                ))
            }
        };

        records
            .into_iter()
            .map(|record| {
                serde_json::from_value(record).map_err(|e| UfmError::decode(url, e.to_string()))
            })
            .collect()
    }
}

/// Extracts the first fabric's `Ports` table from a telemetry document.
///
/// The document is keyed by fabric; only one fabric is monitored per daemon.
pub fn parse_telemetry(url: &str, document: Value) -> Result<TelemetrySnapshot> {
    let fabrics = match document {
        Value::Object(fabrics) => fabrics,
        Value::Null => return Err(UfmError::Empty(url.to_string())),
        other => {
            return Err(UfmError::decode(
                url,
                format!("expected an object keyed by fabric, got {}", other),
            ))
        }
    };

    let Some(fabric) = fabrics.into_iter().next().map(|(_, fabric)| fabric) else {
        return Err(UfmError::Empty(url.to_string()));
    };

    let ports = match fabric {
        Value::Object(mut fabric) => match fabric.remove(fields::PORTS) {
            Some(Value::Object(ports)) => ports,
            _ => return Err(UfmError::decode(url, "fabric entry has no Ports table")),
        },
        _ => return Err(UfmError::decode(url, "fabric entry is not an object")),
    };

    let mut snapshot = TelemetrySnapshot::default();
    for (port, entry) in ports {
        match serde_json::from_value::<PortStatistics>(entry) {
            Ok(stats) => {
                snapshot.ports.insert(port, stats);
            }
            Err(e) => {
                warn!(port = %port, error = %e, "Skipping malformed port telemetry");
            }
        }
    }

    Ok(snapshot)
}

#[async_trait]
impl FabricManager for UfmClient {
    #[instrument(skip(self))]
    async fn get_telemetry(&self) -> Result<TelemetrySnapshot> {
        let document = self.get_json(&self.telemetry_url).await?;
        let snapshot = parse_telemetry(&self.telemetry_url, document)?;
        if snapshot.is_empty() {
            return Err(UfmError::Empty(self.telemetry_url.clone()));
        }
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn get_isolated_ports(&self) -> Result<IsolatedPorts> {
        let url = self.url(endpoints::ISOLATED_PORTS_PATH);
        let document = self.get_json(&url).await?;
        serde_json::from_value(document).map_err(|e| UfmError::decode(&url, e.to_string()))
    }

    #[instrument(skip(self))]
    async fn isolate_port(&self, port: &str) -> Result<ActionResponse> {
        let url = self.url(endpoints::UNHEALTHY_PORTS_PATH);
        debug!("POST {} isolate {}", url, port);
        let body = json!({
            "ports": [port],
            "ports_policy": fields::POLICY_UNHEALTHY,
            "action": fields::ACTION_ISOLATE,
        });
        self.set_ports_policy(self.client.post(&url), body).await
    }

    #[instrument(skip(self))]
    async fn deisolate_port(&self, port: &str) -> Result<ActionResponse> {
        let url = self.url(endpoints::UNHEALTHY_PORTS_PATH);
        debug!("PUT {} healthy {}", url, port);
        let body = json!({
            "ports": [port],
            "ports_policy": fields::POLICY_HEALTHY,
        });
        self.set_ports_policy(self.client.put(&url), body).await
    }

    #[instrument(skip(self))]
    async fn get_ports_metadata(&self) -> Result<Vec<PortMetadata>> {
        let url = self.url(endpoints::PORTS_PATH);
        let document = self.get_json(&url).await?;
        Self::parse_metadata(&url, document)
    }

    #[instrument(skip(self))]
    async fn get_port_metadata(&self, port: &str) -> Result<Vec<PortMetadata>> {
        let url = format!("{}/{}", self.url(endpoints::PORTS_PATH), port);
        let document = self.get_json(&url).await?;
        Self::parse_metadata(&url, document)
    }

    #[instrument(skip(self))]
    async fn send_event(&self, message: &str) -> Result<()> {
        let url = self.url(endpoints::EXTERNAL_EVENT_PATH);
        let body = json!({
            "event_id": endpoints::EXTERNAL_EVENT_ID,
            "description": message,
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UfmError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> UfmClientConfig {
        UfmClientConfig {
            base_url: base_url.to_string(),
            telemetry_url: "http://127.0.0.1:9001/telemetry".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let client = UfmClient::new(config("https://ufm.local/")).unwrap();
        assert_eq!(client.base_url(), "https://ufm.local");
        assert_eq!(
            client.url(endpoints::PORTS_PATH),
            "https://ufm.local/ufmRestV2/resources/ports"
        );
    }

    #[test]
    fn test_new_rejects_empty_base_url() {
        let result = UfmClient::new(config(""));
        assert!(matches!(result, Err(UfmError::Config(_))));
    }

    #[test]
    fn test_parse_telemetry_first_fabric() {
        let document = json!({
            "fabric-a": {
                "Ports": {
                    "e41d2d0300062380_3": { "statistics": { "PortRcvPktsExtended": 10 } },
                    "e41d2d0300062380_4": { "statistics": {} }
                }
            }
        });

        let snapshot = parse_telemetry("/telemetry", document).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.ports["e41d2d0300062380_3"].counter("PortRcvPktsExtended"),
            Some(10.0)
        );
    }

    #[test]
    fn test_parse_telemetry_empty_document() {
        assert!(matches!(
            parse_telemetry("/telemetry", json!({})),
            Err(UfmError::Empty(_))
        ));
        assert!(matches!(
            parse_telemetry("/telemetry", Value::Null),
            Err(UfmError::Empty(_))
        ));
    }

    #[test]
    fn test_parse_telemetry_missing_ports_table() {
        let result = parse_telemetry("/telemetry", json!({ "fabric-a": { "Switches": {} } }));
        assert!(matches!(result, Err(UfmError::Decode { .. })));
    }

    #[test]
    fn test_parse_metadata_accepts_object_or_array() {
        let single =
            UfmClient::parse_metadata("/ports/p1", json!({ "name": "p1", "active_speed": "HDR" }))
                .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].active_speed.as_deref(), Some("HDR"));

        let many = UfmClient::parse_metadata(
            "/ports",
            json!([{ "name": "p1" }, { "name": "p2", "active_speed": "NDR" }]),
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[0].active_speed, None);
    }
}
