//! APNs HTTP/2 deliverer

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Identity, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;
use x509_parser::pem::Pem;

use crate::delivery::{Deliverer, DeliveryOutcome};
use crate::error::{Error, Result};
use crate::types::Registration;

/// Notifications that cannot be delivered within a day are dropped by APNs
const EXPIRATION_HOURS: i64 = 24;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// userId (0.9.2342.19200300.100.1.1), which carries the topic in push certificates
const SUBJECT_UID_OID: &str = "0.9.2342.19200300.100.1.1";

/// APNs environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApnsEndpoint {
    Production,
    Sandbox,
}

impl ApnsEndpoint {
    pub fn base_url(&self) -> &'static str {
        match self {
            ApnsEndpoint::Production => "https://api.push.apple.com",
            ApnsEndpoint::Sandbox => "https://api.sandbox.push.apple.com",
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    reason: Option<String>,
}

/// Sends mail wake-up notifications through APNs
///
/// Authenticates with the mail push certificate; `topic` is the one the
/// certificate was issued for.
pub struct ApnsDeliverer {
    client: Client,
    base_url: String,
    topic: String,
}

impl ApnsDeliverer {
    /// Build a client from PEM encoded certificate and private key files
    ///
    /// Without a `topic` override the topic is read from the UID attribute of
    /// the certificate subject.
    pub async fn from_pem_files<P: AsRef<Path>>(
        certificate_file: P,
        key_file: P,
        topic: Option<String>,
        endpoint: ApnsEndpoint,
    ) -> Result<Self> {
        let mut pem = tokio::fs::read(certificate_file.as_ref()).await?;
        let topic = match topic {
            Some(topic) => topic,
            None => topic_from_certificate(&pem).map_err(|e| {
                Error::Config(format!("{}: {}", certificate_file.as_ref().display(), e))
            })?,
        };
        pem.push(b'\n');
        pem.extend(tokio::fs::read(key_file.as_ref()).await?);

        let identity = Identity::from_pem(&pem)
            .map_err(|e| Error::Config(format!("invalid push certificate or key: {}", e)))?;
        let client = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .http2_prior_knowledge()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self::with_client(client, endpoint.base_url(), topic))
    }

    /// Use an already configured client, e.g. against a local test server
    pub fn with_client(client: Client, base_url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn url(&self, registration: &Registration) -> String {
        format!("{}/3/device/{}", self.base_url, registration.device_token)
    }
}

/// Push topic of a certificate: the UID attribute of its subject
///
/// Uses the first CERTIFICATE block in `pem`.
pub fn topic_from_certificate(pem: &[u8]) -> Result<String> {
    for block in Pem::iter_from_buffer(pem) {
        let block = block.map_err(|e| Error::Config(format!("unreadable PEM data: {}", e)))?;
        if block.label != "CERTIFICATE" {
            continue;
        }
        let certificate = block
            .parse_x509()
            .map_err(|e| Error::Config(format!("invalid certificate: {}", e)))?;
        let uid = certificate
            .subject()
            .iter_attributes()
            .find(|attr| attr.attr_type().to_id_string() == SUBJECT_UID_OID)
            .ok_or_else(|| Error::Config("certificate subject has no UID".to_string()))?;
        let topic = uid
            .as_str()
            .map_err(|e| Error::Config(format!("certificate UID is not a string: {}", e)))?;
        return Ok(topic.to_string());
    }
    Err(Error::Config("no certificate found".to_string()))
}

/// Body of the wake-up notification
pub fn payload(registration: &Registration) -> serde_json::Value {
    json!({ "aps": { "account-id": registration.account_id } })
}

/// Map an APNs status and error body to an outcome
pub fn classify(status: StatusCode, body: &[u8]) -> DeliveryOutcome {
    match status {
        StatusCode::OK => DeliveryOutcome::Delivered,
        StatusCode::GONE => DeliveryOutcome::PermanentlyInvalid,
        status => DeliveryOutcome::TransientFailure {
            status: status.as_u16(),
            reason: serde_json::from_slice::<ErrorBody>(body)
                .ok()
                .and_then(|b| b.reason),
        },
    }
}

#[async_trait]
impl Deliverer for ApnsDeliverer {
    async fn deliver(&self, registration: &Registration) -> Result<DeliveryOutcome> {
        let apns_id = Uuid::new_v4();
        let expiration = (Utc::now() + chrono::Duration::hours(EXPIRATION_HOURS)).timestamp();
        let body = payload(registration);
        log::debug!("Sending {} ({}) to {}", body, apns_id, registration.device_token);

        let response = self
            .client
            .post(self.url(registration))
            .header("apns-topic", &self.topic)
            .header("apns-id", apns_id.to_string())
            .header("apns-expiration", expiration.to_string())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        Ok(classify(status, &bytes))
    }
}
