//! Async HTTP client wrapping the Rapport JSON API, and the two service
//! traits the rest of the client is written against.

use std::{future::Future, time::Duration};

use rapport_core::{exchange::RawDelivery, payload::SharePayload};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::{ClientError, Result};

// ─── Service traits ──────────────────────────────────────────────────────────

/// Server-held short links.
pub trait AliasService: Send + Sync {
  /// Store `token` under a short slug and return the canonical short URL.
  fn shorten<'a>(&'a self, token: &'a str) -> impl Future<Output = Result<String>> + Send + 'a;

  /// The token behind `slug`. Unknown or expired slugs are
  /// [`ClientError::StaleAlias`].
  fn resolve<'a>(&'a self, slug: &'a str) -> impl Future<Output = Result<String>> + Send + 'a;
}

/// The reciprocal-exchange mailbox.
pub trait Mailbox: Send + Sync {
  /// Queue `payload` for `target_id` to pick up.
  fn send<'a>(
    &'a self,
    initiator_id: &'a str,
    target_id: &'a str,
    payload: &'a SharePayload,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Claim the next batch of deliveries for `profile_id`. Payloads are not
  /// yet validated.
  fn drain<'a>(
    &'a self,
    profile_id: &'a str,
  ) -> impl Future<Output = Result<Vec<RawDelivery>>> + Send + 'a;
}

// ─── HTTP client ─────────────────────────────────────────────────────────────

/// Connection settings for the Rapport API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout:  Duration,
}

/// Async HTTP client for the Rapport JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

#[derive(Deserialize)]
struct ShortenResponse {
  url: String,
}

#[derive(Deserialize)]
struct ResolveResponse {
  token: String,
}

#[derive(Deserialize)]
struct DrainResponse {
  #[serde(default)]
  exchanges: Vec<RawDelivery>,
}

#[derive(Deserialize)]
struct FailureBody {
  #[serde(default)]
  message: String,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { client, config })
  }

  pub fn base_url(&self) -> &str { self.config.base_url.trim_end_matches('/') }

  fn url(&self, path: &str) -> String { format!("{}{}", self.base_url(), path) }

  /// `GET /health`
  pub async fn health(&self) -> Result<()> {
    let resp = self.client.get(self.url("/health")).send().await?;
    read_json::<serde_json::Value>(resp).await.map(|_| ())
  }
}

/// Decode a success body, or turn `{ ok: false, message }` into
/// [`ClientError::Server`].
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
  let status = resp.status();
  let bytes = resp.bytes().await?;

  if !status.is_success() {
    let message = serde_json::from_slice::<FailureBody>(&bytes)
      .map(|b| b.message)
      .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
    return Err(ClientError::Server { status: status.as_u16(), message });
  }

  Ok(serde_json::from_slice(&bytes)?)
}

impl AliasService for ApiClient {
  /// `POST /alias`
  async fn shorten<'a>(&'a self, token: &'a str) -> Result<String> {
    let resp = self
      .client
      .post(self.url("/alias"))
      .json(&json!({ "token": token }))
      .send()
      .await?;
    Ok(read_json::<ShortenResponse>(resp).await?.url)
  }

  /// `GET /alias/:slug`
  async fn resolve<'a>(&'a self, slug: &'a str) -> Result<String> {
    let resp = self.client.get(self.url(&format!("/alias/{slug}"))).send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Err(ClientError::StaleAlias);
    }
    Ok(read_json::<ResolveResponse>(resp).await?.token)
  }
}

impl Mailbox for ApiClient {
  /// `POST /exchange`
  async fn send<'a>(
    &'a self,
    initiator_id: &'a str,
    target_id: &'a str,
    payload: &'a SharePayload,
  ) -> Result<()> {
    let resp = self
      .client
      .post(self.url("/exchange"))
      .json(&json!({
        "initiatorId": initiator_id,
        "targetId": target_id,
        "payload": payload,
      }))
      .send()
      .await?;
    read_json::<serde_json::Value>(resp).await.map(|_| ())
  }

  /// `GET /exchange?profileId=<id>`
  async fn drain<'a>(&'a self, profile_id: &'a str) -> Result<Vec<RawDelivery>> {
    let resp = self
      .client
      .get(self.url("/exchange"))
      .query(&[("profileId", profile_id)])
      .send()
      .await?;
    Ok(read_json::<DrainResponse>(resp).await?.exchanges)
  }
}
