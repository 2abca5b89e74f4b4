//! Network access for the worker.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::cache::Snapshot;
use crate::error::FetchError;
use crate::request::Request;

/// Anything that can carry a request to the network.
///
/// Any HTTP status is a successful fetch; only transport failures are errors.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Snapshot, FetchError>>;
}

/// Fetcher backed by a reqwest client.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("mapworker/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Snapshot, FetchError>> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes());
    let client = self.client.clone();
    let request = request.clone();

    async move {
      let method =
        method.map_err(|_| FetchError::InvalidRequest(format!("method {}", request.method)))?;
      let mut builder = client.request(method, request.url.clone());
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if let Some(body) = request.body {
        builder = builder.body(body);
      }

      let response = builder.send().await?;
      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
      let body = response.bytes().await?;

      tracing::trace!(url = %request.url, status, bytes = body.len(), "Fetched");
      Ok(Snapshot::new(status, headers, body.to_vec()))
    }
    .boxed()
  }
}
