//! Intercepted requests as seen by the worker.

use serde::{Deserialize, Serialize};
use url::Url;

/// What the page intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  /// Top-level navigation
  Document,
  Script,
  Style,
  Image,
  Font,
  Manifest,
  /// fetch()/XHR traffic
  #[default]
  Empty,
}

/// A request intercepted from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
  pub method: String,
  pub url: Url,
  #[serde(default)]
  pub destination: Destination,
  #[serde(default)]
  pub headers: Vec<(String, String)>,
  #[serde(default)]
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
      destination: Destination::Empty,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// First header value matching `name`, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the page expects a full navigable document back.
  pub fn wants_document(&self) -> bool {
    self.destination == Destination::Document
      || self
        .header("accept")
        .is_some_and(|accept| accept.contains("text/html"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_method_is_normalized() {
    let req = Request::new("post", url("http://localhost/api/share"));
    assert_eq!(req.method, "POST");
    assert!(!req.is_get());
  }

  #[test]
  fn test_wants_document_from_destination() {
    let req = Request::get(url("http://localhost/")).with_destination(Destination::Document);
    assert!(req.wants_document());
  }

  #[test]
  fn test_wants_document_from_accept_header() {
    let req = Request::get(url("http://localhost/about"))
      .with_header("Accept", "text/html,application/xhtml+xml");
    assert!(req.wants_document());

    let req = Request::get(url("http://localhost/api/v1/health"))
      .with_header("Accept", "application/json");
    assert!(!req.wants_document());
  }
}
