use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use url::Url;

use crate::config::ChatConfig;
use crate::errors::{NetworkErrorKind, StreamError, StreamResult};

pub const EVENT_STREAM: &str = "text/event-stream";

/// A fully composed outbound streaming request
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

pub struct StreamRequestBuilder<'a> {
    config: &'a ChatConfig,
}

impl<'a> StreamRequestBuilder<'a> {
    pub fn new(config: &'a ChatConfig) -> Self {
        Self { config }
    }

    /// Build the GET request for one user query. `text` is expected to be
    /// trimmed and non-empty already.
    pub fn build(&self, text: &str) -> StreamResult<StreamRequest> {
        let url = self.url(text)?;
        let headers = self.headers()?;
        Ok(StreamRequest {
            url,
            headers,
            timeout: self.config.timeout(),
        })
    }

    fn url(&self, text: &str) -> StreamResult<Url> {
        let raw = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.endpoint
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| StreamError::InvalidRequest(format!("{}: {}", raw, e)))?;

        match url.scheme() {
            "https" => {}
            "http" if self.config.allow_insecure_http => {}
            "http" => {
                return Err(StreamError::network(
                    NetworkErrorKind::InsecureTransport,
                    format!("plain http is not allowed for {}", raw),
                ))
            }
            other => {
                return Err(StreamError::InvalidRequest(format!(
                    "unsupported scheme {:?} in {}",
                    other, raw
                )))
            }
        }

        url.query_pairs_mut()
            .append_pair("text", &self.styled_text(text))
            .append_pair("langCode", &self.config.lang_code);
        Ok(url)
    }

    fn styled_text(&self, text: &str) -> String {
        if self.config.format_hint.is_empty() {
            text.to_string()
        } else {
            format!("{}\n\n{}", text, self.config.format_hint)
        }
    }

    fn headers(&self) -> StreamResult<HeaderMap> {
        let token = HeaderValue::from_str(&self.config.token)
            .map_err(|e| StreamError::InvalidRequest(format!("invalid token header: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token.clone());
        headers.insert(HeaderName::from_static("token"), token);
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_build_default_request() {
        let config = ChatConfig::new("secret");
        let request = StreamRequestBuilder::new(&config).build("如何避免运动损伤?").unwrap();

        assert_eq!(request.url.scheme(), "https");
        assert_eq!(request.url.host_str(), Some("www.iconsolepro.com"));
        assert_eq!(request.url.path(), "/oauth/iConsoleProAIApi/AiTest");
        assert_eq!(query(&request.url, "langCode").as_deref(), Some("0"));

        let text = query(&request.url, "text").unwrap();
        assert!(text.starts_with("如何避免运动损伤?\n\n"));
        assert!(text.ends_with(&config.format_hint));

        assert_eq!(request.headers[AUTHORIZATION], "secret");
        assert_eq!(request.headers["token"], "secret");
        assert_eq!(request.headers[ACCEPT], "text/event-stream");
        assert_eq!(request.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_without_format_hint() {
        let config = ChatConfig::new("t").with_format_hint("");
        let request = StreamRequestBuilder::new(&config).build("hi & bye").unwrap();
        assert_eq!(query(&request.url, "text").as_deref(), Some("hi & bye"));
    }

    #[test]
    fn test_plain_http_rejected_by_default() {
        let config = ChatConfig::new("t").with_base_url("http://localhost:8080");
        let err = StreamRequestBuilder::new(&config).build("hi").unwrap_err();
        assert_eq!(err.network_kind(), Some(NetworkErrorKind::InsecureTransport));
        assert!(!err.is_transient());

        let config = config.with_insecure_http(true);
        assert!(StreamRequestBuilder::new(&config).build("hi").is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let config = ChatConfig::new("t").with_base_url("not a url");
        let err = StreamRequestBuilder::new(&config).build("hi").unwrap_err();
        assert!(matches!(err, StreamError::InvalidRequest(_)));
    }

    #[test]
    fn test_invalid_token() {
        let config = ChatConfig::new("bad\ntoken");
        let err = StreamRequestBuilder::new(&config).build("hi").unwrap_err();
        assert!(matches!(err, StreamError::InvalidRequest(_)));
    }
}
