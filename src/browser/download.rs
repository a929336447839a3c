//! Out-of-band resource fetching.
//!
//! Downloads run over a plain HTTP client rather than through the render
//! engine, so large files never touch the page. The caller passes the
//! cookie header derived from the engine's jar to keep authenticated
//! sessions working.

use reqwest::header::COOKIE;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use url::Url;

use crate::browser::engine::EngineConfig;
use crate::error::{BrowserError, Result};

/// HTTP client for fetching resources outside the render engine.
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Builds a client mirroring the engine's network identity: same
    /// user agent, same proxy, same certificate policy.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.clone())?);
        }
        if config.ignore_certificate_errors {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Fetches `url` fully into memory.
    pub async fn fetch(&self, url: &Url, cookie_header: Option<&str>) -> Result<Vec<u8>> {
        let response = self.request(url, cookie_header).await?;
        let bytes = response.bytes().await?;
        info!(%url, bytes = bytes.len(), "download complete");
        Ok(bytes.to_vec())
    }

    /// Streams `url` into `writer` chunk by chunk and returns the number
    /// of bytes written.
    pub async fn fetch_to<W>(
        &self,
        url: &Url,
        cookie_header: Option<&str>,
        writer: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut response = self.request(url, cookie_header).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        info!(%url, bytes = written, "streamed download complete");
        Ok(written)
    }

    async fn request(
        &self,
        url: &Url,
        cookie_header: Option<&str>,
    ) -> Result<reqwest::Response> {
        ensure_http(url)?;
        debug!(%url, "downloading");

        let mut request = self.client.get(url.clone());
        if let Some(header) = cookie_header.filter(|h| !h.is_empty()) {
            request = request.header(COOKIE, header);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response)
    }
}

fn ensure_http(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(BrowserError::operation(format!(
            "cannot download '{url}': scheme '{other}' is not supported"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_http_accepts_web_schemes() {
        assert!(ensure_http(&Url::parse("http://example.org/f.bin").unwrap()).is_ok());
        assert!(ensure_http(&Url::parse("https://example.org/f.bin").unwrap()).is_ok());
    }

    #[test]
    fn test_ensure_http_rejects_other_schemes() {
        let err = ensure_http(&Url::parse("ftp://example.org/f.bin").unwrap()).unwrap_err();
        assert!(err.to_string().contains("ftp"));
        assert!(ensure_http(&Url::parse("file:///tmp/f.bin").unwrap()).is_err());
    }

    #[test]
    fn test_downloader_builds_from_config() {
        let config = EngineConfig::default().user_agent("webpilot-test/1.0");
        assert!(Downloader::new(&config).is_ok());
    }
}
