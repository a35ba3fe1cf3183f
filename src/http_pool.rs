use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;

use crate::config::HttpConfig;
use crate::errors::Result;

/// Fetches a web page as text. Non-success statuses are errors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Shared HTTP client for page scraping and catalog API calls.
#[derive(Clone)]
pub struct HttpPool {
    client: Client,
}

impl HttpPool {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Self::build(config, ClientBuilder::new().pool_idle_timeout(Some(Duration::from_secs(30))))
    }

    /// Client that keeps no idle connections. For use on the extraction
    /// worker, where each thread drives its own runtime and a pooled
    /// connection would be tied to whichever runtime opened it.
    pub fn unpooled(config: &HttpConfig) -> Result<Self> {
        Self::build(config, ClientBuilder::new().pool_max_idle_per_host(0))
    }

    fn build(config: &HttpConfig, builder: ClientBuilder) -> Result<Self> {
        let mut builder = builder
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Duration::from_secs(60));

        if let Some(proxy_url) = &config.proxy {
            log::info!("🌐 [HTTP] Using proxy: {}", proxy_url);
            builder = builder.proxy(Proxy::all(proxy_url)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PageFetcher for HttpPool {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        log::debug!("🌐 [HTTP] GET {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
