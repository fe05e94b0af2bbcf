//! HTTP client with connection pooling

use reqwest::{Client, Response};
use std::time::Duration;
use updraft_errors::{Error, NetworkError, ServerError};

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // large bundle downloads
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 4,
            user_agent: format!("updraft/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client wrapper shared by acquisition and download
#[derive(Clone)]
pub struct NetClient {
    client: Client,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built from
    /// the given configuration.
    pub fn new(config: &NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created with default
    /// settings.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(&NetConfig::default())
    }

    /// Execute a GET request
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` on transport failure. The response is
    /// returned whatever its status; status handling is the caller's.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        let request = self
            .client
            .get(url)
            .build()
            .map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;

        self.client
            .execute(request)
            .await
            .map_err(|e| Self::map_transport_error(url, &e).into())
    }

    /// Execute a GET request, demanding a 2xx response
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` on transport failure and
    /// `ServerError::UnexpectedStatus` on a non-success status.
    pub async fn get_ok(&self, url: &str) -> Result<Response, Error> {
        let response = self.get(url).await?;
        Self::demand_success(url, response)
    }

    /// Execute a GET request with a serialized query string, demanding a
    /// 2xx response. Percent-encoding is reqwest's.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` on transport failure and
    /// `ServerError::UnexpectedStatus` on a non-success status.
    pub async fn get_ok_with_query<Q>(&self, url: &str, query: &Q) -> Result<Response, Error>
    where
        Q: serde::Serialize + ?Sized,
    {
        let request = self
            .client
            .get(url)
            .query(query)
            .build()
            .map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| Self::map_transport_error(url, &e))?;
        Self::demand_success(url, response)
    }

    /// Execute a POST request with a JSON body, demanding a 2xx response
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` on transport failure and
    /// `ServerError::UnexpectedStatus` on a non-success status.
    pub async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, Error> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(url, &e))?;
        Self::demand_success(url, response)
    }

    fn demand_success(url: &str, response: Response) -> Result<Response, Error> {
        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }
        Ok(response)
    }

    fn map_transport_error(url: &str, e: &reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            NetworkError::ConnectionFailed(e.to_string())
        } else {
            NetworkError::RequestFailed(e.to_string())
        }
    }

    /// Get the underlying reqwest client for advanced usage
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
