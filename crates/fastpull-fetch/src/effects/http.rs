use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::data::BasicAuth;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// One streamed `GET`.
#[derive(Debug, Clone, Copy)]
pub struct HttpGet<'a> {
    pub url:         &'a str,
    pub headers:     &'a BTreeMap<String, String>,
    pub auth:        Option<&'a BasicAuth>,
    /// Ask for the body starting at this offset (`Range: bytes=N-`).
    pub range_start: Option<u64>,
}

/// Status line and body of a response. The body is only read for 2xx.
pub struct HttpResponse<E> {
    pub status: u16,
    pub body:   BoxStream<'static, Result<Bytes, E>>,
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations follow redirects and apply their own timeouts. They must
/// not turn non-2xx statuses into errors; the spider classifies statuses
/// itself.
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation using `reqwest`
/// - scripted fakes in tests
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get(
        &self,
        request: HttpGet<'_>,
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};
    use std::thread::ThreadId;

    use futures_util::StreamExt;

    use super::*;
    use crate::data::SpiderConfig;

    /// Production HTTP client implementation using reqwest.
    ///
    /// A `reqwest::Client` carries its DNS resolver and connection pool and
    /// is bound to the runtime that first drives it, so one client is kept
    /// per OS thread. A tokio runtime owns its worker threads, which makes
    /// the thread a safe stand-in for the scheduling context.
    pub struct ReqwestClient {
        config:  SpiderConfig,
        clients: Mutex<HashMap<ThreadId, reqwest::Client>>,
    }

    impl ReqwestClient {
        /// Builds the client for the calling thread up front so a bad
        /// configuration is reported here rather than on first download.
        pub fn new(config: &SpiderConfig) -> Result<Self, reqwest::Error> {
            let client = Self {
                config:  config.clone(),
                clients: Mutex::new(HashMap::new()),
            };
            client.current()?;
            Ok(client)
        }

        fn build(&self) -> Result<reqwest::Client, reqwest::Error> {
            reqwest::Client::builder()
                .user_agent(self.config.user_agent.as_str())
                .connect_timeout(self.config.connect_timeout())
                .read_timeout(self.config.read_timeout())
                .build()
        }

        fn current(&self) -> Result<reqwest::Client, reqwest::Error> {
            let id = std::thread::current().id();
            let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(client) = clients.get(&id) {
                return Ok(client.clone());
            }
            let client = self.build()?;
            clients.insert(id, client.clone());
            Ok(client)
        }

        /// Number of per-thread clients created so far.
        pub fn contexts(&self) -> usize {
            self.clients.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            request: HttpGet<'_>,
        ) -> Result<HttpResponse<Self::Error>, Self::Error> {
            let client = self.current()?;
            let mut builder = client.get(request.url);

            for (key, value) in request.headers {
                builder = builder.header(key, value);
            }
            if let Some(auth) = request.auth {
                builder = builder.basic_auth(&auth.username, auth.password.as_deref());
            }
            if let Some(offset) = request.range_start {
                builder = builder.header(reqwest::header::RANGE, format!("bytes={offset}-"));
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes_stream().boxed();

            Ok(HttpResponse { status, body })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
