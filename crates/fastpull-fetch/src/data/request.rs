use std::collections::BTreeMap;
use std::fmt;

use fastpull_verify::HashKind;
use serde::{Deserialize, Serialize};

/// Basic-auth credentials sent with every attempt of a request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// What to fetch and how.
///
/// Two requests for the same primary URL share one download. Mirror URLs
/// are also checked against in-flight downloads.
///
/// # Examples
///
/// ```
/// use fastpull_fetch::FetchRequest;
/// use fastpull_verify::HashKind;
///
/// let request = FetchRequest::new("https://distfiles.example.org/foo-1.0.tar.gz")
///     .mirror("https://mirror.example.net/foo-1.0.tar.gz")
///     .header("User-Agent", "fastpull")
///     .expect_hash(HashKind::Size, "1024");
///
/// assert_eq!(request.urls().count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url:      String,
    #[serde(default)]
    pub mirrors:  Vec<String>,
    /// When `false`, exactly one attempt is made.
    #[serde(default = "default_retry")]
    pub retry:    bool,
    #[serde(default)]
    pub headers:  BTreeMap<String, String>,
    #[serde(default)]
    pub auth:     Option<BasicAuth>,
    /// Digests the payload must reproduce. Checked once the body is complete.
    #[serde(default)]
    pub expected: BTreeMap<HashKind, String>,
}

fn default_retry() -> bool { true }

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url:      url.into(),
            mirrors:  Vec::new(),
            retry:    true,
            headers:  BTreeMap::new(),
            auth:     None,
            expected: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn mirror(mut self, url: impl Into<String>) -> Self {
        self.mirrors.push(url.into());
        self
    }

    #[must_use]
    pub fn mirrors<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mirrors.extend(urls.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password,
        });
        self
    }

    #[must_use]
    pub fn expect_hash(mut self, kind: HashKind, value: impl Into<String>) -> Self {
        self.expected.insert(kind, value.into());
        self
    }

    /// Primary URL followed by the mirrors, in order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str()).chain(self.mirrors.iter().map(String::as_str))
    }
}
