use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::{HostSlots, SlotPool, host_key, is_success_status, retry_delay};
use crate::data::{FetchRequest, FetchResponse, SpiderConfig};
use crate::effects::http::{HttpClient, HttpGet};
use crate::effects::sink::Sink;
use crate::error::{FetchError, Result};

type Registry = Arc<Mutex<HashMap<String, Arc<Download>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One active network operation. Every URL of the request that started it
/// maps to the same record.
struct Download {
    id:     u64,
    url:    String,
    result: watch::Receiver<Option<FetchResponse>>,
}

/// Held by the task doing the network work. Publishing the response, or
/// dropping the task before it could, removes the registry entries.
struct Registration {
    registry: Registry,
    id:       u64,
    keys:     Vec<String>,
    sender:   watch::Sender<Option<FetchResponse>>,
}

impl Registration {
    fn unregister(&self, registry: &mut HashMap<String, Arc<Download>>) {
        for key in &self.keys {
            if registry.get(key).is_some_and(|d| d.id == self.id) {
                registry.remove(key);
            }
        }
    }

    fn publish(self, response: FetchResponse) {
        let mut registry = lock(&self.registry);
        self.unregister(&mut registry);
        self.sender.send_replace(Some(response));
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        self.unregister(&mut registry);
    }
}

enum Entry {
    Leader {
        registration: Registration,
        result:       watch::Receiver<Option<FetchResponse>>,
    },
    Waiter(Arc<Download>),
}

/// Concurrent download engine.
///
/// At most one network operation runs per URL: a request whose primary URL,
/// or any mirror URL, is already being downloaded waits for that download
/// and receives the same [`FetchResponse`]. The work itself runs on a spawned
/// task, so a caller that stops waiting does not cancel it for the others.
///
/// Cloning is cheap and clones share all state.
pub struct WebSpider<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for WebSpider<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    client:   C,
    config:   SpiderConfig,
    registry: Registry,
    next_id:  AtomicU64,
    slots:    Arc<SlotPool>,
    hosts:    Arc<HostSlots>,
}

impl<C: HttpClient + 'static> WebSpider<C> {
    pub fn new(client: C, config: SpiderConfig) -> Self {
        let slots = SlotPool::new(config.max_downloads);
        let hosts = HostSlots::new(config.max_per_host);
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                registry: Arc::new(Mutex::new(HashMap::new())),
                next_id: AtomicU64::new(0),
                slots,
                hosts,
            }),
        }
    }

    pub fn config(&self) -> &SpiderConfig { &self.inner.config }

    pub fn client(&self) -> &C { &self.inner.client }

    /// Distinct downloads currently running.
    pub fn in_flight(&self) -> usize {
        let registry = lock(&self.inner.registry);
        registry.values().map(|d| d.id).collect::<HashSet<_>>().len()
    }

    pub fn available_slots(&self) -> usize { self.inner.slots.available() }

    /// Fetches `request`, or joins the download already fetching it.
    ///
    /// Never fails: network errors, exhausted retries and digest mismatches
    /// come back as a response whose [`success`](FetchResponse::success) is
    /// `false`.
    pub async fn download(&self, request: FetchRequest) -> FetchResponse {
        let request = Arc::new(request);
        let mut result = match self.inner.attach_or_register(&request) {
            Entry::Waiter(download) => {
                debug!(url = %request.url, leader = %download.url, "joining in-flight download");
                download.result.clone()
            }
            Entry::Leader {
                registration,
                result,
            } => {
                let inner = Arc::clone(&self.inner);
                let leading = Arc::clone(&request);
                tokio::spawn(async move {
                    let response = inner.run(leading).await;
                    registration.publish(response);
                });
                result
            }
        };

        let shared = match result.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        shared.unwrap_or_else(|| {
            warn!(url = %request.url, "download task ended without publishing a result");
            FetchResponse::failure(request, FetchError::Abandoned.to_string(), 0)
        })
    }
}

impl<C: HttpClient> Inner<C> {
    fn attach_or_register(&self, request: &FetchRequest) -> Entry {
        let mut registry = lock(&self.registry);
        if let Some(download) = request.urls().find_map(|url| registry.get(url)) {
            return Entry::Waiter(Arc::clone(download));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, result) = watch::channel(None);
        let download = Arc::new(Download {
            id,
            url: request.url.clone(),
            result: result.clone(),
        });
        let mut keys = Vec::new();
        for url in request.urls() {
            if !keys.iter().any(|k| k == url) {
                keys.push(url.to_string());
                registry.insert(url.to_string(), Arc::clone(&download));
            }
        }

        Entry::Leader {
            registration: Registration {
                registry: Arc::clone(&self.registry),
                id,
                keys,
                sender,
            },
            result,
        }
    }

    async fn run(&self, request: Arc<FetchRequest>) -> FetchResponse {
        let candidates = match candidates(&request) {
            Ok(candidates) => candidates,
            Err(e) => return FetchResponse::failure(request, e.to_string(), 0),
        };

        let mut kinds = self.config.hashes.clone();
        kinds.extend(request.expected.keys().copied());
        let temp_dir = self.config.resolved_temp_dir();
        let mut sink = match Sink::create(&temp_dir, kinds, self.config.chunk_size) {
            Ok(sink) => sink,
            Err(e) => return FetchResponse::failure(request, e.to_string(), 0),
        };

        let poll = self.config.slot_poll_duration();
        let backoff = self.config.retry_backoff_duration();
        let mut schedule = Schedule::new(&candidates, request.retry, self.config.max_attempts);
        let mut attempts = 0u32;
        let mut last_error = None;

        while let Some(index) = schedule.advance() {
            if attempts > 0 {
                tokio::time::sleep(retry_delay(attempts - 1, backoff)).await;
            }
            let (url, host) = &candidates[index];
            attempts += 1;

            let result = {
                // Host slot before global slot; neither outlives the attempt.
                let _host_slot = poll_acquire(|| self.hosts.try_acquire(host), poll).await;
                let _slot = poll_acquire(|| self.slots.try_acquire(), poll).await;
                debug!(url = %url, attempt = attempts, resume_from = sink.received(), "starting attempt");
                self.attempt(url, &request, &mut sink).await
            };

            match result {
                Ok(()) => return self.complete(request, sink, attempts).await,
                Err(e @ FetchError::HttpStatus { .. }) if !e.is_retryable() => {
                    schedule.retire(index);
                    if schedule.has_next() {
                        warn!(url = %url, error = %e, "source refused, trying next");
                    }
                    last_error = Some(e);
                }
                Err(e) if e.is_retryable() => {
                    if schedule.has_next() {
                        warn!(url = %url, attempt = attempts, error = %e, "attempt failed, retrying");
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        let reason = match last_error {
            Some(e) if attempts > 1 => format!("{e} (gave up after {attempts} attempts)"),
            Some(e) => e.to_string(),
            None => "no attempt was made".to_string(),
        };
        warn!(url = %request.url, attempts, reason = %reason, "download failed");
        FetchResponse::failure(request, reason, attempts)
    }

    async fn attempt(&self, url: &str, request: &FetchRequest, sink: &mut Sink) -> Result<()> {
        let range_start = sink.resume_offset(url);
        if range_start.is_none() && sink.received() > 0 {
            sink.reset().await?;
        }

        let response = self
            .client
            .get(HttpGet {
                url,
                headers: &request.headers,
                auth: request.auth.as_ref(),
                range_start,
            })
            .await
            .map_err(|e| network_error(url, &e))?;

        match response.status {
            206 if range_start.is_some() => {
                debug!(url = %url, offset = sink.received(), "server accepted range, resuming");
            }
            status if is_success_status(status) => {
                if sink.received() > 0 {
                    debug!(url = %url, status, "server ignored range, restarting from zero");
                    sink.reset().await?;
                }
            }
            status => {
                if status == 416 {
                    sink.reset().await?;
                }
                return Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status,
                });
            }
        }

        sink.set_source(url);
        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => sink.write(&bytes).await?,
                Err(e) => {
                    // Keep the file in step with the byte count for a resume.
                    sink.flush().await?;
                    return Err(network_error(url, &e));
                }
            }
        }
        sink.flush().await
    }

    async fn complete(&self, request: Arc<FetchRequest>, sink: Sink, attempts: u32) -> FetchResponse {
        let (temp, final_data) = match sink.finish().await {
            Ok(done) => done,
            Err(e) => return FetchResponse::failure(request, e.to_string(), attempts),
        };
        if let Err(e) = final_data.compare(&request.expected) {
            let reason = FetchError::from(e).to_string();
            warn!(url = %request.url, reason = %reason, "downloaded content failed verification");
            return FetchResponse::failure(request, reason, attempts);
        }
        info!(
            url = %request.url,
            size = final_data.size(),
            attempts,
            "download complete"
        );
        FetchResponse::succeeded(request, temp, final_data, attempts)
    }
}

/// Decides which candidate URL the next attempt goes to.
///
/// Attempts rotate primary first, then mirrors. Each URL gets up to
/// `max_attempts` tries and a terminal status retires it for the rest of the
/// request. The total is `max_attempts`, raised so every URL is tried at least
/// once. A non-retryable request makes exactly one attempt.
struct Schedule {
    tried:  Vec<u32>,
    cap:    u32,
    budget: u32,
    used:   u32,
    cursor: usize,
}

impl Schedule {
    fn new(candidates: &[(String, String)], retry: bool, max_attempts: u32) -> Self {
        let cap = if retry { max_attempts.max(1) } else { 1 };
        let budget = if retry {
            cap.max(u32::try_from(candidates.len()).unwrap_or(u32::MAX))
        } else {
            1
        };
        Self {
            tried: vec![0; candidates.len()],
            cap,
            budget,
            used: 0,
            cursor: 0,
        }
    }

    fn peek(&self) -> Option<usize> {
        if self.used >= self.budget {
            return None;
        }
        let len = self.tried.len();
        (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&index| self.tried[index] < self.cap)
    }

    fn has_next(&self) -> bool { self.peek().is_some() }

    fn advance(&mut self) -> Option<usize> {
        let index = self.peek()?;
        self.tried[index] += 1;
        self.used += 1;
        self.cursor = index + 1;
        Some(index)
    }

    fn retire(&mut self, index: usize) { self.tried[index] = self.cap; }
}

/// Tries `try_acquire` until it yields, sleeping `interval` in between. A
/// blocking wait here could starve the very task that would free a slot.
async fn poll_acquire<G>(mut try_acquire: impl FnMut() -> Option<G>, interval: Duration) -> G {
    loop {
        if let Some(guard) = try_acquire() {
            return guard;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Attempt order: primary URL, then mirrors. Unparseable mirrors are
/// skipped; an unparseable primary URL fails the request.
fn candidates(request: &FetchRequest) -> Result<Vec<(String, String)>> {
    let primary = parse_url(&request.url)?;
    let mut out = vec![(request.url.clone(), host_key(&primary))];
    for mirror in &request.mirrors {
        match parse_url(mirror) {
            Ok(url) => out.push((mirror.clone(), host_key(&url))),
            Err(e) => warn!(url = %request.url, error = %e, "skipping mirror"),
        }
    }
    Ok(out)
}

fn parse_url(raw: &str) -> Result<Url> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(invalid("missing host".to_string())),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

fn network_error(url: &str, error: &(dyn StdError + 'static)) -> FetchError {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    FetchError::Network {
        url: url.to_string(),
        message,
    }
}
