use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use fastpull_fetch::{FetchRequest, HttpClient, HttpGet, HttpResponse, SpiderConfig, WebSpider};
use fastpull_verify::{HashKind, hash_reader};
use futures_util::StreamExt;
use futures_util::future::join_all;
use tempfile::TempDir;

const EMPTY_SHA512: &str = "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e";

enum Reply {
    Body(u16, Vec<&'static str>),
    /// Sends the chunks, then the connection drops.
    Cut(u16, Vec<&'static str>),
    Status(u16),
}

#[derive(Debug, Clone)]
struct Call {
    url:     String,
    range:   Option<u64>,
    headers: BTreeMap<String, String>,
    user:    Option<String>,
}

#[derive(Default)]
struct Script {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls:   Mutex<Vec<Call>>,
    delay:   Duration,
    active:  AtomicUsize,
    peak:    AtomicUsize,
}

impl Script {
    fn new() -> Self { Self::default() }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn reply(self, url: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn build(self) -> ScriptedClient { ScriptedClient(Arc::new(self)) }
}

#[derive(Clone)]
struct ScriptedClient(Arc<Script>);

impl Deref for ScriptedClient {
    type Target = Script;

    fn deref(&self) -> &Script { &self.0 }
}

impl HttpClient for ScriptedClient {
    type Error = io::Error;

    async fn get(&self, request: HttpGet<'_>) -> Result<HttpResponse<io::Error>, io::Error> {
        self.calls.lock().unwrap().push(Call {
            url:     request.url.to_string(),
            range:   request.range_start,
            headers: request.headers.clone(),
            user:    request.auth.map(|a| a.username.clone()),
        });

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(request.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Status(404));

        let (status, chunks, cut) = match reply {
            Reply::Body(status, chunks) => (status, chunks, false),
            Reply::Cut(status, chunks) => (status, chunks, true),
            Reply::Status(status) => (status, Vec::new(), false),
        };
        let mut items: Vec<Result<Bytes, io::Error>> =
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        if cut {
            items.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")));
        }
        Ok(HttpResponse {
            status,
            body: futures_util::stream::iter(items).boxed(),
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn spider(client: &ScriptedClient, temp: &TempDir) -> WebSpider<ScriptedClient> {
    let config = SpiderConfig::default()
        .retry_backoff(Duration::ZERO)
        .slot_poll_interval(Duration::from_millis(1))
        .temp_dir(temp.path());
    WebSpider::new(client.clone(), config)
}

fn sha256_of(text: &str) -> String {
    hash_reader(text.as_bytes(), &[HashKind::Sha256])
        .unwrap()
        .digest(HashKind::Sha256)
        .unwrap()
        .to_string()
}

fn temp_files(temp: &TempDir) -> usize { std::fs::read_dir(temp.path()).unwrap().count() }

const URL: &str = "https://dist.example.org/pkg-1.0.tar.gz";
const MIRROR: &str = "https://mirror.example.net/pkg-1.0.tar.gz";

#[tokio::test]
async fn concurrent_requests_share_one_download() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let client = Script::slow(Duration::from_millis(50))
        .reply(URL, Reply::Body(200, vec!["payload"]))
        .build();
    let spider = spider(&client, &temp);

    let responses = join_all((0..10).map(|_| spider.download(FetchRequest::new(URL)))).await;

    assert_eq!(client.calls.lock().unwrap().len(), 1);
    let first = &responses[0];
    assert!(first.success());
    for response in &responses {
        assert!(response.success());
        assert_eq!(response.temp_path(), first.temp_path());
        assert_eq!(response.final_data(), first.final_data());
    }
    assert_eq!(spider.in_flight(), 0);
}

#[tokio::test]
async fn spawned_callers_share_one_download() {
    let temp = TempDir::new().unwrap();
    let client = Script::slow(Duration::from_millis(50))
        .reply(URL, Reply::Body(200, vec!["payload"]))
        .build();
    let spider = spider(&client, &temp);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let spider = spider.clone();
            tokio::spawn(async move { spider.download(FetchRequest::new(URL)).await })
        })
        .collect();
    let mut digests = Vec::new();
    for handle in handles {
        let response = handle.await.unwrap();
        digests.push(response.final_data().unwrap().sha512().unwrap().to_string());
    }

    assert_eq!(client.calls.lock().unwrap().len(), 1);
    assert!(digests.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let temp = TempDir::new().unwrap();
    let client = Script::new().reply(URL, Reply::Status(404)).build();
    let response = spider(&client, &temp).download(FetchRequest::new(URL)).await;

    assert!(!response.success());
    assert_eq!(response.attempts(), 1);
    assert!(response.failure_reason().unwrap().contains("404"));
    assert_eq!(client.calls.lock().unwrap().len(), 1);
    assert_eq!(temp_files(&temp), 0);
}

#[tokio::test]
async fn server_error_is_retried() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Status(503))
        .reply(URL, Reply::Body(200, vec!["hello ", "world"]))
        .build();
    let response = spider(&client, &temp).download(FetchRequest::new(URL)).await;

    assert!(response.success());
    assert_eq!(response.attempts(), 2);
    let data = response.final_data().unwrap();
    assert_eq!(data.size(), 11);
    assert_eq!(data.digest(HashKind::Sha256), Some(sha256_of("hello world").as_str()));
}

#[tokio::test]
async fn retry_disabled_makes_one_attempt() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Status(503))
        .reply(URL, Reply::Body(200, vec!["late"]))
        .build();
    let response = spider(&client, &temp)
        .download(FetchRequest::new(URL).retry(false))
        .await;

    assert!(!response.success());
    assert_eq!(response.attempts(), 1);
    assert!(response.failure_reason().unwrap().contains("503"));
}

#[tokio::test]
async fn exhausted_retries_report_attempts() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Status(503))
        .reply(URL, Reply::Status(502))
        .reply(URL, Reply::Status(503))
        .build();
    let response = spider(&client, &temp).download(FetchRequest::new(URL)).await;

    assert!(!response.success());
    assert_eq!(response.attempts(), 3);
    let reason = response.failure_reason().unwrap();
    assert!(reason.contains("503"), "{reason}");
    assert!(reason.contains("3 attempts"), "{reason}");
    assert_eq!(temp_files(&temp), 0);
}

#[tokio::test]
async fn interrupted_body_resumes_with_range() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Cut(200, vec!["hello "]))
        .reply(URL, Reply::Body(206, vec!["world"]))
        .build();
    let response = spider(&client, &temp).download(FetchRequest::new(URL)).await;

    assert!(response.success());
    let ranges: Vec<_> = client.calls.lock().unwrap().iter().map(|c| c.range).collect();
    assert_eq!(ranges, [None, Some(6)]);
    let path = response.temp_path().unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "hello world");
    assert_eq!(
        response.final_data().unwrap().digest(HashKind::Sha256),
        Some(sha256_of("hello world").as_str())
    );
}

#[tokio::test]
async fn ignored_range_restarts_from_zero() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Cut(200, vec!["hello "]))
        .reply(URL, Reply::Body(200, vec!["hello ", "world"]))
        .build();
    let response = spider(&client, &temp).download(FetchRequest::new(URL)).await;

    assert!(response.success());
    let path = response.temp_path().unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "hello world");
    assert_eq!(response.final_data().unwrap().size(), 11);
}

#[tokio::test]
async fn empty_body_is_a_valid_download() {
    let temp = TempDir::new().unwrap();
    let client = Script::new().reply(URL, Reply::Body(200, vec![])).build();
    let response = spider(&client, &temp).download(FetchRequest::new(URL)).await;

    assert!(response.success());
    let data = response.final_data().unwrap();
    assert_eq!(data.size(), 0);
    assert_eq!(data.sha512(), Some(EMPTY_SHA512));
    assert_eq!(std::fs::metadata(response.temp_path().unwrap()).unwrap().len(), 0);
}

#[tokio::test]
async fn expected_hash_mismatch_fails_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Body(200, vec!["tampered"]))
        .build();
    let request = FetchRequest::new(URL).expect_hash(HashKind::Sha256, "00".repeat(32));
    let response = spider(&client, &temp).download(request).await;

    assert!(!response.success());
    assert_eq!(response.attempts(), 1);
    assert!(response.failure_reason().unwrap().contains("mismatch"));
    assert_eq!(temp_files(&temp), 0);
}

#[tokio::test]
async fn expected_hash_match_succeeds() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Body(200, vec!["genuine"]))
        .build();
    let request = FetchRequest::new(URL)
        .expect_hash(HashKind::Sha256, sha256_of("genuine").to_uppercase())
        .expect_hash(HashKind::Size, "7");
    let response = spider(&client, &temp).download(request).await;

    assert!(response.success());
}

#[tokio::test]
async fn mirror_in_flight_satisfies_other_request() {
    let temp = TempDir::new().unwrap();
    let client = Script::slow(Duration::from_millis(50))
        .reply(URL, Reply::Body(200, vec!["shared"]))
        .build();
    let spider = spider(&client, &temp);

    let (a, b) = tokio::join!(
        spider.download(FetchRequest::new(URL).mirror(MIRROR)),
        spider.download(FetchRequest::new(MIRROR)),
    );

    assert_eq!(client.calls.lock().unwrap().len(), 1);
    assert!(a.success() && b.success());
    assert_eq!(a.temp_path(), b.temp_path());
    assert_eq!(b.request().url, URL);
}

#[tokio::test]
async fn falls_back_to_mirror() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Status(503))
        .reply(MIRROR, Reply::Body(200, vec!["from mirror"]))
        .build();
    let response = spider(&client, &temp)
        .download(FetchRequest::new(URL).mirror(MIRROR))
        .await;

    assert!(response.success());
    assert_eq!(response.attempts(), 2);
    let urls: Vec<_> = client.calls.lock().unwrap().iter().map(|c| c.url.clone()).collect();
    assert_eq!(urls, [URL, MIRROR]);
}

#[tokio::test]
async fn temp_file_lives_until_last_response_drops() {
    let temp = TempDir::new().unwrap();
    let client = Script::new().reply(URL, Reply::Body(200, vec!["data"])).build();
    let response = spider(&client, &temp).download(FetchRequest::new(URL)).await;
    let path = response.temp_path().unwrap().to_path_buf();
    let copy = response.clone();

    drop(response);
    assert!(path.exists());
    drop(copy);
    assert!(!path.exists());
}

#[tokio::test]
async fn per_host_limit_serializes_requests() {
    let temp = TempDir::new().unwrap();
    let mut client = Script::slow(Duration::from_millis(20));
    for i in 0..4 {
        client = client.reply(&format!("https://one.example/{i}"), Reply::Body(200, vec!["x"]));
    }
    let client = client.build();
    let config = SpiderConfig::default()
        .max_per_host(1)
        .slot_poll_interval(Duration::from_millis(1))
        .temp_dir(temp.path());
    let spider = WebSpider::new(client.clone(), config);

    let responses = join_all(
        (0..4).map(|i| spider.download(FetchRequest::new(format!("https://one.example/{i}")))),
    )
    .await;

    assert!(responses.iter().all(|r| r.success()));
    assert_eq!(client.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_url_fails_without_network() {
    let temp = TempDir::new().unwrap();
    let client = Script::new().build();
    let response = spider(&client, &temp)
        .download(FetchRequest::new("not a url"))
        .await;

    assert!(!response.success());
    assert_eq!(response.attempts(), 0);
    assert!(client.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn headers_and_auth_reach_the_client() {
    let temp = TempDir::new().unwrap();
    let client = Script::new().reply(URL, Reply::Body(200, vec!["ok"])).build();
    let request = FetchRequest::new(URL)
        .header("Accept", "application/octet-stream")
        .basic_auth("builder", Some("secret".to_string()));
    spider(&client, &temp).download(request).await;

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls[0].headers.get("Accept").map(String::as_str), Some("application/octet-stream"));
    assert_eq!(calls[0].user.as_deref(), Some("builder"));
}

#[tokio::test]
async fn completed_download_is_not_reused() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Body(200, vec!["one"]))
        .reply(URL, Reply::Body(200, vec!["two"]))
        .build();
    let spider = spider(&client, &temp);

    let first = spider.download(FetchRequest::new(URL)).await;
    let second = spider.download(FetchRequest::new(URL)).await;

    assert_eq!(client.calls.lock().unwrap().len(), 2);
    assert_ne!(first.final_data(), second.final_data());
}

#[tokio::test]
async fn refused_primary_falls_back_to_mirror() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Status(404))
        .reply(MIRROR, Reply::Body(200, vec!["from mirror"]))
        .build();
    let response = spider(&client, &temp)
        .download(FetchRequest::new(URL).mirror(MIRROR))
        .await;

    assert!(response.success(), "{:?}", response.failure_reason());
    assert_eq!(response.attempts(), 2);
    let urls: Vec<_> = client.calls.lock().unwrap().iter().map(|c| c.url.clone()).collect();
    assert_eq!(urls, [URL, MIRROR]);
}

#[tokio::test]
async fn every_mirror_gets_an_attempt() {
    let mirrors = [
        "https://m1.example.net/pkg-1.0.tar.gz",
        "https://m2.example.net/pkg-1.0.tar.gz",
        "https://m3.example.net/pkg-1.0.tar.gz",
    ];
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Status(503))
        .reply(mirrors[0], Reply::Status(503))
        .reply(mirrors[1], Reply::Status(503))
        .reply(mirrors[2], Reply::Body(200, vec!["last one"]))
        .build();
    let response = spider(&client, &temp)
        .download(FetchRequest::new(URL).mirrors(mirrors.iter().map(|m| m.to_string())))
        .await;

    assert!(response.success(), "{:?}", response.failure_reason());
    assert_eq!(response.attempts(), 4);
    let urls: Vec<_> = client.calls.lock().unwrap().iter().map(|c| c.url.clone()).collect();
    assert_eq!(urls, [URL, mirrors[0], mirrors[1], mirrors[2]]);
}

#[tokio::test]
async fn all_sources_refused_fails_once_each() {
    let temp = TempDir::new().unwrap();
    let client = Script::new()
        .reply(URL, Reply::Status(404))
        .reply(MIRROR, Reply::Status(410))
        .build();
    let response = spider(&client, &temp)
        .download(FetchRequest::new(URL).mirror(MIRROR))
        .await;

    assert!(!response.success());
    assert_eq!(response.attempts(), 2);
    assert!(response.failure_reason().unwrap().contains("410"));
    assert_eq!(temp_files(&temp), 0);
}

#[tokio::test]
async fn global_slot_limit_bounds_concurrency() {
    let temp = TempDir::new().unwrap();
    let urls: Vec<_> = (0..4).map(|i| format!("https://host{i}.example/pkg")).collect();
    let mut client = Script::slow(Duration::from_millis(20));
    for url in &urls {
        client = client.reply(url, Reply::Body(200, vec!["x"]));
    }
    let client = client.build();
    let config = SpiderConfig::default()
        .max_downloads(1)
        .slot_poll_interval(Duration::from_millis(1))
        .temp_dir(temp.path());
    let spider = WebSpider::new(client.clone(), config);

    let responses = join_all(urls.iter().map(|url| spider.download(FetchRequest::new(url.clone())))).await;

    assert!(responses.iter().all(|r| r.success()));
    assert_eq!(client.peak.load(Ordering::SeqCst), 1);
    assert_eq!(spider.available_slots(), 1);
}

#[tokio::test]
async fn aborted_caller_does_not_cancel_shared_download() {
    let temp = TempDir::new().unwrap();
    let client = Script::slow(Duration::from_millis(50))
        .reply(URL, Reply::Body(200, vec!["survives"]))
        .build();
    let spider = spider(&client, &temp);

    let leader = {
        let spider = spider.clone();
        tokio::spawn(async move { spider.download(FetchRequest::new(URL)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let waiter = {
        let spider = spider.clone();
        tokio::spawn(async move { spider.download(FetchRequest::new(URL)).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    leader.abort();
    assert!(leader.await.unwrap_err().is_cancelled());

    let response = waiter.await.unwrap();
    assert!(response.success(), "{:?}", response.failure_reason());
    assert_eq!(client.calls.lock().unwrap().len(), 1);
    let path = response.temp_path().unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "survives");
}
