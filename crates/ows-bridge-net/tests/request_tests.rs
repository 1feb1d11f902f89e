//! Protocol tests for the request client, driven by a scripted transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use ows_bridge_net::cache::{CachedResponse, MemoryCache};
use ows_bridge_net::http::{
    CacheLoadControl, HttpMethod, ReplyHead, Transport, TransportReply, TransportRequest,
};
use ows_bridge_net::{
    Authentication, Authorizer, CacheMetadata, ErrorCode, NetworkContext, NetworkError,
    OwsRequest, PostOptions, RequestOptions, ResponseCache, Result,
};

const URL: &str = "http://example.com/wfs";
const CONTEXT: &str = "Download of features failed";

enum Step {
    Reply {
        status: u16,
        location: Option<&'static str>,
        chunks: Vec<&'static [u8]>,
        content_length: Option<u64>,
    },
    Stall {
        first_chunk: &'static [u8],
        released: Arc<AtomicBool>,
    },
    Hang,
    Fail(NetworkError),
}

fn ok(body: &'static [u8]) -> Step {
    Step::Reply {
        status: 200,
        location: None,
        chunks: vec![body],
        content_length: Some(body.len() as u64),
    }
}

fn redirect(location: &'static str) -> Step {
    Step::Reply {
        status: 302,
        location: Some(location),
        chunks: vec![],
        content_length: Some(0),
    }
}

fn status(status: u16) -> Step {
    Step::Reply {
        status,
        location: None,
        chunks: vec![],
        content_length: None,
    }
}

// Sets its flag when the owning stream is dropped.
struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn call(&self, index: usize) -> TransportRequest {
        self.calls.lock()[index].clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'static, Result<TransportReply>> {
        self.calls.lock().push(request.clone());
        let step = self.steps.lock().pop_front().unwrap_or_else(|| status(500));

        match step {
            Step::Reply {
                status,
                location,
                chunks,
                content_length,
            } => {
                let mut head = ReplyHead::new(request.url, status);
                if let Some(location) = location {
                    head.headers
                        .insert(http::header::LOCATION, location.parse().unwrap());
                }
                head.content_length = content_length;
                head.resolve_redirect();
                let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c)))).boxed();
                future::ready(Ok(TransportReply { head, body })).boxed()
            }
            Step::Stall {
                first_chunk,
                released,
            } => {
                let head = ReplyHead::new(request.url, 200);
                let flag = ReleaseFlag(released);
                let body = stream::iter([Ok(Bytes::from_static(first_chunk))])
                    .chain(stream::pending())
                    .map(move |chunk| {
                        let _ = &flag;
                        chunk
                    })
                    .boxed();
                future::ready(Ok(TransportReply { head, body })).boxed()
            }
            Step::Hang => future::pending().boxed(),
            Step::Fail(err) => future::ready(Err(err)).boxed(),
        }
    }
}

fn context(transport: &Arc<ScriptedTransport>) -> NetworkContext {
    NetworkContext::builder()
        .transport(transport.clone())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn client(context: &NetworkContext) -> OwsRequest {
    OwsRequest::builder(context).error_context(CONTEXT).build()
}

fn count_finished(request: &OwsRequest) -> Arc<AtomicUsize> {
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();
    request.download_finished().connect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    finished
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

struct FailingAuthorizer {
    fail_request_after: usize,
    fail_reply: bool,
    requests: AtomicUsize,
}

impl FailingAuthorizer {
    fn on_request(after: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_request_after: after,
            fail_reply: false,
            requests: AtomicUsize::new(0),
        })
    }

    fn on_reply() -> Arc<Self> {
        Arc::new(Self {
            fail_request_after: usize::MAX,
            fail_reply: true,
            requests: AtomicUsize::new(0),
        })
    }
}

impl Authorizer for FailingAuthorizer {
    fn authorize_request(&self, _request: &mut TransportRequest) -> Result<()> {
        if self.requests.fetch_add(1, Ordering::SeqCst) >= self.fail_request_after {
            Err(NetworkError::Authentication("config not found".to_string()))
        } else {
            Ok(())
        }
    }

    fn authorize_reply(&self, _reply: &mut ReplyHead) -> Result<()> {
        if self.fail_reply {
            Err(NetworkError::Authentication("reply rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_get_issues_exactly_one_transport_call() {
    let transport = ScriptedTransport::new(vec![ok(b"<WFS_Capabilities/>")]);
    let context = context(&transport);
    let request = client(&context);
    let finished = count_finished(&request);

    assert!(request.send_get(URL, RequestOptions::default()));

    assert_eq!(transport.call_count(), 1);
    assert_eq!(request.response(), Bytes::from_static(b"<WFS_Capabilities/>"));
    assert_eq!(request.error_code(), ErrorCode::NoError);
    assert!(request.error_message().is_empty());
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    let sent = transport.call(0);
    assert_eq!(sent.method, HttpMethod::Get);
    assert_eq!(sent.cache_load, CacheLoadControl::PreferCache);
    assert!(sent.cache_save);
}

#[test]
fn test_cache_directives_follow_options() {
    let transport = ScriptedTransport::new(vec![ok(b"a"), ok(b"b")]);
    let context = context(&transport);
    let request = client(&context);

    assert!(request.send_get(URL, RequestOptions::default().force_refresh()));
    assert_eq!(transport.call(0).cache_load, CacheLoadControl::AlwaysNetwork);
    assert!(transport.call(0).cache_save);

    assert!(request.send_get(URL, RequestOptions::default().no_cache()));
    assert_eq!(transport.call(1).cache_load, CacheLoadControl::PreferNetwork);
    assert!(!transport.call(1).cache_save);
}

#[test]
fn test_each_redirect_hop_is_one_call() {
    let transport = ScriptedTransport::new(vec![redirect("/moved/wfs"), ok(b"<FeatureCollection/>")]);
    let context = context(&transport);
    let request = client(&context);
    let finished = count_finished(&request);

    assert!(request.send_get(URL, RequestOptions::default().force_refresh()));

    assert_eq!(transport.call_count(), 2);
    let hop = transport.call(1);
    assert_eq!(hop.url.as_str(), "http://example.com/moved/wfs");
    assert_eq!(hop.cache_load, CacheLoadControl::AlwaysNetwork);
    assert!(hop.cache_save);
    assert_eq!(request.response(), Bytes::from_static(b"<FeatureCollection/>"));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_redirect_hop_keeps_cache_directives_without_cache_option() {
    let transport = ScriptedTransport::new(vec![redirect("/other"), ok(b"x")]);
    let context = context(&transport);
    let request = client(&context);

    assert!(request.send_get(URL, RequestOptions::default().no_cache()));
    assert_eq!(transport.call(1).cache_load, CacheLoadControl::PreferCache);
    assert!(transport.call(1).cache_save);
}

#[test]
fn test_self_redirect_is_rejected() {
    let transport = ScriptedTransport::new(vec![redirect("/wfs"), ok(b"never")]);
    let context = context(&transport);
    let request = client(&context);
    let finished = count_finished(&request);

    assert!(!request.send_get(URL, RequestOptions::default()));

    assert_eq!(transport.call_count(), 1);
    assert_eq!(request.error_code(), ErrorCode::ServerException);
    assert_eq!(request.error_message(), "Redirect loop detected: http://example.com/wfs");
    assert!(request.response().is_empty());
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_redirect_cycle_is_rejected() {
    let transport = ScriptedTransport::new(vec![redirect("/b"), redirect("/wfs"), ok(b"never")]);
    let context = context(&transport);
    let request = client(&context);

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert_eq!(transport.call_count(), 2);
    assert!(request.error_message().starts_with("Redirect loop detected"));
}

#[test]
fn test_redirect_limit() {
    let transport = ScriptedTransport::new(vec![redirect("/1"), redirect("/2"), redirect("/3"), ok(b"never")]);
    let context = NetworkContext::builder()
        .transport(transport.clone())
        .max_redirects(2)
        .build()
        .unwrap();
    let request = client(&context);

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert_eq!(transport.call_count(), 3);
    assert_eq!(request.error_code(), ErrorCode::ServerException);
    assert_eq!(request.error_message(), format!("{CONTEXT}: Too many redirects"));
}

#[test]
fn test_request_authorization_failure_creates_no_transport() {
    let transport = ScriptedTransport::new(vec![ok(b"never")]);
    let context = context(&transport);
    let request = OwsRequest::builder(&context)
        .error_context(CONTEXT)
        .authorizer(FailingAuthorizer::on_request(0))
        .build();
    let finished = count_finished(&request);

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert!(!request.send_post(URL, "text/xml", "<GetFeature/>"));

    assert_eq!(transport.call_count(), 0);
    assert_eq!(request.error_code(), ErrorCode::Network);
    assert_eq!(
        request.error_message(),
        format!("{CONTEXT}: network request update failed for authentication config")
    );
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reply_authorization_failure() {
    let transport = ScriptedTransport::new(vec![ok(b"<secret/>")]);
    let context = context(&transport);
    let request = OwsRequest::builder(&context)
        .error_context(CONTEXT)
        .authorizer(FailingAuthorizer::on_reply())
        .build();
    let finished = count_finished(&request);

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert_eq!(transport.call_count(), 1);
    assert_eq!(request.error_code(), ErrorCode::Network);
    assert!(request.response().is_empty());
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_redirect_authorization_failure() {
    let transport = ScriptedTransport::new(vec![redirect("/elsewhere"), ok(b"never")]);
    let context = context(&transport);
    let request = OwsRequest::builder(&context)
        .error_context(CONTEXT)
        .authorizer(FailingAuthorizer::on_request(1))
        .build();

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert_eq!(transport.call_count(), 1);
    assert_eq!(request.error_code(), ErrorCode::Network);
    assert!(request.response().is_empty());
}

#[test]
fn test_static_credentials_on_every_hop() {
    let transport = ScriptedTransport::new(vec![redirect("/next"), ok(b"ok")]);
    let context = context(&transport);
    let request = OwsRequest::builder(&context)
        .authorizer(Arc::new(Authentication::Bearer("token".to_string())))
        .build();

    assert!(request.send_get(URL, RequestOptions::default()));
    for index in 0..2 {
        assert_eq!(transport.call(index).headers["authorization"], "Bearer token");
    }
}

#[test]
fn test_empty_response_is_server_exception() {
    let transport = ScriptedTransport::new(vec![status(200)]);
    let context = context(&transport);
    let request = client(&context);

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert_eq!(request.error_code(), ErrorCode::ServerException);
    assert_eq!(request.error_message(), format!("empty response: {URL}"));
}

#[test]
fn test_empty_reply_after_earlier_bytes_is_accepted() {
    let transport = ScriptedTransport::new(vec![
        Step::Reply {
            status: 302,
            location: Some("/final"),
            chunks: vec![b"<p>Moved</p>"],
            content_length: Some(12),
        },
        status(200),
    ]);
    let context = context(&transport);
    let request = client(&context);

    assert!(request.send_get(URL, RequestOptions::default()));
    assert_eq!(request.error_code(), ErrorCode::NoError);
    assert!(request.response().is_empty());
}

#[test]
fn test_http_error_status() {
    let transport = ScriptedTransport::new(vec![status(404)]);
    let context = context(&transport);
    let request = client(&context);

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert_eq!(request.error_code(), ErrorCode::ServerException);
    assert_eq!(
        request.error_message(),
        format!("{CONTEXT}: Error transferring {URL} - server replied: Not Found")
    );
    let err = request.result().unwrap_err();
    assert_eq!(err.code, ErrorCode::ServerException);
}

#[test]
fn test_transport_error_is_reported_verbatim() {
    let transport = ScriptedTransport::new(vec![Step::Fail(NetworkError::Connection("refused".to_string()))]);
    let context = context(&transport);
    let request = client(&context);

    assert!(!request.send_get(URL, RequestOptions::default()));
    assert_eq!(request.error_code(), ErrorCode::ServerException);
    assert_eq!(request.error_message(), format!("{CONTEXT}: Connection error: refused"));
}

#[test]
fn test_progress_precedes_finished() {
    let transport = ScriptedTransport::new(vec![Step::Reply {
        status: 200,
        location: None,
        chunks: vec![b"abc", b"def", b"ghi"],
        content_length: Some(9),
    }]);
    let context = context(&transport);
    let request = client(&context);

    let events = Arc::new(Mutex::new(Vec::new()));
    let progress_events = events.clone();
    request.download_progress().connect(move |progress| {
        progress_events.lock().push(format!(
            "{}/{}",
            progress.bytes_transferred,
            progress.total_bytes.unwrap_or(0)
        ));
    });
    let finished_events = events.clone();
    request.download_finished().connect(move |_| {
        finished_events.lock().push("finished".to_string());
    });

    assert!(request.send_get(URL, RequestOptions::default()));
    assert_eq!(*events.lock(), ["3/9", "6/9", "9/9", "finished"]);
}

#[test]
fn test_no_progress_for_redirecting_reply() {
    let transport = ScriptedTransport::new(vec![
        Step::Reply {
            status: 301,
            location: Some("/new"),
            chunks: vec![b"moved"],
            content_length: Some(5),
        },
        ok(b"final"),
    ]);
    let context = context(&transport);
    let request = client(&context);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let recorded = progress.clone();
    request.download_progress().connect(move |p| recorded.lock().push(p.bytes_transferred));

    assert!(request.send_get(URL, RequestOptions::default()));
    assert_eq!(*progress.lock(), [5]);
    assert_eq!(request.response(), Bytes::from_static(b"final"));
}

#[test]
fn test_cache_entry_annotated_after_success() {
    let transport = ScriptedTransport::new(vec![redirect("/final"), ok(b"<ok/>")]);
    let cache = Arc::new(MemoryCache::new());
    let final_url = url::Url::parse("http://example.com/final").unwrap();
    for url in [url::Url::parse(URL).unwrap(), final_url.clone()] {
        let mut metadata = CacheMetadata::new(url);
        metadata.raw_headers = vec![
            ("Cache-Control".to_string(), "max-age=0".to_string()),
            ("Content-Type".to_string(), "text/xml".to_string()),
        ];
        cache.insert(CachedResponse {
            metadata,
            status: 200,
            body: Bytes::from_static(b"<ok/>"),
        });
    }

    let context = NetworkContext::builder()
        .transport(transport.clone())
        .cache(cache.clone())
        .build()
        .unwrap();
    let request = OwsRequest::builder(&context)
        .default_expiration(Duration::from_secs(3600))
        .build();

    let before = Utc::now();
    assert!(request.send_get(URL, RequestOptions::default()));

    let annotated = cache.metadata(&final_url).unwrap();
    assert!(!annotated.has_raw_header("cache-control"));
    assert!(annotated.has_raw_header("content-type"));
    assert!(annotated.expiration.unwrap() >= before + chrono::TimeDelta::seconds(3600));

    // The redirecting hop is not annotated.
    let untouched = cache.metadata(&url::Url::parse(URL).unwrap()).unwrap();
    assert!(untouched.has_raw_header("cache-control"));
    assert!(untouched.expiration.is_none());
}

#[test]
fn test_abort_during_exchange() {
    let released = Arc::new(AtomicBool::new(false));
    let transport = ScriptedTransport::new(vec![Step::Stall {
        first_chunk: b"partial",
        released: released.clone(),
    }]);
    let context = context(&transport);
    let request = client(&context);
    let finished = count_finished(&request);

    let got_progress = Arc::new(AtomicBool::new(false));
    let flag = got_progress.clone();
    request
        .download_progress()
        .connect(move |_| flag.store(true, Ordering::SeqCst));

    assert!(request.send_get(URL, RequestOptions::default().asynchronous()));
    assert!(wait_until(|| got_progress.load(Ordering::SeqCst)));

    request.abort();

    assert!(wait_until(|| finished.load(Ordering::SeqCst) == 1));
    assert!(wait_until(|| released.load(Ordering::SeqCst)));
    assert!(request.is_aborted());
    assert!(request.response().is_empty());
    assert_eq!(request.error_code(), ErrorCode::NoError);
    assert!(request.error_message().is_empty());
}

#[test]
fn test_second_send_cancels_first() {
    let released = Arc::new(AtomicBool::new(false));
    let transport = ScriptedTransport::new(vec![
        Step::Stall {
            first_chunk: b"first",
            released: released.clone(),
        },
        ok(b"second"),
    ]);
    let context = context(&transport);
    let request = client(&context);
    let finished = count_finished(&request);

    assert!(request.send_get(URL, RequestOptions::default().asynchronous()));
    assert!(wait_until(|| transport.call_count() == 1));

    assert!(request.send_get(URL, RequestOptions::default()));

    assert!(wait_until(|| released.load(Ordering::SeqCst)));
    assert_eq!(request.response(), Bytes::from_static(b"second"));
    assert_eq!(request.error_code(), ErrorCode::NoError);
    assert!(wait_until(|| finished.load(Ordering::SeqCst) == 2));
}

#[test]
fn test_replaced_async_exchange_reports_before_successor_starts() {
    let first_released = Arc::new(AtomicBool::new(false));
    let second_released = Arc::new(AtomicBool::new(false));
    let transport = ScriptedTransport::new(vec![
        Step::Stall {
            first_chunk: b"first",
            released: first_released.clone(),
        },
        Step::Stall {
            first_chunk: b"second",
            released: second_released.clone(),
        },
    ]);
    let context = context(&transport);
    let request = Arc::new(client(&context));

    // (transport calls so far, aborted) at each finished notification.
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let observed = Arc::downgrade(&request);
    let calls = transport.clone();
    request.download_finished().connect(move |_| {
        if let Some(request) = observed.upgrade() {
            recorded.lock().push((calls.call_count(), request.is_aborted()));
        }
    });

    assert!(request.send_get(URL, RequestOptions::default().asynchronous()));
    assert!(wait_until(|| transport.call_count() == 1));

    assert!(request.send_get(URL, RequestOptions::default().asynchronous()));
    assert_eq!(*seen.lock(), [(1, true)]);

    assert!(wait_until(|| first_released.load(Ordering::SeqCst)));
    assert!(wait_until(|| transport.call_count() == 2));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(seen.lock().len(), 1);
    assert!(!request.is_aborted());

    request.abort();
    assert!(wait_until(|| second_released.load(Ordering::SeqCst)));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(*seen.lock(), [(1, true), (2, true)]);
}

#[test]
fn test_stalled_exchange_times_out() {
    let transport = ScriptedTransport::new(vec![Step::Hang]);
    let context = NetworkContext::builder()
        .transport(transport.clone())
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let request = client(&context);

    let timed_out_ids = Arc::new(Mutex::new(Vec::new()));
    let recorded = timed_out_ids.clone();
    context
        .request_timed_out()
        .connect(move |id| recorded.lock().push(*id));

    assert!(!request.send_get(URL, RequestOptions::default()));

    assert!(request.timed_out());
    assert_eq!(request.error_code(), ErrorCode::Timeout);
    assert_eq!(request.error_message(), format!("{CONTEXT}: Operation canceled"));
    assert!(request.response().is_empty());
    assert_eq!(timed_out_ids.lock().len(), 1);
}

#[test]
fn test_timeout_of_other_client_is_ignored() {
    let transport = ScriptedTransport::new(vec![Step::Hang, ok(b"fine")]);
    let context = NetworkContext::builder()
        .transport(transport.clone())
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let stalled = client(&context);
    let healthy = client(&context);

    assert!(!stalled.send_get(URL, RequestOptions::default()));
    assert!(healthy.send_get(URL, RequestOptions::default()));
    assert!(!healthy.timed_out());
    assert_eq!(healthy.error_code(), ErrorCode::NoError);
}

#[test]
fn test_async_get_reports_through_finished() {
    let transport = ScriptedTransport::new(vec![ok(b"<async/>")]);
    let context = context(&transport);
    let request = client(&context);
    let finished = count_finished(&request);

    assert!(request.send_get(URL, RequestOptions::default().asynchronous()));
    assert!(wait_until(|| finished.load(Ordering::SeqCst) == 1));
    assert_eq!(request.result().unwrap(), Bytes::from_static(b"<async/>"));
}

#[test]
fn test_sync_get_off_owner_thread() {
    let transport = ScriptedTransport::new(vec![ok(b"<worker/>")]);
    let context = context(&transport);
    let request = Arc::new(client(&context));

    let worker_request = request.clone();
    let success = std::thread::spawn(move || worker_request.send_get(URL, RequestOptions::default()))
        .join()
        .unwrap();

    assert!(success);
    assert_eq!(request.response(), Bytes::from_static(b"<worker/>"));
}

#[test]
fn test_post_sends_body_and_content_type() {
    let transport = ScriptedTransport::new(vec![ok(b"<TransactionResponse/>")]);
    let context = context(&transport);
    let request = client(&context);

    assert!(request.send_post(URL, "text/xml; charset=utf-8", "<Transaction/>"));

    let sent = transport.call(0);
    assert_eq!(sent.method, HttpMethod::Post);
    assert_eq!(sent.headers["content-type"], "text/xml; charset=utf-8");
    assert_eq!(sent.body.as_deref(), Some(&b"<Transaction/>"[..]));
    assert!(!sent.cache_save);
    assert_eq!(request.response(), Bytes::from_static(b"<TransactionResponse/>"));
}

#[test]
fn test_post_redirect_refetches_with_force_refresh() {
    let transport = ScriptedTransport::new(vec![redirect("/result"), ok(b"<done/>")]);
    let context = context(&transport);
    let request = client(&context);

    assert!(request.send_post(URL, "text/xml", "<GetFeature/>"));
    let hop = transport.call(1);
    assert_eq!(hop.method, HttpMethod::Get);
    assert_eq!(hop.cache_load, CacheLoadControl::AlwaysNetwork);
}

#[test]
fn test_post_can_be_asynchronous() {
    let transport = ScriptedTransport::new(vec![ok(b"<async/>")]);
    let context = context(&transport);
    let request = client(&context);
    let finished = count_finished(&request);

    assert!(request.send_post_with(URL, "text/xml", "<GetFeature/>", PostOptions::default().asynchronous()));
    assert!(wait_until(|| finished.load(Ordering::SeqCst) == 1));
    assert_eq!(request.response(), Bytes::from_static(b"<async/>"));
}

#[test]
fn test_invalid_content_type_is_setup_failure() {
    let transport = ScriptedTransport::new(vec![]);
    let context = context(&transport);
    let request = client(&context);

    assert!(!request.send_post(URL, "text/xml\r\nX-Injected: 1", "<a/>"));
    assert_eq!(transport.call_count(), 0);
    assert_eq!(request.error_code(), ErrorCode::Network);
}
