//! End-to-end tests: client → proxy → mock upstream → proxy → client.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use encoding_rs::WINDOWS_1251;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;

mod common;

use common::MockResponse;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

#[tokio::test]
async fn rewrites_plain_utf8_text() {
    let backend = common::start_backend(|_| {
        MockResponse::ok("text/plain; charset=utf-8", "hello world")
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "world", "there").await;

    let res = common::client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_LENGTH], "11");
    assert_eq!(res.text().await.unwrap(), "hello there");

    shutdown.trigger();
}

#[tokio::test]
async fn rewrites_gzipped_windows_1251_text() {
    let (encoded, _, _) = WINDOWS_1251.encode("Добро пожаловать в Байкал");
    let body = gzip(&encoded);
    let backend = common::start_backend(move |_| {
        MockResponse::ok("text/html; charset=windows-1251", body.clone()).header("Content-Encoding", "gzip")
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "Байкал", "Baikal").await;

    let res = common::client()
        .get(format!("http://{proxy}/index.html"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_ENCODING], "gzip");
    assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=windows-1251");
    let declared: usize = res.headers()[CONTENT_LENGTH].to_str().unwrap().parse().unwrap();

    let bytes = res.bytes().await.unwrap();
    assert_eq!(declared, bytes.len());

    let decompressed = gunzip(&bytes);
    let (text, _, had_errors) = WINDOWS_1251.decode(&decompressed);
    assert!(!had_errors);
    assert_eq!(text, "Добро пожаловать в Baikal");

    shutdown.trigger();
}

#[tokio::test]
async fn passes_binary_content_through() {
    let png = b"\x89PNG\r\n\x1a\nworld".to_vec();
    let served = png.clone();
    let backend = common::start_backend(move |_| MockResponse::ok("image/png", served.clone())).await;
    let (proxy, shutdown) = common::start_proxy(backend, "world", "there").await;

    let res = common::client()
        .get(format!("http://{proxy}/logo.png"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(res.headers()[CONTENT_LENGTH], png.len().to_string().as_str());
    assert_eq!(res.bytes().await.unwrap().as_ref(), png.as_slice());

    shutdown.trigger();
}

#[tokio::test]
async fn director_rewrites_host_and_keeps_path() {
    let seen = Arc::new(Mutex::new(String::new()));
    let recorder = seen.clone();
    let backend = common::start_backend(move |head| {
        *recorder.lock().unwrap() = head.to_string();
        MockResponse::ok("text/plain", "ok")
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "zzz", "yyy").await;

    let res = common::client()
        .get(format!("http://{proxy}/catalog/tours?id=7&lang=ru"))
        .header("accept-language", "ru")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let head = seen.lock().unwrap().to_ascii_lowercase();
    assert!(head.starts_with("get /catalog/tours?id=7&lang=ru http/1.1\r\n"), "{head}");
    assert!(head.contains(&format!("host: {backend}\r\n")), "{head}");
    assert!(!head.contains(&format!("host: {proxy}\r\n")), "{head}");
    assert!(head.contains("accept-language: ru\r\n"), "{head}");
    assert!(head.contains("x-request-id: "), "{head}");

    shutdown.trigger();
}

#[tokio::test]
async fn client_request_id_is_forwarded_and_echoed() {
    let seen = Arc::new(Mutex::new(String::new()));
    let recorder = seen.clone();
    let backend = common::start_backend(move |head| {
        *recorder.lock().unwrap() = head.to_string();
        MockResponse::ok("text/plain", "ok")
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "zzz", "yyy").await;

    let res = common::client()
        .get(format!("http://{proxy}/"))
        .header("x-request-id", "trace-me-42")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"], "trace-me-42");
    assert!(seen.lock().unwrap().to_ascii_lowercase().contains("x-request-id: trace-me-42"));

    shutdown.trigger();
}

#[tokio::test]
async fn upstream_unavailable_is_bad_gateway() {
    let upstream = common::closed_port().await;
    let (proxy, shutdown) = common::start_proxy(upstream, "a", "b").await;

    let res = common::client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    shutdown.trigger();
}

#[tokio::test]
async fn malformed_gzip_is_bad_gateway() {
    let backend = common::start_backend(|_| {
        MockResponse::ok("text/html", "this is not gzip").header("Content-Encoding", "gzip")
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "gzip", "zip").await;

    let res = common::client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(!res.text().await.unwrap().contains("zip"));

    shutdown.trigger();
}

#[tokio::test]
async fn unrepresentable_replacement_is_bad_gateway() {
    let (encoded, _, _) = WINDOWS_1251.encode("Байкал");
    let body = encoded.into_owned();
    let backend = common::start_backend(move |_| {
        MockResponse::ok("text/html; charset=windows-1251", body.clone())
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "Байкал", "✓").await;

    let res = common::client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    shutdown.trigger();
}

#[tokio::test]
async fn upstream_status_is_preserved() {
    let backend = common::start_backend(|_| {
        MockResponse::ok("text/html", "<h1>world not found</h1>").status(404)
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "world", "page").await;

    let res = common::client()
        .get(format!("http://{proxy}/missing"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "<h1>page not found</h1>");

    shutdown.trigger();
}

#[tokio::test]
async fn head_response_keeps_upstream_length() {
    let backend = common::start_backend(|head| {
        if head.starts_with("HEAD ") {
            MockResponse::ok("text/html; charset=utf-8", "").declared_length(4096)
        } else {
            MockResponse::ok("text/html; charset=utf-8", "unexpected method")
        }
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "world", "there").await;

    let res = common::client()
        .head(format!("http://{proxy}/page.html"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_LENGTH], "4096");
    assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=utf-8");

    shutdown.trigger();
}

#[tokio::test]
async fn bodiless_statuses_pass_through() {
    let backend = common::start_backend(|head| {
        let status = if head.starts_with("GET /no-content ") { 204 } else { 304 };
        MockResponse::ok("text/html", "").status(status)
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "world", "there").await;

    for (path, status) in [
        ("/no-content", StatusCode::NO_CONTENT),
        ("/cached", StatusCode::NOT_MODIFIED),
    ] {
        let res = common::client()
            .get(format!("http://{proxy}{path}"))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), status);
        assert!(res.bytes().await.unwrap().is_empty());
    }

    shutdown.trigger();
}

#[tokio::test]
async fn unregistered_content_encoding_is_untouched() {
    let compressed = vec![0x1b, 0xff, 0x80, 0x41, 0xc3, 0x28, 0x90];
    let served = compressed.clone();
    let backend = common::start_backend(move |_| {
        MockResponse::ok("text/html; charset=utf-8", served.clone()).header("Content-Encoding", "br")
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(backend, "A", "B").await;

    let res = common::client()
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_ENCODING], "br");
    assert_eq!(res.headers()[CONTENT_LENGTH], "7");
    assert_eq!(res.bytes().await.unwrap().as_ref(), compressed.as_slice());

    shutdown.trigger();
}

#[tokio::test]
async fn oversized_text_body_is_bad_gateway() {
    let text = "world ".repeat(64);
    let backend = common::start_backend(move |head| {
        if head.starts_with("GET /image ") {
            MockResponse::ok("image/png", text.clone())
        } else {
            MockResponse::ok("text/plain", text.clone())
        }
    })
    .await;
    let (proxy, shutdown) = common::start_proxy_with(backend, "world", "there", |config| {
        config.limits.max_response_body_bytes = 64;
    })
    .await;

    let res = common::client()
        .get(format!("http://{proxy}/page"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(!res.text().await.unwrap().contains("there"));

    // Bodies that are never rewritten are never buffered, so the cap does not apply.
    let res = common::client()
        .get(format!("http://{proxy}/image"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().len(), 6 * 64);

    shutdown.trigger();
}
