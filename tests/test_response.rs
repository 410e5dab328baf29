mod common;

use bytes::Bytes;
use common::*;
use netreq::RequestError;
use netreq::engine::loopback::Behavior;

#[tokio::test]
async fn test_metadata_defaults_before_response() {
    let (_engine, ctx) = engine_and_context(Behavior::default());
    let request = ctx.request("http://example.com/").build().unwrap();

    assert_eq!(request.content_length().await, -1);
    assert_eq!(request.content_type().await, None);
    assert_eq!(request.http_status_code().await, 0);
    assert!(request.outcome().await.is_none());
}

#[tokio::test]
async fn test_body_delivered_in_pieces_and_sink_closed() {
    let (_engine, ctx) = engine_and_context(Behavior {
        read_size: 3,
        ..Behavior::default()
    });
    let sink = CaptureSink::default();
    let request = ctx
        .request("http://example.com/")
        .sink(sink.clone())
        .build()
        .unwrap();

    request
        .set_upload_data(Some("text/plain"), "split into several reads")
        .await
        .unwrap();
    request.start().await.unwrap();
    let outcome = complete(&request).await;

    assert!(outcome.is_success());
    assert_eq!(sink.bytes(), b"split into several reads");
    assert!(sink.is_closed());
    assert_eq!(request.content_type().await.as_deref(), Some("text/plain"));
    assert_eq!(request.content_length().await, 24);
    assert_eq!(outcome.content.content_length, 24);
}

#[tokio::test]
async fn test_content_type_defaults_without_upload_type() {
    let (_engine, ctx) = engine_and_context(Behavior::default());
    let request = ctx.request("http://example.com/").build().unwrap();
    request.start().await.unwrap();
    let outcome = complete(&request).await;

    assert_eq!(
        outcome.content.content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(outcome.content.content_length, 0);
}

#[tokio::test]
async fn test_content_length_passed_through_uncorrected() {
    let (_engine, ctx) = engine_and_context(Behavior {
        content_length: Some(4096),
        response_body: Some(Bytes::from_static(b"short")),
        ..Behavior::default()
    });
    let sink = CaptureSink::default();
    let request = ctx
        .request("http://example.com/")
        .sink(sink.clone())
        .build()
        .unwrap();
    request.start().await.unwrap();
    complete(&request).await;

    assert_eq!(request.content_length().await, 4096);
    assert_eq!(sink.bytes(), b"short");
}

#[tokio::test]
async fn test_unknown_content_length_stays_negative() {
    let (_engine, ctx) = engine_and_context(Behavior {
        content_length: Some(-1),
        response_body: Some(Bytes::from_static(b"streamed")),
        ..Behavior::default()
    });
    let request = ctx.request("http://example.com/").build().unwrap();
    request.start().await.unwrap();
    complete(&request).await;

    assert_eq!(request.content_length().await, -1);
}

#[tokio::test]
async fn test_status_survives_recycle() {
    let (_engine, ctx) = engine_and_context(Behavior {
        http_status: 201,
        ..Behavior::default()
    });
    let request = ctx.request("http://example.com/").build().unwrap();
    request.start().await.unwrap();
    let outcome = complete(&request).await;

    assert!(request.is_recycled().await);
    assert_eq!(outcome.http_status, 201);
    assert_eq!(request.http_status_code().await, 201);
}

#[tokio::test]
async fn test_sink_failure_cancels_and_is_reported() {
    let (_engine, ctx) = engine_and_context(Behavior {
        response_body: Some(Bytes::from_static(b"nobody reads this")),
        read_size: 4,
        ..Behavior::default()
    });
    let request = ctx
        .request("http://example.com/")
        .sink(BrokenSink)
        .build()
        .unwrap();
    request.start().await.unwrap();
    let outcome = complete(&request).await;

    assert!(outcome.canceled);
    assert!(!outcome.is_success());
    let error = outcome.error.expect("sink failure should be reported");
    assert_eq!(
        error.as_io().map(|e| e.kind()),
        Some(std::io::ErrorKind::BrokenPipe)
    );
    assert!(matches!(error, RequestError::Io(_)));
}

#[tokio::test]
async fn test_response_discarded_without_sink() {
    let (_engine, ctx) = engine_and_context(Behavior {
        response_body: Some(Bytes::from_static(b"dropped on the floor")),
        ..Behavior::default()
    });
    let request = ctx.request("http://example.com/").build().unwrap();
    request.start().await.unwrap();

    assert!(complete(&request).await.is_success());
}
