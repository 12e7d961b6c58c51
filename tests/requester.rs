//! End-to-end requester scenarios.
//!
//! Each test plays the responder: it reads the requester's outbound frames
//! from the wire queue and injects inbound frames through `handle_frame`,
//! the same way a connection's read loop would.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use rsocket_core::{
    Error, ErrorCode, Frame, FrameFlags, Payload, PayloadResult, RequestError, Requester,
    StreamIds, DEFAULT_INITIAL_REQUESTS,
};

const WIRE_CAPACITY: usize = 16;

fn requester() -> (Arc<Requester>, mpsc::Receiver<Frame>) {
    requester_with_window(DEFAULT_INITIAL_REQUESTS)
}

fn requester_with_window(initial_requests: u32) -> (Arc<Requester>, mpsc::Receiver<Frame>) {
    // Opt-in logging: RUST_LOG=rsocket_core=debug cargo test
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let (tx, rx) = mpsc::channel(WIRE_CAPACITY);
    (
        Arc::new(Requester::new(tx, StreamIds::client(), initial_requests)),
        rx,
    )
}

async fn next_frame(wire: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_secs(1), wire.recv())
        .await
        .expect("timed out waiting for an outbound frame")
        .expect("outbound queue closed")
}

async fn next_result(responses: &mut mpsc::Receiver<PayloadResult>) -> Option<PayloadResult> {
    timeout(Duration::from_secs(1), responses.recv())
        .await
        .expect("timed out waiting for a response")
}

async fn assert_no_frame(wire: &mut mpsc::Receiver<Frame>) {
    assert!(
        timeout(Duration::from_millis(100), wire.recv()).await.is_err(),
        "expected no further outbound frames"
    );
}

fn payload_frame(stream_id: u32, complete: bool, payload: Payload) -> Frame {
    Frame::payload_next(stream_id, payload, complete)
}

#[tokio::test]
async fn request_stream_complete() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let mut responses = requester
        .request_stream(&ctx, Payload::text("hello").with_metadata("world"))
        .await
        .unwrap();

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);
    assert_eq!(frame.flags(), FrameFlags::METADATA);
    match &frame {
        Frame::RequestStream {
            initial_requests,
            payload,
            ..
        } => {
            assert_eq!(*initial_requests, DEFAULT_INITIAL_REQUESTS);
            assert_eq!(payload.data, Bytes::from("hello"));
            assert_eq!(payload.metadata.as_deref(), Some(b"world".as_slice()));
        }
        other => panic!("expected REQUEST_STREAM, got {other:?}"),
    }

    requester
        .handle_frame(payload_frame(1, false, Payload::text("foo")))
        .await
        .unwrap();
    requester
        .handle_frame(payload_frame(1, true, Payload::text("bar")))
        .await
        .unwrap();

    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("foo"))));
    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("bar"))));
    assert_eq!(next_result(&mut responses).await, None);
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_stream_with_application_error() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let mut responses = requester
        .request_stream(&ctx, Payload::text("hello").with_metadata("world"))
        .await
        .unwrap();
    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);

    requester
        .handle_frame(payload_frame(1, false, Payload::text("foo")))
        .await
        .unwrap();
    requester
        .handle_frame(payload_frame(1, false, Payload::text("bar")))
        .await
        .unwrap();
    requester
        .handle_frame(Frame::error(
            1,
            Error::new(ErrorCode::ApplicationError, "for test"),
        ))
        .await
        .unwrap();

    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("foo"))));
    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("bar"))));
    assert_eq!(
        next_result(&mut responses).await,
        Some(Err(Error::new(ErrorCode::ApplicationError, "for test")))
    );
    assert_eq!(next_result(&mut responses).await, None);
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_stream_canceled_by_caller() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let mut responses = requester
        .request_stream(&ctx, Payload::text("hello"))
        .await
        .unwrap();
    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);

    requester
        .handle_frame(payload_frame(1, false, Payload::text("foo")))
        .await
        .unwrap();
    requester
        .handle_frame(payload_frame(1, false, Payload::text("bar")))
        .await
        .unwrap();

    ctx.cancel();

    assert!(matches!(
        next_frame(&mut wire).await,
        Frame::Cancel { stream_id: 1 }
    ));
    assert_no_frame(&mut wire).await;

    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("foo"))));
    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("bar"))));
    assert_eq!(next_result(&mut responses).await, Some(Err(Error::canceled())));
    assert_eq!(next_result(&mut responses).await, None);
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_stream_canceled_by_peer() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let mut responses = requester
        .request_stream(&ctx, Payload::text("hello"))
        .await
        .unwrap();
    let _ = next_frame(&mut wire).await;

    requester
        .handle_frame(payload_frame(1, false, Payload::text("foo")))
        .await
        .unwrap();
    requester.handle_frame(Frame::cancel(1)).await.unwrap();

    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("foo"))));
    assert_eq!(next_result(&mut responses).await, Some(Err(Error::canceled())));
    assert_eq!(next_result(&mut responses).await, None);
    // The peer canceled; the requester answers with nothing.
    assert_no_frame(&mut wire).await;
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_channel_complete_from_both_sides() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    // Both outbound payloads are buffered before the request goes out, so
    // the first one rides in the REQUEST_CHANNEL frame.
    let (requests, requests_rx) = mpsc::channel(128);
    requests.send(Ok(Payload::text("hello"))).await.unwrap();
    requests.send(Ok(Payload::text("world"))).await.unwrap();
    drop(requests);

    let mut responses = requester.request_channel(&ctx, requests_rx).await.unwrap();

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);
    assert_eq!(frame.flags(), FrameFlags::empty());
    match &frame {
        Frame::RequestChannel {
            initial_requests,
            complete,
            payload,
            ..
        } => {
            assert_eq!(*initial_requests, DEFAULT_INITIAL_REQUESTS);
            assert!(!*complete);
            assert_eq!(payload.data, Bytes::from("hello"));
        }
        other => panic!("expected REQUEST_CHANNEL, got {other:?}"),
    }

    requester
        .handle_frame(Frame::request_n(1, DEFAULT_INITIAL_REQUESTS))
        .await
        .unwrap();

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.flags(), FrameFlags::NEXT);
    match &frame {
        Frame::Payload { payload, .. } => assert_eq!(payload.data, Bytes::from("world")),
        other => panic!("expected PAYLOAD, got {other:?}"),
    }

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.flags(), FrameFlags::COMPLETE);
    match &frame {
        Frame::Payload { payload, .. } => assert!(payload.data.is_empty()),
        other => panic!("expected COMPLETE, got {other:?}"),
    }

    requester
        .handle_frame(payload_frame(1, false, Payload::text("foo")))
        .await
        .unwrap();
    requester
        .handle_frame(payload_frame(1, true, Payload::text("bar")))
        .await
        .unwrap();

    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("foo"))));
    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("bar"))));
    assert_eq!(next_result(&mut responses).await, None);
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_channel_outbound_error_terminates_the_stream() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let (requests, requests_rx) = mpsc::channel(128);
    let mut responses = requester.request_channel(&ctx, requests_rx).await.unwrap();

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);
    assert_eq!(frame.flags(), FrameFlags::empty());
    match &frame {
        Frame::RequestChannel {
            complete, payload, ..
        } => {
            assert!(!*complete);
            assert!(payload.data.is_empty());
        }
        other => panic!("expected REQUEST_CHANNEL, got {other:?}"),
    }

    requester
        .handle_frame(Frame::request_n(1, DEFAULT_INITIAL_REQUESTS))
        .await
        .unwrap();

    requests.send(Ok(Payload::text("hello"))).await.unwrap();
    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.flags(), FrameFlags::NEXT);
    match &frame {
        Frame::Payload { payload, .. } => assert_eq!(payload.data, Bytes::from("hello")),
        other => panic!("expected PAYLOAD, got {other:?}"),
    }

    requester
        .handle_frame(payload_frame(1, false, Payload::text("world")))
        .await
        .unwrap();
    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("world"))));

    requests
        .send(Err(Error::new(ErrorCode::ApplicationError, "for test")))
        .await
        .unwrap();
    drop(requests);

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.flags(), FrameFlags::empty());
    match frame {
        Frame::Error { stream_id, error } => {
            assert_eq!(stream_id, 1);
            assert_eq!(error.code, ErrorCode::ApplicationError);
            assert_eq!(error.message, "for test");
        }
        other => panic!("expected ERROR, got {other:?}"),
    }

    assert_eq!(next_result(&mut responses).await, None);
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_channel_outbound_error_after_responder_completed() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let (requests, requests_rx) = mpsc::channel(128);
    let mut responses = requester.request_channel(&ctx, requests_rx).await.unwrap();
    let _ = next_frame(&mut wire).await;

    requester
        .handle_frame(Frame::request_n(1, DEFAULT_INITIAL_REQUESTS))
        .await
        .unwrap();

    requests.send(Ok(Payload::text("hello"))).await.unwrap();
    let _ = next_frame(&mut wire).await;

    // Responder completes its half first.
    requester
        .handle_frame(payload_frame(1, true, Payload::text("world")))
        .await
        .unwrap();
    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("world"))));
    assert_eq!(next_result(&mut responses).await, None);

    // The outbound half still reports its failure on the wire.
    requests
        .send(Err(Error::new(ErrorCode::ApplicationError, "for test")))
        .await
        .unwrap();
    drop(requests);

    match next_frame(&mut wire).await {
        Frame::Error { stream_id, error } => {
            assert_eq!(stream_id, 1);
            assert_eq!(error.code, ErrorCode::ApplicationError);
            assert_eq!(error.message, "for test");
        }
        other => panic!("expected ERROR, got {other:?}"),
    }
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_channel_source_closed_before_request() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let (requests, requests_rx) = mpsc::channel::<PayloadResult>(8);
    drop(requests);

    let mut responses = requester.request_channel(&ctx, requests_rx).await.unwrap();

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.flags(), FrameFlags::COMPLETE);
    match &frame {
        Frame::RequestChannel {
            complete, payload, ..
        } => {
            assert!(*complete);
            assert!(payload.data.is_empty());
        }
        other => panic!("expected REQUEST_CHANNEL, got {other:?}"),
    }

    requester
        .handle_frame(payload_frame(1, true, Payload::text("reply")))
        .await
        .unwrap();
    assert_eq!(next_result(&mut responses).await, Some(Ok(Payload::text("reply"))));
    assert_eq!(next_result(&mut responses).await, None);
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_response_complete() {
    let (requester, mut wire) = requester();

    let caller = tokio::spawn({
        let requester = requester.clone();
        async move {
            let ctx = CancellationToken::new();
            requester
                .request_response(&ctx, Payload::text("hello").with_metadata("world"))
                .await
        }
    });

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);
    assert_eq!(frame.flags(), FrameFlags::METADATA);
    match &frame {
        Frame::RequestResponse { payload, .. } => {
            assert_eq!(payload.data, Bytes::from("hello"));
            assert_eq!(payload.metadata.as_deref(), Some(b"world".as_slice()));
        }
        other => panic!("expected REQUEST_RESPONSE, got {other:?}"),
    }

    requester
        .handle_frame(payload_frame(1, true, Payload::text("hello world")))
        .await
        .unwrap();

    let payload = caller.await.unwrap().unwrap();
    assert_eq!(payload.as_text(), "hello world");
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_response_with_error() {
    let (requester, mut wire) = requester();

    let caller = tokio::spawn({
        let requester = requester.clone();
        async move {
            let ctx = CancellationToken::new();
            requester.request_response(&ctx, Payload::text("hello")).await
        }
    });

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.flags(), FrameFlags::empty());

    requester
        .handle_frame(Frame::error(
            1,
            Error::new(ErrorCode::ApplicationError, "for test"),
        ))
        .await
        .unwrap();

    let error = caller.await.unwrap().unwrap_err();
    assert_eq!(error.to_string(), "ERROR[APPLICATION_ERROR] for test");
    assert_eq!(
        error,
        RequestError::Remote(Error::new(ErrorCode::ApplicationError, "for test"))
    );
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_response_canceled_by_peer() {
    let (requester, mut wire) = requester();

    let caller = tokio::spawn({
        let requester = requester.clone();
        async move {
            let ctx = CancellationToken::new();
            requester.request_response(&ctx, Payload::text("hello")).await
        }
    });

    let _ = next_frame(&mut wire).await;
    requester.handle_frame(Frame::cancel(1)).await.unwrap();

    assert_eq!(caller.await.unwrap(), Err(RequestError::Canceled));
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn request_response_canceled_by_caller() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let caller = tokio::spawn({
        let requester = requester.clone();
        let ctx = ctx.clone();
        async move { requester.request_response(&ctx, Payload::text("hello")).await }
    });

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);

    ctx.cancel();

    assert!(matches!(
        next_frame(&mut wire).await,
        Frame::Cancel { stream_id: 1 }
    ));
    assert_no_frame(&mut wire).await;
    assert_eq!(caller.await.unwrap(), Err(RequestError::Canceled));
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn fire_and_forget() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    requester
        .fire_and_forget(&ctx, Payload::text("hello").with_metadata("world"))
        .await
        .unwrap();

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 1);
    assert_eq!(frame.flags(), FrameFlags::METADATA);
    match &frame {
        Frame::RequestFnf { payload, .. } => {
            assert_eq!(payload.data, Bytes::from("hello"));
            assert_eq!(payload.metadata.as_deref(), Some(b"world".as_slice()));
        }
        other => panic!("expected REQUEST_FNF, got {other:?}"),
    }

    assert_no_frame(&mut wire).await;
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn metadata_push() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    requester.metadata_push(&ctx, "hello").await.unwrap();

    let frame = next_frame(&mut wire).await;
    assert_eq!(frame.stream_id(), 0);
    assert_eq!(frame.flags(), FrameFlags::METADATA);
    match frame {
        Frame::MetadataPush { metadata } => assert_eq!(metadata, Bytes::from("hello")),
        other => panic!("expected METADATA_PUSH, got {other:?}"),
    }
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn client_stream_ids_are_odd_and_sequential() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    for expected in [1, 3, 5] {
        requester
            .fire_and_forget(&ctx, Payload::text("ping"))
            .await
            .unwrap();
        assert_eq!(next_frame(&mut wire).await.stream_id(), expected);
    }
}

#[tokio::test]
async fn channel_payloads_never_exceed_granted_credit() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let (requests, requests_rx) = mpsc::channel(8);
    for text in ["a", "b", "c", "d"] {
        requests.send(Ok(Payload::text(text))).await.unwrap();
    }
    drop(requests);

    let _responses = requester.request_channel(&ctx, requests_rx).await.unwrap();

    // "a" rides in the request frame and spends no credit.
    match next_frame(&mut wire).await {
        Frame::RequestChannel { payload, .. } => assert_eq!(payload.data, Bytes::from("a")),
        other => panic!("expected REQUEST_CHANNEL, got {other:?}"),
    }
    assert_no_frame(&mut wire).await;

    requester.handle_frame(Frame::request_n(1, 1)).await.unwrap();
    match next_frame(&mut wire).await {
        Frame::Payload { payload, .. } => assert_eq!(payload.data, Bytes::from("b")),
        other => panic!("expected PAYLOAD, got {other:?}"),
    }
    assert_no_frame(&mut wire).await;

    requester.handle_frame(Frame::request_n(1, 2)).await.unwrap();
    match next_frame(&mut wire).await {
        Frame::Payload { payload, .. } => assert_eq!(payload.data, Bytes::from("c")),
        other => panic!("expected PAYLOAD, got {other:?}"),
    }
    match next_frame(&mut wire).await {
        Frame::Payload { payload, .. } => assert_eq!(payload.data, Bytes::from("d")),
        other => panic!("expected PAYLOAD, got {other:?}"),
    }

    // Source exhausted: the half-close goes out without needing credit.
    match next_frame(&mut wire).await {
        Frame::Payload { complete, payload, .. } => {
            assert!(complete);
            assert!(payload.data.is_empty());
        }
        other => panic!("expected COMPLETE, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_replenishes_inbound_credit_when_spent() {
    let (requester, mut wire) = requester_with_window(2);
    let ctx = CancellationToken::new();

    let mut responses = requester
        .request_stream(&ctx, Payload::text("hello"))
        .await
        .unwrap();
    match next_frame(&mut wire).await {
        Frame::RequestStream {
            initial_requests, ..
        } => assert_eq!(initial_requests, 2),
        other => panic!("expected REQUEST_STREAM, got {other:?}"),
    }

    requester
        .handle_frame(payload_frame(1, false, Payload::text("one")))
        .await
        .unwrap();
    requester
        .handle_frame(payload_frame(1, false, Payload::text("two")))
        .await
        .unwrap();

    match next_frame(&mut wire).await {
        Frame::RequestN { stream_id, n } => {
            assert_eq!(stream_id, 1);
            assert_eq!(n, 2);
        }
        other => panic!("expected REQUEST_N, got {other:?}"),
    }

    assert!(next_result(&mut responses).await.unwrap().is_ok());
    assert!(next_result(&mut responses).await.unwrap().is_ok());
}

#[tokio::test]
async fn payload_without_next_or_complete_is_invalid() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let mut responses = requester
        .request_stream(&ctx, Payload::text("hello"))
        .await
        .unwrap();
    let _ = next_frame(&mut wire).await;

    requester
        .handle_frame(Frame::Payload {
            stream_id: 1,
            follows: false,
            complete: false,
            next: false,
            payload: Payload::empty(),
        })
        .await
        .unwrap();

    match next_result(&mut responses).await {
        Some(Err(error)) => assert_eq!(error.code, ErrorCode::Invalid),
        other => panic!("expected INVALID error, got {other:?}"),
    }
    assert_eq!(next_result(&mut responses).await, None);

    match next_frame(&mut wire).await {
        Frame::Error { stream_id, error } => {
            assert_eq!(stream_id, 1);
            assert_eq!(error.code, ErrorCode::Invalid);
        }
        other => panic!("expected outbound ERROR, got {other:?}"),
    }
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn frames_for_unknown_streams_are_dropped() {
    let (requester, _wire) = requester();
    requester
        .handle_frame(payload_frame(99, false, Payload::text("late")))
        .await
        .unwrap();
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn dropping_the_source_cancels_the_stream() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let responses = requester
        .request_stream(&ctx, Payload::text("hello"))
        .await
        .unwrap();
    let _ = next_frame(&mut wire).await;
    drop(responses);

    // The next delivery attempt notices the dropped source.
    requester
        .handle_frame(payload_frame(1, false, Payload::text("foo")))
        .await
        .unwrap();

    assert!(matches!(
        next_frame(&mut wire).await,
        Frame::Cancel { stream_id: 1 }
    ));
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn connection_close_reaches_every_live_stream() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let mut first = requester
        .request_stream(&ctx, Payload::text("one"))
        .await
        .unwrap();
    let mut second = requester
        .request_stream(&ctx, Payload::text("two"))
        .await
        .unwrap();
    let _ = next_frame(&mut wire).await;
    let _ = next_frame(&mut wire).await;
    assert_eq!(requester.active_stream_ids(), vec![1, 3]);

    requester.close();

    for responses in [&mut first, &mut second] {
        assert_eq!(
            next_result(responses).await,
            Some(Err(Error::connection_closed()))
        );
        assert_eq!(next_result(responses).await, None);
    }
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn connection_error_frame_terminates_everything() {
    let (requester, mut wire) = requester();
    let ctx = CancellationToken::new();

    let mut responses = requester
        .request_stream(&ctx, Payload::text("one"))
        .await
        .unwrap();
    let _ = next_frame(&mut wire).await;

    let result = requester
        .handle_frame(Frame::error(
            0,
            Error::new(ErrorCode::ConnectionError, "gone"),
        ))
        .await;
    assert!(result.is_err());

    match next_result(&mut responses).await {
        Some(Err(error)) => {
            assert_eq!(error.code, ErrorCode::ConnectionError);
            assert_eq!(error.message, "gone");
        }
        other => panic!("expected CONNECTION_ERROR, got {other:?}"),
    }
    assert_eq!(next_result(&mut responses).await, None);
    assert_eq!(requester.active_streams(), 0);
}

#[tokio::test]
async fn inbound_metadata_push_reaches_the_sink() {
    let (requester, _wire) = requester();
    let (sink, mut pushes) = mpsc::channel(4);
    requester.set_metadata_sink(sink);

    requester
        .handle_frame(Frame::metadata_push("hello"))
        .await
        .unwrap();

    assert_eq!(
        timeout(Duration::from_secs(1), pushes.recv()).await.unwrap(),
        Some(Bytes::from("hello"))
    );
}
