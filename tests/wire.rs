// tests/wire.rs
//
// Emitter → SSE frames → arbitrary chunking → FrameDecoder → reducer.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::items;
use news_impact_scanner::classify::{DisabledClassifier, FallbackClassifier, Orchestrator};
use news_impact_scanner::config::BatchConfig;
use news_impact_scanner::context::RunContext;
use news_impact_scanner::reconcile::{Lifecycle, Transition};
use news_impact_scanner::stream::{Emitter, FrameDecoder, Phase, ProtocolError};
use news_impact_scanner::{ScanEvent, ScanState};
use rand::Rng;
use tokio::sync::mpsc;

async fn emitted_events(n: usize) -> Vec<ScanEvent> {
    let (tx, mut rx) = mpsc::channel(256);
    let mut emitter = Emitter::new(tx);
    let list = items(n);

    emitter
        .status(Phase::Analyzing, "Analyzing", Some(list.len()))
        .await
        .unwrap();
    emitter.articles(&list).await.unwrap();
    let orch = Orchestrator::new(
        Arc::new(DisabledClassifier),
        FallbackClassifier::default(),
        BatchConfig {
            inter_batch_delay_ms: 0,
            ..BatchConfig::default()
        },
    );
    orch.run(&list, &RunContext::new(Duration::from_secs(1)), &mut emitter)
        .await;
    emitter.complete().await.unwrap();
    drop(emitter);

    let mut out = Vec::new();
    while let Some(ev) = rx.recv().await {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn twelve_items_stream_in_order_with_monotonic_progress() {
    let events = emitted_events(12).await;
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();

    assert_eq!(names[0], "status");
    assert_eq!(names[1], "articles");
    assert_eq!(names.iter().filter(|n| **n == "analyzed").count(), 12);
    assert_eq!(*names.last().unwrap(), "complete");

    let mut last = 0;
    let mut keys = HashSet::new();
    for ev in &events {
        if let ScanEvent::Analyzed(p) = ev {
            assert!(p.progress.current > last);
            assert!(p.progress.current <= p.progress.total);
            assert_eq!(p.progress.total, 12);
            last = p.progress.current;
            assert!(keys.insert(p.article.key().clone()), "each key exactly once");
        }
    }
    assert_eq!(last, 12);
}

#[tokio::test]
async fn decoded_stream_rebuilds_the_same_state_under_any_chunking() {
    let events = emitted_events(7).await;
    let mut wire = String::new();
    for ev in &events {
        wire.push_str(&ev.to_frame().unwrap());
        // heartbeats between frames must be skipped
        wire.push_str(":keep-alive\n\n");
    }
    let bytes = wire.into_bytes();

    let mut rng = rand::rng();
    for _ in 0..20 {
        let mut decoder = FrameDecoder::new();
        let mut state = ScanState::new();
        let mut transitions = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let step = rng.random_range(1..=64).min(bytes.len() - pos);
            for frame in decoder.push(&bytes[pos..pos + step]) {
                transitions.push(state.apply(frame.decode().unwrap()));
            }
            pos += step;
        }

        assert_eq!(decoder.pending_bytes(), 0);
        assert_eq!(transitions.last(), Some(&Transition::Completed));
        assert_eq!(state.lifecycle(), &Lifecycle::Complete);
        assert_eq!(state.analyzed_count(), 7);
        assert_eq!(state.pending_count(), 0);
    }
}

#[test]
fn crlf_and_multiline_data_are_accepted() {
    let mut d = FrameDecoder::new();
    let frames = d.push(b"event: error\r\ndata: {\"message\":\r\ndata: \"boom\"}\r\n\r\n");
    assert_eq!(frames.len(), 1);
    match frames[0].decode().unwrap() {
        ScanEvent::Error(e) => assert_eq!(e.message, "boom"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_event_and_bad_payload_are_protocol_errors() {
    let mut d = FrameDecoder::new();
    let frames = d.push(b"event: gossip\ndata: {}\n\nevent: complete\ndata: {\"totl\":1}\n\n");
    assert!(matches!(frames[0].decode(), Err(ProtocolError::UnknownEvent(ref n)) if n == "gossip"));
    assert!(matches!(frames[1].decode(), Err(ProtocolError::BadPayload { .. })));
}
