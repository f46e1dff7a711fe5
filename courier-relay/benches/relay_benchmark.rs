use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use courier_relay::protocol::{
    ClientEvent, DeliveredMessage, OutgoingMessage, ServerEvent, UserIdentity,
};
use courier_relay::registry::{ConnectionHandle, ConnectionRegistry};
use serde_json::json;

fn bench_event_encode(c: &mut Criterion) {
    let event = ServerEvent::MessageReceived(DeliveredMessage {
        message: json!({"text": "hello there", "sentAt": 1_700_000_000}),
        sender: json!({"username": "alice", "fullName": "Alice A."}),
        flag: json!(false),
    });

    c.bench_function("message_received_encode", |b| {
        b.iter(|| black_box(black_box(&event).encode().unwrap()))
    });
}

fn bench_event_decode(c: &mut Criterion) {
    let text = ClientEvent::SendMessage(OutgoingMessage::new(
        "bob",
        json!({"text": "hello there"}),
        "alice",
        false,
    ))
    .encode()
    .unwrap();

    c.bench_function("send_message_decode", |b| {
        b.iter(|| black_box(ClientEvent::decode(black_box(&text)).unwrap()))
    });
}

fn bench_broadcast_100_members(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let registry = ConnectionRegistry::new();
    let room = UserIdentity::new("lobby");

    let mut receivers = Vec::new();
    runtime.block_on(async {
        for _ in 0..100 {
            let (handle, rx) = ConnectionHandle::channel();
            registry.join(&handle, &room).await;
            receivers.push(rx);
        }
    });

    let event = ServerEvent::MessageReceived(DeliveredMessage {
        message: json!({"text": "hi"}),
        sender: json!("alice"),
        flag: json!(false),
    });

    c.bench_function("broadcast_100_members", |b| {
        b.iter(|| {
            runtime.block_on(async {
                black_box(registry.broadcast(&room, &event, None).await);
            });
            for rx in receivers.iter_mut() {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

criterion_group!(
    benches,
    bench_event_encode,
    bench_event_decode,
    bench_broadcast_100_members,
);
criterion_main!(benches);
