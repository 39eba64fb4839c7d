//! Fan-out benchmarks for the room registry and dispatcher.

use confab_core::{Dispatcher, MemberHandle, MemoryStore, Outbound, RoomRegistry};
use confab_protocol::Notification;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::Receiver;

fn populate(
    registry: &RoomRegistry,
    room: &str,
    members: i64,
) -> Vec<(MemberHandle, Receiver<Outbound>)> {
    (0..members)
        .map(|participant| {
            let (handle, rx) = registry.open_queue(participant);
            registry.join(room, handle.clone());
            (handle, rx)
        })
        .collect()
}

fn drain(members: &mut [(MemberHandle, Receiver<Outbound>)]) {
    for (_, rx) in members.iter_mut() {
        while rx.try_recv().is_ok() {}
    }
}

/// Benchmark registry broadcast at several room sizes.
fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");

    for size in [2i64, 16, 256] {
        let registry = RoomRegistry::new();
        let mut members = populate(&registry, "room", size);
        let notification = Notification::left("room", 0);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let delivery = registry.broadcast_all("room", black_box(notification.clone()));
                drain(&mut members);
                delivery
            })
        });
    }

    group.finish();
}

/// Benchmark join/leave churn on a single room.
fn bench_churn(c: &mut Criterion) {
    let registry = RoomRegistry::new();
    let _resident = populate(&registry, "room", 8);
    let mut participant = 1_000i64;

    c.bench_function("join_leave", |b| {
        b.iter(|| {
            participant += 1;
            let (handle, _rx) = registry.open_queue(participant);
            let session = handle.session();
            registry.join("room", handle);
            registry.leave_session("room", participant, session)
        })
    });
}

/// Benchmark a full persist-then-broadcast dispatch.
fn bench_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let registry = Arc::new(RoomRegistry::new());
    let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::new(MemoryStore::new()));
    let members = Mutex::new(populate(&registry, "room", 16));
    let origin = members.lock().unwrap()[0].0.clone();
    let counter = AtomicU64::new(0);

    let (dispatcher, origin, members, counter) = (&dispatcher, &origin, &members, &counter);
    c.bench_function("send_message_16", |b| {
        b.to_async(&runtime).iter(move || async move {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            let outcome = dispatcher
                .send_message("room", origin, format!("m-{n}"), "hello".into())
                .await;
            drain(&mut members.lock().unwrap());
            outcome
        })
    });
}

criterion_group!(benches, bench_broadcast, bench_churn, bench_dispatch);
criterion_main!(benches);
