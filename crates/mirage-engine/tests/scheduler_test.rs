mod common;

use common::*;
use mirage_common::ChunkPos;
use mirage_engine::light::LightMode;
use mirage_engine::metrics::Instrumentation;
use mirage_engine::scheduler::DispatchScheduler;
use mirage_engine::state_cache::BinaryStateCache;
use mirage_engine::ChunkSynthesizer;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

fn scheduler(pool_size: usize, chunks_per_tick: usize) -> DispatchScheduler {
    init_tracing();
    let synthesizer = ChunkSynthesizer::new(
        Arc::new(BinaryStateCache::new()),
        LightMode::Copy,
        127,
        16,
    );
    DispatchScheduler::new(
        pool_size,
        256,
        chunks_per_tick,
        Arc::new(FakeWorld::new()),
        synthesizer,
        Arc::new(Instrumentation::new()),
    )
}

/// No single tick may hand more than `chunks_per_tick` chunks per viewer
/// to the workers, whatever the queue sizes look like.
#[test]
fn tick_never_submits_more_than_the_cap() {
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let cap = rng.gen_range(1..=5);
        let mut scheduler = scheduler(2, cap);
        let transport = RecordingTransport::new();

        let viewers: Vec<Uuid> = (0..rng.gen_range(1..=4)).map(|_| Uuid::new_v4()).collect();
        for viewer in &viewers {
            let len = rng.gen_range(0..40);
            let chunks: Vec<ChunkPos> = (0..len).map(|x| ChunkPos::new(x, 0)).collect();
            scheduler.schedule_send(&[*viewer], &chunks, false);
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while scheduler.active_drains() != 0 {
            assert!(Instant::now() < deadline, "drains never completed");

            let mut submitted: std::collections::HashMap<Uuid, usize> =
                std::collections::HashMap::new();
            scheduler.tick(&transport, |viewer, _chunk| {
                *submitted.entry(viewer).or_default() += 1;
                (None, Vec::new())
            });
            for (viewer, count) in submitted {
                assert!(
                    count <= cap,
                    "viewer {} got {} submissions in one tick (cap {})",
                    viewer,
                    count,
                    cap
                );
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        scheduler.shutdown();
    }
}

/// Two viewers drain independently; one cancelling must not disturb the
/// other's delivery order.
#[test]
fn cancel_is_scoped_to_one_viewer() {
    let mut scheduler = scheduler(2, 2);
    let transport = RecordingTransport::new();

    let kept = Uuid::new_v4();
    let cancelled = Uuid::new_v4();
    let chunks: Vec<ChunkPos> = (0..8).map(|x| ChunkPos::new(x, 0)).collect();
    scheduler.schedule_send(&[kept, cancelled], &chunks, false);
    scheduler.cancel_viewer(cancelled);

    let deadline = Instant::now() + Duration::from_secs(5);
    while scheduler.active_drains() != 0 && Instant::now() < deadline {
        scheduler.tick(&transport, |_, _| (None, Vec::new()));
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(scheduler.active_drains(), 0);

    let received: Vec<ChunkPos> = transport
        .columns_for(kept)
        .iter()
        .map(|unit| unit.chunk)
        .collect();
    assert_eq!(received, chunks);
    assert_eq!(transport.column_count(cancelled), 0);
    scheduler.shutdown();
}
