//! Claim loop behavior with several workers sharing one in-memory queue.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{income, Files, MemoryStore, OWNER};
use cuentia_db::CfdiStore;
use etl_worker::{BatchStats, Worker, WorkerOptions};

fn options(worker_id: &str, batch_size: i64) -> WorkerOptions {
    WorkerOptions {
        worker_id: worker_id.to_string(),
        batch_size,
        idle_backoff: Duration::from_millis(10),
        claim_lease: Duration::from_secs(900),
    }
}

fn enqueue_invoices(store: &MemoryStore, files: &Files, count: usize) {
    for i in 0..count {
        let uuid = format!("INV-{i:04}");
        store.enqueue(OWNER, &files.write(&format!("emitidos/{uuid}.xml"), &income(&uuid)));
    }
}

async fn wait_until_drained(store: &MemoryStore) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while store.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue did not drain");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn concurrent_workers_claim_each_entry_once() {
    let store = MemoryStore::new();
    let files = Files::new();
    enqueue_invoices(&store, &files, 500);

    let mut tasks = Vec::new();
    for n in 0..3 {
        let dyn_store: Arc<dyn CfdiStore> = store.clone();
        let (mut worker, handle) = Worker::new(dyn_store, options(&format!("etl-{n}"), 200));

        tasks.push(tokio::spawn(async move {
            let _handle = handle;
            let mut total = BatchStats::default();
            loop {
                let stats = worker.run_once().await.unwrap();
                if stats.claimed == 0 {
                    break;
                }
                total.absorb(&stats);
            }
            total
        }));
    }

    let mut processed = 0;
    for task in tasks {
        processed += task.await.unwrap().processed;
    }
    assert_eq!(processed, 500);

    let state = store.state();
    let mut seen: HashMap<i64, usize> = HashMap::new();
    for (id, _) in &state.claims {
        *seen.entry(*id).or_default() += 1;
    }
    assert_eq!(seen.len(), 500);
    assert!(seen.values().all(|&count| count == 1));
    assert!(state.queue.values().all(|row| row.processed && row.error.is_none()));
    assert_eq!(state.headers.len(), 500);
    assert_eq!(state.lines.len(), 500);
}

#[tokio::test]
async fn run_drains_queue_until_shutdown() {
    let store = MemoryStore::new();
    let files = Files::new();
    enqueue_invoices(&store, &files, 7);

    let dyn_store: Arc<dyn CfdiStore> = store.clone();
    let (worker, handle) = Worker::new(dyn_store, options("etl-run", 3));
    let task = tokio::spawn(worker.run());

    wait_until_drained(&store).await;
    handle.shutdown().await.unwrap();
    let report = task.await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.claim_errors, 0);
    assert_eq!(report.totals.claimed, 7);
    assert_eq!(report.totals.processed, 7);
    assert_eq!(report.totals.failed, 0);
}

#[tokio::test]
async fn failed_claims_are_retried_after_backoff() {
    let store = MemoryStore::new();
    let files = Files::new();
    enqueue_invoices(&store, &files, 2);
    store.fail_next_claims(2);

    let dyn_store: Arc<dyn CfdiStore> = store.clone();
    let (worker, handle) = Worker::new(dyn_store, options("etl-retry", 10));
    let task = tokio::spawn(worker.run());

    wait_until_drained(&store).await;
    handle.shutdown().await.unwrap();
    let report = task.await.unwrap();

    assert_eq!(report.claim_errors, 2);
    assert_eq!(report.totals.processed, 2);
}

#[tokio::test]
async fn failed_entries_do_not_stop_the_batch() {
    let store = MemoryStore::new();
    let files = Files::new();
    store.enqueue(OWNER, &files.write("emitidos/bad.xml", "<Retenciones/>"));
    store.enqueue(OWNER, &files.path("emitidos/missing.xml"));
    enqueue_invoices(&store, &files, 1);

    let dyn_store: Arc<dyn CfdiStore> = store.clone();
    let (mut worker, _handle) = Worker::new(dyn_store, options("etl-mixed", 10));
    let stats = worker.run_once().await.unwrap();

    assert_eq!(stats.claimed, 3);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.processed, 1);
    assert_eq!(store.pending(), 0);
}

#[tokio::test]
async fn shutdown_mid_batch_releases_remaining_claims() {
    let store = MemoryStore::new();
    let files = Files::new();
    enqueue_invoices(&store, &files, 5);

    let dyn_store: Arc<dyn CfdiStore> = store.clone();
    let (mut worker, handle) = Worker::new(dyn_store, options("etl-stop", 10));
    handle.shutdown().await.unwrap();

    let stats = worker.run_once().await.unwrap();

    assert_eq!(stats.claimed, 5);
    assert_eq!(stats.released, 5);
    assert_eq!(stats.processed, 0);
    assert_eq!(store.pending(), 5);
    assert!(store
        .state()
        .queue
        .values()
        .all(|row| row.claimed_by.is_none()));
}

#[tokio::test]
async fn lease_expiry_mid_batch_hands_rest_to_other_worker() {
    let store = MemoryStore::new();
    let files = Files::new();
    enqueue_invoices(&store, &files, 5);
    store.take_over_after(2, "etl-late");

    let dyn_store: Arc<dyn CfdiStore> = store.clone();
    let (mut slow, _slow_handle) = Worker::new(dyn_store.clone(), options("etl-slow", 10));
    let stats = slow.run_once().await.unwrap();

    assert_eq!(stats.claimed, 5);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.lost, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.pending(), 3);
    assert_eq!(store.state().lines.len(), 2);

    // The new owner's lease runs out too, so a plain claim picks the rest up
    store.expire_leases();
    let (mut late, _late_handle) = Worker::new(dyn_store, options("etl-late", 10));
    let stats = late.run_once().await.unwrap();

    assert_eq!(stats.processed, 3);
    assert_eq!(store.pending(), 0);
    let state = store.state();
    assert_eq!(state.headers.len(), 5);
    assert_eq!(state.lines.len(), 5);
    assert!(state.queue.values().all(|row| row.error.is_none()));
}

#[tokio::test]
async fn dropped_handle_stops_worker() {
    let store = MemoryStore::new();
    let dyn_store: Arc<dyn CfdiStore> = store.clone();
    let (worker, handle) = Worker::new(dyn_store, options("etl-orphan", 10));
    drop(handle);

    let report = tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .unwrap();

    assert_eq!(report.batches, 0);
    assert_eq!(report.totals, BatchStats::default());
}
