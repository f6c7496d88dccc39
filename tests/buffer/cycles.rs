use super::common::{Lookup, N, assert_elapsed, found, shares, spawn_lookup};
use coalesce::{
    buffer::{Buffer, Whole},
    config::BufferConfig,
};
use futures_util::future::join_all;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

const INPUT_LAG: Duration = Duration::from_millis(20);
const INTERVAL: Duration = Duration::from_millis(30);
const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test(start_paused = true)]
async fn time_is_the_limit() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::default();
    let buffer = spawn_lookup(&cancel, &lookup, 6, INTERVAL);

    let first = join_all([1, 1, 2].map(|n| buffer.submit(N(n))));
    let second = async {
        sleep(INPUT_LAG).await;
        join_all([3, 3].map(|n| buffer.submit(N(n)))).await
    };

    let started = Instant::now();
    let (first, second) = tokio::join!(first, second);

    assert_elapsed(started, INTERVAL);
    assert_eq!(shares(first), found(&[1, 1, 2]));
    assert_eq!(shares(second), found(&[3, 3]));
    assert_eq!(lookup.cycles(), 1);
    assert_eq!(lookup.batches(), vec![vec![1, 1, 2, 3, 3]]);
    assert_eq!(buffer.stats().cycles, 1);
    assert_eq!(buffer.stats().dispatched, 5);
}

#[tokio::test(start_paused = true)]
async fn size_is_the_limit() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::default();
    let buffer = spawn_lookup(&cancel, &lookup, 6, INTERVAL);

    let delayed = |lag: u32, values: Vec<u32>| {
        let buffer = buffer.clone();
        async move {
            sleep(INPUT_LAG * lag).await;
            join_all(values.into_iter().map(|n| buffer.submit(N(n)))).await
        }
    };

    let (first, second, third) = tokio::join!(
        delayed(0, vec![1, 1, 2]),
        delayed(1, vec![3, 3, 1, 5]),
        delayed(2, vec![7, 1, 9, 7, 1, 9]),
    );

    assert_eq!(shares(first), found(&[1, 1, 2]));
    assert_eq!(shares(second), found(&[3, 3, 1, 5]));
    assert_eq!(shares(third), found(&[7, 1, 9, 7, 1, 9]));
    assert_eq!(
        lookup.batches(),
        vec![vec![1, 1, 2, 3, 3, 1], vec![5, 7, 1, 9, 7, 1], vec![9]]
    );
}

#[tokio::test(start_paused = true)]
async fn capacity_dispatches_immediately() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::default();
    let buffer = spawn_lookup(&cancel, &lookup, 3, HOUR);
    assert_eq!(buffer.capacity(), 3);

    let started = Instant::now();
    let results = join_all([4, 5, 6].map(|n| buffer.submit(N(n)))).await;

    assert_elapsed(started, Duration::ZERO);
    assert_eq!(shares(results), found(&[4, 5, 6]));
    assert_eq!(lookup.cycles(), 1);
    assert_eq!(buffer.stats().cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn timer_restarts_after_capacity_dispatch() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::default();
    let buffer = spawn_lookup(&cancel, &lookup, 3, INTERVAL);

    // fills the buffer 20ms in, the timer is due 30ms later instead of 10ms later
    sleep(INPUT_LAG).await;
    let results = join_all([1, 2, 3].map(|n| buffer.submit(N(n)))).await;
    assert_eq!(shares(results), found(&[1, 2, 3]));

    sleep(Duration::from_millis(5)).await;
    let started = Instant::now();
    let result = buffer.submit(N(4)).await.unwrap();

    assert_eq!(result, Some(4));
    assert_elapsed(started, Duration::from_millis(25));
    assert_eq!(lookup.batches(), vec![vec![1, 2, 3], vec![4]]);
}

#[tokio::test(start_paused = true)]
async fn empty_cycles_are_skipped() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::default();
    let buffer = spawn_lookup(&cancel, &lookup, 6, INTERVAL);

    sleep(INTERVAL * 5).await;
    assert_eq!(lookup.cycles(), 0);
    assert_eq!(buffer.stats().cycles, 0);

    assert_eq!(buffer.submit(N(1)).await.unwrap(), Some(1));
    assert_eq!(lookup.cycles(), 1);
}

#[tokio::test(start_paused = true)]
async fn preserves_arrival_order() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::default();
    let buffer = spawn_lookup(&cancel, &lookup, 100, INTERVAL);

    let values = (0..25).collect::<Vec<u32>>();
    let results = join_all(values.iter().map(|n| buffer.submit(N(*n)))).await;

    assert_eq!(shares(results), found(&values));
    assert_eq!(lookup.batches(), vec![values]);
}

#[tokio::test(start_paused = true)]
async fn duplicates_each_get_their_share() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::with_missing([13]);
    let buffer = spawn_lookup(&cancel, &lookup, 5, INTERVAL);

    let results = join_all([8, 8, 13, 8, 2].map(|n| buffer.submit(N(n)))).await;

    assert_eq!(
        shares(results),
        vec![Ok(Some(8)), Ok(Some(8)), Ok(None), Ok(Some(8)), Ok(Some(2))]
    );
    assert_eq!(lookup.batches(), vec![vec![8, 8, 13, 8, 2]]);
}

#[tokio::test(start_paused = true)]
async fn whole_fragments_share_the_combined_output() {
    let cancel = CancellationToken::new();
    let sum = |_: &CancellationToken, fragments: &[Whole<u64>]| {
        let total = fragments.iter().map(|f| f.into_inner()).sum::<u64>();
        async move { Ok::<_, Infallible>(total) }
    };
    let buffer = Buffer::<Whole<u64>, _>::spawn(&cancel, sum, BufferConfig::new(3, INTERVAL));

    let results = join_all([1, 2, 3].map(|n| buffer.submit(Whole::new(n)))).await;

    let totals = results.into_iter().map(|r| r.unwrap().unwrap()).collect::<Vec<Arc<u64>>>();
    assert!(totals.iter().all(|total| **total == 6));
    assert!(Arc::ptr_eq(&totals[0], &totals[2]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_submitters() {
    let cancel = CancellationToken::new();
    let lookup = Lookup::default();
    let buffer = spawn_lookup(&cancel, &lookup, 2, Duration::from_millis(10));

    let submitters = (1..=4).map(|n| {
        let buffer = buffer.clone();
        tokio::task::spawn_blocking(move || buffer.submit_blocking(N(n)))
    });

    let mut results = Vec::new();
    for submitter in submitters.collect::<Vec<_>>() {
        results.push(submitter.await.unwrap());
    }

    assert_eq!(shares(results), found(&[1, 2, 3, 4]));
    assert_eq!(lookup.batches().concat().len(), 4);
}
