//! Unit tests for the stateful run handles

use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::cancel::Cancellation;
use crate::error::BoxError;
use crate::source::{DepResults, FnSource};

fn chain_deps(n: &&'static str) -> Result<Vec<&'static str>, BoxError> {
    Ok(match *n {
        "a" => vec!["b"],
        "b" => vec!["c"],
        "c" => vec!["d"],
        _ => Vec::new(),
    })
}

fn chain_visit(
    n: &&'static str,
    _signal: &Cancellation,
    _path: &[&'static str],
    _deps: &DepResults<&'static str, &'static str>,
) -> Result<&'static str, BoxError> {
    Ok(*n)
}

type ChainSource = FnSource<
    &'static str,
    &'static str,
    fn(&&'static str) -> Result<Vec<&'static str>, BoxError>,
    fn(
        &&'static str,
        &Cancellation,
        &[&'static str],
        &DepResults<&'static str, &'static str>,
    ) -> Result<&'static str, BoxError>,
>;

fn chain_source() -> Arc<ChainSource> {
    Arc::new(FnSource::new(
        chain_deps as fn(&&'static str) -> Result<Vec<&'static str>, BoxError>,
        chain_visit
            as fn(
                &&'static str,
                &Cancellation,
                &[&'static str],
                &DepResults<&'static str, &'static str>,
            ) -> Result<&'static str, BoxError>,
    ))
}

#[tokio::test]
async fn test_route_follows_the_realized_path() {
    let runner = Runner::new(vec!["a"], chain_source(), RunOptions::default());
    runner.run().await.unwrap();

    assert_eq!(runner.route(&"a", &"d"), Some(vec!["a", "b", "c", "d"]));
    assert_eq!(runner.route(&"b", &"d"), Some(vec!["b", "c", "d"]));
    assert_eq!(runner.route(&"a", &"b"), Some(vec!["a", "b"]));
}

#[tokio::test]
async fn test_route_is_unconnected_without_a_realized_descent() {
    let runner = Runner::new(vec!["a"], chain_source(), RunOptions::default());
    runner.run().await.unwrap();

    // never reached in that direction
    assert_eq!(runner.route(&"d", &"a"), None);
    // no self-loop was traversed
    assert_eq!(runner.route(&"a", &"a"), None);
    // never visited at all
    assert_eq!(runner.route(&"a", &"x"), None);
    assert_eq!(runner.route(&"x", &"d"), None);
}

#[tokio::test]
async fn test_wait_graph_is_empty_after_the_run() {
    let runner = Runner::new(vec!["a"], chain_source(), RunOptions::default());
    runner.run().await.unwrap();
    assert!(runner.wait_graph().is_empty());
}

#[tokio::test]
async fn test_wait_graph_is_empty_after_a_failed_run() {
    fn failing_visit(
        n: &&'static str,
        _signal: &Cancellation,
        _path: &[&'static str],
        _deps: &DepResults<&'static str, &'static str>,
    ) -> Result<&'static str, BoxError> {
        match *n {
            "d" => Err("glorp".into()),
            _ => Ok(*n),
        }
    }
    let source: Arc<ChainSource> = Arc::new(FnSource::new(
        chain_deps as fn(&&'static str) -> Result<Vec<&'static str>, BoxError>,
        failing_visit
            as fn(
                &&'static str,
                &Cancellation,
                &[&'static str],
                &DepResults<&'static str, &'static str>,
            ) -> Result<&'static str, BoxError>,
    ));

    let runner = Runner::new(vec!["a"], source, RunOptions::default());
    runner.run().await.unwrap_err();
    assert!(runner.wait_graph().is_empty());
}

/// Root depends on a leaf whose visit parks until released, keeping the
/// wait edge observable
struct GatedLeaf {
    gate: Notify,
}

#[async_trait]
impl NodeSource for GatedLeaf {
    type Node = &'static str;
    type Output = &'static str;

    async fn dependencies(&self, node: &&'static str) -> Result<Vec<&'static str>, BoxError> {
        Ok(match *node {
            "root" => vec!["leaf"],
            _ => Vec::new(),
        })
    }

    async fn visit(
        &self,
        node: &&'static str,
        _signal: &Cancellation,
        _path: &[&'static str],
        _deps: &DepResults<&'static str, &'static str>,
    ) -> Result<&'static str, BoxError> {
        if *node == "leaf" {
            self.gate.notified().await;
        }
        Ok(*node)
    }
}

#[tokio::test]
async fn test_wait_graph_is_observable_while_the_run_is_in_flight() {
    let source = Arc::new(GatedLeaf { gate: Notify::new() });
    let runner = Arc::new(Runner::new(
        vec!["root"],
        Arc::clone(&source),
        RunOptions::default(),
    ));

    let running = Arc::clone(&runner);
    let handle = tokio::spawn(async move { running.run().await });

    // the edge appears once root starts waiting on the gated leaf
    timeout(Duration::from_secs(5), async {
        loop {
            let waiting = runner.wait_graph();
            if waiting
                .get("root")
                .is_some_and(|deps| deps.contains("leaf"))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("wait edge never became visible");

    source.gate.notify_one();
    let results = handle.await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
    assert!(runner.wait_graph().is_empty());
}

#[tokio::test]
async fn test_runner_returns_the_stored_outcome_on_reruns() {
    let visits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&visits);
    let source = Arc::new(FnSource::new(
        chain_deps,
        move |n: &&'static str,
              _: &Cancellation,
              _: &[&'static str],
              _: &DepResults<&'static str, &'static str>|
              -> Result<&'static str, BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(*n)
        },
    ));

    let runner = Runner::new(vec!["a"], source, RunOptions::default());
    let first = runner.run().await.unwrap();
    let second = runner.run().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(visits.load(Ordering::SeqCst), 4);
}

#[test]
fn test_runner_sync_routes_and_reruns() {
    let mut runner = RunnerSync::new(vec!["a"], chain_source(), RunOptions::default());
    let first = runner.run().unwrap();
    assert_eq!(first.len(), 4);

    assert_eq!(runner.route(&"a", &"d"), Some(vec!["a", "b", "c", "d"]));
    assert_eq!(runner.route(&"c", &"a"), None);
    assert!(runner.wait_graph().is_empty());

    let second = runner.run().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_runner_sync_rejects_an_empty_entry_set() {
    let mut runner = RunnerSync::new(Vec::new(), chain_source(), RunOptions::default());
    assert!(runner.run().unwrap_err().is_config());
}
