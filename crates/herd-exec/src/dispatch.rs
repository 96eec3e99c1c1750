//! Fan-out/fan-in dispatch
//!
//! Runs one unit of work per host concurrently and collects exactly one
//! outcome per host, whatever each unit does.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::debug;

/// Run `work` once per host and collect a complete host-to-outcome map.
///
/// One task is spawned per host with no concurrency cap and no timeout;
/// the collector blocks until every task has reported. A failing host
/// contributes an error entry and leaves its siblings untouched.
pub async fn dispatch<T, F, Fut>(hosts: &[String], work: F) -> HashMap<String, T>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<(String, T)>(hosts.len().max(1));

    for host in hosts {
        let tx = tx.clone();
        let host = host.clone();
        let unit = work(host.clone());

        tokio::spawn(async move {
            let outcome = unit.await;
            // A send fails only when the collector was dropped early
            let _ = tx.send((host, outcome)).await;
        });
    }
    drop(tx);

    let mut results = HashMap::with_capacity(hosts.len());
    for _ in 0..hosts.len() {
        match rx.recv().await {
            Some((host, outcome)) => {
                results.insert(host, outcome);
            }
            None => break,
        }
    }

    debug!(hosts = hosts.len(), collected = results.len(), "dispatch complete");

    results
}
