// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-key claim coordination.
//!
//! When several tasks want to produce the same keyed result concurrently,
//! exactly one becomes the leader and does the work; the rest wait for the
//! leader to finish and then re-check whatever shared state the leader
//! filled in. Used for artifact writes and fingerprint computation so two
//! jobs over identical content never duplicate work.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

pub struct Singleflight<K> {
    inflight: Arc<Mutex<HashMap<K, broadcast::Sender<()>>>>,
}

impl<K> Default for Singleflight<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Singleflight<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Claim the key or join the claim already in flight.
    pub fn begin(&self, key: &K) -> Flight<K> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        match inflight.get(key) {
            Some(tx) => Flight::Follower(tx.subscribe()),
            None => {
                let (tx, _) = broadcast::channel(1);
                inflight.insert(key.clone(), tx);
                Flight::Leader(FlightGuard {
                    inflight: Arc::clone(&self.inflight),
                    key: key.clone(),
                })
            }
        }
    }
}

pub enum Flight<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// This task owns the computation; dropping the guard releases the key
    /// and wakes every follower.
    Leader(FlightGuard<K>),
    Follower(broadcast::Receiver<()>),
}

impl<K> Flight<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Wait for the in-flight leader to finish. No-op for the leader itself.
    pub async fn wait(self) {
        if let Flight::Follower(mut rx) = self {
            // The leader never sends; dropping its sender closes the channel,
            // which is the wake signal.
            let _ = rx.recv().await;
        }
    }
}

pub struct FlightGuard<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    inflight: Arc<Mutex<HashMap<K, broadcast::Sender<()>>>>,
    key: K,
}

impl<K> Drop for FlightGuard<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        inflight.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn second_caller_becomes_follower() {
        let sf = Singleflight::new();
        let key = "k".to_string();

        let first = sf.begin(&key);
        assert!(matches!(first, Flight::Leader(_)));

        let second = sf.begin(&key);
        assert!(matches!(second, Flight::Follower(_)));

        drop(first);
        // After the leader releases, the key is claimable again.
        assert!(matches!(sf.begin(&key), Flight::Leader(_)));
    }

    #[tokio::test]
    async fn followers_wake_when_leader_drops() {
        let sf = Arc::new(Singleflight::new());
        let key = "k".to_string();
        let done = Arc::new(AtomicU32::new(0));

        let leader = sf.begin(&key);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flight = sf.begin(&key);
            let done = Arc::clone(&done);
            handles.push(tokio::spawn(async move {
                flight.wait().await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(done.load(Ordering::SeqCst), 0);

        drop(leader);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_interfere() {
        let sf = Singleflight::new();
        let a = sf.begin(&"a".to_string());
        let b = sf.begin(&"b".to_string());
        assert!(matches!(a, Flight::Leader(_)));
        assert!(matches!(b, Flight::Leader(_)));
    }
}
