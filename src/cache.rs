//! Refresh cycle and the cache that serves its latest result.
//!
//! A [`SeedCache`] can only be created from an already generated
//! [`SeedList`], so nothing is ever served before the first cycle
//! completes.  Regeneration happens outside the lock; the lock is held
//! just long enough to swap the stored artifact.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};

use crate::filter::TaskFilter;
use crate::orchestrator::Orchestrator;
use crate::peer::{fetch_peer_keys, PeerKeySource};
use crate::seedlist::{SeedList, SeedListBuilder};

/// Result of one refresh cycle.
pub struct Generation {
    pub seed_list: SeedList,
    pub candidates: usize,
}

impl Generation {
    /// Candidates existed but none of them answered.
    pub fn all_peers_failed(&self) -> bool {
        self.candidates > 0 && self.seed_list.peer_count() == 0
    }
}

/// Runs filter → fetch → build for one cycle.
pub struct SeedListGenerator {
    orchestrator: Arc<dyn Orchestrator>,
    peers: Arc<dyn PeerKeySource>,
    services: Vec<String>,
    filter: TaskFilter,
    builder: SeedListBuilder,
    rpc_timeout: Duration,
    sort_peers: bool,
}

impl SeedListGenerator {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        peers: Arc<dyn PeerKeySource>,
        services: Vec<String>,
        filter: TaskFilter,
        builder: SeedListBuilder,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            peers,
            services,
            filter,
            builder,
            rpc_timeout,
            sort_peers: true,
        }
    }

    /// Keep peers in completion order instead of sorting by address.
    pub fn completion_order(mut self) -> Self {
        self.sort_peers = false;
        self
    }

    pub async fn generate(&self) -> Result<Generation> {
        let tasks = self.orchestrator.running_tasks(&self.services).await?;
        let candidates = self.filter.candidates(&tasks);
        let candidate_count = candidates.len();

        let mut records =
            fetch_peer_keys(Arc::clone(&self.peers), candidates, self.rpc_timeout).await;
        if self.sort_peers {
            records.sort();
        }

        let seed_list = self.builder.build(&records);
        info!(
            "Generated seed list: {} tasks, {} candidates, {} peers",
            tasks.len(),
            candidate_count,
            seed_list.peer_count()
        );
        Ok(Generation {
            seed_list,
            candidates: candidate_count,
        })
    }
}

/// Most recent seed list, shared between the refresher and readers.
#[derive(Clone)]
pub struct SeedCache {
    current: Arc<RwLock<SeedList>>,
}

impl SeedCache {
    pub fn new(initial: SeedList) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn read(&self) -> SeedList {
        self.current.read().await.clone()
    }

    pub async fn swap(&self, next: SeedList) {
        *self.current.write().await = next;
    }

    /// Run one background cycle; the cached list is only replaced on
    /// success.  Returns whether a swap happened.
    pub async fn refresh(&self, generator: &SeedListGenerator) -> bool {
        match generator.generate().await {
            Ok(generation) if generation.all_peers_failed() => {
                warn!(
                    "All {} peers failed to answer, keeping previous seed list",
                    generation.candidates
                );
                false
            }
            Ok(generation) => {
                self.swap(generation.seed_list).await;
                true
            }
            Err(e) => {
                error!("Failed to refresh seed list: {:#}", e);
                false
            }
        }
    }
}

/// Regenerate every `period`, one cycle at a time.  Never returns.
pub async fn run_refresh(cache: SeedCache, generator: SeedListGenerator, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the initial list already exists.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        cache.refresh(&generator).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerError;
    use crate::types::{NetworkAttachment, Task, TaskState};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeOrchestrator {
        tasks: Vec<Task>,
        down: AtomicBool,
    }

    #[async_trait]
    impl Orchestrator for FakeOrchestrator {
        async fn running_tasks(&self, services: &[String]) -> Result<Vec<Task>> {
            assert_eq!(services, &["validator".to_string()][..]);
            if self.down.load(Ordering::SeqCst) {
                return Err(anyhow!("connection refused"));
            }
            Ok(self.tasks.clone())
        }
    }

    struct FakePeers {
        keys: HashMap<IpAddr, &'static str>,
        down: AtomicBool,
    }

    #[async_trait]
    impl PeerKeySource for FakePeers {
        async fn public_key(&self, ip: IpAddr) -> Result<String, PeerError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(PeerError::MissingResult);
            }
            match self.keys.get(&ip) {
                Some(k) => Ok(k.to_string()),
                None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(PeerError::MissingResult)
                }
            }
        }
    }

    fn running(id: &str, addr: &str) -> Task {
        Task {
            id: id.into(),
            desired_state: TaskState::Running,
            state: TaskState::Running,
            attachments: vec![NetworkAttachment {
                network: "devnet".into(),
                addresses: vec![addr.into()],
            }],
        }
    }

    fn setup() -> (Arc<FakeOrchestrator>, Arc<FakePeers>, SeedListGenerator) {
        let orch = Arc::new(FakeOrchestrator {
            tasks: vec![
                running("t2", "10.0.0.2/24"),
                running("t1", "10.0.0.1/24"),
                running("t3", "10.0.0.3/24"),
            ],
            down: AtomicBool::new(false),
        });
        let peers = Arc::new(FakePeers {
            keys: HashMap::from([
                ("10.0.0.1".parse().unwrap(), "aa"),
                ("10.0.0.2".parse().unwrap(), "bb"),
            ]),
            down: AtomicBool::new(false),
        });
        let generator = SeedListGenerator::new(
            orch.clone(),
            peers.clone(),
            vec!["validator".into()],
            TaskFilter::new("devnet"),
            SeedListBuilder::new("ws", 8443, None),
            Duration::from_millis(100),
        );
        (orch, peers, generator)
    }

    #[tokio::test]
    async fn timed_out_peer_is_left_out() {
        let (_, _, generator) = setup();
        let generation = generator.generate().await.unwrap();
        assert_eq!(generation.candidates, 3);
        assert_eq!(
            &generation.seed_list.body()[..],
            b"ws://10.0.0.1:8443/aa\nws://10.0.0.2:8443/bb\n"
        );
    }

    #[tokio::test]
    async fn completion_order_contains_same_urls() {
        let (_, _, generator) = setup();
        let body = generator.completion_order().generate().await.unwrap().seed_list.body();
        let text = std::str::from_utf8(&body).unwrap();
        let mut lines: Vec<_> = text.lines().collect();
        lines.sort();
        assert_eq!(lines, ["ws://10.0.0.1:8443/aa", "ws://10.0.0.2:8443/bb"]);
        assert!(text.ends_with('\n'));
    }

    #[tokio::test]
    async fn orchestrator_failure_keeps_previous_list() {
        let (orch, _, generator) = setup();
        let cache = SeedCache::new(generator.generate().await.unwrap().seed_list);
        let before = cache.read().await;

        orch.down.store(true, Ordering::SeqCst);
        assert!(!cache.refresh(&generator).await);
        assert_eq!(cache.read().await.body(), before.body());
    }

    #[tokio::test]
    async fn total_peer_failure_keeps_previous_list() {
        let (_, peers, generator) = setup();
        let cache = SeedCache::new(generator.generate().await.unwrap().seed_list);
        let before = cache.read().await;

        peers.down.store(true, Ordering::SeqCst);
        let generation = generator.generate().await.unwrap();
        assert!(generation.seed_list.body().is_empty());
        assert!(generation.all_peers_failed());

        assert!(!cache.refresh(&generator).await);
        assert_eq!(cache.read().await.body(), before.body());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_only_see_committed_lists() {
        let builder = SeedListBuilder::new("ws", 8443, None);
        let lists: Vec<SeedList> = (1..=20u8)
            .map(|n| {
                let records: Vec<_> = (1..=n)
                    .map(|i| crate::types::PeerRecord {
                        ip: IpAddr::from([10, 0, n, i]),
                        public_key: format!("key{n}"),
                    })
                    .collect();
                builder.build(&records)
            })
            .collect();
        let cache = SeedCache::new(lists[0].clone());

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let lists = lists.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let seen = cache.read().await;
                        assert!(lists.contains(&seen));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for list in &lists {
            cache.swap(list.clone()).await;
            tokio::task::yield_now().await;
        }
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(cache.read().await, lists[19]);
    }
}
