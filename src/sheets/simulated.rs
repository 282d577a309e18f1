//! Simulated Sheet Store with Fault Injection
//!
//! Wraps another transport and fails calls with configured probabilities,
//! drawn from a seeded RNG so a failing run can be replayed.

use crate::sheets::range::SheetRange;
use crate::sheets::transport::{Rows, SheetTransport, TransportError, TransportFuture};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedSheetsConfig {
    /// Probability of a read failing
    pub get_fail_prob: f64,
    /// Probability of an append failing
    pub append_fail_prob: f64,
    /// Probability of an overwrite failing
    pub update_fail_prob: f64,
}

impl Default for SimulatedSheetsConfig {
    fn default() -> Self {
        SimulatedSheetsConfig {
            get_fail_prob: 0.01,
            append_fail_prob: 0.01,
            update_fail_prob: 0.01,
        }
    }
}

impl SimulatedSheetsConfig {
    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedSheetsConfig {
            get_fail_prob: 0.0,
            append_fail_prob: 0.0,
            update_fail_prob: 0.0,
        }
    }

    /// Every call fails
    pub fn outage() -> Self {
        SimulatedSheetsConfig {
            get_fail_prob: 1.0,
            append_fail_prob: 1.0,
            update_fail_prob: 1.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedSheetsStats {
    pub get_attempts: u64,
    pub get_failures: u64,
    pub append_attempts: u64,
    pub append_failures: u64,
    pub update_attempts: u64,
    pub update_failures: u64,
}

struct SimulatedInner {
    rng: ChaCha8Rng,
    config: SimulatedSheetsConfig,
    stats: SimulatedSheetsStats,
}

#[derive(Clone, Copy)]
enum Call {
    Get,
    Append,
    Update,
}

/// Fault-injecting transport wrapper
#[derive(Clone)]
pub struct SimulatedSheets<S: SheetTransport> {
    inner_store: S,
    state: Arc<Mutex<SimulatedInner>>,
}

impl<S: SheetTransport> SimulatedSheets<S> {
    pub fn new(inner_store: S, seed: u64, config: SimulatedSheetsConfig) -> Self {
        SimulatedSheets {
            inner_store,
            state: Arc::new(Mutex::new(SimulatedInner {
                rng: ChaCha8Rng::seed_from_u64(seed),
                config,
                stats: SimulatedSheetsStats::default(),
            })),
        }
    }

    /// Swap the fault probabilities, e.g. to end a simulated outage
    pub fn set_config(&self, config: SimulatedSheetsConfig) {
        self.state.lock().config = config;
    }

    pub fn stats(&self) -> SimulatedSheetsStats {
        self.state.lock().stats.clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    fn roll(&self, call: Call) -> Result<(), TransportError> {
        let mut s = self.state.lock();
        let prob = match call {
            Call::Get => {
                s.stats.get_attempts += 1;
                s.config.get_fail_prob
            }
            Call::Append => {
                s.stats.append_attempts += 1;
                s.config.append_fail_prob
            }
            Call::Update => {
                s.stats.update_attempts += 1;
                s.config.update_fail_prob
            }
        };
        if prob <= 0.0 || !s.rng.gen_bool(prob.min(1.0)) {
            return Ok(());
        }
        let op = match call {
            Call::Get => {
                s.stats.get_failures += 1;
                "get"
            }
            Call::Append => {
                s.stats.append_failures += 1;
                "append"
            }
            Call::Update => {
                s.stats.update_failures += 1;
                "update"
            }
        };
        Err(TransportError::Unavailable(format!("simulated {} failure", op)))
    }
}

impl<S: SheetTransport> SheetTransport for SimulatedSheets<S> {
    fn get<'a>(&'a self, range: &'a SheetRange) -> TransportFuture<'a, Rows> {
        Box::pin(async move {
            self.roll(Call::Get)?;
            self.inner_store.get(range).await
        })
    }

    fn append<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.roll(Call::Append)?;
            self.inner_store.append(range, rows).await
        })
    }

    fn update<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.roll(Call::Update)?;
            self.inner_store.update(range, rows).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::transport::InMemorySheets;

    #[tokio::test]
    async fn test_no_faults_passes_through() {
        let inner = InMemorySheets::new().with_table("T", &["id"]);
        let sim = SimulatedSheets::new(inner, 7, SimulatedSheetsConfig::no_faults());
        for _ in 0..50 {
            sim.get(&SheetRange::table("T")).await.unwrap();
        }
        let stats = sim.stats();
        assert_eq!(stats.get_attempts, 50);
        assert_eq!(stats.get_failures, 0);
    }

    #[tokio::test]
    async fn test_outage_fails_everything() {
        let inner = InMemorySheets::new().with_table("T", &["id"]);
        let sim = SimulatedSheets::new(inner.clone(), 7, SimulatedSheetsConfig::outage());
        let result = sim.append(&SheetRange::table("T"), vec![]).await;
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
        assert_eq!(inner.append_count(), 0);

        sim.set_config(SimulatedSheetsConfig::no_faults());
        sim.append(&SheetRange::table("T"), vec![]).await.unwrap();
        assert_eq!(inner.append_count(), 1);
    }

    #[tokio::test]
    async fn test_same_seed_same_faults() {
        async fn run(seed: u64) -> Vec<bool> {
            let inner = InMemorySheets::new().with_table("T", &["id"]);
            let config = SimulatedSheetsConfig {
                get_fail_prob: 0.3,
                ..SimulatedSheetsConfig::no_faults()
            };
            let sim = SimulatedSheets::new(inner, seed, config);
            let mut outcomes = Vec::new();
            for _ in 0..32 {
                outcomes.push(sim.get(&SheetRange::table("T")).await.is_ok());
            }
            outcomes
        }
        assert_eq!(run(99).await, run(99).await);
    }
}
