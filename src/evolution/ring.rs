//! Ring network of parallel workers.
//!
//! Every worker evolves its own population on its own thread. After each new best it
//! publishes a snapshot into its slot of the shared `RingContext`, and one of its
//! breeding strategies reads the slot of its successor `(i + 1) % K`. A single flag
//! ends the run for everybody once one worker is done.

use crate::config::EngineConfig;
use crate::evolution::breeder::{Worker, WorkerReport};
use crate::evolution::{EngineError, OrganismModel, RunOutcome};
use crate::rng::Prng;
use log::{info, warn};
use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The best organism a worker has published so far.
///
/// Only the owning worker writes; any worker may take a snapshot. Replacing the
/// content drops the previous `Arc`, freeing that organism once the last reader
/// lets go of it.
pub struct SharedSlot<O> {
    best: RwLock<Option<Arc<O>>>,
}

impl<O> SharedSlot<O> {
    fn new() -> Self {
        Self {
            best: RwLock::new(None),
        }
    }

    fn publish(&self, organism: O) {
        let fresh = Arc::new(organism);
        let previous = self.best.write().replace(fresh);
        // dropped outside the lock
        drop(previous);
    }

    fn snapshot(&self) -> Option<Arc<O>> {
        self.best.read().clone()
    }
}

/// State shared by all workers of one ring run, created per run and dropped after
/// every worker joined.
pub struct RingContext<O> {
    slots: Vec<SharedSlot<O>>,
    finished: AtomicBool,
}

impl<O> RingContext<O> {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers).map(|_| SharedSlot::new()).collect(),
            finished: AtomicBool::new(false),
        }
    }

    pub fn workers(&self) -> usize {
        self.slots.len()
    }

    /// The view of the ring handed to worker `worker`
    pub fn link(&self, worker: usize) -> RingLink<'_, O> {
        RingLink {
            context: self,
            own: worker,
            neighbor: (worker + 1) % self.slots.len(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn signal_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// A worker's handle on the ring: writes its own slot, reads its neighbor's.
pub struct RingLink<'a, O> {
    context: &'a RingContext<O>,
    own: usize,
    neighbor: usize,
}

impl<'a, O> RingLink<'a, O> {
    pub fn publish(&self, organism: O) {
        self.context.slots[self.own].publish(organism);
    }

    pub fn neighbor_best(&self) -> Option<Arc<O>> {
        self.context.slots[self.neighbor].snapshot()
    }

    pub fn neighbor(&self) -> usize {
        self.neighbor
    }

    pub fn is_finished(&self) -> bool {
        self.context.is_finished()
    }

    pub fn signal_finished(&self) {
        self.context.signal_finished();
    }
}

/// Runs `workers` breeding loops in parallel and reduces them to one winner.
///
/// Each worker gets a dedicated thread of a pool sized to the ring, so no worker
/// waits for another to start. A worker failure raises the shared flag so the others
/// wind down; the failure is reported only after every worker has returned.
///
/// # Arguments
/// * `model` - The organism model shared by every worker
/// * `config` - The run configuration, already validated
/// * `base_seed` - Seed from which every worker stream is derived
/// * `time_budget` - Wall-clock budget of each worker, `None` for unbounded
/// * `workers` - Ring size, at least 2
///
/// # Returns
/// * `Result<RunOutcome, EngineError>` - The best organism across workers and the
///   summed generation count, or `EngineError::Ring` if any worker failed
pub fn run_ring<M: OrganismModel>(
    model: &M,
    config: &EngineConfig,
    base_seed: u64,
    time_budget: Option<Duration>,
    workers: usize,
) -> Result<RunOutcome<M::Organism>, EngineError> {
    if workers < 2 {
        return Err(EngineError::RingTooSmall(workers));
    }
    config.validate()?;

    let started = Instant::now();
    info!(
        "Starting ring of {} workers, population {} each",
        workers, config.population_size
    );

    let context = RingContext::new(workers);
    let pool = ThreadPoolBuilder::new()
        .num_threads(context.workers())
        .thread_name(|i| format!("ring-worker-{}", i))
        .build()?;

    let results: Vec<Result<WorkerReport<M::Organism>, EngineError>> = pool.install(|| {
        (0..context.workers())
            .into_par_iter()
            .with_max_len(1)
            .map(|index| run_ring_worker(model, config, &context, base_seed, index, time_budget))
            .collect()
    });

    let mut reports = Vec::with_capacity(workers);
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => failures.push(e),
        }
    }
    let failed = failures.len();
    if let Some(first) = failures.into_iter().next() {
        return Err(EngineError::Ring {
            failed,
            workers,
            first: Box::new(first),
        });
    }

    let generations: usize = reports.iter().map(|r| r.generations).sum();
    // strictly greater, so ties go to the lowest worker index
    let winner = reports
        .into_iter()
        .reduce(|best, next| if next.score > best.score { next } else { best })
        .ok_or(EngineError::RingTooSmall(workers))?;

    let elapsed = started.elapsed();
    info!(
        "Done in {}ms and {} generations (worker {} won with {:.4})",
        elapsed.as_millis(),
        generations,
        winner.worker,
        winner.score
    );

    Ok(RunOutcome {
        best: winner.best,
        score: winner.score,
        generations,
        elapsed,
    })
}

fn run_ring_worker<M: OrganismModel>(
    model: &M,
    config: &EngineConfig,
    context: &RingContext<M::Organism>,
    base_seed: u64,
    index: usize,
    time_budget: Option<Duration>,
) -> Result<WorkerReport<M::Organism>, EngineError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let rng = Prng::for_worker(config.rng, base_seed, index);
        Worker::new(model, config, index, rng, Some(context.link(index)))?.run(time_budget)
    }));

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(EngineError::WorkerPanicked {
            worker: index,
            message: panic_message(payload.as_ref()),
        }),
    };

    if let Err(e) = &result {
        warn!("Ring worker {} failed, stopping the ring: {}", index, e);
        context.signal_finished();
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::breeder::StopReason;
    use crate::evolution::{ModelResult, OrganismModel};
    use crate::rng::RngKind;
    use std::thread;

    /// Every child beats its best parent by one; only worker 0 may accept.
    struct Climber {
        goal: f64,
    }

    impl OrganismModel for Climber {
        type Organism = f64;

        fn generate(&self, index: usize, _rng: &mut Prng) -> ModelResult<f64> {
            Ok(index as f64)
        }

        fn breed(&self, a: &f64, b: &f64, child: &mut f64, _rng: &mut Prng) -> ModelResult<()> {
            *child = a.max(*b) + 1.0;
            Ok(())
        }

        fn score(&self, organism: &f64, _worker: usize, _rng: &mut Prng) -> ModelResult<f64> {
            Ok(*organism)
        }

        fn accept(&self, _o: &f64, score: f64, _g: usize, worker: usize, _rng: &mut Prng) -> ModelResult<bool> {
            Ok(worker == 0 && score >= self.goal)
        }
    }

    fn run_workers(model: &Climber, context: &RingContext<f64>) -> Vec<WorkerReport<f64>> {
        let config = EngineConfig {
            population_size: 10,
            ..EngineConfig::default()
        };
        thread::scope(|scope| {
            let handles: Vec<_> = (0..context.workers())
                .map(|index| {
                    let config = &config;
                    scope.spawn(move || {
                        let rng = Prng::for_worker(RngKind::Lcg, 99, index);
                        Worker::new(model, config, index, rng, Some(context.link(index)))
                            .unwrap()
                            .run(None)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn test_peers_stop_once_worker_zero_accepts() {
        let model = Climber { goal: 60.0 };
        let context = RingContext::new(4);
        let reports = run_workers(&model, &context);

        assert_eq!(reports[0].stop, StopReason::Accepted);
        assert!(reports[0].score >= 60.0);
        for report in &reports[1..] {
            assert_eq!(report.stop, StopReason::RingFinished, "worker {}", report.worker);
        }
        assert!(context.is_finished());
        // the last worker's neighbor is worker 0, whose slot holds its final best
        let published = context.link(3).neighbor_best().unwrap();
        assert_eq!(*published, reports[0].best);
    }

    #[test]
    fn test_initial_accept_also_stops_peers() {
        // worker 0 accepts its freshly generated population
        let model = Climber { goal: 0.0 };
        let context = RingContext::new(3);
        let reports = run_workers(&model, &context);

        assert_eq!(reports[0].stop, StopReason::Accepted);
        assert_eq!(reports[0].generations, 0);
        for report in &reports[1..] {
            assert_eq!(report.stop, StopReason::RingFinished);
        }
    }

    #[test]
    fn test_links_point_to_successor() {
        let context: RingContext<u32> = RingContext::new(4);
        assert_eq!(context.workers(), 4);
        assert_eq!(context.link(0).neighbor(), 1);
        assert_eq!(context.link(2).neighbor(), 3);
        assert_eq!(context.link(3).neighbor(), 0);
    }

    #[test]
    fn test_neighbor_reads_latest_publish() {
        let context: RingContext<String> = RingContext::new(3);
        let reader = context.link(0);
        let writer = context.link(1);

        assert!(reader.neighbor_best().is_none());
        writer.publish("first".to_string());
        let held = reader.neighbor_best().unwrap();
        writer.publish("second".to_string());

        // an older snapshot stays valid after the slot moved on
        assert_eq!(held.as_str(), "first");
        assert_eq!(reader.neighbor_best().unwrap().as_str(), "second");
        // worker 2 reads worker 0, which never published
        assert!(context.link(2).neighbor_best().is_none());
    }

    #[test]
    fn test_replaced_organism_is_released() {
        let context: RingContext<Vec<u8>> = RingContext::new(2);
        let link = context.link(0);
        link.publish(vec![1, 2, 3]);
        let snapshot = context.link(1).neighbor_best().unwrap();
        assert_eq!(Arc::strong_count(&snapshot), 2);

        link.publish(vec![4]);
        assert_eq!(Arc::strong_count(&snapshot), 1);
    }

    #[test]
    fn test_finish_flag_is_shared_and_sticky() {
        let context: RingContext<u8> = RingContext::new(3);
        assert!(!context.link(2).is_finished());
        context.link(1).signal_finished();
        for worker in 0..3 {
            assert!(context.link(worker).is_finished());
        }
        context.link(0).signal_finished();
        assert!(context.is_finished());
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
