//! Execution substrate - Deferred results, task dispatch and collectives.
//!
//! A [`Substrate`] is what one subdomain sees of the distributed runtime: it
//! runs the corrector as a deferred unit of work and performs global sum and
//! minimum reductions across subdomains. [`LocalSubstrate`] implements it for
//! subdomains living in one process, with the corrector dispatched onto the
//! rayon pool (or run inline when the caller is already a rayon worker) and
//! reductions rendezvousing through a shared [`AllReduce`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use super::{CorrectorOutcome, CorrectorTask, TimeStep};

/// Errors raised while waiting on a deferred result.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Deferred result was dropped before it was produced")]
    Disconnected,
}

/// A value that is either available now or will be delivered later.
#[derive(Debug)]
pub struct Deferred<T> {
    inner: Inner<T>,
}

#[derive(Debug)]
enum Inner<T> {
    Ready(T),
    Pending(Receiver<T>),
}

impl<T> Deferred<T> {
    /// A result that is already known.
    pub fn ready(value: T) -> Self {
        Self {
            inner: Inner::Ready(value),
        }
    }

    /// A pending result together with the sender that fulfils it.
    pub fn channel() -> (Sender<T>, Self) {
        let (tx, rx) = mpsc::channel();
        (
            tx,
            Self {
                inner: Inner::Pending(rx),
            },
        )
    }

    /// Block until the value is available.
    pub fn wait(self) -> Result<T, TaskError> {
        match self.inner {
            Inner::Ready(value) => Ok(value),
            Inner::Pending(rx) => rx.recv().map_err(|_| TaskError::Disconnected),
        }
    }
}

/// The distributed runtime as seen by one subdomain.
pub trait Substrate: Send + Sync {
    /// Rank of this subdomain.
    fn subdomain(&self) -> usize;

    fn num_subdomains(&self) -> usize;

    /// Run the corrector phase asynchronously.
    fn launch_corrector(&self, task: CorrectorTask) -> Deferred<CorrectorOutcome>;

    /// Sum of `value` over all subdomains.
    fn global_sum(&self, value: f64) -> Deferred<f64>;

    /// Tightest time step over all subdomains.
    fn global_min(&self, step: TimeStep) -> Deferred<TimeStep>;
}

/// One round of an all-reduce: a slot per participant plus the waiters.
struct Round<T> {
    values: Vec<Option<T>>,
    waiters: Vec<Sender<T>>,
}

/// Rendezvous reduction shared by a fixed set of participants.
///
/// Each participant contributes once per round. When the last contribution of
/// a round arrives the values are combined in rank order and the result is
/// sent to every participant of that round.
pub struct AllReduce<T> {
    participants: usize,
    combine: fn(T, T) -> T,
    rounds: Mutex<HashMap<u64, Round<T>>>,
}

impl<T: Clone + Send> AllReduce<T> {
    pub fn new(participants: usize, combine: fn(T, T) -> T) -> Self {
        assert!(participants > 0, "an all-reduce needs at least one participant");
        Self {
            participants,
            combine,
            rounds: Mutex::new(HashMap::new()),
        }
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Contribute `value` from `rank` to `round`.
    pub fn contribute(&self, round: u64, rank: usize, value: T) -> Deferred<T> {
        let (tx, deferred) = Deferred::channel();
        let mut rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = rounds.entry(round).or_insert_with(|| Round {
            values: (0..self.participants).map(|_| None).collect(),
            waiters: Vec::with_capacity(self.participants),
        });
        assert!(
            entry.values[rank].is_none(),
            "rank {rank} contributed twice to round {round}"
        );
        entry.values[rank] = Some(value);
        entry.waiters.push(tx);
        if entry.waiters.len() < self.participants {
            return deferred;
        }

        if let Some(done) = rounds.remove(&round) {
            let result = done.values.into_iter().flatten().reduce(self.combine);
            if let Some(result) = result {
                for waiter in done.waiters {
                    // a participant that stopped waiting is not an error for the others
                    let _ = waiter.send(result.clone());
                }
            }
        }
        deferred
    }
}

/// Substrate for subdomains that share one process.
pub struct LocalSubstrate {
    rank: usize,
    sums: Arc<AllReduce<f64>>,
    mins: Arc<AllReduce<TimeStep>>,
    sum_round: AtomicU64,
    min_round: AtomicU64,
}

impl LocalSubstrate {
    /// Substrate of a run with a single subdomain.
    pub fn single() -> Self {
        Self::member(
            0,
            Arc::new(AllReduce::new(1, add)),
            Arc::new(AllReduce::new(1, TimeStep::tightest)),
        )
    }

    /// One connected substrate per subdomain, indexed by rank.
    pub fn group(num_subdomains: usize) -> Vec<Self> {
        let sums = Arc::new(AllReduce::new(num_subdomains, add));
        let mins = Arc::new(AllReduce::new(num_subdomains, TimeStep::tightest));
        (0..num_subdomains)
            .map(|rank| Self::member(rank, Arc::clone(&sums), Arc::clone(&mins)))
            .collect()
    }

    fn member(rank: usize, sums: Arc<AllReduce<f64>>, mins: Arc<AllReduce<TimeStep>>) -> Self {
        Self {
            rank,
            sums,
            mins,
            sum_round: AtomicU64::new(0),
            min_round: AtomicU64::new(0),
        }
    }
}

fn add(a: f64, b: f64) -> f64 {
    a + b
}

impl Substrate for LocalSubstrate {
    fn subdomain(&self) -> usize {
        self.rank
    }

    fn num_subdomains(&self) -> usize {
        self.sums.participants()
    }

    fn launch_corrector(&self, task: CorrectorTask) -> Deferred<CorrectorOutcome> {
        // a worker blocking on a task queued to its own pool can starve it
        if rayon::current_thread_index().is_some() {
            return Deferred::ready(task.run());
        }
        let (tx, deferred) = Deferred::channel();
        rayon::spawn(move || {
            let _ = tx.send(task.run());
        });
        deferred
    }

    fn global_sum(&self, value: f64) -> Deferred<f64> {
        let round = self.sum_round.fetch_add(1, Ordering::Relaxed);
        self.sums.contribute(round, self.rank, value)
    }

    fn global_min(&self, step: TimeStep) -> Deferred<TimeStep> {
        let round = self.min_round.fetch_add(1, Ordering::Relaxed);
        self.mins.contribute(round, self.rank, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::DtLimit;
    use crate::mesh::ZoneId;

    #[test]
    fn test_deferred_ready_and_pending() {
        assert_eq!(Deferred::ready(3).wait().unwrap(), 3);

        let (tx, deferred) = Deferred::channel();
        let producer = std::thread::spawn(move || tx.send("done").unwrap());
        assert_eq!(deferred.wait().unwrap(), "done");
        producer.join().unwrap();
    }

    #[test]
    fn test_deferred_reports_dropped_producer() {
        let (tx, deferred) = Deferred::<u8>::channel();
        drop(tx);
        assert!(matches!(deferred.wait(), Err(TaskError::Disconnected)));
    }

    #[test]
    fn test_single_substrate_reduces_to_own_value() {
        let substrate = LocalSubstrate::single();
        assert_eq!(substrate.num_subdomains(), 1);
        assert_eq!(substrate.global_sum(2.5).wait().unwrap(), 2.5);
        let step = TimeStep::new(0.1, DtLimit::Courant(Some(ZoneId::new(4))), 0);
        assert_eq!(substrate.global_min(step).wait().unwrap(), step);
    }

    #[test]
    fn test_group_reductions_across_threads() {
        let group = LocalSubstrate::group(4);
        let results: Vec<(f64, f64, TimeStep)> = std::thread::scope(|scope| {
            let handles: Vec<_> = group
                .iter()
                .map(|sub| {
                    scope.spawn(move || {
                        let rank = sub.subdomain();
                        let first = sub.global_sum(rank as f64).wait().unwrap();
                        let second = sub.global_sum(1.0).wait().unwrap();
                        let step = TimeStep::new(
                            if rank == 2 { 0.01 } else { 0.5 },
                            DtLimit::VolumeChange(Some(ZoneId::new(rank))),
                            rank,
                        );
                        let min = sub.global_min(step).wait().unwrap();
                        (first, second, min)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (first, second, min) in results {
            assert_eq!(first, 6.0);
            assert_eq!(second, 4.0);
            assert_eq!(min.subdomain, 2);
            assert_eq!(min.dt, 0.01);
        }
    }

    #[test]
    #[should_panic(expected = "contributed twice")]
    fn test_double_contribution_panics() {
        let reduce = AllReduce::new(2, add);
        let _first = reduce.contribute(0, 1, 1.0);
        let _second = reduce.contribute(0, 1, 1.0);
    }
}
