//! A reusable rendezvous point for a fixed number of threads.
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct BarrierState {
    /// Number of threads that must call `wait` before any of them is released.
    participants: usize,
    /// Arrivals counted into the current generation.
    arrived: usize,
    /// Threads that have arrived and have not yet left `wait`.
    waiting: usize,
    /// Bumped every time a generation is released.
    generation: u64,
    /// Set between the last arrival and the moment the last waiter leaves.
    releasing: bool,
}

/// Barrier that can be reconfigured and reused for any number of phases.
///
/// Unlike [`std::sync::Barrier`] the participant count can be changed with
/// [`ReusableBarrier::init`] between phases, so one instance serves every
/// thread-count tier of a sweep.
///
/// A generation is released only when the N-th thread arrives, and the
/// arrival counter is reset only after every released thread has left
/// `wait`. Threads that arrive for the next phase while the previous one is
/// still draining are held back until the drain completes, so a late waker
/// can never be counted into the wrong generation.
#[derive(Debug)]
pub struct ReusableBarrier {
    state: Mutex<BarrierState>,
    cv: Condvar,
}

impl ReusableBarrier {
    /// Creates a barrier for `participants` threads.
    ///
    /// # Panics
    /// Panics if `participants` is zero.
    pub fn new(participants: usize) -> Self {
        let barrier = Self {
            state: Mutex::new(BarrierState::default()),
            cv: Condvar::new(),
        };
        barrier.init(participants);
        barrier
    }

    /// Reconfigures the participant count and resets all counters.
    ///
    /// Must not be called while any thread is blocked in [`Self::wait`].
    ///
    /// # Panics
    /// Panics if `participants` is zero.
    pub fn init(&self, participants: usize) {
        assert!(participants > 0, "barrier needs at least one participant");
        let mut state = self.lock();
        state.participants = participants;
        state.arrived = 0;
        state.waiting = 0;
        state.releasing = false;
    }

    /// Number of threads a generation waits for.
    pub fn participants(&self) -> usize {
        self.lock().participants
    }

    /// Blocks until all participants of the current generation have arrived.
    ///
    /// Returns `true` for exactly one thread per generation: the one whose
    /// arrival released the others.
    pub fn wait(&self) -> bool {
        let state = self.lock();
        let mut state = self
            .cv
            .wait_while(state, |s| s.releasing)
            .unwrap_or_else(PoisonError::into_inner);

        let generation = state.generation;
        state.arrived += 1;
        state.waiting += 1;

        let is_leader = state.arrived >= state.participants;
        if is_leader {
            state.releasing = true;
            state.generation = state.generation.wrapping_add(1);
            self.cv.notify_all();
        } else {
            state = self
                .cv
                .wait_while(state, |s| s.generation == generation)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.waiting -= 1;
        if state.waiting == 0 {
            // last one out opens the barrier for the next generation
            state.arrived = 0;
            state.releasing = false;
            self.cv.notify_all();
        }
        is_leader
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        // counters are updated atomically under the lock, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn single_participant_never_blocks() {
        let barrier = ReusableBarrier::new(1);
        for _ in 0..100 {
            assert!(barrier.wait());
        }
    }

    #[test]
    fn nobody_leaves_before_last_arrival() {
        for n in 1..=8 {
            let barrier = ReusableBarrier::new(n);
            let arrived = AtomicUsize::new(0);
            let leaders = AtomicUsize::new(0);

            std::thread::scope(|s| {
                for _ in 0..n {
                    s.spawn(|| {
                        arrived.fetch_add(1, Ordering::SeqCst);
                        if barrier.wait() {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                        assert_eq!(arrived.load(Ordering::SeqCst), n);
                    });
                }
            });
            assert_eq!(leaders.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn reuse_across_many_rounds() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 1000;

        let barrier = ReusableBarrier::new(THREADS);
        // arrivals per round; a thread counted into the wrong generation breaks the equality
        let per_round: Vec<AtomicUsize> = (0..ROUNDS).map(|_| AtomicUsize::new(0)).collect();
        let leaders = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for round in 0..ROUNDS {
                        per_round[round].fetch_add(1, Ordering::SeqCst);
                        if barrier.wait() {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                        assert_eq!(per_round[round].load(Ordering::SeqCst), THREADS);
                    }
                });
            }
        });

        assert_eq!(leaders.load(Ordering::SeqCst), ROUNDS);
        assert!(per_round
            .iter()
            .all(|x| x.load(Ordering::SeqCst) == THREADS));
    }

    #[test]
    fn init_changes_participants_between_phases() {
        let barrier = ReusableBarrier::new(2);
        for n in [2, 3, 1, 5] {
            barrier.init(n);
            assert_eq!(barrier.participants(), n);
            let leaders = AtomicUsize::new(0);
            std::thread::scope(|s| {
                for _ in 0..n {
                    s.spawn(|| {
                        for _ in 0..50 {
                            if barrier.wait() {
                                leaders.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    });
                }
            });
            assert_eq!(leaders.load(Ordering::SeqCst), 50);
        }
    }

    #[test]
    #[should_panic(expected = "at least one participant")]
    fn zero_participants_is_rejected() {
        ReusableBarrier::new(0);
    }
}
