//! Thread-backed communicator.

use super::Comm;
use std::any::Any;
use std::sync::{Arc, Barrier, Mutex};

type Slot = Option<Box<dyn Any + Send>>;

struct Mesh {
    size: usize,
    /// Mailbox `src * size + dst`.
    slots: Mutex<Vec<Slot>>,
    barrier: Barrier,
}

/// One rank of an in-process mesh of `size` ranks.
///
/// Every collective is two barrier phases: ranks deposit their outgoing
/// buffers, wait, collect their inbox and wait again before the mailbox can be
/// reused.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    mesh: Arc<Mesh>,
}

impl ThreadComm {
    /// Build the `size` endpoints of a fresh mesh.
    pub fn mesh(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let mesh = Arc::new(Mesh {
            size,
            slots: Mutex::new((0..size * size).map(|_| None).collect()),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                mesh: Arc::clone(&mesh),
            })
            .collect()
    }

    /// Run `f` on `size` ranks, one scoped thread each, and return the results
    /// in rank order. A panic on any rank is re-raised on the caller.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let comms = ThreadComm::mesh(size);
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        // A poisoned mailbox means another rank panicked mid-collective; the
        // payloads are still consistent because each slot is written whole.
        self.mesh
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.mesh.size)
            .finish()
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.mesh.size
    }

    /// # Panics
    ///
    /// Panics if ranks enter different collectives (payload types disagree)
    /// or `send` does not hold one buffer per rank.
    fn exchange<T: Clone + Send + 'static>(&self, send: Vec<Vec<T>>) -> Vec<Vec<T>> {
        let size = self.mesh.size;
        assert_eq!(send.len(), size, "exchange needs one buffer per rank");
        {
            let mut slots = self.lock_slots();
            for (dst, buf) in send.into_iter().enumerate() {
                slots[self.rank * size + dst] = Some(Box::new(buf));
            }
        }
        self.mesh.barrier.wait();
        let recv = {
            let mut slots = self.lock_slots();
            (0..size)
                .map(|src| {
                    let payload = slots[src * size + self.rank].take();
                    match payload.map(|b| b.downcast::<Vec<T>>()) {
                        Some(Ok(buf)) => *buf,
                        _ => panic!(
                            "rank {} received a mismatched payload from rank {}",
                            self.rank, src
                        ),
                    }
                })
                .collect()
        };
        self.mesh.barrier.wait();
        recv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_routes_by_destination() {
        let results = ThreadComm::run(3, |comm| {
            let send = (0..comm.size())
                .map(|dst| vec![10 * comm.rank() + dst])
                .collect();
            comm.exchange(send)
        });
        for (rank, recv) in results.iter().enumerate() {
            let expected: Vec<Vec<usize>> = (0..3).map(|src| vec![10 * src + rank]).collect();
            assert_eq!(recv, &expected);
        }
    }

    #[test]
    fn test_reductions_agree_on_all_ranks() {
        let sums = ThreadComm::run(4, |comm| comm.all_reduce_sum(comm.rank() as f64 + 0.5));
        assert!(sums.iter().all(|&s| s == 8.0));

        let maxes = ThreadComm::run(4, |comm| comm.all_reduce_max(-(comm.rank() as f64)));
        assert!(maxes.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_all_to_all_v_counts() {
        let results = ThreadComm::run(2, |comm| {
            // rank r sends r+1 copies of r to each peer
            let per = comm.rank() + 1;
            let send: Vec<usize> = (0..2 * per).map(|_| comm.rank()).collect();
            comm.all_to_all_v(&send, &[per, per])
        });
        for (recv, counts) in results {
            assert_eq!(counts, vec![1, 2]);
            assert_eq!(recv, vec![0, 1, 1]);
        }
    }

    #[test]
    fn test_consecutive_collectives_do_not_interfere() {
        let results = ThreadComm::run(3, |comm| {
            let a = comm.all_reduce_count(1);
            let b = comm.all_gather(vec![comm.rank() as u8]);
            (a, b)
        });
        for (a, b) in results {
            assert_eq!(a, 3);
            assert_eq!(b, vec![vec![0u8], vec![1], vec![2]]);
        }
    }
}
