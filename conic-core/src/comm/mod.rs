//! Process communication layer.
//!
//! Distributed containers talk to each other through the [`Comm`] trait. It is
//! a message-passing abstraction with blocking collective semantics. All ranks
//! of a communicator must enter every collective in the same order, or the
//! program deadlocks.
//!
//! Two implementations ship with the crate:
//!
//! - [`SelfComm`]: the single-process communicator. Every collective is a copy.
//! - [`ThreadComm`]: an in-process mesh where each rank is an OS thread. The
//!   tests use it to exercise multi-rank behaviour without MPI.
//!
//! Reductions combine contributions in rank order, so results are bitwise
//! reproducible for a fixed number of ranks.

mod thread;

pub use thread::ThreadComm;

/// Blocking collective communication.
pub trait Comm: Clone + Send {
    /// Rank of this process in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes.
    fn size(&self) -> usize;

    /// Personalized all-to-all: `send[q]` goes to rank `q`; the result holds at
    /// index `q` the buffer rank `q` sent here.
    fn exchange<T: Clone + Send + 'static>(&self, send: Vec<Vec<T>>) -> Vec<Vec<T>>;

    /// All-to-all of one count per destination.
    fn all_to_all_counts(&self, send_counts: &[usize]) -> Vec<usize> {
        let send = send_counts.iter().map(|&c| vec![c]).collect();
        self.exchange(send)
            .into_iter()
            .map(|v| v.first().copied().unwrap_or(0))
            .collect()
    }

    /// Variable-size all-to-all over packed buffers.
    ///
    /// `send` is laid out contiguously by destination with `send_counts[q]`
    /// items for rank `q`. Returns the packed receive buffer and the per-source
    /// receive counts.
    fn all_to_all_v<T: Clone + Send + 'static>(
        &self,
        send: &[T],
        send_counts: &[usize],
    ) -> (Vec<T>, Vec<usize>) {
        let (offs, _) = scan(send_counts);
        let buckets = send_counts
            .iter()
            .zip(offs.iter())
            .map(|(&count, &off)| send[off..off + count].to_vec())
            .collect();
        let recv = self.exchange(buckets);
        let recv_counts = recv.iter().map(Vec::len).collect();
        (recv.into_iter().flatten().collect(), recv_counts)
    }

    /// Every rank receives every rank's contribution, indexed by rank.
    fn all_gather<T: Clone + Send + 'static>(&self, value: Vec<T>) -> Vec<Vec<T>> {
        let send = (0..self.size()).map(|_| value.clone()).collect();
        self.exchange(send)
    }

    /// Sum over ranks, accumulated in rank order.
    fn all_reduce_sum(&self, value: f64) -> f64 {
        self.all_gather(vec![value]).into_iter().flatten().sum()
    }

    /// Maximum over ranks.
    fn all_reduce_max(&self, value: f64) -> f64 {
        self.all_gather(vec![value])
            .into_iter()
            .flatten()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Minimum over ranks.
    fn all_reduce_min(&self, value: f64) -> f64 {
        self.all_gather(vec![value])
            .into_iter()
            .flatten()
            .fold(f64::INFINITY, f64::min)
    }

    /// Integer sum over ranks.
    fn all_reduce_count(&self, value: usize) -> usize {
        self.all_gather(vec![value]).into_iter().flatten().sum()
    }
}

/// Exclusive prefix sum. Returns the offsets and the total.
pub fn scan(counts: &[usize]) -> (Vec<usize>, usize) {
    let mut offs = Vec::with_capacity(counts.len());
    let mut total = 0;
    for &c in counts {
        offs.push(total);
        total += c;
    }
    (offs, total)
}

/// Communicator containing only the calling process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Comm for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange<T: Clone + Send + 'static>(&self, send: Vec<Vec<T>>) -> Vec<Vec<T>> {
        send
    }
}
