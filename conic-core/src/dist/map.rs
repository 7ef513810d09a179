//! Block-distributed integer map.

use super::RowPartition;
use crate::comm::Comm;
use crate::error::{Result, SolverError};

/// A map `i -> map[i]` over `0..height` whose images are stored with the same
/// block partition as a [`DistMultiVec`](super::DistMultiVec).
#[derive(Debug, Clone)]
pub struct DistMap<C: Comm> {
    comm: C,
    part: RowPartition,
    local: Vec<usize>,
}

impl<C: Comm> DistMap<C> {
    /// Keep this rank's block of a replicated map.
    pub fn from_global(comm: C, global: &[usize]) -> Self {
        let part = RowPartition::new(global.len(), comm.size(), comm.rank());
        let first = part.first_local_row();
        let local = global[first..first + part.local_height()].to_vec();
        Self { comm, part, local }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn height(&self) -> usize {
        self.part.height
    }

    pub fn first_local_source(&self) -> usize {
        self.part.first_local_row()
    }

    pub fn local(&self) -> &[usize] {
        &self.local
    }

    /// Replace every entry `i` of `inds` by `map[i]`.
    ///
    /// Queries are bucketed by owner, answered with one all-to-all and
    /// returned with a second. Every rank must call this collectively.
    pub fn translate(&self, inds: &mut [usize]) -> Result<()> {
        let size = self.comm.size();
        let mut send: Vec<Vec<usize>> = vec![Vec::new(); size];
        for &i in inds.iter() {
            if i >= self.height() {
                return Err(SolverError::Logic(format!(
                    "map index {} out of range {}",
                    i,
                    self.height()
                )));
            }
            send[self.part.row_owner(i)].push(i);
        }
        let first = self.part.first_local_row();
        let replies: Vec<Vec<usize>> = self
            .comm
            .exchange(send)
            .into_iter()
            .map(|reqs| reqs.into_iter().map(|i| self.local[i - first]).collect())
            .collect();
        let answers = self.comm.exchange(replies);

        // Answers come back in the order the queries were bucketed.
        let mut cursors = vec![0usize; size];
        for i in inds.iter_mut() {
            let q = self.part.row_owner(*i);
            *i = answers[q][cursors[q]];
            cursors[q] += 1;
        }
        Ok(())
    }

    /// Inverse permutation, distributed the same way.
    pub fn invert(&self) -> Result<Self> {
        let size = self.comm.size();
        let mut send: Vec<Vec<(usize, usize)>> = vec![Vec::new(); size];
        let first = self.part.first_local_row();
        for (i_loc, &image) in self.local.iter().enumerate() {
            if image >= self.height() {
                return Err(SolverError::Logic(format!(
                    "map image {} out of range {}",
                    image,
                    self.height()
                )));
            }
            send[self.part.row_owner(image)].push((image, first + i_loc));
        }
        let mut local = vec![usize::MAX; self.part.local_height()];
        for (image, source) in self.comm.exchange(send).into_iter().flatten() {
            local[image - first] = source;
        }
        let missing = local.iter().filter(|&&s| s == usize::MAX).count();
        if self.comm.all_reduce_count(missing) > 0 {
            return Err(SolverError::Logic("map is not a permutation".into()));
        }
        Ok(Self {
            comm: self.comm.clone(),
            part: self.part,
            local,
        })
    }

    /// Replicate the full map on every rank.
    pub fn gather(&self) -> Vec<usize> {
        self.comm
            .all_gather(self.local.clone())
            .into_iter()
            .flatten()
            .collect()
    }
}
