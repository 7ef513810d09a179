//! Multivectors laid out along an elimination tree.
//!
//! A [`DistNodalMultiVec`] stores one dense block per supernode visible to
//! this rank. Local nodes hold all of their rows. Shared nodes hold the rows
//! `team_rank, team_rank + team_size, ...` of the node. [`pull`] moves data
//! from the natural row distribution into this layout and [`push`] moves it
//! back.
//!
//! [`pull`]: DistNodalMultiVec::pull
//! [`push`]: DistNodalMultiVec::push

use super::info::DistSymmInfo;
use crate::comm::{scan, Comm};
use crate::dist::{DistMap, DistMultiVec};
use crate::error::{Result, SolverError};
use nalgebra::{DMatrix, Scalar};
use num_traits::Zero;

/// Nodal view of a `height × width` multivector.
#[derive(Debug, Clone)]
pub struct DistNodalMultiVec<T: Scalar> {
    height: usize,
    width: usize,
    /// One block per local node, `size × width`.
    pub local_nodes: Vec<DMatrix<T>>,
    /// One block per shared node, `local_size × width`. Entry 0 mirrors the
    /// local root and stays empty.
    pub dist_nodes: Vec<DMatrix<T>>,
}

impl<T> DistNodalMultiVec<T>
where
    T: Scalar + Zero + Send,
{
    /// Zero-filled nodal multivector shaped by `info`.
    pub fn new(info: &DistSymmInfo, width: usize) -> Self {
        let local_nodes = info
            .local_nodes
            .iter()
            .map(|node| DMatrix::zeros(node.size, width))
            .collect();
        let dist_nodes = info
            .dist_nodes
            .iter()
            .enumerate()
            .map(|(s, node)| {
                let rows = if s == 0 { 0 } else { node.local_size() };
                DMatrix::zeros(rows, width)
            })
            .collect();
        Self {
            height: info.num_indices(),
            width,
            local_nodes,
            dist_nodes,
        }
    }

    /// Gather the rows of `x` into nodal form.
    ///
    /// `inverse_map` sends tree-ordered indices back to the original row
    /// indices of `x`.
    pub fn pull<C: Comm>(
        inverse_map: &DistMap<C>,
        info: &DistSymmInfo,
        x: &DistMultiVec<T, C>,
    ) -> Result<Self> {
        let comm = x.comm();
        let comm_size = comm.size();
        let width = x.width();
        let mut nodal = Self::new(info, width);
        nodal.height = x.height();

        // Tree-ordered indices this rank needs, in traversal order.
        let mut mapped_inds = info.local_indices();
        let num_recv_inds = mapped_inds.len();
        inverse_map.translate(&mut mapped_inds)?;

        // Bucket the original indices by the rank owning them in `x`.
        let mut send_sizes = vec![0usize; comm_size];
        for &i in &mapped_inds {
            send_sizes[x.row_owner(i)] += 1;
        }
        let (send_offs, _) = scan(&send_sizes);
        let mut send_inds = vec![0usize; num_recv_inds];
        let mut cursors = send_offs.clone();
        for &i in &mapped_inds {
            let q = x.row_owner(i);
            send_inds[cursors[q]] = i;
            cursors[q] += 1;
        }

        // Owners answer each request with the `width` entries of the row.
        let (recv_inds, recv_sizes) = comm.all_to_all_v(&send_inds, &send_sizes);
        let first = x.first_local_row();
        let mut reply = Vec::with_capacity(recv_inds.len() * width);
        for &i in &recv_inds {
            let i_loc = i.checked_sub(first).filter(|&l| l < x.local_height()).ok_or_else(|| {
                SolverError::Logic(format!("row {} requested from a rank that does not own it", i))
            })?;
            for j in 0..width {
                reply.push(x.get_local(i_loc, j));
            }
        }
        let reply_sizes: Vec<usize> = recv_sizes.iter().map(|&c| c * width).collect();
        let (values, _) = comm.all_to_all_v(&reply, &reply_sizes);
        if values.len() != num_recv_inds * width {
            return Err(SolverError::Logic(format!(
                "received {} values but expected {}",
                values.len(),
                num_recv_inds * width
            )));
        }

        // Unpack in the same traversal order the requests were built in.
        let mut cursors = send_offs;
        let mut rows = Vec::with_capacity(num_recv_inds);
        for &i in &mapped_inds {
            let q = x.row_owner(i);
            rows.push(cursors[q]);
            cursors[q] += 1;
        }
        let mut k = 0;
        for block in nodal
            .local_nodes
            .iter_mut()
            .chain(nodal.dist_nodes.iter_mut().skip(1))
        {
            for t in 0..block.nrows() {
                let src = rows[k] * width;
                for j in 0..width {
                    block[(t, j)] = values[src + j].clone();
                }
                k += 1;
            }
        }
        if k != num_recv_inds {
            return Err(SolverError::Logic(format!(
                "unpacked {} rows but expected {}",
                k, num_recv_inds
            )));
        }
        Ok(nodal)
    }

    /// Scatter the nodal data back into the natural row distribution of `x`.
    ///
    /// `x` is resized to `root.off + root.size` rows and this multivector's
    /// width.
    pub fn push<C: Comm>(
        &self,
        inverse_map: &DistMap<C>,
        info: &DistSymmInfo,
        x: &mut DistMultiVec<T, C>,
    ) -> Result<()> {
        let root = info
            .root()
            .ok_or_else(|| SolverError::Logic("elimination tree has no root".into()))?;
        self.check_layout(info)?;
        let width = self.width;
        x.resize(root.size + root.off, width);
        let comm = x.comm().clone();
        let comm_size = comm.size();

        let mut mapped_inds = info.local_indices();
        let num_send_inds = mapped_inds.len();
        inverse_map.translate(&mut mapped_inds)?;

        let mut send_sizes = vec![0usize; comm_size];
        for &i in &mapped_inds {
            send_sizes[x.row_owner(i)] += 1;
        }
        let (send_offs, _) = scan(&send_sizes);
        let mut send_inds = vec![0usize; num_send_inds];
        let mut send_vals: Vec<T> = vec![T::zero(); num_send_inds * width];
        let mut cursors = send_offs;
        let mut k = 0;
        for block in self.local_nodes.iter().chain(self.dist_nodes.iter().skip(1)) {
            for t in 0..block.nrows() {
                let i = mapped_inds[k];
                let q = x.row_owner(i);
                let dst = cursors[q];
                send_inds[dst] = i;
                for j in 0..width {
                    send_vals[dst * width + j] = block[(t, j)].clone();
                }
                cursors[q] += 1;
                k += 1;
            }
        }
        if k != num_send_inds {
            return Err(SolverError::Logic(format!(
                "packed {} rows but the tree holds {}",
                k, num_send_inds
            )));
        }

        let (recv_inds, _) = comm.all_to_all_v(&send_inds, &send_sizes);
        let val_sizes: Vec<usize> = send_sizes.iter().map(|&c| c * width).collect();
        let (recv_vals, _) = comm.all_to_all_v(&send_vals, &val_sizes);
        if recv_inds.len() != x.local_height() {
            return Err(SolverError::Logic(format!(
                "received {} rows for a local height of {}",
                recv_inds.len(),
                x.local_height()
            )));
        }

        let first = x.first_local_row();
        for (k, &i) in recv_inds.iter().enumerate() {
            for j in 0..width {
                x.set_local(i - first, j, recv_vals[k * width + j].clone());
            }
        }
        Ok(())
    }

    fn check_layout(&self, info: &DistSymmInfo) -> Result<()> {
        let (held, expected) = (self.local_height(), info.local_height());
        if held != expected {
            return Err(SolverError::Logic(format!(
                "nodal blocks hold {} rows but the tree assigns {} to this rank",
                held, expected
            )));
        }
        Ok(())
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows stored on this rank.
    pub fn local_height(&self) -> usize {
        let local: usize = self.local_nodes.iter().map(|b| b.nrows()).sum();
        let dist: usize = self.dist_nodes.iter().skip(1).map(|b| b.nrows()).sum();
        local + dist
    }

    /// Recompute the global height from the tree.
    pub fn update_height(&mut self, info: &DistSymmInfo) {
        self.height = info.num_indices();
    }

    /// Recompute the width from the stored blocks. The first local node is
    /// authoritative.
    pub fn update_width(&mut self) {
        self.width = self
            .local_nodes
            .first()
            .or_else(|| self.dist_nodes.first())
            .map_or(0, |b| b.ncols());
    }

    /// Replicate the whole multivector on every rank, rows in tree order.
    pub fn gather_tree_ordered<C: Comm>(&self, info: &DistSymmInfo, comm: &C) -> DMatrix<T> {
        let inds = info.local_indices();
        let mut packed = Vec::with_capacity(inds.len() * self.width);
        for block in self.local_nodes.iter().chain(self.dist_nodes.iter().skip(1)) {
            for t in 0..block.nrows() {
                for j in 0..self.width {
                    packed.push(block[(t, j)].clone());
                }
            }
        }
        let all_inds = comm.all_gather(inds);
        let all_vals = comm.all_gather(packed);
        let mut global = DMatrix::zeros(info.num_indices(), self.width);
        for (inds, vals) in all_inds.iter().zip(all_vals.iter()) {
            for (k, &i) in inds.iter().enumerate() {
                for j in 0..self.width {
                    global[(i, j)] = vals[k * self.width + j].clone();
                }
            }
        }
        global
    }

    /// Overwrite the locally stored rows from a replicated tree-ordered matrix.
    pub fn scatter_tree_ordered(&mut self, info: &DistSymmInfo, global: &DMatrix<T>) -> Result<()> {
        SolverError::check_dim("tree-ordered rows", info.num_indices(), global.nrows())?;
        SolverError::check_dim("tree-ordered columns", self.width, global.ncols())?;
        self.check_layout(info)?;
        let inds = info.local_indices();
        let mut k = 0;
        for block in self
            .local_nodes
            .iter_mut()
            .chain(self.dist_nodes.iter_mut().skip(1))
        {
            for t in 0..block.nrows() {
                for j in 0..block.ncols() {
                    block[(t, j)] = global[(inds[k], j)].clone();
                }
                k += 1;
            }
        }
        Ok(())
    }
}
