//! Elimination-tree metadata.

/// A supernode owned entirely by this rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymmNodeInfo {
    /// Number of tree-ordered indices in the node.
    pub size: usize,
    /// First tree-ordered index of the node.
    pub off: usize,
    /// Indices of the child nodes in the same `local_nodes` vector.
    pub children: Vec<usize>,
}

/// A supernode shared by a team of ranks.
///
/// Entry `t` of the node (`0 <= t < size`) lives on the team member with
/// `team_rank == t % team_size`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistSymmNodeInfo {
    pub size: usize,
    pub off: usize,
    pub team_size: usize,
    pub team_rank: usize,
}

impl DistSymmNodeInfo {
    /// Number of node entries stored on this rank.
    pub fn local_size(&self) -> usize {
        if self.size > self.team_rank {
            (self.size - self.team_rank - 1) / self.team_size + 1
        } else {
            0
        }
    }

    /// Offsets (relative to `off`) of the entries stored on this rank.
    pub fn local_offsets(&self) -> impl Iterator<Item = usize> {
        (self.team_rank..self.size).step_by(self.team_size.max(1))
    }
}

/// The part of the elimination tree visible to one rank.
///
/// `local_nodes` is the rank's private subtree in postorder, so its last
/// entry is the local root. `dist_nodes` runs from the local root (index 0,
/// a one-member team duplicating that last local node) up to the global root.
#[derive(Debug, Clone, Default)]
pub struct DistSymmInfo {
    pub local_nodes: Vec<SymmNodeInfo>,
    pub dist_nodes: Vec<DistSymmNodeInfo>,
}

impl DistSymmInfo {
    pub fn root(&self) -> Option<&DistSymmNodeInfo> {
        self.dist_nodes.last()
    }

    /// Total number of tree-ordered indices.
    pub fn num_indices(&self) -> usize {
        self.root().map_or(0, |r| r.off + r.size)
    }

    /// Number of indices this rank holds in nodal form.
    pub fn local_height(&self) -> usize {
        let local: usize = self.local_nodes.iter().map(|n| n.size).sum();
        let dist: usize = self.dist_nodes.iter().skip(1).map(|n| n.local_size()).sum();
        local + dist
    }

    /// Tree-ordered indices held by this rank, in traversal order: local
    /// nodes first, then the shared nodes above the local root.
    pub fn local_indices(&self) -> Vec<usize> {
        let mut inds = Vec::with_capacity(self.local_height());
        for node in &self.local_nodes {
            inds.extend(node.off..node.off + node.size);
        }
        for node in self.dist_nodes.iter().skip(1) {
            inds.extend(node.local_offsets().map(|t| node.off + t));
        }
        inds
    }
}
