//! Nested dissection ordering.
//!
//! Recursive level-set bisection on a replicated graph. Every rank runs the
//! same deterministic algorithm, so all ranks agree on the tree without
//! communicating. Process teams are halved at each of the top levels until a
//! team holds one rank; below that the rank keeps bisecting its own subgraph
//! until pieces fall under the cutoff.

use super::info::{DistSymmInfo, DistSymmNodeInfo, SymmNodeInfo};
use crate::comm::Comm;
use crate::dist::DistMap;
use crate::error::{Result, SolverError};
use std::collections::VecDeque;
use std::ops::Range;

/// Nested dissection controls.
#[derive(Debug, Clone)]
pub struct NestedDissectionCtrl {
    /// Subgraphs owned by a single rank stop splitting at this many vertices.
    pub cutoff: usize,
}

impl Default for NestedDissectionCtrl {
    fn default() -> Self {
        Self { cutoff: 64 }
    }
}

/// Ordering and tree produced by nested dissection.
#[derive(Debug, Clone)]
pub struct DistNodalTree<C: Comm> {
    /// Original index to tree-ordered index.
    pub map: DistMap<C>,
    /// Tree-ordered index to original index.
    pub inv_map: DistMap<C>,
    pub info: DistSymmInfo,
}

#[derive(Debug)]
struct TreeNode {
    off: usize,
    size: usize,
    team: Range<usize>,
    children: Vec<usize>,
}

struct Dissector<'a> {
    adj: &'a [Vec<usize>],
    cutoff: usize,
    member: Vec<usize>,
    visited: Vec<usize>,
    stamp: usize,
    perm: Vec<usize>,
    nodes: Vec<TreeNode>,
}

impl<'a> Dissector<'a> {
    fn new(adj: &'a [Vec<usize>], cutoff: usize) -> Self {
        let n = adj.len();
        Self {
            adj,
            cutoff: cutoff.max(1),
            member: vec![0; n],
            visited: vec![0; n],
            stamp: 0,
            perm: Vec::with_capacity(n),
            nodes: Vec::new(),
        }
    }

    fn next_stamp(&mut self) -> usize {
        self.stamp += 1;
        self.stamp
    }

    /// Level structure of the component containing `start`, restricted to
    /// vertices carrying the `set` stamp.
    fn level_sets(&mut self, start: usize, set: usize) -> (Vec<Vec<usize>>, usize) {
        let seen = self.next_stamp();
        self.visited[start] = seen;
        let mut levels = vec![vec![start]];
        let mut queue = VecDeque::from(vec![(start, 0usize)]);
        while let Some((v, level)) = queue.pop_front() {
            for &w in &self.adj[v] {
                if self.member[w] == set && self.visited[w] != seen {
                    self.visited[w] = seen;
                    if levels.len() == level + 1 {
                        levels.push(Vec::new());
                    }
                    levels[level + 1].push(w);
                    queue.push_back((w, level + 1));
                }
            }
        }
        (levels, seen)
    }

    /// Split `verts` into `(left, right, separator)` with no edges between the
    /// two halves. Returns `None` when no useful split exists.
    fn bisect(&mut self, verts: &[usize]) -> Option<(Vec<usize>, Vec<usize>, Vec<usize>)> {
        if verts.len() < 2 {
            return None;
        }
        let set = self.next_stamp();
        for &v in verts {
            self.member[v] = set;
        }
        let degree = |v: usize| self.adj[v].iter().filter(|&&w| self.member[w] == set).count();
        let start = verts
            .iter()
            .copied()
            .min_by_key(|&v| (degree(v), v))
            .unwrap_or(verts[0]);

        // One sweep towards a pseudo-peripheral vertex.
        let (sweep, _) = self.level_sets(start, set);
        let far = sweep
            .last()
            .and_then(|l| l.first().copied())
            .unwrap_or(start);
        let (levels, reached) = self.level_sets(far, set);
        let rest: Vec<usize> = verts
            .iter()
            .copied()
            .filter(|&v| self.visited[v] != reached)
            .collect();

        let (mut left, mut right, sep) = if levels.len() >= 3 {
            let total: usize = levels.iter().map(Vec::len).sum();
            let mut cumulative = 0;
            let mut cut = levels.len() - 2;
            for (l, level) in levels.iter().enumerate() {
                cumulative += level.len();
                if 2 * cumulative >= total {
                    cut = l;
                    break;
                }
            }
            let cut = cut.clamp(1, levels.len() - 2);
            (
                levels[..cut].concat(),
                levels[cut + 1..].concat(),
                levels[cut].clone(),
            )
        } else if !rest.is_empty() {
            (levels.concat(), Vec::new(), Vec::new())
        } else {
            return None;
        };

        if left.len() <= right.len() {
            left.extend(rest);
        } else {
            right.extend(rest);
        }
        left.sort_unstable();
        right.sort_unstable();
        Some((left, right, sep))
    }

    fn dissect(&mut self, verts: Vec<usize>, team: Range<usize>) -> usize {
        let p = team.len();
        let split = if p > 1 {
            Some(
                self.bisect(&verts)
                    .unwrap_or_else(|| (Vec::new(), Vec::new(), verts.clone())),
            )
        } else if verts.len() > self.cutoff {
            self.bisect(&verts)
        } else {
            None
        };

        let children = match split {
            Some((left, right, sep)) => {
                let mid = team.start + p / 2;
                let (left_team, right_team) = if p > 1 {
                    (team.start..mid, mid..team.end)
                } else {
                    (team.clone(), team.clone())
                };
                let c0 = self.dissect(left, left_team);
                let c1 = self.dissect(right, right_team);
                Some((vec![c0, c1], sep))
            }
            None => None,
        };

        let (children, own) = children.unwrap_or((Vec::new(), verts));
        let off = self.perm.len();
        self.perm.extend_from_slice(&own);
        self.nodes.push(TreeNode {
            off,
            size: own.len(),
            team,
            children,
        });
        self.nodes.len() - 1
    }
}

/// Order the rows of a symmetric graph by nested dissection over the ranks of
/// `comm` and describe the tree from this rank's point of view.
///
/// `adj` must be the same replicated adjacency structure on every rank.
pub fn nested_dissection<C: Comm>(
    adj: &[Vec<usize>],
    comm: &C,
    ctrl: &NestedDissectionCtrl,
) -> Result<DistNodalTree<C>> {
    let n = adj.len();
    let mut dissector = Dissector::new(adj, ctrl.cutoff);
    let root = dissector.dissect((0..n).collect(), 0..comm.size());
    let Dissector { perm, nodes, .. } = dissector;

    if perm.len() != n {
        return Err(SolverError::Logic(format!(
            "dissection numbered {} of {} vertices",
            perm.len(),
            n
        )));
    }

    let rank = comm.rank();
    let mut dist_nodes = Vec::new();
    let mut cur = root;
    loop {
        let node = &nodes[cur];
        dist_nodes.push(DistSymmNodeInfo {
            size: node.size,
            off: node.off,
            team_size: node.team.len(),
            team_rank: rank - node.team.start,
        });
        if node.team.len() == 1 {
            break;
        }
        cur = node
            .children
            .iter()
            .copied()
            .find(|&c| nodes[c].team.contains(&rank))
            .ok_or_else(|| SolverError::Logic(format!("rank {} lost in the tree", rank)))?;
    }
    dist_nodes.reverse();

    let mut local_nodes = Vec::new();
    collect_local(&nodes, cur, &mut local_nodes);

    let mut map = vec![0; n];
    for (new, &old) in perm.iter().enumerate() {
        map[old] = new;
    }
    Ok(DistNodalTree {
        map: DistMap::from_global(comm.clone(), &map),
        inv_map: DistMap::from_global(comm.clone(), &perm),
        info: DistSymmInfo {
            local_nodes,
            dist_nodes,
        },
    })
}

fn collect_local(nodes: &[TreeNode], id: usize, out: &mut Vec<SymmNodeInfo>) -> usize {
    let children = nodes[id]
        .children
        .iter()
        .map(|&c| collect_local(nodes, c, out))
        .collect();
    out.push(SymmNodeInfo {
        size: nodes[id].size,
        off: nodes[id].off,
        children,
    });
    out.len() - 1
}
