//! Control-flow reconstruction from block links
//!
//! Builds a forward-reachability table once per function and derives the
//! uniform blocks (blocks every lane passes through together, outside of any
//! loop) and the loop blocks (blocks that can reach themselves).

use std::collections::VecDeque;

/// Control flow of one function
#[derive(Debug, Clone)]
pub struct ControlFlow {
    successors: Vec<Vec<u32>>,
    /// `reachable[from][to]`: `to` can be reached from `from` through one or
    /// more links
    reachable: Vec<Vec<bool>>,
    uniform_blocks: Vec<u32>,
    loop_blocks: Vec<u32>,
}

impl ControlFlow {
    /// Build from `(from, to)` links over `block_count` blocks
    ///
    /// Block 0 is the entry. Blocks with no outgoing link exit the function.
    pub fn new(block_count: usize, links: &[(u32, u32)]) -> Self {
        let count = links
            .iter()
            .map(|&(from, to)| from.max(to) as usize + 1)
            .max()
            .unwrap_or(0)
            .max(block_count);

        let mut successors = vec![Vec::new(); count];
        for &(from, to) in links {
            if !successors[from as usize].contains(&to) {
                successors[from as usize].push(to);
            }
        }

        let reachable = (0..count).map(|b| reachable_from(&successors, b)).collect::<Vec<_>>();

        let loop_blocks: Vec<u32> =
            (0..count).filter(|&b| reachable[b][b]).map(|b| b as u32).collect();

        let uniform_blocks = if count == 0 {
            Vec::new()
        } else {
            exit_dominators(&successors, &reachable)
                .into_iter()
                .filter(|b| !loop_blocks.contains(b))
                .collect()
        };

        ControlFlow { successors, reachable, uniform_blocks, loop_blocks }
    }

    pub fn block_count(&self) -> usize {
        self.successors.len()
    }

    pub fn successors(&self, block: u32) -> &[u32] {
        self.successors.get(block as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Uniform blocks in ascending order
    pub fn uniform_blocks(&self) -> &[u32] {
        &self.uniform_blocks
    }

    /// Loop blocks in ascending order
    pub fn loop_blocks(&self) -> &[u32] {
        &self.loop_blocks
    }

    pub fn is_uniform(&self, block: u32) -> bool {
        self.uniform_blocks.contains(&block)
    }

    pub fn is_loop(&self, block: u32) -> bool {
        self.loop_blocks.contains(&block)
    }

    /// Whether `to` can be reached from `from` by following at least one link
    pub fn is_forward_connection(&self, from: u32, to: u32) -> bool {
        self.reachable
            .get(from as usize)
            .and_then(|row| row.get(to as usize))
            .copied()
            .unwrap_or(false)
    }

    /// Closest uniform block reachable from `from`, or `from` when none is
    ///
    /// Ties at the same distance go to the lowest block index.
    pub fn next_uniform_block(&self, from: u32) -> u32 {
        let count = self.block_count();
        if from as usize >= count {
            return from;
        }
        let mut visited = vec![false; count];
        let mut level: Vec<u32> = self.successors(from).to_vec();
        while !level.is_empty() {
            if let Some(best) = level.iter().copied().filter(|b| self.is_uniform(*b)).min() {
                return best;
            }
            let mut next = Vec::new();
            for b in level {
                if std::mem::replace(&mut visited[b as usize], true) {
                    continue;
                }
                for &s in self.successors(b) {
                    if !visited[s as usize] && !next.contains(&s) {
                        next.push(s);
                    }
                }
            }
            level = next;
        }
        from
    }
}

fn reachable_from(successors: &[Vec<u32>], start: usize) -> Vec<bool> {
    let mut seen = vec![false; successors.len()];
    let mut queue: VecDeque<u32> = successors[start].iter().copied().collect();
    while let Some(b) = queue.pop_front() {
        if std::mem::replace(&mut seen[b as usize], true) {
            continue;
        }
        queue.extend(successors[b as usize].iter().copied());
    }
    seen
}

/// Blocks on every path from the entry to any function exit
///
/// Computed as the dominators of a virtual exit node that every exiting block
/// links to. When no exit is reachable only the entry qualifies.
fn exit_dominators(successors: &[Vec<u32>], reachable: &[Vec<bool>]) -> Vec<u32> {
    let count = successors.len();
    let exit = count;
    let in_graph = |b: usize| b == 0 || reachable[0][b];

    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); count + 1];
    for (from, succ) in successors.iter().enumerate() {
        if !in_graph(from) {
            continue;
        }
        if succ.is_empty() {
            preds[exit].push(from);
        }
        for &to in succ {
            preds[to as usize].push(from);
        }
    }
    if preds[exit].is_empty() {
        return vec![0];
    }

    // dom[n][d]: d dominates n
    let nodes: Vec<usize> = (0..count).filter(|&b| in_graph(b)).chain(Some(exit)).collect();
    let mut dom = vec![vec![true; count + 1]; count + 1];
    dom[0] = vec![false; count + 1];
    dom[0][0] = true;

    let mut changed = true;
    while changed {
        changed = false;
        for &n in nodes.iter().skip(1) {
            let mut new = vec![true; count + 1];
            for &p in &preds[n] {
                for (d, slot) in new.iter_mut().enumerate() {
                    *slot &= dom[p][d];
                }
            }
            new[n] = true;
            if new != dom[n] {
                dom[n] = new;
                changed = true;
            }
        }
    }

    (0..count).filter(|&b| dom[exit][b]).map(|b| b as u32).collect()
}
