use rand::Rng;
use tracing::{debug, trace};

use crate::generator::{Generator, RNG};
use crate::syntax::{NodeId, SyntaxKind, SyntaxTree};

/// Outcome of permuting the children of a single node
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Region {
    /// Fewer than two reorderable children
    Nothing,
    /// Every distinct ordering was visited; holds the variants emitted,
    /// nested ones included
    Permuted(usize),
    /// The callback asked to stop
    Cancelled,
}

/// Outcome of a whole-tree enumeration
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Enumeration {
    Exhausted(usize),
    Cancelled(usize),
}

impl Enumeration {
    pub fn emitted(self) -> usize {
        match self {
            Enumeration::Exhausted(n) | Enumeration::Cancelled(n) => n,
        }
    }
}

/// Rearrange `order` into the next lexicographically greater sequence
/// under `key`. Returns `false`, leaving `order` sorted ascending, once the
/// last arrangement has been passed. Equal keys are interchangeable, so a
/// run of ties contributes a single arrangement.
pub fn next_arrangement<K, F>(order: &mut [usize], key: F) -> bool
where
    K: Ord,
    F: Fn(usize) -> K,
{
    if order.len() < 2 {
        return false;
    }
    let mut i = order.len() - 1;
    while i > 0 && key(order[i - 1]) >= key(order[i]) {
        i -= 1;
    }
    if i == 0 {
        order.reverse();
        return false;
    }
    let pivot = i - 1;
    let mut j = order.len() - 1;
    while key(order[j]) <= key(order[pivot]) {
        j -= 1;
    }
    order.swap(pivot, j);
    order[i..].reverse();
    true
}

/// Rank each of `n` children left to right. A child keeps the running rank
/// with probability `p_sticky` and takes a fresh one otherwise, so ties
/// between neighbours cut down the number of distinct orderings.
pub fn assign_ranks<R: Rng + ?Sized>(rng: &mut R, n: usize, p_sticky: f64) -> Vec<usize> {
    let mut counter = 0;
    (0..n)
        .map(|_| {
            if !rng.random_bool(p_sticky) {
                counter += 1;
            }
            counter
        })
        .collect()
}

struct Cancelled;

struct Permuter<'g, F> {
    rng: &'g mut RNG,
    p_sticky: f64,
    callback: F,
    emitted: usize,
}

impl<F: FnMut(&SyntaxTree) -> bool> Permuter<'_, F> {
    fn emit(&mut self, tree: &SyntaxTree) -> Result<(), Cancelled> {
        self.emitted += 1;
        trace!(variant = self.emitted, "permutation emitted");
        if (self.callback)(tree) {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    fn visit(&mut self, tree: &mut SyntaxTree, id: NodeId) -> Result<(), Cancelled> {
        let kind = tree.kind(id);
        if kind.is_inert() {
            return Ok(());
        }
        if let Some(start) = kind.permutable_from() {
            if let Region::Permuted(n) = self.region(tree, id, start)? {
                if n > 0 {
                    return Ok(());
                }
            }
        }
        // Nothing was reordered here: look for permutable structure below
        let children: Vec<NodeId> = tree.children(id).iter().flatten().copied().collect();
        for child in children {
            self.visit(tree, child)?;
        }
        Ok(())
    }

    /// End of the reorderable range. An unconditional `else` must stay last.
    fn region_end(tree: &SyntaxTree, id: NodeId) -> usize {
        let children = tree.children(id);
        if tree.kind(id) == SyntaxKind::IfGroup {
            if let Some(Some(last)) = children.last() {
                if tree.children(*last).first() == Some(&None) {
                    return children.len() - 1;
                }
            }
        }
        children.len()
    }

    fn region(
        &mut self,
        tree: &mut SyntaxTree,
        id: NodeId,
        start: usize,
    ) -> Result<Region, Cancelled> {
        let end = Self::region_end(tree, id);
        if end < start + 2 {
            return Ok(Region::Nothing);
        }

        let slots: Vec<Option<NodeId>> = tree.children(id)[start..end].to_vec();
        let ranks = assign_ranks(&mut *self.rng, slots.len(), self.p_sticky);
        let mut order: Vec<usize> = (0..slots.len()).collect();
        let before = self.emitted;

        while next_arrangement(&mut order, |i| ranks[i]) {
            place(tree, id, start, &slots, &order);
            self.emit(tree)?;
            for slot in start..end {
                if let Some(child) = tree.children(id)[slot] {
                    self.visit(tree, child)?;
                }
            }
        }
        // The final step wrapped `order` back to its first arrangement
        place(tree, id, start, &slots, &order);
        Ok(Region::Permuted(self.emitted - before))
    }
}

fn place(
    tree: &mut SyntaxTree,
    id: NodeId,
    start: usize,
    slots: &[Option<NodeId>],
    order: &[usize],
) {
    let children = tree.children_mut(id);
    for (k, &i) in order.iter().enumerate() {
        children[start + k] = slots[i];
    }
}

impl Generator {
    /// Walk the tree rooted at `root`, calling `callback` once per distinct
    /// reordering of a permutable region. The tree is rearranged in place
    /// before each call; returning `true` stops the whole walk.
    pub fn enumerate<F>(&mut self, tree: &mut SyntaxTree, root: NodeId, callback: F) -> Enumeration
    where
        F: FnMut(&SyntaxTree) -> bool,
    {
        let mut p = Permuter {
            p_sticky: self.config.p_sticky_rank,
            rng: &mut self.rng,
            callback,
            emitted: 0,
        };
        let result = match p.visit(tree, root) {
            Ok(()) => Enumeration::Exhausted(p.emitted),
            Err(Cancelled) => Enumeration::Cancelled(p.emitted),
        };
        debug!(?result, "enumeration finished");
        result
    }

    /// Permute the children of `id` from slot `start` on, recursing into
    /// each reordered child after every new arrangement.
    pub fn permute_region<F>(
        &mut self,
        tree: &mut SyntaxTree,
        id: NodeId,
        start: usize,
        callback: F,
    ) -> Region
    where
        F: FnMut(&SyntaxTree) -> bool,
    {
        let mut p = Permuter {
            p_sticky: self.config.p_sticky_rank,
            rng: &mut self.rng,
            callback,
            emitted: 0,
        };
        match p.region(tree, id, start) {
            Ok(region) => region,
            Err(Cancelled) => Region::Cancelled,
        }
    }
}
