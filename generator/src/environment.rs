use rand::Rng;

use crate::syntax::NodeId;

const PICK_RETRIES: usize = 10;

#[derive(Default, Debug, Clone)]
struct Scope {
    decoys: Vec<NodeId>,
}

/// Decoy variables visible to the obfuscator, grouped by scope. Entries are
/// identifier nodes owned by their declarations; they are only read, never
/// re-parented.
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Register a decoy identifier in the innermost scope
    pub fn bind(&mut self, identifier: NodeId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.decoys.push(identifier);
        }
    }

    /// Pick a random decoy. A random scope is drawn until a non-empty one
    /// turns up; after too many empty draws the search gives up.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeId> {
        if self.scopes.is_empty() {
            return None;
        }
        let mut retries = 0;
        loop {
            let scope = &self.scopes[rng.random_range(0..self.scopes.len())];
            if !scope.decoys.is_empty() {
                return Some(scope.decoys[rng.random_range(0..scope.decoys.len())]);
            }
            if retries == PICK_RETRIES {
                return None;
            }
            retries += 1;
        }
    }

    /// Open a scope for decoys declared inside a nested block
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::syntax::{SyntaxKind, SyntaxTree};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn empty_environment_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let env = Environment::new();
        assert_eq!(env.pick(&mut rng), None);
    }

    #[test]
    fn pick_only_returns_bound_decoys() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut t = SyntaxTree::new();
        let a = t.leaf(SyntaxKind::Identifier, "abc");
        let b = t.leaf(SyntaxKind::Identifier, "xyz");
        let mut env = Environment::new();
        env.bind(a);
        let mut inner = env.clone();
        inner.push_scope();
        inner.bind(b);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(inner.pick(&mut rng).unwrap());
            assert_eq!(env.pick(&mut rng), Some(a));
        }
        assert_eq!(seen, HashSet::from([a, b]));
    }

    #[test]
    fn empty_inner_scopes_are_skipped() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut t = SyntaxTree::new();
        let a = t.leaf(SyntaxKind::Identifier, "abc");
        let mut env = Environment::new();
        env.bind(a);
        env.push_scope();
        let mut found = 0;
        for _ in 0..50 {
            if let Some(picked) = env.pick(&mut rng) {
                assert_eq!(picked, a);
                found += 1;
            }
        }
        assert!(found >= 45, "{}", found);
    }
}
