use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

use crate::environment::Environment;
use crate::generator::{Generator, ScalarType};
use crate::syntax::{NodeId, SyntaxKind, SyntaxTree};

/// One layer of noise wrapped around the goal
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Transform {
    /// Append an assignment to an existing decoy
    AssignDecoy,
    /// Append a declaration of a fresh, unused decoy
    DeclareDecoy,
    /// Always-true `if`, followed by always-false `else if` branches
    If,
    /// `switch` whose taken case holds the goal
    Switch,
    /// `for` loop with a constant trip count
    For,
    /// Counter-driven `while` loop
    While,
}

impl Generator {
    /// Wrap `goal` in randomly chosen transforms until the stop draw fires.
    /// The goal stays on the only reachable path; decoy branches and cases
    /// sit behind conditions that never hold.
    pub fn obfuscate(&mut self, tree: &mut SyntaxTree, goal: NodeId, env: &Environment) -> NodeId {
        let goal_kind = tree.kind(goal);
        assert!(
            matches!(goal_kind, SyntaxKind::Assign | SyntaxKind::Return),
            "goal must be an assignment or a return, got {:?}",
            goal_kind
        );

        let mut current = goal;
        let mut applied = Vec::new();
        while !self.rng.random_bool(self.config.p_stop) {
            let transform = self.transforms.pick(&mut self.rng);
            current = self.apply(tree, transform, current, goal, env);
            applied.push(transform);
        }
        debug!(?applied, "obfuscated {:?} goal", goal_kind);
        current
    }

    pub fn apply(
        &mut self,
        tree: &mut SyntaxTree,
        transform: Transform,
        current: NodeId,
        goal: NodeId,
        env: &Environment,
    ) -> NodeId {
        match transform {
            Transform::AssignDecoy => self.assign_decoy(tree, current, env),
            Transform::DeclareDecoy => self.declare_decoy(tree, current),
            Transform::If => self.wrap_if(tree, current, goal),
            Transform::Switch => self.wrap_switch(tree, current, goal, env),
            Transform::For => self.wrap_for(tree, current),
            Transform::While => self.wrap_while(tree, current),
        }
    }

    /// Block holding one fresh decoy whose obfuscated assignment is the goal.
    /// The decoy joins the pool in a scope of its own, visible only to the
    /// noise wrapped around that assignment.
    pub fn random_obfuscated_block(&mut self, tree: &mut SyntaxTree, env: &Environment) -> NodeId {
        let name = self.fresh_name();
        let initial = self.value_for(ScalarType::U32);
        let decl = self.declaration(tree, &name, Some(initial));
        let block = tree.node(SyntaxKind::Block, &[decl]);

        let mut inner = env.clone();
        inner.push_scope();
        inner.bind(tree.child(decl, 1));

        let target = tree.leaf(SyntaxKind::Identifier, &name);
        let value = self.value_for(ScalarType::U32);
        let value = self.literal(tree, value);
        let assign = tree.node(SyntaxKind::Assign, &[target, value]);
        let obfuscated = self.obfuscate(tree, assign, &inner);
        tree.add(block, obfuscated);
        block
    }

    pub(crate) fn declaration(
        &self,
        tree: &mut SyntaxTree,
        name: &str,
        init: Option<u32>,
    ) -> NodeId {
        let type_ = tree.leaf(SyntaxKind::Type, ScalarType::U32.name());
        let ident = tree.leaf(SyntaxKind::Identifier, name);
        let mut children = vec![type_, ident];
        if let Some(v) = init {
            children.push(self.literal(tree, v));
        }
        tree.node(SyntaxKind::Declaration, &children)
    }

    fn into_block(&self, tree: &mut SyntaxTree, current: NodeId) -> NodeId {
        if tree.kind(current) == SyntaxKind::Block {
            current
        } else {
            tree.node(SyntaxKind::Block, &[current])
        }
    }

    /// A statement with the goal's shape but a different literal, used in
    /// branches that never run. Returns `None` when no such statement fits.
    fn distractor(
        &mut self,
        tree: &mut SyntaxTree,
        goal: NodeId,
        allow_assign: bool,
    ) -> Option<NodeId> {
        match tree.kind(goal) {
            SyntaxKind::Return => {
                let value = self.value_for(ScalarType::U32);
                let value = self.literal(tree, value);
                Some(tree.node(SyntaxKind::Return, &[value]))
            }
            SyntaxKind::Assign if allow_assign => {
                let target = tree.duplicate(tree.child(goal, 0));
                let value = self.value_for(ScalarType::U32);
                let value = self.literal(tree, value);
                Some(tree.node(SyntaxKind::Assign, &[target, value]))
            }
            _ => None,
        }
    }

    fn assign_decoy(
        &mut self,
        tree: &mut SyntaxTree,
        current: NodeId,
        env: &Environment,
    ) -> NodeId {
        let block = self.into_block(tree, current);
        if let Some(decoy) = env.pick(&mut self.rng) {
            let target = tree.duplicate(decoy);
            let value = self.value_for(ScalarType::U32);
            let value = self.literal(tree, value);
            let assign = tree.node(SyntaxKind::Assign, &[target, value]);
            tree.add(block, assign);
        }
        block
    }

    fn declare_decoy(&mut self, tree: &mut SyntaxTree, current: NodeId) -> NodeId {
        let block = self.into_block(tree, current);
        let name = self.fresh_name();
        let decl = self.declaration(tree, &name, None);
        tree.add(block, decl);
        block
    }

    fn wrap_if(&mut self, tree: &mut SyntaxTree, current: NodeId, goal: NodeId) -> NodeId {
        let cond = self.always_true_or_false(tree, true);
        let branch = tree.node(SyntaxKind::If, &[cond, current]);
        let group = tree.node(SyntaxKind::IfGroup, &[branch]);
        while !self.rng.random_bool(self.config.p_branch_stop) {
            if let Some(body) = self.distractor(tree, goal, self.config.assign_else_branches) {
                let cond = self.always_true_or_false(tree, false);
                let branch = tree.node(SyntaxKind::If, &[cond, body]);
                tree.add(group, branch);
            }
        }
        group
    }

    fn wrap_switch(
        &mut self,
        tree: &mut SyntaxTree,
        current: NodeId,
        goal: NodeId,
        env: &Environment,
    ) -> NodeId {
        let block = tree.node(SyntaxKind::Block, &[]);

        // Either switch on a decoy whose value is unknown here, taking the
        // goal through `default`, or declare one with a known value.
        let pooled = if self.rng.random_bool(self.config.p_switch_on_decoy) {
            env.pick(&mut self.rng)
        } else {
            None
        };
        let (discriminant, assured) = match pooled {
            Some(decoy) => (tree.duplicate(decoy), None),
            None => {
                let name = self.fresh_name();
                let value = self.value_for(ScalarType::U32);
                let decl = self.declaration(tree, &name, Some(value));
                tree.add(block, decl);
                (tree.leaf(SyntaxKind::Identifier, &name), Some(value))
            }
        };

        let switch = tree.node(SyntaxKind::Switch, &[discriminant]);
        tree.add(block, switch);

        let label = assured.map(|v| self.literal(tree, v));
        let brk = tree.node(SyntaxKind::Break, &[]);
        let main_case = tree.create(SyntaxKind::Case, None, [label, Some(current), Some(brk)]);
        tree.add(switch, main_case);

        if let Some(assured) = assured {
            let mut labels = HashSet::from([assured]);
            while !self.rng.random_bool(self.config.p_case_stop) {
                let label_value = self.value_for(ScalarType::U32);
                if !labels.insert(label_value) {
                    continue;
                }
                let case = self.decoy_case(tree, label_value, goal, env);
                tree.add(switch, case);
            }
        }
        block
    }

    fn decoy_case(
        &mut self,
        tree: &mut SyntaxTree,
        label: u32,
        goal: NodeId,
        env: &Environment,
    ) -> NodeId {
        let label = self.literal(tree, label);
        let case = tree.node(SyntaxKind::Case, &[label]);
        if self.rng.random_bool(self.config.p_simple_decoy_case) {
            if let Some(stmt) = self.distractor(tree, goal, true) {
                tree.add(case, stmt);
            }
            if self.rng.random_bool(self.config.p_case_break) {
                let brk = tree.node(SyntaxKind::Break, &[]);
                tree.add(case, brk);
            }
        } else {
            let inner = self.random_obfuscated_block(tree, env);
            if self.rng.random_bool(self.config.p_case_break) {
                let brk = tree.node(SyntaxKind::Break, &[]);
                tree.add(inner, brk);
            }
            tree.add(case, inner);
        }
        if tree.children(case).len() == 1 {
            let nop = tree.node(SyntaxKind::Nop, &[]);
            tree.add(case, nop);
        }
        case
    }

    fn loop_condition(&mut self, tree: &mut SyntaxTree, counter: &str) -> NodeId {
        let trips = self.rng.random_range(self.config.min_trips..=self.config.max_trips);
        let counter = tree.leaf(SyntaxKind::Identifier, counter);
        let bound = tree.leaf(SyntaxKind::Literal, &trips.to_string());
        tree.binary("<", counter, bound)
    }

    fn wrap_for(&mut self, tree: &mut SyntaxTree, current: NodeId) -> NodeId {
        let name = self.fresh_name();
        let decl = self.declaration(tree, &name, None);
        let zero = tree.leaf(SyntaxKind::Literal, "0");
        let init = tree.node(SyntaxKind::Assign, &[decl, zero]);
        let cond = self.loop_condition(tree, &name);
        let step = tree.leaf(SyntaxKind::Exact, &format!("++{}", name));
        let body = tree.node(SyntaxKind::Block, &[current]);
        tree.node(SyntaxKind::For, &[init, cond, step, body])
    }

    fn wrap_while(&mut self, tree: &mut SyntaxTree, current: NodeId) -> NodeId {
        let name = self.fresh_name();
        let decl = self.declaration(tree, &name, Some(0));
        let cond = self.loop_condition(tree, &name);
        let previous = tree.node(SyntaxKind::Block, &[current]);
        let step = tree.leaf(SyntaxKind::Exact, &format!("++{};", name));
        let body = tree.node(SyntaxKind::Block, &[previous, step]);
        let while_ = tree.node(SyntaxKind::While, &[cond, body]);
        tree.node(SyntaxKind::Block, &[decl, while_])
    }
}
