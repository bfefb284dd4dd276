//! Assembly of a complete test program around one obfuscated goal.

use tracing::debug;

use crate::config::{GoalKind, ScriptConfig};
use crate::emit::Emit;
use crate::environment::Environment;
use crate::eval::{run_program, EvalError, Outcome};
use crate::generator::{Generator, ScalarType};
use crate::permute::Enumeration;
use crate::syntax::{NodeId, SyntaxKind, SyntaxTree};

const PRELUDE: &str = "#include <assert.h>\n#include <stdint.h>\n";
const MAIN: &str = "main";
const HELPER: &str = "compute";

/// A program whose only observable effect is an assertion on one value
pub struct Script {
    tree: SyntaxTree,
    root: NodeId,
    goal: GoalKind,
    goal_value: u32,
}

/// One reordering of a script, borrowed for as long as the enumeration
/// leaves the tree in that arrangement
pub struct Variant<'a> {
    pub index: usize,
    tree: &'a SyntaxTree,
    root: NodeId,
}

impl Variant<'_> {
    pub fn render(&self) -> String {
        self.tree.render(self.root)
    }

    pub fn evaluate(&self) -> Result<Outcome, EvalError> {
        run_program(self.tree, self.root)
    }
}

impl Script {
    pub fn build(gen: &mut Generator, config: &ScriptConfig) -> Self {
        gen.reserve_name(MAIN);
        gen.reserve_name(HELPER);

        let mut tree = SyntaxTree::new();
        let prelude = tree.leaf(SyntaxKind::Exact, PRELUDE);
        let root = tree.node(SyntaxKind::Root, &[prelude]);
        let goal_value = gen.value_for(ScalarType::U32);

        let main_body = tree.node(SyntaxKind::Block, &[]);
        match config.goal {
            GoalKind::Assign => {
                let env = declare_decoys(gen, &mut tree, main_body, config.n_decoys);

                let name = gen.fresh_name();
                let decl = gen.declaration(&mut tree, &name, None);
                tree.add(main_body, decl);

                let target = tree.leaf(SyntaxKind::Identifier, &name);
                let value = gen.literal(&mut tree, goal_value);
                let goal = tree.node(SyntaxKind::Assign, &[target, value]);
                let obfuscated = gen.obfuscate(&mut tree, goal, &env);
                tree.add(main_body, obfuscated);

                let check = tree.leaf(SyntaxKind::Identifier, &name);
                let check = assertion(gen, &mut tree, check, goal_value);
                tree.add(main_body, check);
            }
            GoalKind::Return => {
                let body = tree.node(SyntaxKind::Block, &[]);
                let env = declare_decoys(gen, &mut tree, body, config.n_decoys);

                let value = gen.literal(&mut tree, goal_value);
                let goal = tree.node(SyntaxKind::Return, &[value]);
                let obfuscated = gen.obfuscate(&mut tree, goal, &env);
                tree.add(body, obfuscated);

                let helper = function(&mut tree, HELPER, body);
                tree.add(root, helper);

                let call = tree.leaf(SyntaxKind::Exact, &format!("{}()", HELPER));
                let check = assertion(gen, &mut tree, call, goal_value);
                tree.add(main_body, check);
            }
        }

        let zero = tree.leaf(SyntaxKind::Literal, "0");
        let ret = tree.node(SyntaxKind::Return, &[zero]);
        tree.add(main_body, ret);
        let main = function(&mut tree, MAIN, main_body);
        tree.add(root, main);

        debug!(goal = ?config.goal, goal_value, nodes = tree.len(), "script assembled");
        Self {
            tree,
            root,
            goal: config.goal,
            goal_value,
        }
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn goal(&self) -> GoalKind {
        self.goal
    }

    pub fn goal_value(&self) -> u32 {
        self.goal_value
    }

    pub fn render(&self) -> String {
        self.tree.render(self.root)
    }

    pub fn evaluate(&self) -> Result<Outcome, EvalError> {
        run_program(&self.tree, self.root)
    }

    /// Hand at most `max_variants` reorderings to `sink`, numbered from 0.
    /// `sink` returns `true` to stop early.
    pub fn variants<F>(
        &mut self,
        gen: &mut Generator,
        max_variants: usize,
        mut sink: F,
    ) -> Enumeration
    where
        F: FnMut(Variant<'_>) -> bool,
    {
        if max_variants == 0 {
            return Enumeration::Cancelled(0);
        }
        let root = self.root;
        let mut index = 0;
        gen.enumerate(&mut self.tree, root, |tree| {
            let stop = sink(Variant { index, tree, root });
            index += 1;
            stop || index >= max_variants
        })
    }
}

impl Emit for Script {
    fn emit(&self) -> String {
        self.render()
    }
}

/// Initialized decoys at the top of `block`, registered for reuse
fn declare_decoys(
    gen: &mut Generator,
    tree: &mut SyntaxTree,
    block: NodeId,
    n: usize,
) -> Environment {
    let mut env = Environment::new();
    for _ in 0..n {
        let name = gen.fresh_name();
        let value = gen.value_for(ScalarType::U32);
        let decl = gen.declaration(tree, &name, Some(value));
        tree.add(block, decl);
        env.bind(tree.child(decl, 1));
    }
    env
}

fn function(tree: &mut SyntaxTree, name: &str, body: NodeId) -> NodeId {
    let type_ = tree.leaf(SyntaxKind::Type, ScalarType::U32.name());
    let ident = tree.leaf(SyntaxKind::Identifier, name);
    let proto = tree.node(SyntaxKind::FunctionProto, &[type_, ident]);
    tree.node(SyntaxKind::Function, &[proto, body])
}

fn assertion(gen: &Generator, tree: &mut SyntaxTree, actual: NodeId, expected: u32) -> NodeId {
    let expected = gen.literal(tree, expected);
    let cmp = tree.binary("==", actual, expected);
    tree.node(SyntaxKind::Assert, &[cmp])
}
