//! Reference interpreter for generated programs.
//!
//! Runs a tree with C semantics restricted to what the generator emits:
//! `uint32_t` variables with wrapping arithmetic, scoped blocks, `if`
//! chains, `for`/`while` loops, `switch` with fallthrough, `assert` and
//! zero-argument calls. Verbatim text is understood only in the forms the
//! generator writes (`#include` lines, `++name`, `name()`).

use std::collections::HashMap;

use thiserror::Error;

use crate::syntax::{NodeId, SyntaxKind, SyntaxTree};

const STEP_LIMIT: usize = 10_000_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),
    #[error("malformed literal `{0}`")]
    MalformedLiteral(String),
    #[error("unsupported verbatim text `{0}`")]
    UnsupportedExact(String),
    #[error("{0:?} node cannot be evaluated in this position")]
    Unexpected(SyntaxKind),
    #[error("`break` outside of a loop or switch")]
    StrayBreak,
    #[error("step limit exceeded")]
    StepLimit,
}

/// How control leaves a statement
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Normal,
    Break,
    Return(u32),
}

/// Result of running a whole program from `main`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub exit: u32,
    pub assertions: usize,
    pub failed_assertions: usize,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.failed_assertions == 0 && self.exit == 0
    }
}

pub struct Evaluator<'t> {
    tree: &'t SyntaxTree,
    scopes: Vec<HashMap<String, u32>>,
    functions: HashMap<String, NodeId>,
    assertions: usize,
    failed_assertions: usize,
    steps: usize,
}

/// Evaluate a closed expression
pub fn evaluate(tree: &SyntaxTree, expr: NodeId) -> Result<u32, EvalError> {
    Evaluator::new(tree).eval(expr)
}

/// Run the `main` function defined under `root`
pub fn run_program(tree: &SyntaxTree, root: NodeId) -> Result<Outcome, EvalError> {
    let mut e = Evaluator::new(tree);
    e.exec(root)?;
    let exit = e.call("main")?;
    Ok(Outcome {
        exit,
        assertions: e.assertions,
        failed_assertions: e.failed_assertions,
    })
}

pub fn parse_literal(text: &str) -> Result<u32, EvalError> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    };
    match parsed {
        Ok(v) if v <= u64::from(u32::MAX) => Ok(v as u32),
        _ => Err(EvalError::MalformedLiteral(text.to_string())),
    }
}

impl<'t> Evaluator<'t> {
    pub fn new(tree: &'t SyntaxTree) -> Self {
        Self {
            tree,
            scopes: vec![HashMap::new()],
            functions: HashMap::new(),
            assertions: 0,
            failed_assertions: 0,
            steps: 0,
        }
    }

    pub fn declare(&mut self, name: &str, value: u32) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    pub fn assertions(&self) -> usize {
        self.assertions
    }

    pub fn failed_assertions(&self) -> usize {
        self.failed_assertions
    }

    fn store(&mut self, name: &str, value: u32) -> Result<(), EvalError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return Ok(());
            }
        }
        Err(EvalError::UnknownVariable(name.to_string()))
    }

    fn tick(&mut self) -> Result<(), EvalError> {
        self.steps += 1;
        if self.steps > STEP_LIMIT {
            Err(EvalError::StepLimit)
        } else {
            Ok(())
        }
    }

    fn text(&self, id: NodeId) -> &'t str {
        self.tree.value(id).unwrap_or("")
    }

    fn scoped<F>(&mut self, f: F) -> Result<Flow, EvalError>
    where
        F: FnOnce(&mut Self) -> Result<Flow, EvalError>,
    {
        self.scopes.push(HashMap::new());
        let flow = f(self);
        self.scopes.pop();
        flow
    }

    pub fn call(&mut self, name: &str) -> Result<u32, EvalError> {
        let function = match self.functions.get(name) {
            Some(f) => *f,
            None => return Err(EvalError::UnknownFunction(name.to_string())),
        };
        let body = self.tree.child(function, 1);
        let caller = std::mem::replace(&mut self.scopes, vec![HashMap::new()]);
        let flow = self.exec(body);
        self.scopes = caller;
        match flow? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(0),
            Flow::Break => Err(EvalError::StrayBreak),
        }
    }

    fn exact(&mut self, id: NodeId) -> Result<Option<u32>, EvalError> {
        let raw = self.text(id);
        let text = raw.trim().trim_end_matches(';').trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(None);
        }
        if let Some(name) = text.strip_prefix("++") {
            let value = self
                .lookup(name)
                .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))?
                .wrapping_add(1);
            self.store(name, value)?;
            return Ok(Some(value));
        }
        if let Some(name) = text.strip_suffix("()") {
            return self.call(name).map(Some);
        }
        Err(EvalError::UnsupportedExact(raw.to_string()))
    }

    pub fn eval(&mut self, id: NodeId) -> Result<u32, EvalError> {
        self.tick()?;
        let tree = self.tree;
        match tree.kind(id) {
            SyntaxKind::Literal => parse_literal(self.text(id)),
            SyntaxKind::Identifier => {
                let name = self.text(id);
                self.lookup(name)
                    .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
            }
            SyntaxKind::Exact => match self.exact(id)? {
                Some(v) => Ok(v),
                None => Err(EvalError::UnsupportedExact(self.text(id).to_string())),
            },
            SyntaxKind::Binary => {
                let lhs = self.eval(tree.child(id, 0))?;
                let rhs = self.eval(tree.child(id, 1))?;
                let op = self.text(id);
                Ok(match op {
                    "+" => lhs.wrapping_add(rhs),
                    "-" => lhs.wrapping_sub(rhs),
                    "*" => lhs.wrapping_mul(rhs),
                    "&" => lhs & rhs,
                    "|" => lhs | rhs,
                    "^" => lhs ^ rhs,
                    "==" => u32::from(lhs == rhs),
                    "!=" => u32::from(lhs != rhs),
                    "<" => u32::from(lhs < rhs),
                    "<=" => u32::from(lhs <= rhs),
                    ">" => u32::from(lhs > rhs),
                    ">=" => u32::from(lhs >= rhs),
                    _ => return Err(EvalError::UnsupportedOperator(op.to_string())),
                })
            }
            kind => Err(EvalError::Unexpected(kind)),
        }
    }

    fn branch(&mut self, id: NodeId) -> Result<Option<Flow>, EvalError> {
        let taken = match self.tree.children(id)[0] {
            Some(cond) => self.eval(cond)? != 0,
            None => true,
        };
        if taken {
            self.exec(self.tree.child(id, 1)).map(Some)
        } else {
            Ok(None)
        }
    }

    fn switch(&mut self, id: NodeId) -> Result<Flow, EvalError> {
        let tree = self.tree;
        let discriminant = self.eval(tree.child(id, 0))?;
        let cases: Vec<NodeId> = tree.children(id)[1..].iter().flatten().copied().collect();

        let mut entry = None;
        let mut default = None;
        for (i, case) in cases.iter().enumerate() {
            match tree.children(*case)[0] {
                Some(label) => {
                    if entry.is_none() && self.eval(label)? == discriminant {
                        entry = Some(i);
                    }
                }
                None => default = default.or(Some(i)),
            }
        }
        let start = match entry.or(default) {
            Some(i) => i,
            None => return Ok(Flow::Normal),
        };

        for case in &cases[start..] {
            for stmt in tree.children(*case)[1..].iter().flatten() {
                match self.exec(*stmt)? {
                    Flow::Normal => {}
                    Flow::Break => return Ok(Flow::Normal),
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn repeat(
        &mut self,
        cond: NodeId,
        body: NodeId,
        step: Option<NodeId>,
    ) -> Result<Flow, EvalError> {
        loop {
            self.tick()?;
            if self.eval(cond)? == 0 {
                return Ok(Flow::Normal);
            }
            match self.exec(body)? {
                Flow::Normal => {}
                Flow::Break => return Ok(Flow::Normal),
                ret @ Flow::Return(_) => return Ok(ret),
            }
            if let Some(step) = step {
                self.exec(step)?;
            }
        }
    }

    pub fn exec(&mut self, id: NodeId) -> Result<Flow, EvalError> {
        self.tick()?;
        let tree = self.tree;
        match tree.kind(id) {
            SyntaxKind::Root => {
                for child in tree.children(id).iter().flatten() {
                    if tree.kind(*child) == SyntaxKind::Function {
                        let proto = tree.child(*child, 0);
                        let name = self.text(tree.child(proto, 1));
                        self.functions.insert(name.to_string(), *child);
                    } else {
                        self.exec(*child)?;
                    }
                }
                Ok(Flow::Normal)
            }
            SyntaxKind::Function => Ok(Flow::Normal),
            SyntaxKind::Exact => {
                self.exact(id)?;
                Ok(Flow::Normal)
            }
            SyntaxKind::Block => self.scoped(|e| {
                for child in tree.children(id).iter().flatten() {
                    match e.exec(*child)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }),
            SyntaxKind::Declaration => {
                let name = self.text(tree.child(id, 1));
                let value = match tree.children(id).len() {
                    3 => self.eval(tree.child(id, 2))?,
                    _ => 0,
                };
                self.declare(name, value);
                Ok(Flow::Normal)
            }
            SyntaxKind::Assign => {
                let value = self.eval(tree.child(id, 1))?;
                let target = tree.child(id, 0);
                match tree.kind(target) {
                    SyntaxKind::Identifier => self.store(self.text(target), value)?,
                    SyntaxKind::Declaration => {
                        let name = self.text(tree.child(target, 1));
                        self.declare(name, value);
                    }
                    kind => return Err(EvalError::Unexpected(kind)),
                }
                Ok(Flow::Normal)
            }
            SyntaxKind::IfGroup => {
                for branch in tree.children(id).iter().flatten() {
                    if let Some(flow) = self.branch(*branch)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            SyntaxKind::If => Ok(self.branch(id)?.unwrap_or(Flow::Normal)),
            SyntaxKind::Return => Ok(Flow::Return(self.eval(tree.child(id, 0))?)),
            SyntaxKind::For => self.scoped(|e| {
                e.exec(tree.child(id, 0))?;
                e.repeat(tree.child(id, 1), tree.child(id, 3), Some(tree.child(id, 2)))
            }),
            SyntaxKind::While => self.repeat(tree.child(id, 0), tree.child(id, 1), None),
            SyntaxKind::Switch => self.scoped(|e| e.switch(id)),
            SyntaxKind::Break => Ok(Flow::Break),
            SyntaxKind::Assert => {
                self.assertions += 1;
                if self.eval(tree.child(id, 0))? == 0 {
                    self.failed_assertions += 1;
                }
                Ok(Flow::Normal)
            }
            SyntaxKind::Nop => Ok(Flow::Normal),
            SyntaxKind::Identifier | SyntaxKind::Literal | SyntaxKind::Binary => {
                self.eval(id)?;
                Ok(Flow::Normal)
            }
            kind @ (SyntaxKind::Type | SyntaxKind::FunctionProto | SyntaxKind::Case) => {
                Err(EvalError::Unexpected(kind))
            }
        }
    }
}
