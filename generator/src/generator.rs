use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::choice::WeightedTable;
use crate::config::{ConfigError, ObfuscationConfig};
use crate::obfuscate::Transform;
use crate::symbol::SymbolTable;
use crate::syntax::{NodeId, SyntaxKind, SyntaxTree};

pub type RNG = StdRng;

/// Scalar types the synthesizer can produce values for
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScalarType {
    U32,
}

impl ScalarType {
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::U32 => "uint32_t",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueForm {
    /// `value`
    Literal,
    /// `(value + r) - (r)`
    Minus,
    /// `(value - r) + (r)`
    Plus,
    /// `(value) & (0xFFFFFFFF)`
    Mask,
    /// `(value) ^ ((value) ^ (value))`
    Xor,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PredicateForm {
    /// One value compared with itself
    Reflexive,
    /// Two values known to differ
    Distinct,
}

const TRUE_OPS: [&str; 3] = ["==", ">=", "<="];
const FALSE_OPS: [&str; 3] = ["!=", "<", ">"];
const MASK: &str = "0xFFFFFFFF";

/// Owns the single random stream every synthesis and enumeration step draws
/// from, so a seed fixes the whole output.
pub struct Generator {
    pub(crate) rng: RNG,
    pub(crate) config: ObfuscationConfig,
    pub(crate) symbols: SymbolTable,
    pub(crate) transforms: WeightedTable<Transform>,
    value_forms: WeightedTable<ValueForm>,
    predicate_forms: WeightedTable<PredicateForm>,
}

impl Generator {
    pub fn new(config: ObfuscationConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(config: ObfuscationConfig, rng: RNG) -> Result<Self, ConfigError> {
        config.validate()?;
        let transforms = WeightedTable::new(
            "transform",
            &[
                (Transform::AssignDecoy, config.w_assign_decoy),
                (Transform::DeclareDecoy, config.w_declare_decoy),
                (Transform::If, config.w_if),
                (Transform::Switch, config.w_switch),
                (Transform::For, config.w_for),
                (Transform::While, config.w_while),
            ],
        )?;
        let value_forms = WeightedTable::new(
            "value form",
            &[
                (ValueForm::Literal, config.w_literal),
                (ValueForm::Minus, config.w_minus),
                (ValueForm::Plus, config.w_plus),
                (ValueForm::Mask, config.w_mask),
                (ValueForm::Xor, config.w_xor),
            ],
        )?;
        let predicate_forms = WeightedTable::new(
            "predicate form",
            &[
                (PredicateForm::Reflexive, config.w_reflexive),
                (PredicateForm::Distinct, config.w_distinct),
            ],
        )?;
        Ok(Self {
            rng,
            config,
            symbols: SymbolTable::new(),
            transforms,
            value_forms,
            predicate_forms,
        })
    }

    pub fn config(&self) -> &ObfuscationConfig {
        &self.config
    }

    /// Keep `name` out of the pool of fresh identifiers
    pub fn reserve_name(&mut self, name: &str) {
        self.symbols.to_sym(name);
    }

    pub fn fresh_name(&mut self) -> String {
        let sym = self.symbols.fresh(&mut self.rng, self.config.name_length);
        self.symbols.from_sym(sym).to_string()
    }

    pub fn value_for(&mut self, type_: ScalarType) -> u32 {
        match type_ {
            ScalarType::U32 => self.rng.random(),
        }
    }

    pub fn literal(&self, tree: &mut SyntaxTree, value: u32) -> NodeId {
        tree.leaf(SyntaxKind::Literal, &value.to_string())
    }

    /// Expression that evaluates to `value` modulo 2^32. Each operand is
    /// synthesized recursively, so nesting depth is geometric.
    pub fn expression_evaluating_to(&mut self, tree: &mut SyntaxTree, value: u32) -> NodeId {
        match self.value_forms.pick(&mut self.rng) {
            ValueForm::Literal => self.literal(tree, value),
            ValueForm::Minus => {
                let r: u32 = self.rng.random();
                let lhs = self.expression_evaluating_to(tree, value.wrapping_add(r));
                let rhs = self.expression_evaluating_to(tree, r);
                tree.binary("-", lhs, rhs)
            }
            ValueForm::Plus => {
                let r: u32 = self.rng.random();
                let lhs = self.expression_evaluating_to(tree, value.wrapping_sub(r));
                let rhs = self.expression_evaluating_to(tree, r);
                tree.binary("+", lhs, rhs)
            }
            ValueForm::Mask => {
                let lhs = self.literal(tree, value);
                let rhs = tree.leaf(SyntaxKind::Literal, MASK);
                tree.binary("&", lhs, rhs)
            }
            ValueForm::Xor => {
                let lhs = self.literal(tree, value);
                let a = self.expression_evaluating_to(tree, value);
                let b = self.expression_evaluating_to(tree, value);
                let rhs = tree.binary("^", a, b);
                tree.binary("^", lhs, rhs)
            }
        }
    }

    /// Comparison that always evaluates to `truth`.
    pub fn always_true_or_false(&mut self, tree: &mut SyntaxTree, truth: bool) -> NodeId {
        match self.predicate_forms.pick(&mut self.rng) {
            PredicateForm::Reflexive => {
                let op = self.rng.random_range(0..TRUE_OPS.len());
                let op = if truth { TRUE_OPS[op] } else { FALSE_OPS[op] };
                let value = self.value_for(ScalarType::U32);
                let lhs = self.expression_evaluating_to(tree, value);
                // Same subtree on both sides, so both operands evaluate identically
                let rhs = tree.duplicate(lhs);
                tree.binary(op, lhs, rhs)
            }
            PredicateForm::Distinct => {
                let a = self.value_for(ScalarType::U32);
                let b = loop {
                    let b = self.value_for(ScalarType::U32);
                    if b != a {
                        break b;
                    }
                };
                let lhs = self.expression_evaluating_to(tree, a);
                let rhs = self.expression_evaluating_to(tree, b);
                tree.binary(if truth { "!=" } else { "==" }, lhs, rhs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;

    fn generator(seed: u64) -> Generator {
        Generator::new(ObfuscationConfig::default(), seed).unwrap()
    }

    fn only_form(form: ValueForm) -> ObfuscationConfig {
        let mut c = ObfuscationConfig {
            w_literal: 0,
            w_minus: 0,
            w_plus: 0,
            w_mask: 0,
            w_xor: 0,
            ..ObfuscationConfig::default()
        };
        match form {
            ValueForm::Literal => c.w_literal = 1,
            ValueForm::Minus => c.w_minus = 1,
            ValueForm::Plus => c.w_plus = 1,
            ValueForm::Mask => c.w_mask = 1,
            ValueForm::Xor => c.w_xor = 1,
        }
        c
    }

    #[test]
    fn seeds_fix_the_output() {
        let mut a = generator(42);
        let mut b = generator(42);
        let mut ta = SyntaxTree::new();
        let mut tb = SyntaxTree::new();
        for _ in 0..50 {
            let ea = a.always_true_or_false(&mut ta, true);
            let eb = b.always_true_or_false(&mut tb, true);
            assert_eq!(ta.render(ea), tb.render(eb));
        }
    }

    #[test]
    fn expressions_evaluate_to_their_value() {
        let mut g = generator(1);
        let mut t = SyntaxTree::new();
        for _ in 0..1000 {
            let v = g.value_for(ScalarType::U32);
            let e = g.expression_evaluating_to(&mut t, v);
            assert_eq!(evaluate(&t, e).unwrap(), v, "{}", t.render(e));
        }
    }

    #[test]
    fn every_form_alone_is_correct() {
        // Forms that recurse stay bounded through the literal fallback of
        // the other weights, so give the literal a share here too.
        for form in [ValueForm::Minus, ValueForm::Plus, ValueForm::Mask, ValueForm::Xor] {
            let mut config = only_form(form);
            config.w_literal = 3;
            let mut g = Generator::new(config, 9).unwrap();
            let mut t = SyntaxTree::new();
            for _ in 0..1000 {
                let v = g.value_for(ScalarType::U32);
                let e = g.expression_evaluating_to(&mut t, v);
                assert_eq!(evaluate(&t, e).unwrap(), v, "{:?}: {}", form, t.render(e));
            }
        }

        let mut g = Generator::new(only_form(ValueForm::Literal), 9).unwrap();
        let mut t = SyntaxTree::new();
        let e = g.expression_evaluating_to(&mut t, 77);
        assert_eq!(t.render(e), "77");
    }

    #[test]
    fn mask_form_shape() {
        let mut config = only_form(ValueForm::Mask);
        config.w_literal = 1;
        let mut g = Generator::new(config, 5).unwrap();
        let mut t = SyntaxTree::new();
        let e = loop {
            let e = g.expression_evaluating_to(&mut t, 5);
            if t.kind(e) == SyntaxKind::Binary {
                break e;
            }
        };
        assert_eq!(t.render(e), "(5) & (0xFFFFFFFF)");
        assert_eq!(evaluate(&t, e).unwrap(), 5);
    }

    #[test]
    fn predicates_hold() {
        let mut g = generator(2);
        let mut t = SyntaxTree::new();
        for _ in 0..1000 {
            let p = g.always_true_or_false(&mut t, true);
            assert_ne!(evaluate(&t, p).unwrap(), 0, "{}", t.render(p));
            let p = g.always_true_or_false(&mut t, false);
            assert_eq!(evaluate(&t, p).unwrap(), 0, "{}", t.render(p));
        }
    }

    #[test]
    fn reflexive_operands_render_identically() {
        let config = ObfuscationConfig {
            w_distinct: 0,
            ..ObfuscationConfig::default()
        };
        let mut g = Generator::new(config, 8).unwrap();
        let mut t = SyntaxTree::new();
        for _ in 0..100 {
            let p = g.always_true_or_false(&mut t, false);
            let lhs = t.child(p, 0);
            let rhs = t.child(p, 1);
            assert_ne!(lhs, rhs);
            assert_eq!(t.render(lhs), t.render(rhs));
            assert!(FALSE_OPS.contains(&t.value(p).unwrap()));
        }
    }

    #[test]
    fn fresh_names_avoid_reserved_ones() {
        let config = ObfuscationConfig {
            name_length: 2,
            ..ObfuscationConfig::default()
        };
        let mut g = Generator::new(config, 3).unwrap();
        g.reserve_name("ab");
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let name = g.fresh_name();
            assert_ne!(name, "ab");
            assert!(seen.insert(name));
        }
    }
}
