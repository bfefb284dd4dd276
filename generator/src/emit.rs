use crate::syntax::{NodeId, SyntaxKind, SyntaxTree};

/// Anything that can be written out as a complete program text
pub trait Emit {
    fn emit(&self) -> String;
}

/// Terminate a statement with `;` unless it already ends in `;` or `}`.
pub fn ensure_eol<S: Into<String>>(text: S) -> String {
    let mut text = text.into();
    match text.chars().last() {
        None => String::from(";"),
        Some(';') | Some('}') => text,
        Some(_) => {
            text.push(';');
            text
        }
    }
}

impl SyntaxTree {
    fn expect_arity(&self, id: NodeId, ok: bool, expected: &str) {
        assert!(
            ok,
            "malformed {:?} node: expected {} children, found {}",
            self.kind(id),
            expected,
            self.children(id).len()
        );
    }

    fn payload(&self, id: NodeId) -> &str {
        match self.value(id) {
            Some(v) => v,
            None => panic!("malformed {:?} node: missing payload", self.kind(id)),
        }
    }

    fn render_child(&self, id: NodeId, slot: usize) -> String {
        self.render(self.child(id, slot))
    }

    /// Statement position: `Function` and `Exact` supply their own
    /// termination, everything else goes through `ensure_eol`.
    fn render_statement(&self, id: NodeId) -> String {
        match self.kind(id) {
            SyntaxKind::Function | SyntaxKind::Exact => self.render(id),
            _ => ensure_eol(self.render(id)),
        }
    }

    /// Body of a branch or function, always brace-delimited.
    fn render_body(&self, id: NodeId) -> String {
        if self.kind(id) == SyntaxKind::Block {
            ensure_eol(self.render(id))
        } else {
            format!("{{{}}}", ensure_eol(self.render(id)))
        }
    }

    pub fn render(&self, id: NodeId) -> String {
        let n = self.children(id).len();
        match self.kind(id) {
            SyntaxKind::Type | SyntaxKind::Identifier | SyntaxKind::Literal | SyntaxKind::Exact => {
                self.expect_arity(id, n == 0, "0");
                self.payload(id).to_string()
            }
            SyntaxKind::Declaration => {
                self.expect_arity(id, n == 2 || n == 3, "2 or 3");
                let mut out = format!("{} {}", self.render_child(id, 0), self.render_child(id, 1));
                if n == 3 {
                    out.push_str(" = ");
                    out.push_str(&self.render_child(id, 2));
                }
                out
            }
            SyntaxKind::Assign => {
                self.expect_arity(id, n == 2, "2");
                format!("{} = {}", self.render_child(id, 0), self.render_child(id, 1))
            }
            SyntaxKind::Function => {
                self.expect_arity(id, n == 2, "2");
                let out = self.render_child(id, 0) + &self.render_body(self.child(id, 1));
                ensure_eol(out)
            }
            SyntaxKind::FunctionProto => {
                self.expect_arity(id, n >= 2, "at least 2");
                let params: Vec<String> = (2..n).map(|i| self.render_child(id, i)).collect();
                format!(
                    "{} {}({})",
                    self.render_child(id, 0),
                    self.render_child(id, 1),
                    params.join(", ")
                )
            }
            kind @ (SyntaxKind::Root | SyntaxKind::Block) => {
                let mut out = String::new();
                if kind == SyntaxKind::Block {
                    out.push('{');
                }
                for i in 0..n {
                    out.push_str(&self.render_statement(self.child(id, i)));
                }
                if kind == SyntaxKind::Block {
                    out.push('}');
                }
                out
            }
            SyntaxKind::IfGroup => {
                self.expect_arity(id, n >= 1, "at least 1");
                let mut out = String::new();
                for i in 0..n {
                    let branch = self.child(id, i);
                    let conditional = self.children(branch).first().copied().flatten().is_some();
                    if i == 0 {
                        assert!(
                            conditional,
                            "malformed IfGroup node: first branch has no condition"
                        );
                        out.push_str("if ");
                    } else if conditional {
                        out.push_str("else if ");
                    } else {
                        out.push_str("else ");
                    }
                    out.push_str(&self.render(branch));
                }
                out
            }
            SyntaxKind::If => {
                self.expect_arity(id, n == 2, "2");
                let body = self.render_body(self.child(id, 1));
                match self.children(id)[0] {
                    Some(cond) => format!("({}){}", self.render(cond), body),
                    None => body,
                }
            }
            SyntaxKind::Return => {
                self.expect_arity(id, n == 1, "1");
                format!("return {}", self.render_child(id, 0))
            }
            SyntaxKind::Binary => {
                self.expect_arity(id, n == 2, "2");
                format!(
                    "({}) {} ({})",
                    self.render_child(id, 0),
                    self.payload(id),
                    self.render_child(id, 1)
                )
            }
            SyntaxKind::For => {
                self.expect_arity(id, n == 4, "4");
                format!(
                    "for ({}; {}; {}){}",
                    self.render_child(id, 0),
                    self.render_child(id, 1),
                    self.render_child(id, 2),
                    ensure_eol(self.render_child(id, 3))
                )
            }
            SyntaxKind::While => {
                self.expect_arity(id, n == 2, "2");
                format!(
                    "while ({}){}",
                    self.render_child(id, 0),
                    ensure_eol(self.render_child(id, 1))
                )
            }
            SyntaxKind::Switch => {
                self.expect_arity(id, n >= 1, "at least 1");
                let mut out = format!("switch ({}) {{", self.render_child(id, 0));
                for i in 1..n {
                    out.push_str(&self.render_child(id, i));
                }
                out.push('}');
                out
            }
            SyntaxKind::Case => {
                self.expect_arity(id, n >= 1, "at least 1");
                let mut out = match self.children(id)[0] {
                    Some(label) => format!("case {}:", self.render(label)),
                    None => String::from("default:"),
                };
                for i in 1..n {
                    out.push_str(&ensure_eol(self.render_child(id, i)));
                }
                out
            }
            SyntaxKind::Break => {
                self.expect_arity(id, n == 0, "0");
                String::from("break")
            }
            SyntaxKind::Assert => {
                self.expect_arity(id, n == 1, "1");
                format!("assert({})", self.render_child(id, 0))
            }
            SyntaxKind::Nop => {
                self.expect_arity(id, n == 0, "0");
                String::from(";")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SyntaxKind::*;

    fn assign(t: &mut SyntaxTree, name: &str, value: &str) -> NodeId {
        let lhs = t.leaf(Identifier, name);
        let rhs = t.leaf(Literal, value);
        t.node(Assign, &[lhs, rhs])
    }

    #[test]
    fn statement_terminator() {
        assert_eq!(ensure_eol(""), ";");
        assert_eq!(ensure_eol("x=1"), "x=1;");
        assert_eq!(ensure_eol("{...}"), "{...}");
        assert_eq!(ensure_eol("x=1;"), "x=1;");
    }

    #[test]
    fn declarations_and_assignments() {
        let mut t = SyntaxTree::new();
        let ty = t.leaf(Type, "uint32_t");
        let name = t.leaf(Identifier, "abc");
        let init = t.leaf(Literal, "7");
        let decl = t.node(Declaration, &[ty, name, init]);
        assert_eq!(t.render(decl), "uint32_t abc = 7");

        let a = assign(&mut t, "abc", "3");
        assert_eq!(t.render(a), "abc = 3");
    }

    #[test]
    fn block_terminates_statements_but_not_exact_text() {
        let mut t = SyntaxTree::new();
        let a = assign(&mut t, "x", "1");
        let inc = t.leaf(Exact, "++x;");
        let brk = t.node(Break, &[]);
        let block = t.node(Block, &[a, inc, brk]);
        assert_eq!(t.render(block), "{x = 1;++x;break;}");

        let empty = t.node(Block, &[]);
        assert_eq!(t.render(empty), "{}");
    }

    #[test]
    fn function_body_is_forced_into_braces() {
        let mut t = SyntaxTree::new();
        let ty = t.leaf(Type, "uint32_t");
        let name = t.leaf(Identifier, "main");
        let proto = t.node(FunctionProto, &[ty, name]);
        let zero = t.leaf(Literal, "0");
        let ret = t.node(Return, &[zero]);
        let f = t.node(Function, &[proto, ret]);
        assert_eq!(t.render(f), "uint32_t main(){return 0;}");

        let include = t.leaf(Exact, "#include <stdint.h>\n");
        let root = t.node(Root, &[include, f]);
        assert_eq!(t.render(root), "#include <stdint.h>\nuint32_t main(){return 0;}");
    }

    #[test]
    fn prototype_parameters_are_comma_separated() {
        let mut t = SyntaxTree::new();
        let ty = t.leaf(Type, "uint32_t");
        let name = t.leaf(Identifier, "f");
        let p1 = t.leaf(Exact, "uint32_t a");
        let p2 = t.leaf(Exact, "uint32_t b");
        let proto = t.node(FunctionProto, &[ty, name, p1, p2]);
        assert_eq!(t.render(proto), "uint32_t f(uint32_t a, uint32_t b)");
    }

    #[test]
    fn if_group_prefixes() {
        let mut t = SyntaxTree::new();
        let c1 = t.leaf(Literal, "1");
        let b1 = assign(&mut t, "x", "1");
        let first = t.node(If, &[c1, b1]);
        let c2 = t.leaf(Literal, "0");
        let b2 = assign(&mut t, "x", "2");
        let second = t.node(If, &[c2, b2]);
        let b3 = assign(&mut t, "x", "3");
        let last = t.create(If, None, [None, Some(b3)]);
        let group = t.node(IfGroup, &[first, second, last]);
        assert_eq!(
            t.render(group),
            "if (1){x = 1;}else if (0){x = 2;}else {x = 3;}"
        );
    }

    #[test]
    fn binary_parenthesizes_operands() {
        let mut t = SyntaxTree::new();
        let a = t.leaf(Literal, "5");
        let b = t.leaf(Literal, "3");
        let inner = t.binary("-", a, b);
        let c = t.leaf(Literal, "2");
        let outer = t.binary("==", inner, c);
        assert_eq!(t.render(outer), "((5) - (3)) == (2)");
    }

    #[test]
    fn loops() {
        let mut t = SyntaxTree::new();
        let ty = t.leaf(Type, "uint32_t");
        let i = t.leaf(Identifier, "i");
        let decl = t.node(Declaration, &[ty, i]);
        let zero = t.leaf(Literal, "0");
        let init = t.node(Assign, &[decl, zero]);
        let iv = t.leaf(Identifier, "i");
        let three = t.leaf(Literal, "3");
        let cond = t.binary("<", iv, three);
        let step = t.leaf(Exact, "++i");
        let stmt = assign(&mut t, "x", "1");
        let body = t.node(Block, &[stmt]);
        let for_ = t.node(For, &[init, cond, step, body]);
        assert_eq!(t.render(for_), "for (uint32_t i = 0; (i) < (3); ++i){x = 1;}");

        let iv = t.leaf(Identifier, "i");
        let three = t.leaf(Literal, "3");
        let cond = t.binary("<", iv, three);
        let stmt = assign(&mut t, "x", "1");
        let while_ = t.node(While, &[cond, stmt]);
        assert_eq!(t.render(while_), "while ((i) < (3))x = 1;");
    }

    #[test]
    fn switch_with_cases_and_default() {
        let mut t = SyntaxTree::new();
        let disc = t.leaf(Identifier, "v");
        let l1 = t.leaf(Literal, "4");
        let s1 = assign(&mut t, "x", "1");
        let b1 = t.node(Break, &[]);
        let c1 = t.node(Case, &[l1, s1, b1]);
        let nop = t.node(Nop, &[]);
        let c2 = t.create(Case, None, [None, Some(nop)]);
        let sw = t.node(Switch, &[disc, c1, c2]);
        assert_eq!(t.render(sw), "switch (v) {case 4:x = 1;break;default:;}");
    }

    #[test]
    fn assert_and_return() {
        let mut t = SyntaxTree::new();
        let x = t.leaf(Identifier, "x");
        let v = t.leaf(Literal, "9");
        let eq = t.binary("==", x, v);
        let a = t.node(Assert, &[eq]);
        assert_eq!(t.render(a), "assert((x) == (9))");
        let v = t.leaf(Literal, "9");
        let r = t.node(Return, &[v]);
        assert_eq!(t.render(r), "return 9");
    }

    #[test]
    fn rendering_is_idempotent() {
        let mut t = SyntaxTree::new();
        let s = assign(&mut t, "x", "1");
        let block = t.node(Block, &[s]);
        assert_eq!(t.render(block), t.render(block));
    }

    #[test]
    #[should_panic(expected = "malformed Binary node")]
    fn binary_with_one_operand_is_rejected() {
        let mut t = SyntaxTree::new();
        let a = t.leaf(Literal, "1");
        let bad = t.create(Binary, Some("+"), [Some(a)]);
        t.render(bad);
    }

    #[test]
    #[should_panic(expected = "malformed For node")]
    fn for_without_body_is_rejected() {
        let mut t = SyntaxTree::new();
        let a = t.leaf(Literal, "1");
        let bad = t.node(For, &[a, a, a]);
        t.render(bad);
    }

    #[test]
    #[should_panic(expected = "malformed Declaration node")]
    fn declaration_without_name_is_rejected() {
        let mut t = SyntaxTree::new();
        let ty = t.leaf(Type, "uint32_t");
        let bad = t.node(Declaration, &[ty]);
        t.render(bad);
    }

    #[test]
    #[should_panic(expected = "first branch has no condition")]
    fn if_group_must_open_with_a_condition() {
        let mut t = SyntaxTree::new();
        let body = t.node(Nop, &[]);
        let else_ = t.create(If, None, [None, Some(body)]);
        let group = t.node(IfGroup, &[else_]);
        t.render(group);
    }
}
