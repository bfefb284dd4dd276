use std::ops::Index;

use la_arena::{Arena, Idx};

pub type NodeId = Idx<Syntax>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SyntaxKind {
    Root,
    Type,
    Identifier,
    Literal,
    Exact,
    Declaration,
    Function,
    FunctionProto,
    Block,
    IfGroup,
    If,
    Return,
    Assign,
    Binary,
    For,
    While,
    Switch,
    Case,
    Break,
    Assert,
    Nop,
}

impl SyntaxKind {
    /// Kinds that never contain reorderable structure
    pub fn is_inert(self) -> bool {
        match self {
            SyntaxKind::Type
            | SyntaxKind::Identifier
            | SyntaxKind::Literal
            | SyntaxKind::Exact
            | SyntaxKind::Declaration
            | SyntaxKind::FunctionProto
            | SyntaxKind::Return
            | SyntaxKind::Assign
            | SyntaxKind::Binary
            | SyntaxKind::Break
            | SyntaxKind::Assert
            | SyntaxKind::Nop => true,
            SyntaxKind::Root
            | SyntaxKind::Function
            | SyntaxKind::Block
            | SyntaxKind::IfGroup
            | SyntaxKind::If
            | SyntaxKind::For
            | SyntaxKind::While
            | SyntaxKind::Switch
            | SyntaxKind::Case => false,
        }
    }

    /// First child slot whose siblings may be reordered freely
    pub fn permutable_from(self) -> Option<usize> {
        match self {
            SyntaxKind::IfGroup => Some(0),
            SyntaxKind::Switch => Some(1),
            SyntaxKind::For => Some(3),
            SyntaxKind::While => Some(1),
            _ => None,
        }
    }
}

/// A single node. `None` children only appear in nullable slots: the
/// condition of an `If` (unconditional else) and the label of a `Case`
/// (default).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Syntax {
    pub kind: SyntaxKind,
    pub value: Option<String>,
    pub children: Vec<Option<NodeId>>,
}

/// Arena owning every node of one synthesized program. Parents refer to
/// their children by id; nothing else owns a node.
#[derive(Clone, Debug, Default)]
pub struct SyntaxTree {
    nodes: Arena<Syntax>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self { nodes: Arena::new() }
    }

    pub fn create<I>(&mut self, kind: SyntaxKind, value: Option<&str>, children: I) -> NodeId
    where
        I: IntoIterator<Item = Option<NodeId>>,
    {
        self.nodes.alloc(Syntax {
            kind,
            value: value.map(String::from),
            children: children.into_iter().collect(),
        })
    }

    pub fn leaf(&mut self, kind: SyntaxKind, text: &str) -> NodeId {
        self.create(kind, Some(text), [])
    }

    pub fn node(&mut self, kind: SyntaxKind, children: &[NodeId]) -> NodeId {
        self.create(kind, None, children.iter().copied().map(Some))
    }

    pub fn binary(&mut self, op: &str, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.create(SyntaxKind::Binary, Some(op), [Some(lhs), Some(rhs)])
    }

    pub fn add(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(Some(child));
    }

    pub fn kind(&self, id: NodeId) -> SyntaxKind {
        self.nodes[id].kind
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].value.as_deref()
    }

    pub fn children(&self, id: NodeId) -> &[Option<NodeId>] {
        &self.nodes[id].children
    }

    pub(crate) fn children_mut(&mut self, id: NodeId) -> &mut Vec<Option<NodeId>> {
        &mut self.nodes[id].children
    }

    /// Child in a slot that must be populated.
    pub fn child(&self, id: NodeId, slot: usize) -> NodeId {
        let node = &self.nodes[id];
        match node.children.get(slot) {
            Some(Some(c)) => *c,
            Some(None) => panic!("{:?} node has an empty required slot {}", node.kind, slot),
            None => panic!(
                "{:?} node has {} children, slot {} requested",
                node.kind,
                node.children.len(),
                slot
            ),
        }
    }

    /// Deep copy of a subtree. The copy shares no node with the original.
    pub fn duplicate(&mut self, id: NodeId) -> NodeId {
        let Syntax {
            kind,
            value,
            children,
        } = self.nodes[id].clone();
        let copied: Vec<Option<NodeId>> = children
            .into_iter()
            .map(|c| c.map(|c| self.duplicate(c)))
            .collect();
        self.nodes.alloc(Syntax {
            kind,
            value,
            children: copied,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Index<NodeId> for SyntaxTree {
    type Output = Syntax;

    fn index(&self, id: NodeId) -> &Syntax {
        &self.nodes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_copies_the_whole_subtree() {
        let mut t = SyntaxTree::new();
        let a = t.leaf(SyntaxKind::Literal, "1");
        let b = t.leaf(SyntaxKind::Identifier, "abc");
        let bin = t.binary("+", a, b);
        let copy = t.duplicate(bin);

        assert_ne!(copy, bin);
        assert_eq!(t.kind(copy), SyntaxKind::Binary);
        assert_eq!(t.value(copy), Some("+"));
        let lhs = t.child(copy, 0);
        assert_ne!(lhs, a);
        assert_eq!(t.value(lhs), Some("1"));
        assert_eq!(t.len(), 6);
    }

    #[test]
    fn nullable_slots_are_kept_in_order() {
        let mut t = SyntaxTree::new();
        let body = t.node(SyntaxKind::Nop, &[]);
        let else_ = t.create(SyntaxKind::If, None, [None, Some(body)]);
        assert_eq!(t.children(else_), &[None, Some(body)]);
    }

    #[test]
    #[should_panic(expected = "empty required slot")]
    fn child_rejects_empty_slot() {
        let mut t = SyntaxTree::new();
        let case = t.create(SyntaxKind::Case, None, [None]);
        t.child(case, 0);
    }

    #[test]
    fn permutable_regions_start_after_fixed_slots() {
        assert_eq!(SyntaxKind::IfGroup.permutable_from(), Some(0));
        assert_eq!(SyntaxKind::Switch.permutable_from(), Some(1));
        assert_eq!(SyntaxKind::For.permutable_from(), Some(3));
        assert_eq!(SyntaxKind::While.permutable_from(), Some(1));
        assert_eq!(SyntaxKind::Block.permutable_from(), None);
        assert!(SyntaxKind::Assign.is_inert());
        assert!(!SyntaxKind::Case.is_inert());
    }
}
