//! Generic traversal over the syntax tree.
//!
//! A single depth-first walk parameterized by a [`Visitor`]. Passes that
//! only need to look at nodes (free-variable scans, statement offsets)
//! implement the two hooks instead of writing their own recursion.

use crate::parser::ast::{NodeId, SyntaxTree};

/// Hooks invoked by [`walk`].
pub trait Visitor {
    /// Called before a node's children. Returning `false` skips the subtree.
    fn enter(&mut self, _tree: &SyntaxTree, _id: NodeId) -> bool {
        true
    }

    /// Called after a node's children (only for entered nodes).
    fn leave(&mut self, _tree: &SyntaxTree, _id: NodeId) {}
}

/// Depth-first walk of the subtree rooted at `id`, children in evaluation order.
pub fn walk<V: Visitor + ?Sized>(tree: &SyntaxTree, id: NodeId, visitor: &mut V) {
    if !visitor.enter(tree, id) {
        return;
    }
    for child in tree.children(id) {
        walk(tree, child, visitor);
    }
    visitor.leave(tree, id);
}

/// Closure adapter: visits every node, calling `f` on entry.
pub struct ForEachNode<F>(pub F);

impl<F: FnMut(&SyntaxTree, NodeId)> Visitor for ForEachNode<F> {
    fn enter(&mut self, tree: &SyntaxTree, id: NodeId) -> bool {
        (self.0)(tree, id);
        true
    }
}

/// Every node of the subtree for which `pred` holds, in walk order.
pub fn collect<P>(tree: &SyntaxTree, id: NodeId, mut pred: P) -> Vec<NodeId>
where
    P: FnMut(&SyntaxTree, NodeId) -> bool,
{
    let mut found = Vec::new();
    walk(
        tree,
        id,
        &mut ForEachNode(|tree: &SyntaxTree, node: NodeId| {
            if pred(tree, node) {
                found.push(node);
            }
        }),
    );
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::NodeKind;
    use crate::parser::parser::parse;

    fn no_types(_: &str) -> bool {
        false
    }

    #[test]
    fn test_collect_variables_in_order() {
        let tree = parse("a + b * c", &no_types).unwrap();
        let vars: Vec<String> = collect(&tree, tree.root(), |t, id| {
            matches!(t.kind(id), NodeKind::Variable(_))
        })
        .into_iter()
        .map(|id| match tree.kind(id) {
            NodeKind::Variable(name) => name.clone(),
            _ => unreachable!(),
        })
        .collect();
        assert_eq!(vars, vec!["a", "b", "c"]);
    }

    struct SkipLambdas {
        seen: usize,
    }

    impl Visitor for SkipLambdas {
        fn enter(&mut self, tree: &SyntaxTree, id: NodeId) -> bool {
            if matches!(tree.kind(id), NodeKind::Lambda { .. }) {
                return false;
            }
            if matches!(tree.kind(id), NodeKind::Variable(_)) {
                self.seen += 1;
            }
            true
        }
    }

    #[test]
    fn test_enter_can_prune_subtrees() {
        let tree = parse("def f = x -> y; z", &no_types).unwrap();
        let mut v = SkipLambdas { seen: 0 };
        walk(&tree, tree.root(), &mut v);
        assert_eq!(v.seen, 1);
    }
}
