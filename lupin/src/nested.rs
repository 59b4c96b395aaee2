//! Memoized traversal of the prior DAG.
//!
//! Priors reference their dependencies through shared handles, so one
//! dependency can be reached through several parents. Every recursive
//! evaluation (log-joint, move ratio, move application, sampling) threads
//! an [`EvalContext`] through the calls; a node contributes only on its
//! first visit within that context. The context is created by the
//! top-level caller and dropped when the call returns, so there is no
//! processed flag left to reset.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared handle to a prior node; lives as long as its longest holder.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a prior into a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Identity of a node in the prior DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

impl NodeId {
    /// A process-unique identity.
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything that takes part in a memoized traversal.
pub trait NestedRandomVariable {
    /// Identity used to visit this node once per traversal.
    fn node_id(&self) -> NodeId;
}

/// Visited set for one top-level evaluation.
#[derive(Debug, Default)]
pub struct EvalContext {
    processed: Vec<NodeId>,
}

impl EvalContext {
    /// Fresh traversal with nothing visited.
    pub fn new() -> Self {
        EvalContext {
            processed: Vec::with_capacity(8),
        }
    }

    /// Whether `node` was already visited.
    pub fn is_processed(&self, node: NodeId) -> bool {
        self.processed.contains(&node)
    }

    /// Run `f` on the first visit of `node`; later visits return `None`.
    ///
    /// The node is marked before `f` runs, so cycles terminate instead of
    /// recursing forever (their contribution is then simply partial).
    pub fn once<T>(&mut self, node: NodeId, f: impl FnOnce(&mut Self) -> T) -> Option<T> {
        if self.is_processed(node) {
            return None;
        }
        self.processed.push(node);
        Some(f(self))
    }

    /// Number of nodes visited so far.
    pub fn num_processed(&self) -> usize {
        self.processed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A node with a constant term and shared children.
    struct Term {
        id: NodeId,
        value: f64,
        children: Vec<Shared<Term>>,
    }

    impl Term {
        fn new(value: f64, children: Vec<Shared<Term>>) -> Shared<Term> {
            shared(Term {
                id: NodeId::fresh(),
                value,
                children,
            })
        }

        fn total_with(&self, ctx: &mut EvalContext) -> f64 {
            ctx.once(self.id, |ctx| {
                self.value
                    + self
                        .children
                        .iter()
                        .map(|c| c.borrow().total_with(ctx))
                        .sum::<f64>()
            })
            .unwrap_or(0.0)
        }

        fn total(&self) -> f64 {
            self.total_with(&mut EvalContext::new())
        }
    }

    #[test]
    fn test_diamond_counts_shared_node_once() {
        // top -> {left, right} -> shared
        let base = Term::new(1.0, vec![]);
        let left = Term::new(10.0, vec![base.clone()]);
        let right = Term::new(100.0, vec![base.clone()]);
        let top = Term::new(1000.0, vec![left, right]);

        assert_eq!(top.borrow().total(), 1111.0);
        // a second independent call starts from a clean context
        assert_eq!(top.borrow().total(), 1111.0);
        assert_eq!(base.borrow().total(), 1.0);
    }

    #[test]
    fn test_shared_context_across_roots() {
        let base = Term::new(1.0, vec![]);
        let a = Term::new(2.0, vec![base.clone()]);
        let b = Term::new(4.0, vec![base.clone()]);

        let mut ctx = EvalContext::new();
        let total = a.borrow().total_with(&mut ctx) + b.borrow().total_with(&mut ctx);
        assert_eq!(total, 7.0);
        assert_eq!(ctx.num_processed(), 3);
        assert!(ctx.is_processed(base.borrow().id));
    }

    #[test]
    fn test_fresh_ids_are_distinct() {
        let ids: Vec<_> = (0..10).map(|_| NodeId::fresh()).collect();
        let mut sorted = ids.clone();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }
}
