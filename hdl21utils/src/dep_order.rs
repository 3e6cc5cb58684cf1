//!
//! # Dependency-Ordering Trait and Helpers
//!

// Std-lib
use std::collections::HashSet;
use std::marker::PhantomData;

///
/// # Dependency-Ordering Trait
///
/// Circuit hierarchies are graphs of dependencies between items:
/// modules instantiate other modules, which instantiate others, and so on.
/// Nodes are commonly stored unordered, but must be dependency-ordered
/// for most processing tasks: children are completed before the parents which instantiate them.
///
/// The [DepOrder] trait aids these orderings.
/// Implementers are typically stateful tree-walkers, which may modify the graph as they go,
/// e.g. by creating new nodes for previously unresolved references.
/// The sole processing method `process` handles a single `Item`.
/// Its implementation is responsible for iterating over `item`'s (direct) dependencies,
/// and passing each to `orderer.push`.
/// The `push` method, implemented on helper-type [DepOrderer], recursively traverses
/// dependencies, calling `process` on each.
/// `push` also monitors for graph-cycles, and reports each detected cycle to `fail`,
/// in order from its first re-entered item, with that item repeated at the end.
///
/// Typical usage:
///
/// ```text
/// struct MyGraphOrder { graph: MyGraph }
/// impl DepOrder for MyGraphOrder {
///     type Item = NodeKey;
///     type Error = MyError;
///
///     fn process(&mut self, item: &NodeKey, orderer: &mut DepOrderer<Self>) -> Result<(), MyError> {
///         for dep in self.graph.dependencies(item) {
///             orderer.push(self, &dep)?;
///         }
///         Ok(())
///     }
///     fn fail(&mut self, cycle: Vec<NodeKey>) -> Result<(), MyError> {
///         Err(MyError::cycle(cycle))
///     }
/// }
/// ```
///
pub trait DepOrder: Sized {
    // Associated types
    /// Item Type. Typically keys to the nodes in the dependency graph.
    type Item: Clone + Eq + std::hash::Hash;
    /// Error Type
    type Error;

    // Default Methods
    /// Dependency-order all entries in slice `items`, and everything they depend upon
    fn order(&mut self, items: &[Self::Item]) -> Result<Vec<Self::Item>, Self::Error> {
        DepOrderer::<Self>::order(self, items)
    }

    // Required Methods
    /// Process a single `item`, typically depth-first
    fn process(&mut self, item: &Self::Item, orderer: &mut DepOrderer<Self>)
        -> Result<(), Self::Error>;
    /// Failure-handler for a detected `cycle`. Return our `Error` type.
    fn fail(&mut self, cycle: Vec<Self::Item>) -> Result<(), Self::Error>;
}
/// # Dependency Order Helper
/// Should not be used directly.
/// Public solely for use in the call-signature of [DepOrder::process].
pub struct DepOrderer<P: DepOrder> {
    /// Ordered, completed items
    stack: Vec<P::Item>,
    /// Hash-set of completed items, for quick membership tests
    seen: HashSet<P::Item>,
    /// Pending items, in the order of their open recursive stack-frames
    pending: Vec<P::Item>,
    // Item-processor phantom reference
    p: PhantomData<P>,
}
impl<P: DepOrder> DepOrderer<P> {
    /// Dependency-order all entries in slice `items`
    pub fn order(processor: &mut P, items: &[P::Item]) -> Result<Vec<P::Item>, P::Error> {
        let mut this = Self {
            stack: Vec::with_capacity(items.len()),
            seen: HashSet::with_capacity(items.len()),
            pending: Vec::new(),
            p: PhantomData,
        };
        for item in items.iter() {
            this.push(processor, item)?;
        }
        Ok(this.stack)
    }
    /// Push `item`'s dependencies, and then itself, onto the stack
    pub fn push(&mut self, processor: &mut P, item: &P::Item) -> Result<(), P::Error> {
        if self.seen.contains(item) {
            return Ok(());
        }
        // Check for cycles, indicated if `item` is pending, i.e. in an open recursive stack-frame.
        if let Some(start) = self.pending.iter().position(|p| p == item) {
            let mut cycle = self.pending[start..].to_vec();
            cycle.push(item.clone());
            return processor.fail(cycle);
        }
        self.pending.push(item.clone());
        // Process the Item, dependencies first
        processor.process(item, self)?;
        // Check that `item` closes the innermost stack-frame
        match self.pending.pop() {
            Some(ref popped) if popped == item => (),
            _ => return processor.fail(vec![item.clone()]),
        }
        self.seen.insert(item.clone());
        self.stack.push(item.clone());
        Ok(())
    }
    /// Boolean indication of whether `item` has been completed
    pub fn done(&self, item: &P::Item) -> bool {
        self.seen.contains(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Simple adjacency-list graph of string-named nodes
    struct Graph {
        edges: HashMap<&'static str, Vec<&'static str>>,
        processed: Vec<&'static str>,
    }
    impl Graph {
        fn new(edges: &[(&'static str, &[&'static str])]) -> Self {
            let edges = edges.iter().map(|(k, v)| (*k, v.to_vec())).collect();
            Self {
                edges,
                processed: Vec::new(),
            }
        }
    }
    impl DepOrder for Graph {
        type Item = &'static str;
        type Error = Vec<&'static str>;

        fn process(
            &mut self,
            item: &Self::Item,
            orderer: &mut DepOrderer<Self>,
        ) -> Result<(), Self::Error> {
            self.processed.push(*item);
            let deps = self.edges.get(item).cloned().unwrap_or_default();
            for dep in deps.iter() {
                orderer.push(self, dep)?;
            }
            Ok(())
        }
        fn fail(&mut self, cycle: Vec<Self::Item>) -> Result<(), Self::Error> {
            Err(cycle)
        }
    }

    #[test]
    fn test_dep_order() {
        let mut g = Graph::new(&[("top", &["a", "b"]), ("a", &["leaf"]), ("b", &["leaf"])]);
        let order = g.order(&["top"]).unwrap();
        assert_eq!(order, vec!["leaf", "a", "b", "top"]);
        // Shared dependencies are processed just once
        assert_eq!(g.processed.iter().filter(|p| **p == "leaf").count(), 1);
    }
    #[test]
    fn test_dep_order_cycle() {
        let mut g = Graph::new(&[("top", &["a"]), ("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let cycle = g.order(&["top"]).unwrap_err();
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
    }
    #[test]
    fn test_dep_order_self_cycle() {
        let mut g = Graph::new(&[("a", &["a"])]);
        assert_eq!(g.order(&["a"]).unwrap_err(), vec!["a", "a"]);
    }
}
