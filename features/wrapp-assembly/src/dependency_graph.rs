use std::{ops::Range, sync::Arc};

use crate::{
    errors::{BuildError, ConfigurationError, CycleError, CycleMember},
    extension::graph::ExtensionGraph,
    ids::{NodeId, ScopeId, SlotId},
    plan::{Plan, PlanInner, PlanNode, PlanScope},
    scope::{ScopeState, ScopeTree},
    topo,
};

/// Slots assigned to one scope
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScopeSlots {
    own: Range<SlotId>,
    subtree: Range<SlotId>,
}

/// Graph of the entire application
///
/// Resolves every dependency key to a node, lays the nodes out in the pool
/// and orders them for construction.
pub(crate) struct DependencyGraph<'a> {
    tree: &'a ScopeTree,
    slots: Vec<ScopeSlots>,
    /// Nodes each node depends on, indexed by node
    dependencies: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(tree: &'a ScopeTree) -> Result<Self, ConfigurationError> {
        if let Some(open) = tree
            .scopes()
            .iter()
            .find(|scope| scope.state != ScopeState::Sealed)
        {
            return Err(ConfigurationError::UnsealedScope {
                scope: open.path.clone(),
            });
        }

        let slots = allocate(tree);
        verify_slots(tree, &slots)?;

        let mut dependencies = Vec::with_capacity(tree.nodes().len());
        for node in tree.nodes() {
            let mut edges = Vec::with_capacity(node.dependencies.len());
            for dependency in &node.dependencies {
                let provider = tree
                    .resolve_dependency(node, dependency, false)?
                    .ok_or_else(|| {
                        ConfigurationError::InvariantViolation(format!(
                            "'{dependency}' unresolved in a sealed tree"
                        ))
                    })?;
                edges.push(provider.index());
            }
            dependencies.push(edges);
        }

        Ok(Self {
            tree,
            slots,
            dependencies,
        })
    }

    /// Orders the nodes, failing on the first cycle in declaration order
    pub fn order(&self) -> Result<Vec<NodeId>, CycleError> {
        match topo::sort(&self.dependencies) {
            Ok(order) => Ok(order.into_iter().map(NodeId::new).collect()),
            Err(cycle) => {
                let nodes = self.tree.nodes();
                Err(CycleError::Beans {
                    cycle: cycle
                        .into_iter()
                        .map(|index| CycleMember {
                            node: nodes[index].id,
                            key: nodes[index].provides,
                        })
                        .collect(),
                })
            }
        }
    }

    fn output_of(&self, node: usize) -> SlotId {
        let node = &self.tree.nodes()[node];
        let base = self.slots[node.owner_scope.index()].own.start.index();
        SlotId::offset(base, node.output)
    }

    pub fn into_plan(self, extensions: ExtensionGraph) -> Result<Plan, BuildError> {
        let order = self.order()?;

        let nodes = self
            .tree
            .nodes()
            .iter()
            .enumerate()
            .map(|(index, node)| PlanNode {
                id: node.id,
                scope: node.owner_scope,
                key: node.provides,
                produces: node.produces,
                output: self.output_of(index),
                inputs: self.dependencies[index]
                    .iter()
                    .map(|dependency| self.output_of(*dependency))
                    .collect(),
                construct: Arc::clone(&node.construct),
                location: node.location,
            })
            .collect();

        let scopes = self
            .tree
            .scopes()
            .iter()
            .zip(&self.slots)
            .map(|(scope, slots)| PlanScope {
                id: scope.id,
                kind: scope.kind,
                path: scope.path.clone(),
                parent: scope.parent,
                own: slots.own.clone(),
                subtree: slots.subtree.clone(),
                keys: scope.keys.clone(),
            })
            .collect();

        let (records, mut hooks) = extensions.into_parts();
        // Stable, so hooks of one extension keep their install order before being reversed
        hooks.sort_by_key(|hook| hook.activation);
        hooks.reverse();

        let pool_size = self
            .slots
            .first()
            .map(|root| root.subtree.end.index())
            .unwrap_or(0);

        tracing::debug!(
            "Resolved plan with {} nodes over {} slots in {} scopes",
            self.tree.nodes().len(),
            pool_size,
            self.tree.scopes().len()
        );

        Ok(Plan(Arc::new(PlanInner {
            nodes,
            order,
            scopes,
            pool_size,
            extensions: records,
            hooks,
        })))
    }
}

/// Assigns slot ranges walking the tree in pre-order
///
/// A scope's own nodes come first, followed by the subtrees of its children in creation order.
fn allocate(tree: &ScopeTree) -> Vec<ScopeSlots> {
    enum Visit {
        Enter(ScopeId),
        Leave(ScopeId),
    }

    let empty = ScopeSlots {
        own: SlotId::new(0)..SlotId::new(0),
        subtree: SlotId::new(0)..SlotId::new(0),
    };
    let mut slots = vec![empty; tree.scopes().len()];
    let mut next = 0;

    // Iterative so deep scope nesting can't overflow the stack
    let mut stack = vec![Visit::Enter(tree.root())];
    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(scope) => {
                let entry = &tree.scopes()[scope.index()];
                let start = next;
                next += entry.reserved;
                slots[scope.index()].own = SlotId::new(start)..SlotId::new(next);

                stack.push(Visit::Leave(scope));
                // Reversed, so children are entered in creation order
                stack.extend(entry.children.iter().rev().map(|child| Visit::Enter(*child)));
            }
            Visit::Leave(scope) => {
                let range = &mut slots[scope.index()];
                range.subtree = range.own.start..SlotId::new(next);
            }
        }
    }
    slots
}

/// Re-checks what the allocation promises, nested ranges and no overlapping siblings
fn verify_slots(tree: &ScopeTree, slots: &[ScopeSlots]) -> Result<(), ConfigurationError> {
    for scope in tree.scopes() {
        let range = &slots[scope.id.index()];

        for node in &scope.owned_nodes {
            let output = range.own.start.index() + tree.nodes()[node.index()].output.index();
            if output >= range.own.end.index() {
                return Err(ConfigurationError::InvariantViolation(format!(
                    "{node} of '{}' lies outside of the scope's slots",
                    scope.path
                )));
            }
        }

        let mut previous_end = range.own.end;
        for child in &scope.children {
            let child_range = &slots[child.index()].subtree;
            if child_range.start < previous_end || child_range.end > range.subtree.end {
                return Err(ConfigurationError::InvariantViolation(format!(
                    "slots of '{}' overlap a sibling or escape '{}'",
                    tree.path(*child),
                    scope.path
                )));
            }
            previous_end = child_range.end;
        }
    }
    Ok(())
}
