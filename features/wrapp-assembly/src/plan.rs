use std::{collections::HashMap, fmt, ops::Range, panic::Location, sync::Arc};

use crate::{
    descriptor::ConstructFn,
    errors::{AccessError, LaunchError},
    extension::graph::{ExtensionRecord, HookEntry},
    ids::{NodeId, ScopeId, SlotId},
    instance::{RunningInstance, SlotAccessor},
    launcher::Launcher,
    scope::ScopeKind,
    types::{Injectable, Key, TypeInfo},
};

/// A node with its inputs resolved to slots
pub(crate) struct PlanNode {
    pub id: NodeId,
    pub scope: ScopeId,
    pub key: Key,
    pub produces: TypeInfo,
    pub output: SlotId,
    pub inputs: Vec<SlotId>,
    pub construct: ConstructFn,
    pub location: &'static Location<'static>,
}

pub(crate) struct PlanScope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub path: String,
    pub parent: Option<ScopeId>,
    /// Slots of the scope's own nodes
    pub own: Range<SlotId>,
    /// Slots of the scope and all of its descendants
    pub subtree: Range<SlotId>,
    pub keys: HashMap<Key, NodeId>,
}

pub(crate) struct PlanInner {
    pub nodes: Vec<PlanNode>,
    pub order: Vec<NodeId>,
    pub scopes: Vec<PlanScope>,
    pub pool_size: usize,
    pub extensions: Vec<ExtensionRecord>,
    /// Already in the order they run, last activated extension first
    pub hooks: Vec<HookEntry>,
}

/// An immutable construction plan
///
/// Computed once per assembly, it can be launched any number of times, from any thread.
#[derive(Clone)]
pub struct Plan(pub(crate) Arc<PlanInner>);
impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("pool_size", &self.0.pool_size)
            .field("nodes", &self.0.nodes.len())
            .field("scopes", &self.0.scopes.len())
            .field("extensions", &self.0.extensions.len())
            .finish()
    }
}

impl Plan {
    /// Populates a fresh pool, see [`Launcher`]
    pub fn launch(&self) -> Result<RunningInstance, LaunchError> {
        Launcher::new(self).run()
    }

    /// Construction order, every node comes after the nodes it depends on
    pub fn order(&self) -> &[NodeId] {
        &self.0.order
    }

    pub fn pool_size(&self) -> usize {
        self.0.pool_size
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::new(0)
    }

    pub fn extensions(&self) -> &[ExtensionRecord] {
        &self.0.extensions
    }

    pub fn slot_of(&self, node: NodeId) -> Option<SlotId> {
        self.0.nodes.get(node.index()).map(|node| node.output)
    }

    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.0.nodes.get(node.index()).map(|node| node.scope)
    }

    /// The scope's own slots and the slots of its whole subtree
    pub fn slot_range(&self, scope: ScopeId) -> Option<(Range<SlotId>, Range<SlotId>)> {
        self.0
            .scopes
            .get(scope.index())
            .map(|scope| (scope.own.clone(), scope.subtree.clone()))
    }

    /// Finds the node providing `key` for `scope`, looking at ancestors as well
    pub fn lookup(&self, scope: ScopeId, key: &Key) -> Option<NodeId> {
        let mut current = self.0.scopes.get(scope.index());
        while let Some(scope) = current {
            if let Some(node) = scope.keys.get(key) {
                return Some(*node);
            }
            current = scope.parent.and_then(|parent| self.0.scopes.get(parent.index()));
        }
        None
    }

    /// Creates an accessor bound to the slot of `node`, usable on every instance of this plan
    pub fn accessor<T: Injectable>(&self, node: NodeId) -> Result<SlotAccessor<T>, AccessError> {
        let slot = self.slot_of(node).ok_or(AccessError::UnknownNode(node))?;
        Ok(SlotAccessor::new(self.clone(), node, slot))
    }

    /// Accessor for the bean providing `T` in the root scope
    pub fn accessor_for<T: Injectable>(&self) -> Result<SlotAccessor<T>, AccessError> {
        let key = Key::of::<T>();
        let node = self
            .lookup(self.root(), &key)
            .ok_or(AccessError::Missing(key))?;
        self.accessor(node)
    }

    pub(crate) fn node(&self, node: NodeId) -> Option<&PlanNode> {
        self.0.nodes.get(node.index())
    }

    pub(crate) fn scope_path(&self, scope: ScopeId) -> String {
        match self.0.scopes.get(scope.index()) {
            Some(scope) => scope.path.clone(),
            None => scope.to_string(),
        }
    }

    pub(crate) fn same_as(&self, other: &Plan) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A comparable description of the plan's structure
    pub fn layout(&self) -> PlanLayout {
        PlanLayout {
            pool_size: self.0.pool_size,
            order: self.0.order.clone(),
            nodes: self
                .0
                .nodes
                .iter()
                .map(|node| NodeLayout {
                    node: node.id,
                    scope: node.scope,
                    key: node.key.to_string(),
                    output: node.output,
                    inputs: node.inputs.clone(),
                })
                .collect(),
            scopes: self
                .0
                .scopes
                .iter()
                .map(|scope| ScopeLayout {
                    scope: scope.id,
                    kind: scope.kind,
                    path: scope.path.clone(),
                    parent: scope.parent,
                    own: scope.own.clone(),
                    subtree: scope.subtree.clone(),
                })
                .collect(),
            extensions: self
                .0
                .extensions
                .iter()
                .map(|record| (record.extension.type_name, record.scope))
                .collect(),
        }
    }
}

/// Structure of a [`Plan`], without the construct functions
///
/// Two builds of the same assembly produce equal layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLayout {
    pub pool_size: usize,
    pub order: Vec<NodeId>,
    pub nodes: Vec<NodeLayout>,
    pub scopes: Vec<ScopeLayout>,
    /// Extension type and owning scope, in activation order
    pub extensions: Vec<(&'static str, ScopeId)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLayout {
    pub node: NodeId,
    pub scope: ScopeId,
    pub key: String,
    pub output: SlotId,
    pub inputs: Vec<SlotId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeLayout {
    pub scope: ScopeId,
    pub kind: ScopeKind,
    pub path: String,
    pub parent: Option<ScopeId>,
    pub own: Range<SlotId>,
    pub subtree: Range<SlotId>,
}
