use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    descriptor::ConstructionDescriptor,
    errors::ConfigurationError,
    ids::{LocalSlot, NodeId, ScopeId},
    node::DependencyNode,
    types::Key,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// The root of the tree, exactly one per assembly
    Application,
    Container,
    /// A leaf scope grouping beans which belong to a single bean
    Bean,
}
impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScopeKind::Application => "application",
            ScopeKind::Container => "container",
            ScopeKind::Bean => "bean",
        })
    }
}
impl ScopeKind {
    /// Whether the scope owns a [`ScopeHandle`] at the start of its slot range
    pub fn has_lifetime_object(self) -> bool {
        !matches!(self, ScopeKind::Bean)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Open,
    /// Extensions are being finalized, they may still add beans
    Sealing,
    Sealed,
}

/// Runtime object of an application or container scope
///
/// Beans can require it with `Key::of::<ScopeHandle>()` to learn which scope they live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeHandle {
    pub scope: ScopeId,
    pub kind: ScopeKind,
    pub name: Arc<str>,
    pub path: Arc<str>,
}

pub(crate) struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    /// Names from the root down, joined with '/'
    pub path: String,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub owned_nodes: Vec<NodeId>,
    /// Lookup table from provided key to the providing node
    pub keys: HashMap<Key, NodeId>,
    /// Number of local slots handed out so far
    pub reserved: usize,
    pub state: ScopeState,
}

/// Every scope and node of one assembly
pub(crate) struct ScopeTree {
    scopes: Vec<Scope>,
    nodes: Vec<DependencyNode>,
}

impl ScopeTree {
    /// Creates a tree holding only the application scope
    pub fn new(name: &str) -> Self {
        let mut tree = ScopeTree {
            scopes: Vec::new(),
            nodes: Vec::new(),
        };
        tree.push_scope(None, ScopeKind::Application, name);
        tree
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::new(0)
    }

    pub fn get(&self, scope: ScopeId) -> Result<&Scope, ConfigurationError> {
        self.scopes
            .get(scope.index())
            .ok_or(ConfigurationError::UnknownScope(scope))
    }

    fn get_mut(&mut self, scope: ScopeId) -> Result<&mut Scope, ConfigurationError> {
        self.scopes
            .get_mut(scope.index())
            .ok_or(ConfigurationError::UnknownScope(scope))
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn path(&self, scope: ScopeId) -> String {
        match self.scopes.get(scope.index()) {
            Some(scope) => scope.path.clone(),
            None => scope.to_string(),
        }
    }

    /// The scope followed by all of its ancestors, nearest first
    pub fn chain(&self, scope: ScopeId) -> impl Iterator<Item = &Scope> + '_ {
        std::iter::successors(self.scopes.get(scope.index()), |scope| {
            scope.parent.map(|parent| &self.scopes[parent.index()])
        })
    }

    pub fn is_ancestor(&self, ancestor: ScopeId, of: ScopeId) -> bool {
        self.chain(of).skip(1).any(|scope| scope.id == ancestor)
    }

    pub fn add_scope(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        name: &str,
    ) -> Result<ScopeId, ConfigurationError> {
        let parent_scope = self.ensure_configurable(parent)?;
        if parent_scope.kind == ScopeKind::Bean || kind == ScopeKind::Application {
            return Err(ConfigurationError::InvalidParent {
                parent: parent_scope.path.clone(),
                kind: parent_scope.kind,
                child: kind,
            });
        }

        let id = self.push_scope(Some(parent), kind, name);
        self.scopes[parent.index()].children.push(id);
        Ok(id)
    }

    fn push_scope(&mut self, parent: Option<ScopeId>, kind: ScopeKind, name: &str) -> ScopeId {
        let id = ScopeId::new(self.scopes.len());
        let path = match parent {
            Some(parent) => format!("{}/{}", self.scopes[parent.index()].path, name),
            None => name.to_string(),
        };
        tracing::debug!("Created {kind} scope '{path}' ({id})");

        self.scopes.push(Scope {
            id,
            kind,
            name: name.to_string(),
            path: path.clone(),
            parent,
            children: Vec::new(),
            owned_nodes: Vec::new(),
            keys: HashMap::new(),
            reserved: 0,
            state: ScopeState::Open,
        });

        if kind.has_lifetime_object() {
            let handle = ScopeHandle {
                scope: id,
                kind,
                name: Arc::from(name),
                path: Arc::from(path),
            };
            let descriptor = ConstructionDescriptor::new(Vec::new(), move |_| {
                Ok::<_, std::convert::Infallible>(handle.clone())
            });
            // A fresh scope is open and has no keys yet, so this can't fail
            let registered = self.register(id, &descriptor);
            debug_assert!(registered.is_ok(), "lifetime object must register");
        }

        id
    }

    /// Fails if the scope no longer accepts registrations
    fn ensure_configurable(&self, scope: ScopeId) -> Result<&Scope, ConfigurationError> {
        let entry = self.get(scope)?;
        match entry.state {
            ScopeState::Open | ScopeState::Sealing => Ok(entry),
            ScopeState::Sealed => Err(ConfigurationError::ScopeSealed {
                scope: entry.path.clone(),
            }),
        }
    }

    /// Hands out the next local slot of a scope
    pub fn reserve(&mut self, scope: ScopeId) -> Result<LocalSlot, ConfigurationError> {
        self.ensure_configurable(scope)?;
        let entry = self.get_mut(scope)?;
        let slot = LocalSlot::new(entry.reserved);
        entry.reserved += 1;
        Ok(slot)
    }

    pub fn register(
        &mut self,
        scope: ScopeId,
        descriptor: &ConstructionDescriptor,
    ) -> Result<NodeId, ConfigurationError> {
        let entry = self.ensure_configurable(scope)?;
        if entry.keys.contains_key(&descriptor.provides) {
            return Err(ConfigurationError::DuplicateKey {
                key: descriptor.provides,
                scope: entry.path.clone(),
            });
        }

        let output = self.reserve(scope)?;
        let id = NodeId::new(self.nodes.len());
        self.nodes
            .push(DependencyNode::new(id, scope, output, descriptor));

        let entry = self.get_mut(scope)?;
        entry.owned_nodes.push(id);
        entry.keys.insert(descriptor.provides, id);
        tracing::debug!(
            "Registered '{}' in '{}' as {id} with {} dependencies",
            descriptor.provides,
            entry.path,
            descriptor.dependencies.len()
        );

        Ok(id)
    }

    /// Finds the node providing `key`, looking at the scope first and then its ancestors
    pub fn lookup(&self, scope: ScopeId, key: &Key) -> Option<NodeId> {
        self.chain(scope)
            .find_map(|scope| scope.keys.get(key).copied())
    }

    /// Any scope providing `key`, in creation order
    fn provider_anywhere(&self, key: &Key) -> Option<&Scope> {
        self.scopes.iter().find(|scope| scope.keys.contains_key(key))
    }

    /// Resolves one dependency of a node, reporting why it can't be resolved
    ///
    /// Returns `Ok(None)` when the key may still be registered by an open ancestor.
    pub fn resolve_dependency(
        &self,
        node: &DependencyNode,
        dependency: &Key,
        allow_pending: bool,
    ) -> Result<Option<NodeId>, ConfigurationError> {
        if let Some(found) = self.lookup(node.owner_scope, dependency) {
            return Ok(Some(found));
        }

        // An open ancestor may still provide the key, whatever other scopes hold
        let ancestors_open = self
            .chain(node.owner_scope)
            .skip(1)
            .any(|ancestor| ancestor.state != ScopeState::Sealed);
        if allow_pending && ancestors_open {
            return Ok(None);
        }

        let scope = self.path(node.owner_scope);
        if let Some(elsewhere) = self.provider_anywhere(dependency) {
            return Err(ConfigurationError::InvalidEdge {
                dependency: *dependency,
                required_by: node.provides,
                scope,
                provided_in: elsewhere.path.clone(),
            });
        }

        Err(ConfigurationError::MissingDependency {
            dependency: *dependency,
            required_by: node.provides,
            scope,
        })
    }

    /// Checks every dependency of the scope's own nodes which can already be decided
    pub fn check_edges(&self, scope: ScopeId) -> Result<(), ConfigurationError> {
        for node_id in &self.get(scope)?.owned_nodes {
            let node = &self.nodes[node_id.index()];
            for dependency in &node.dependencies {
                self.resolve_dependency(node, dependency, true)?;
            }
        }
        Ok(())
    }

    pub fn set_state(&mut self, scope: ScopeId, state: ScopeState) -> Result<(), ConfigurationError> {
        let entry = self.get_mut(scope)?;
        tracing::debug!("Scope '{}' is now {state:?}", entry.path);
        entry.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use pretty_assertions::assert_eq;

    use super::*;

    fn bean<T: crate::types::Injectable + Default>(deps: Vec<Key>) -> ConstructionDescriptor {
        ConstructionDescriptor::new(deps, |_| Ok::<_, Infallible>(T::default()))
    }

    #[test]
    fn lifetime_object_takes_first_slot() {
        let mut tree = ScopeTree::new("app");
        let root = tree.root();
        let child = tree.add_scope(root, ScopeKind::Container, "child").unwrap();
        let beans = tree.add_scope(child, ScopeKind::Bean, "beans").unwrap();

        for scope in [root, child] {
            let entry = tree.get(scope).unwrap();
            let first = &tree.nodes()[entry.owned_nodes[0].index()];
            assert_eq!(first.output, LocalSlot::new(0));
            assert_eq!(first.provides, Key::of::<ScopeHandle>());
        }
        assert!(tree.get(beans).unwrap().owned_nodes.is_empty());
        assert_eq!(tree.path(beans), "app/child/beans");
    }

    #[test]
    fn bean_scopes_are_leaves() {
        let mut tree = ScopeTree::new("app");
        let beans = tree.add_scope(tree.root(), ScopeKind::Bean, "b").unwrap();
        let err = tree.add_scope(beans, ScopeKind::Container, "c").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidParent {
                parent: "app/b".into(),
                kind: ScopeKind::Bean,
                child: ScopeKind::Container,
            }
        );

        let err = tree
            .add_scope(tree.root(), ScopeKind::Application, "nested")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidParent { .. }));
    }

    #[test]
    fn duplicate_key_leaves_scope_unchanged() {
        let mut tree = ScopeTree::new("app");
        let root = tree.root();
        tree.register(root, &bean::<u8>(vec![])).unwrap();
        let reserved = tree.get(root).unwrap().reserved;

        let err = tree.register(root, &bean::<u8>(vec![])).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateKey { .. }));
        assert_eq!(tree.get(root).unwrap().reserved, reserved);

        // A qualifier makes it a different key
        tree.register(root, &bean::<u8>(vec![]).named("other")).unwrap();
    }

    #[test]
    fn nearest_scope_wins_lookup() {
        let mut tree = ScopeTree::new("app");
        let root = tree.root();
        let child = tree.add_scope(root, ScopeKind::Container, "child").unwrap();

        let outer = tree.register(root, &bean::<u8>(vec![])).unwrap();
        let inner = tree.register(child, &bean::<u8>(vec![])).unwrap();

        assert_eq!(tree.lookup(child, &Key::of::<u8>()), Some(inner));
        assert_eq!(tree.lookup(root, &Key::of::<u8>()), Some(outer));
    }

    #[test]
    fn sideways_dependency_is_an_invalid_edge() {
        let mut tree = ScopeTree::new("app");
        let root = tree.root();
        let left = tree.add_scope(root, ScopeKind::Container, "left").unwrap();
        let right = tree.add_scope(root, ScopeKind::Container, "right").unwrap();

        tree.register(left, &bean::<u8>(vec![])).unwrap();
        tree.register(right, &bean::<u16>(vec![Key::of::<u8>()])).unwrap();

        // The open root may still provide its own u8
        assert_eq!(tree.check_edges(right), Ok(()));

        tree.set_state(root, ScopeState::Sealed).unwrap();
        let err = tree.check_edges(right).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidEdge {
                dependency: Key::of::<u8>(),
                required_by: Key::of::<u16>(),
                scope: "app/right".into(),
                provided_in: "app/left".into(),
            }
        );
    }

    #[test]
    fn missing_dependency_waits_for_open_ancestors() {
        let mut tree = ScopeTree::new("app");
        let root = tree.root();
        let child = tree.add_scope(root, ScopeKind::Container, "child").unwrap();
        tree.register(child, &bean::<u16>(vec![Key::of::<u8>()])).unwrap();

        // The root may still register a u8
        assert_eq!(tree.check_edges(child), Ok(()));

        tree.set_state(root, ScopeState::Sealed).unwrap();
        let err = tree.check_edges(child).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingDependency { .. }));
    }

    #[test]
    fn open_ancestor_provides_key_held_by_sibling() {
        let mut tree = ScopeTree::new("app");
        let root = tree.root();
        let left = tree.add_scope(root, ScopeKind::Container, "left").unwrap();
        let right = tree.add_scope(root, ScopeKind::Container, "right").unwrap();

        tree.register(left, &bean::<u8>(vec![])).unwrap();
        let needs = tree.register(right, &bean::<u16>(vec![Key::of::<u8>()])).unwrap();
        assert_eq!(tree.check_edges(right), Ok(()));

        let provided = tree.register(root, &bean::<u8>(vec![])).unwrap();
        tree.set_state(root, ScopeState::Sealed).unwrap();
        assert_eq!(tree.check_edges(right), Ok(()));

        let node = &tree.nodes()[needs.index()];
        assert_eq!(
            tree.resolve_dependency(node, &Key::of::<u8>(), false),
            Ok(Some(provided))
        );
    }

    #[test]
    fn sealed_scope_rejects_registration() {
        let mut tree = ScopeTree::new("app");
        let root = tree.root();
        tree.set_state(root, ScopeState::Sealed).unwrap();

        let before = tree.nodes().len();
        assert_eq!(
            tree.register(root, &bean::<u8>(vec![])),
            Err(ConfigurationError::ScopeSealed { scope: "app".into() })
        );
        assert!(tree.reserve(root).is_err());
        assert!(tree.add_scope(root, ScopeKind::Container, "late").is_err());
        assert_eq!(tree.nodes().len(), before);
    }
}
