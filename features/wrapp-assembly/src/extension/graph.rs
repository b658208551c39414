use std::{any::TypeId, collections::HashMap, sync::Arc};

use crate::{
    descriptor::ConstructionDescriptor,
    errors::{BuildError, ConfigurationError, CycleError},
    extension::{DynExtension, ExtensionKey, ExtensionMetadata, ExtensionRegistry},
    ids::{ExtensionId, NodeId, ScopeId},
    instance::RunningInstance,
    scope::{ScopeState, ScopeTree},
    topo,
    types::{DynError, Key, TypeInfo},
};

/// Runs when a [`RunningInstance`] is shut down
pub type ShutdownHook = Arc<dyn Fn(&RunningInstance) -> Result<(), DynError> + Send + Sync>;

/// A shutdown hook together with the extension which installed it
#[derive(Clone)]
pub(crate) struct HookEntry {
    pub extension: TypeInfo,
    pub scope: ScopeId,
    pub scope_path: String,
    pub activation: ExtensionId,
    pub hook: ShutdownHook,
}

/// An activated extension
///
/// Ids are handed out in activation order, so comparing ids compares activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub id: ExtensionId,
    pub extension: TypeInfo,
    pub scope: ScopeId,
    /// The ancestor instance this one was seeded from
    pub inherited_from: Option<ExtensionId>,
}

struct ExtensionNode {
    record: ExtensionRecord,
    /// Only taken out while the instance is being finalized
    instance: Option<Box<dyn DynExtension>>,
    finalized: bool,
}

/// Extension instances of an assembly, mirroring the scope tree
#[derive(Default)]
pub(crate) struct ExtensionGraph {
    nodes: Vec<ExtensionNode>,
    by_scope: HashMap<(ScopeId, TypeId), ExtensionId>,
    hooks: Vec<HookEntry>,
}

impl ExtensionGraph {
    pub fn find(&self, scope: ScopeId, type_id: TypeId) -> Option<ExtensionId> {
        self.by_scope.get(&(scope, type_id)).copied()
    }

    /// Nearest strict ancestor of `scope` holding an instance of the type
    pub fn nearest_ancestor(
        &self,
        tree: &ScopeTree,
        scope: ScopeId,
        type_id: TypeId,
    ) -> Option<ExtensionId> {
        tree.chain(scope)
            .skip(1)
            .find_map(|ancestor| self.find(ancestor.id, type_id))
    }

    pub fn record(&self, id: ExtensionId) -> Option<&ExtensionRecord> {
        self.nodes.get(id.index()).map(|node| &node.record)
    }

    /// Returns the instance of `key` in `scope`, activating it and its dependencies if needed
    pub fn request(
        &mut self,
        tree: &ScopeTree,
        registry: &ExtensionRegistry,
        scope: ScopeId,
        key: ExtensionKey,
    ) -> Result<ExtensionId, BuildError> {
        if let Some(existing) = self.find(scope, key.info.type_id) {
            return Ok(existing);
        }
        ensure_open(tree, scope)?;

        for metadata in activation_order(registry, key)? {
            if self.find(scope, metadata.key.info.type_id).is_none() {
                self.activate(tree, scope, metadata, None);
            }
        }

        self.find(scope, key.info.type_id).ok_or_else(|| {
            ConfigurationError::InvariantViolation(format!(
                "'{}' missing after activation",
                key.info
            ))
            .into()
        })
    }

    /// Adds an already created instance, activating its dependencies first
    pub fn install(
        &mut self,
        tree: &ScopeTree,
        registry: &ExtensionRegistry,
        scope: ScopeId,
        key: ExtensionKey,
        instance: Box<dyn DynExtension>,
    ) -> Result<ExtensionId, BuildError> {
        if self.find(scope, key.info.type_id).is_some() {
            return Err(ConfigurationError::DuplicateExtension {
                extension: key.info,
                scope: tree.path(scope),
            }
            .into());
        }
        ensure_open(tree, scope)?;

        let mut order = activation_order(registry, key)?;
        // The installed extension itself is always last, everything else is a dependency
        let metadata = order.pop().ok_or_else(|| {
            ConfigurationError::InvariantViolation(format!("no activation order for '{}'", key.info))
        })?;
        for dependency in order {
            if self.find(scope, dependency.key.info.type_id).is_none() {
                self.activate(tree, scope, dependency, None);
            }
        }

        Ok(self.activate(tree, scope, metadata, Some(instance)))
    }

    fn activate(
        &mut self,
        tree: &ScopeTree,
        scope: ScopeId,
        metadata: Arc<ExtensionMetadata>,
        preset: Option<Box<dyn DynExtension>>,
    ) -> ExtensionId {
        let id = ExtensionId::new(self.nodes.len());
        let info = metadata.key.info;

        let (instance, inherited_from) = match preset {
            Some(instance) => (instance, None),
            None => {
                let inherited_from = metadata
                    .inheritable
                    .then(|| self.nearest_ancestor(tree, scope, info.type_id))
                    .flatten();
                let seed = inherited_from
                    .and_then(|ancestor| self.nodes[ancestor.index()].instance.as_ref())
                    .map(|ancestor| ancestor.expose_any());
                (metadata.create(seed), inherited_from)
            }
        };

        match inherited_from {
            Some(ancestor) => tracing::debug!(
                "Activated extension {info} in '{}' as {id}, inherited from {ancestor}",
                tree.path(scope)
            ),
            None => tracing::debug!("Activated extension {info} in '{}' as {id}", tree.path(scope)),
        }

        self.nodes.push(ExtensionNode {
            record: ExtensionRecord {
                id,
                extension: info,
                scope,
                inherited_from,
            },
            instance: Some(instance),
            finalized: false,
        });
        self.by_scope.insert((scope, info.type_id), id);
        id
    }

    pub fn instance(
        &self,
        tree: &ScopeTree,
        id: ExtensionId,
    ) -> Result<&(dyn DynExtension + 'static), ConfigurationError> {
        let node = self.live_node(tree, id)?;
        node.instance
            .as_deref()
            .ok_or_else(|| finalized_error(tree, &node.record))
    }

    pub fn instance_mut(
        &mut self,
        tree: &ScopeTree,
        id: ExtensionId,
    ) -> Result<&mut (dyn DynExtension + 'static), ConfigurationError> {
        self.live_node(tree, id)?;
        let node = &mut self.nodes[id.index()];
        match node.instance.as_deref_mut() {
            Some(instance) => Ok(instance),
            None => Err(finalized_error(tree, &node.record)),
        }
    }

    fn live_node(&self, tree: &ScopeTree, id: ExtensionId) -> Result<&ExtensionNode, ConfigurationError> {
        let node = self.nodes.get(id.index()).ok_or_else(|| {
            ConfigurationError::InvariantViolation(format!("{id} does not exist"))
        })?;
        if node.finalized {
            return Err(finalized_error(tree, &node.record));
        }
        Ok(node)
    }

    /// Seals a scope, finalizing its extensions last activated first
    ///
    /// The scope ends up sealed even if a finalizer fails.
    pub fn seal(&mut self, tree: &mut ScopeTree, scope: ScopeId) -> Result<(), ConfigurationError> {
        let entry = tree.get(scope)?;
        if entry.state != ScopeState::Open {
            return Err(ConfigurationError::ScopeSealed {
                scope: entry.path.clone(),
            });
        }

        let owned: Vec<ExtensionId> = self
            .nodes
            .iter()
            .filter(|node| node.record.scope == scope)
            .map(|node| node.record.id)
            .collect();

        // Inherited instances finalize no earlier than the instance they were seeded from
        for id in &owned {
            let record = &self.nodes[id.index()].record;
            let Some(ancestor) = record.inherited_from else {
                continue;
            };
            let ancestor = &self.nodes[ancestor.index()];
            if !ancestor.finalized {
                return Err(ConfigurationError::AncestorExtensionOpen {
                    extension: record.extension,
                    scope: tree.path(scope),
                    ancestor: tree.path(ancestor.record.scope),
                });
            }
        }

        tree.set_state(scope, ScopeState::Sealing)?;
        let finalized = self.finalize(tree, scope, &owned);
        tree.set_state(scope, ScopeState::Sealed)?;
        finalized?;

        tree.check_edges(scope)
    }

    fn finalize(
        &mut self,
        tree: &mut ScopeTree,
        scope: ScopeId,
        owned: &[ExtensionId],
    ) -> Result<(), ConfigurationError> {
        for &id in owned.iter().rev() {
            let node = &mut self.nodes[id.index()];
            let extension = node.record.extension;
            let Some(mut instance) = node.instance.take() else {
                continue;
            };

            tracing::debug!("Finalizing extension {extension} in '{}'", tree.path(scope));
            let mut cx = SealContext {
                tree: &mut *tree,
                scope,
                extension,
                activation: id,
                hooks: &mut self.hooks,
            };
            let result = instance.on_seal(&mut cx);

            let node = &mut self.nodes[id.index()];
            node.instance = Some(instance);
            node.finalized = true;
            result?;
        }
        Ok(())
    }

    /// Activation records and installed hooks, consumed when the plan is emitted
    pub fn into_parts(self) -> (Vec<ExtensionRecord>, Vec<HookEntry>) {
        let records = self.nodes.into_iter().map(|node| node.record).collect();
        (records, self.hooks)
    }
}

fn ensure_open(tree: &ScopeTree, scope: ScopeId) -> Result<(), ConfigurationError> {
    let entry = tree.get(scope)?;
    match entry.state {
        ScopeState::Open => Ok(()),
        ScopeState::Sealing => Err(ConfigurationError::ScopeSealing {
            scope: entry.path.clone(),
        }),
        ScopeState::Sealed => Err(ConfigurationError::ScopeSealed {
            scope: entry.path.clone(),
        }),
    }
}

fn finalized_error(tree: &ScopeTree, record: &ExtensionRecord) -> ConfigurationError {
    ConfigurationError::ExtensionFinalized {
        extension: record.extension,
        scope: tree.path(record.scope),
    }
}

/// Orders `key` and everything it transitively depends on, dependencies first
///
/// Vertices are numbered in discovery order, starting with `key` and following the
/// declared dependencies, so ties resolve the same way on every run.
fn activation_order(
    registry: &ExtensionRegistry,
    key: ExtensionKey,
) -> Result<Vec<Arc<ExtensionMetadata>>, CycleError> {
    let mut vertices = vec![registry.metadata(key)];
    let mut index: HashMap<TypeId, usize> = HashMap::from([(key.info.type_id, 0)]);
    let mut dependencies: Vec<Vec<usize>> = Vec::new();

    let mut next = 0;
    while next < vertices.len() {
        let metadata = vertices[next].clone();
        let mut edges = Vec::with_capacity(metadata.dependencies.len());
        for dependency in &metadata.dependencies {
            let vertex = *index.entry(dependency.info.type_id).or_insert_with(|| {
                vertices.push(registry.metadata(*dependency));
                vertices.len() - 1
            });
            edges.push(vertex);
        }
        dependencies.push(edges);
        next += 1;
    }

    match topo::sort(&dependencies) {
        Ok(order) => Ok(order.into_iter().map(|v| vertices[v].clone()).collect()),
        Err(cycle) => Err(CycleError::Extensions {
            cycle: cycle.into_iter().map(|v| vertices[v].key.info).collect(),
        }),
    }
}

/// Access to the scope being sealed, handed to [`Extension::on_seal`](super::Extension::on_seal)
pub struct SealContext<'a> {
    tree: &'a mut ScopeTree,
    scope: ScopeId,
    extension: TypeInfo,
    activation: ExtensionId,
    hooks: &'a mut Vec<HookEntry>,
}
impl SealContext<'_> {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn scope_path(&self) -> String {
        self.tree.path(self.scope)
    }

    /// Registers a bean into the scope being sealed
    pub fn register_bean(
        &mut self,
        descriptor: ConstructionDescriptor,
    ) -> Result<NodeId, ConfigurationError> {
        self.tree.register(self.scope, &descriptor)
    }

    /// Finds the node providing `key` for this scope
    pub fn lookup(&self, key: &Key) -> Option<NodeId> {
        self.tree.lookup(self.scope, key)
    }

    /// Installs a hook which runs when an instance of the application shuts down
    ///
    /// Hooks run last activated extension first, and within one extension last installed first.
    pub fn on_shutdown<F>(&mut self, hook: F)
    where
        F: Fn(&RunningInstance) -> Result<(), DynError> + Send + Sync + 'static,
    {
        self.hooks.push(HookEntry {
            extension: self.extension,
            scope: self.scope,
            scope_path: self.tree.path(self.scope),
            activation: self.activation,
            hook: Arc::new(hook),
        });
    }
}
