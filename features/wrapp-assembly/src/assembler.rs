use std::any::TypeId;

use crate::{
    config::AssemblyConfig,
    dependency_graph::DependencyGraph,
    descriptor::{Bean, ConstructionDescriptor},
    errors::{BuildError, ConfigurationError, LaunchError},
    extension::{graph::ExtensionGraph, Extension, ExtensionHandle, ExtensionKey},
    ids::{ExtensionId, NodeId, ScopeId},
    instance::RunningInstance,
    plan::Plan,
    scope::{ScopeKind, ScopeState, ScopeTree},
    types::{Injectable, Key},
};

/// A reusable piece of an application description
///
/// Implemented for every closure taking the assembler and the scope to describe.
pub trait Assembly {
    fn assemble(self, assembler: &mut Assembler, scope: ScopeId) -> Result<(), BuildError>;
}
impl<F> Assembly for F
where
    F: FnOnce(&mut Assembler, ScopeId) -> Result<(), BuildError>,
{
    fn assemble(self, assembler: &mut Assembler, scope: ScopeId) -> Result<(), BuildError> {
        self(assembler, scope)
    }
}

/// Describes the shape of one application
///
/// Scopes, beans and extensions are registered here until every scope is sealed,
/// then [`Assembler::finish`] resolves everything into a [`Plan`].
pub struct Assembler {
    config: AssemblyConfig,
    tree: ScopeTree,
    extensions: ExtensionGraph,
}

impl Assembler {
    pub fn new(config: AssemblyConfig) -> Self {
        let tree = ScopeTree::new(&config.name);
        Self {
            config,
            tree,
            extensions: ExtensionGraph::default(),
        }
    }

    /// The application scope
    pub fn root(&self) -> ScopeId {
        self.tree.root()
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    pub fn container(&mut self, parent: ScopeId, name: &str) -> Result<ScopeId, ConfigurationError> {
        self.tree.add_scope(parent, ScopeKind::Container, name)
    }

    /// Adds a leaf scope, which can hold beans but no further scopes
    pub fn bean_scope(&mut self, parent: ScopeId, name: &str) -> Result<ScopeId, ConfigurationError> {
        self.tree.add_scope(parent, ScopeKind::Bean, name)
    }

    /// Runs a reusable assembly against `scope`
    pub fn include(&mut self, scope: ScopeId, assembly: impl Assembly) -> Result<(), BuildError> {
        assembly.assemble(self, scope)
    }

    pub fn register_bean(
        &mut self,
        scope: ScopeId,
        descriptor: ConstructionDescriptor,
    ) -> Result<NodeId, ConfigurationError> {
        self.tree.register(scope, &descriptor)
    }

    /// Registers a bean which describes itself, through the shared descriptor cache
    pub fn register<B: Bean>(&mut self, scope: ScopeId) -> Result<NodeId, ConfigurationError> {
        let descriptor = self.config.descriptors.descriptor::<B>();
        self.tree.register(scope, &descriptor)
    }

    /// Registers an already constructed value, shared by every launch
    #[track_caller]
    pub fn register_instance<T: Injectable>(
        &mut self,
        scope: ScopeId,
        instance: T,
    ) -> Result<NodeId, ConfigurationError> {
        self.register_bean(scope, ConstructionDescriptor::instance(instance))
    }

    /// Returns the extension's instance in `scope`, activating it and its dependencies if needed
    pub fn request_extension<E: Extension>(
        &mut self,
        scope: ScopeId,
    ) -> Result<ExtensionHandle<E>, BuildError> {
        let id = self.request_extension_dyn(scope, ExtensionKey::of::<E>())?;
        Ok(ExtensionHandle::new(id, scope))
    }

    pub fn request_extension_dyn(
        &mut self,
        scope: ScopeId,
        key: ExtensionKey,
    ) -> Result<ExtensionId, BuildError> {
        self.extensions
            .request(&self.tree, &self.config.extensions, scope, key)
    }

    /// Adds an instance created by the caller instead of [`Extension::create`]
    pub fn install_extension<E: Extension>(
        &mut self,
        scope: ScopeId,
        instance: E,
    ) -> Result<ExtensionHandle<E>, BuildError> {
        let id = self.extensions.install(
            &self.tree,
            &self.config.extensions,
            scope,
            ExtensionKey::of::<E>(),
            Box::new(instance),
        )?;
        Ok(ExtensionHandle::new(id, scope))
    }

    pub fn extension<E: Extension>(
        &self,
        handle: ExtensionHandle<E>,
    ) -> Result<&E, ConfigurationError> {
        self.extensions
            .instance(&self.tree, handle.id)?
            .as_any()
            .downcast_ref::<E>()
            .ok_or_else(|| mismatched_handle::<E>(handle.id))
    }

    pub fn extension_mut<E: Extension>(
        &mut self,
        handle: ExtensionHandle<E>,
    ) -> Result<&mut E, ConfigurationError> {
        self.extensions
            .instance_mut(&self.tree, handle.id)?
            .as_any_mut()
            .downcast_mut::<E>()
            .ok_or_else(|| mismatched_handle::<E>(handle.id))
    }

    /// Nearest instance of the same extension type in an ancestor of the handle's scope
    ///
    /// Instances in child scopes are never reachable this way.
    pub fn parent_extension<E: Extension>(
        &self,
        handle: ExtensionHandle<E>,
    ) -> Result<Option<&E>, ConfigurationError> {
        let Some(ancestor) =
            self.extensions
                .nearest_ancestor(&self.tree, handle.scope, TypeId::of::<E>())
        else {
            return Ok(None);
        };

        self.extensions
            .instance(&self.tree, ancestor)?
            .as_any()
            .downcast_ref::<E>()
            .map(Some)
            .ok_or_else(|| mismatched_handle::<E>(ancestor))
    }

    /// Finalizes the scope's extensions and freezes it
    ///
    /// Fails if the scope is already sealed, or if one of its beans has a dependency
    /// which can no longer be satisfied.
    pub fn seal(&mut self, scope: ScopeId) -> Result<(), ConfigurationError> {
        self.extensions.seal(&mut self.tree, scope)
    }

    pub fn state(&self, scope: ScopeId) -> Result<ScopeState, ConfigurationError> {
        Ok(self.tree.get(scope)?.state)
    }

    /// Node providing `key` as seen from `scope`
    pub fn lookup(&self, scope: ScopeId, key: &Key) -> Option<NodeId> {
        self.tree.lookup(scope, key)
    }

    /// Seals what is still open and resolves the assembly into a plan
    pub fn finish(mut self) -> Result<Plan, BuildError> {
        // Parents are always created before their children
        let open: Vec<ScopeId> = self
            .tree
            .scopes()
            .iter()
            .filter(|scope| scope.state == ScopeState::Open)
            .map(|scope| scope.id)
            .collect();

        if let Some(first) = open.first() {
            if !self.config.auto_seal {
                return Err(ConfigurationError::UnsealedScope {
                    scope: self.tree.path(*first),
                }
                .into());
            }
            tracing::debug!("Sealing {} scopes left open", open.len());
        }
        for scope in open {
            self.seal(scope)?;
        }

        let Assembler {
            tree, extensions, ..
        } = self;
        DependencyGraph::new(&tree)?.into_plan(extensions)
    }
}

fn mismatched_handle<E>(id: ExtensionId) -> ConfigurationError {
    ConfigurationError::InvariantViolation(format!(
        "{id} is not an instance of '{}'",
        std::any::type_name::<E>()
    ))
}

/// Describes an application with the default configuration and resolves it into a plan
pub fn build<F>(assembly: F) -> Result<Plan, BuildError>
where
    F: FnOnce(&mut Assembler, ScopeId) -> Result<(), BuildError>,
{
    build_with(AssemblyConfig::default(), assembly)
}

pub fn build_with<F>(config: AssemblyConfig, assembly: F) -> Result<Plan, BuildError>
where
    F: FnOnce(&mut Assembler, ScopeId) -> Result<(), BuildError>,
{
    let mut assembler = Assembler::new(config);
    let root = assembler.root();
    assembler.include(root, assembly)?;
    assembler.finish()
}

/// Populates a fresh pool from `plan`
///
/// May be called any number of times, every call yields an independent instance.
pub fn launch(plan: &Plan) -> Result<RunningInstance, LaunchError> {
    plan.launch()
}
