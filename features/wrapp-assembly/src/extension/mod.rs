use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    errors::ConfigurationError,
    ids::{ExtensionId, ScopeId},
    types::TypeInfo,
};

pub mod graph;

pub use graph::SealContext;

/// A pluggable participant in assembly
///
/// At most one instance of an extension type exists per scope. Instances are created the
/// first time they are requested in a scope, and finalized when that scope is sealed.
pub trait Extension: Send + 'static {
    /// State handed to instances in child scopes when the extension is inherited
    type Exposed: Clone + Send + 'static;

    /// Creates a new instance, `seed` is the exposed state of the nearest ancestor instance
    /// when the extension is inheritable and such an instance exists
    fn create(seed: Option<Self::Exposed>) -> Self
    where
        Self: Sized;

    fn expose(&self) -> Self::Exposed;

    /// Extensions which are activated in the same scope before this one
    fn dependencies() -> Vec<ExtensionKey>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Whether instances in child scopes are seeded from their ancestor
    fn inheritable() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// Called once while the owning scope is sealed
    ///
    /// May still register beans into the scope and install shutdown hooks.
    fn on_seal(&mut self, cx: &mut SealContext<'_>) -> Result<(), ConfigurationError> {
        let _ = cx;
        Ok(())
    }
}

/// Wrapper Trait for extensions, allowing extensions of different types side by side
pub trait DynExtension: Send {
    fn info(&self) -> TypeInfo;

    fn expose_any(&self) -> Box<dyn Any + Send>;

    fn on_seal(&mut self, cx: &mut SealContext<'_>) -> Result<(), ConfigurationError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
// Impl DynExtension for any Extension
impl<E: Extension> DynExtension for E {
    fn info(&self) -> TypeInfo {
        TypeInfo::of::<E>()
    }

    fn expose_any(&self) -> Box<dyn Any + Send> {
        Box::new(Extension::expose(self))
    }

    fn on_seal(&mut self, cx: &mut SealContext<'_>) -> Result<(), ConfigurationError> {
        // Forward the call to the specific implementation
        Extension::on_seal(self, cx)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type CreateFn = fn(Option<Box<dyn Any + Send>>) -> Box<dyn DynExtension>;

fn create_erased<E: Extension>(seed: Option<Box<dyn Any + Send>>) -> Box<dyn DynExtension> {
    let seed = seed
        .and_then(|seed| seed.downcast::<E::Exposed>().ok())
        .map(|seed| *seed);
    Box::new(E::create(seed))
}

/// Names an extension type without instantiating it
///
/// Compared by type only.
#[derive(Clone, Copy)]
pub struct ExtensionKey {
    pub info: TypeInfo,
    describe: fn() -> ExtensionMetadata,
}
impl ExtensionKey {
    pub fn of<E: Extension>() -> Self {
        ExtensionKey {
            info: TypeInfo::of::<E>(),
            describe: ExtensionMetadata::of::<E>,
        }
    }
}
impl fmt::Debug for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExtensionKey").field(&self.info.type_name).finish()
    }
}
impl PartialEq for ExtensionKey {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
    }
}
impl Eq for ExtensionKey {}
impl Hash for ExtensionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.hash(state);
    }
}

/// What the runtime knows about an extension type
pub struct ExtensionMetadata {
    pub key: ExtensionKey,
    pub dependencies: Vec<ExtensionKey>,
    pub inheritable: bool,
    create: CreateFn,
}
impl fmt::Debug for ExtensionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionMetadata")
            .field("extension", &self.key.info.type_name)
            .field("dependencies", &self.dependencies)
            .field("inheritable", &self.inheritable)
            .finish()
    }
}
impl ExtensionMetadata {
    pub fn of<E: Extension>() -> Self {
        ExtensionMetadata {
            key: ExtensionKey {
                info: TypeInfo::of::<E>(),
                describe: ExtensionMetadata::of::<E>,
            },
            dependencies: E::dependencies(),
            inheritable: E::inheritable(),
            create: create_erased::<E>,
        }
    }

    pub(crate) fn create(&self, seed: Option<Box<dyn Any + Send>>) -> Box<dyn DynExtension> {
        (self.create)(seed)
    }
}

/// Memoizes [`ExtensionMetadata`] per extension type
///
/// Append only, shareable between concurrent assemblies.
#[derive(Default)]
pub struct ExtensionRegistry {
    metadata: DashMap<TypeId, Arc<ExtensionMetadata>>,
}
impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("len", &self.metadata.len())
            .finish()
    }
}
impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self, key: ExtensionKey) -> Arc<ExtensionMetadata> {
        if let Some(existing) = self.metadata.get(&key.info.type_id) {
            return existing.clone();
        }

        self.metadata
            .entry(key.info.type_id)
            .or_insert_with(|| {
                tracing::debug!("Describing extension {}", key.info.type_name);
                Arc::new((key.describe)())
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

/// Typed handle to an extension instance in a scope
pub struct ExtensionHandle<E> {
    pub id: ExtensionId,
    pub scope: ScopeId,
    _marker: PhantomData<fn() -> E>,
}
impl<E> ExtensionHandle<E> {
    pub(crate) fn new(id: ExtensionId, scope: ScopeId) -> Self {
        Self {
            id,
            scope,
            _marker: PhantomData,
        }
    }
}
impl<E> Clone for ExtensionHandle<E> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<E> Copy for ExtensionHandle<E> {}
impl<E> fmt::Debug for ExtensionHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("extension", &std::any::type_name::<E>())
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}
impl<E> PartialEq for ExtensionHandle<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<E> Eq for ExtensionHandle<E> {}
