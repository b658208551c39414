use std::{any::TypeId, fmt, panic::Location, sync::Arc};

use dashmap::DashMap;

use crate::types::{DynError, Injectable, Key, TypeInfo, Value};

/// Type erased construct function
///
/// Receives the values of the required keys, in declaration order.
pub type ConstructFn = Arc<dyn Fn(&[&Value]) -> Result<Value, DynError> + Send + Sync>;

/// Everything the runtime needs to know to construct one bean
///
/// Descriptors are produced outside of the runtime, the runtime never inspects types itself.
#[derive(Clone)]
pub struct ConstructionDescriptor {
    /// The type the construct function returns
    pub produces: TypeInfo,
    /// The key other beans use to require this one
    pub provides: Key,
    /// Required keys, the construct function receives their values in this order
    pub dependencies: Vec<Key>,
    pub construct: ConstructFn,
    pub location: &'static Location<'static>,
}
impl fmt::Debug for ConstructionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructionDescriptor")
            .field("provides", &self.provides)
            .field("dependencies", &self.dependencies)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl ConstructionDescriptor {
    /// Describes a bean of type `T`, built by `construct` from the values of `dependencies`
    #[track_caller]
    pub fn new<T, F, E>(dependencies: Vec<Key>, construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&[&Value]) -> Result<T, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        Self {
            produces: TypeInfo::of::<T>(),
            provides: Key::of::<T>(),
            dependencies,
            construct: Arc::new(move |inputs: &[&Value]| -> Result<Value, DynError> {
                construct(inputs).map(Value::new).map_err(Into::into)
            }),
            location: Location::caller(),
        }
    }

    /// Describes an already existing value
    ///
    /// Every launch shares the same instance.
    #[track_caller]
    pub fn instance<T: Injectable>(instance: T) -> Self {
        let value = Value::new(instance);
        Self {
            produces: value.info,
            provides: Key::of::<T>(),
            dependencies: Vec::new(),
            construct: Arc::new(move |_: &[&Value]| Ok::<_, DynError>(value.clone())),
            location: Location::caller(),
        }
    }

    /// Describes a bean from an already type erased construct function
    #[track_caller]
    pub fn from_raw(produces: TypeInfo, dependencies: Vec<Key>, construct: ConstructFn) -> Self {
        Self {
            produces,
            provides: Key {
                type_info: produces,
                qualifier: None,
            },
            dependencies,
            construct,
            location: Location::caller(),
        }
    }

    /// Provides the bean under a qualified key
    pub fn named(mut self, qualifier: &'static str) -> Self {
        self.provides.qualifier = Some(qualifier);
        self
    }
}

/// A type which knows how it is constructed
pub trait Bean: Injectable {
    /// Produces the descriptor for this type
    ///
    /// Only called once per [`DescriptorCache`].
    fn descriptor() -> ConstructionDescriptor;
}

/// Memoizes descriptors per bean type
///
/// Append only, entries are never invalidated. Share one cache between assemblies
/// by handing the same `Arc` to each [`AssemblyConfig`](crate::config::AssemblyConfig).
#[derive(Default)]
pub struct DescriptorCache {
    descriptors: DashMap<TypeId, Arc<ConstructionDescriptor>>,
}
impl fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("len", &self.descriptors.len())
            .finish()
    }
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor<B: Bean>(&self) -> Arc<ConstructionDescriptor> {
        self.get_or_insert_with(TypeInfo::of::<B>(), B::descriptor)
    }

    /// Returns the cached descriptor for `type_info`, computing it with `describe` on first use
    pub fn get_or_insert_with(
        &self,
        type_info: TypeInfo,
        describe: impl FnOnce() -> ConstructionDescriptor,
    ) -> Arc<ConstructionDescriptor> {
        // Fast path, only takes a shard read lock
        if let Some(existing) = self.descriptors.get(&type_info.type_id) {
            return existing.clone();
        }

        self.descriptors
            .entry(type_info.type_id)
            .or_insert_with(|| {
                tracing::debug!("Describing bean {}", type_info.type_name);
                Arc::new(describe())
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
