use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use crate::errors::DowncastError;

/// All errors raised by construct functions and hooks
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Plans are launched on whatever thread the host picks,
/// so anything stored in a pool needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// Identifies what a bean provides and what it requires.
///
/// Two beans in the same scope can provide the same type as long as their qualifiers differ.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Key {
    pub type_info: TypeInfo,
    pub qualifier: Option<&'static str>,
}
impl Key {
    pub fn of<T: 'static + ?Sized>() -> Key {
        Key {
            type_info: TypeInfo::of::<T>(),
            qualifier: None,
        }
    }

    pub fn named<T: 'static + ?Sized>(qualifier: &'static str) -> Key {
        Key {
            type_info: TypeInfo::of::<T>(),
            qualifier: Some(qualifier),
        }
    }
}
impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(qualifier) => write!(f, "{}@{}", self.type_info, qualifier),
            None => write!(f, "{}", self.type_info),
        }
    }
}

/// A constructed, type erased value living in a pool slot
#[derive(Clone)]
pub struct Value {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
}
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.info.type_name).finish()
    }
}

impl Value {
    pub fn new<T: Injectable>(instance: T) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    pub fn from_arc<T: Injectable>(instance: Arc<T>) -> Self {
        Value {
            info: TypeInfo::of::<T>(),
            instance,
        }
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, DowncastError> {
        Arc::downcast::<T>(self.instance.clone()).map_err(|_| DowncastError {
            required_type: std::any::type_name::<T>(),
            actual_type: self.info.type_name,
        })
    }

    /// Borrowing variant of [`Value::downcast`]
    pub fn downcast_ref<T: Injectable>(&self) -> Result<&T, DowncastError> {
        self.instance
            .downcast_ref::<T>()
            .ok_or(DowncastError {
                required_type: std::any::type_name::<T>(),
                actual_type: self.info.type_name,
            })
    }

    pub fn is<T: Injectable>(&self) -> bool {
        self.info.type_id == TypeId::of::<T>()
    }
}
