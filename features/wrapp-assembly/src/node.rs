use std::{panic::Location, sync::Arc};

use crate::{
    descriptor::{ConstructFn, ConstructionDescriptor},
    ids::{LocalSlot, NodeId, ScopeId},
    types::{Key, TypeInfo},
};

/// One bean's construction, as registered in a scope
///
/// Inputs are still keys at this point, the resolver turns them into slots.
#[derive(Clone)]
pub(crate) struct DependencyNode {
    pub id: NodeId,
    pub owner_scope: ScopeId,
    pub output: LocalSlot,
    pub produces: TypeInfo,
    pub provides: Key,
    pub dependencies: Vec<Key>,
    pub construct: ConstructFn,
    pub location: &'static Location<'static>,
}

impl DependencyNode {
    pub fn new(
        id: NodeId,
        owner_scope: ScopeId,
        output: LocalSlot,
        descriptor: &ConstructionDescriptor,
    ) -> Self {
        Self {
            id,
            owner_scope,
            output,
            produces: descriptor.produces,
            provides: descriptor.provides,
            dependencies: descriptor.dependencies.clone(),
            construct: Arc::clone(&descriptor.construct),
            location: descriptor.location,
        }
    }
}
