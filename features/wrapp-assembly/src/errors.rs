use std::{panic::Location, sync::Arc};

use thiserror::Error;

use crate::{
    ids::{NodeId, ScopeId, SlotId},
    scope::ScopeKind,
    types::{DynError, Key, TypeInfo},
};

/// Mistakes made while describing the application
///
/// These are always programming errors in the describing layer, they are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Scope '{scope}' is sealed")]
    ScopeSealed { scope: String },
    #[error("Scope '{scope}' is being sealed, no more extensions can be requested")]
    ScopeSealing { scope: String },
    #[error("Scope {0} does not exist")]
    UnknownScope(ScopeId),
    #[error("'{parent}' is a {kind} scope and cannot contain a {child} scope")]
    InvalidParent {
        parent: String,
        kind: ScopeKind,
        child: ScopeKind,
    },
    #[error("A Key has been registered twice in '{scope}': '{key}'")]
    DuplicateKey { key: Key, scope: String },
    #[error("'{required_by}' in '{scope}' needs '{dependency}' but it is missing")]
    MissingDependency {
        dependency: Key,
        required_by: Key,
        scope: String,
    },
    #[error("'{required_by}' in '{scope}' needs '{dependency}' which is only provided by '{provided_in}' - dependencies must come from the same or an enclosing scope")]
    InvalidEdge {
        dependency: Key,
        required_by: Key,
        scope: String,
        provided_in: String,
    },
    #[error("Extension '{extension}' is already present in '{scope}'")]
    DuplicateExtension { extension: TypeInfo, scope: String },
    #[error("Extension '{extension}' in '{scope}' has been finalized")]
    ExtensionFinalized { extension: TypeInfo, scope: String },
    #[error("Extension '{extension}' in '{scope}' inherits from '{ancestor}', which must be sealed first")]
    AncestorExtensionOpen {
        extension: TypeInfo,
        scope: String,
        ancestor: String,
    },
    #[error("Scope '{scope}' was never sealed")]
    UnsealedScope { scope: String },
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// One member of a bean dependency cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleMember {
    pub node: NodeId,
    pub key: Key,
}

/// A dependency cycle, reported in the order it was walked
///
/// The first and the last entry are the same, closing the cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("A circular dependency exists between beans: {}", display_members(.cycle))]
    Beans { cycle: Vec<CycleMember> },
    #[error("A circular dependency exists between extensions: {}", display_types(.cycle))]
    Extensions { cycle: Vec<TypeInfo> },
}

fn display_members(cycle: &[CycleMember]) -> String {
    let chain: Vec<_> = cycle.iter().map(|member| member.key.to_string()).collect();
    chain.join(" -> ")
}

fn display_types(cycle: &[TypeInfo]) -> String {
    let chain: Vec<_> = cycle.iter().map(TypeInfo::to_string).collect();
    chain.join(" -> ")
}

/// A construct function failed while launching
#[derive(Error, Debug, Clone)]
#[error("Construction of '{key}' ({node}) in '{scope_path}' declared at {location} failed - error: {error}")]
pub struct ConstructionError {
    pub node: NodeId,
    pub key: Key,
    pub scope: ScopeId,
    pub scope_path: String,
    pub location: &'static Location<'static>,
    pub error: Arc<DynError>,
}

/// Broken write-once guarantees of a [`ValuePool`](crate::pool::ValuePool)
///
/// A correct plan never produces these, any occurrence is a resolver defect.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalPoolError {
    #[error("Slot {slot} has already been written")]
    AlreadyWritten { slot: SlotId },
    #[error("Slot {slot} was read before it was written")]
    Unwritten { slot: SlotId },
    #[error("Slot {slot} is outside of a pool of size {size}")]
    OutOfBounds { slot: SlotId, size: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
pub struct DowncastError {
    pub required_type: &'static str,
    pub actual_type: &'static str,
}

/// Errors while turning an assembly into a plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Errors while populating a fresh pool from a plan
#[derive(Error, Debug, Clone)]
pub enum LaunchError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error("Internal pool error while constructing {node} in {scope}: {error}")]
    Internal {
        node: NodeId,
        scope: ScopeId,
        #[source]
        error: InternalPoolError,
    },
}

/// Errors when reading values out of a running instance
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// No scope in the chain provides the key
    #[error("No bean provides '{0}'")]
    Missing(Key),
    #[error("{0} is not part of this plan")]
    UnknownNode(NodeId),
    #[error("The accessor was created for a different plan")]
    ForeignPlan,
    #[error(transparent)]
    Downcast(#[from] DowncastError),
    #[error(transparent)]
    Pool(#[from] InternalPoolError),
}

/// A single failed shutdown hook
#[derive(Debug, Clone)]
pub struct ShutdownFailure {
    pub extension: TypeInfo,
    pub scope_path: String,
    pub error: Arc<DynError>,
}

#[derive(Error, Debug, Clone)]
pub struct ShutdownError {
    pub failures: Vec<ShutdownFailure>,
}
impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("One or more shutdown hooks failed:".to_string());
        for failure in &self.failures {
            display.push(format!(
                "- '{}' in '{}': {}",
                failure.extension, failure.scope_path, failure.error
            ));
        }
        f.write_str(&display.join("\n"))
    }
}
