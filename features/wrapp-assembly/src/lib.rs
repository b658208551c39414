//! Wrapp Assembly describes an application as a tree of scopes, resolves it once into an
//! immutable construction plan and launches that plan any number of times.
//!
//! Wrapp Assembly is split into three phases:
//! 1. Assembly: scopes, beans and extensions are registered through an [`Assembler`] until
//!    every scope is sealed
//! 2. Resolution: every dependency is resolved to a slot, nodes are ordered and a [`Plan`]
//!    is emitted
//! 3. Launch: the plan is executed against a fresh value pool, producing a [`RunningInstance`]
//!
//! # Examples
//!
//! ```rust
//! use wrapp_assembly::{build, launch, ConstructionDescriptor, DynError, Key};
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! let plan = build(|assembler, root| {
//!     assembler.register_instance(root, "Hello".to_string())?;
//!     assembler.register_bean(
//!         root,
//!         ConstructionDescriptor::new(vec![Key::of::<String>()], |inputs| {
//!             let greeting = inputs[0].downcast_ref::<String>()?;
//!             Ok::<_, DynError>(Greeter {
//!                 greeting: format!("{greeting} world"),
//!             })
//!         }),
//!     )?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! // Every launch gets its own pool
//! let first = launch(&plan).unwrap();
//! let second = launch(&plan).unwrap();
//! assert_eq!(first.require::<Greeter>().unwrap().greeting, "Hello world");
//! assert_eq!(first.shape(), second.shape());
//! ```
//!
//! Wrapp Assembly consists of the following components:
//!
//! 1. Scope - the scope tree, scope states and key lookup
//! 2. Extension - scoped participants in assembly, composed by their own dependency order
//! 3. Dependency Graph - slot allocation, validation and ordering
//! 4. Launcher - executes a plan into a value pool
//! 5. Errors - for everything that can go wrong while building, launching or shutting down

pub mod assembler;
pub mod config;
pub mod descriptor;
pub mod errors;
pub mod extension;
pub mod ids;
pub mod instance;
pub mod launcher;
pub mod plan;
pub mod pool;
pub mod scope;
pub mod types;

mod dependency_graph;
mod node;
mod topo;

pub use assembler::{build, build_with, launch, Assembler, Assembly};
pub use config::AssemblyConfig;
pub use descriptor::{Bean, ConstructFn, ConstructionDescriptor, DescriptorCache};
pub use errors::{
    AccessError, BuildError, ConfigurationError, ConstructionError, CycleError, CycleMember,
    DowncastError, InternalPoolError, LaunchError, ShutdownError, ShutdownFailure,
};
pub use extension::{
    graph::{ExtensionRecord, ShutdownHook},
    Extension, ExtensionHandle, ExtensionKey, ExtensionMetadata, ExtensionRegistry,
    SealContext,
};
pub use ids::{ExtensionId, LocalSlot, NodeId, ScopeId, SlotId};
pub use instance::{RunningInstance, SlotAccessor};
pub use launcher::{LaunchState, Launcher};
pub use plan::{NodeLayout, Plan, PlanLayout, ScopeLayout};
pub use pool::ValuePool;
pub use scope::{ScopeHandle, ScopeKind, ScopeState};
pub use types::{DynError, Injectable, Key, TypeInfo, Value};
