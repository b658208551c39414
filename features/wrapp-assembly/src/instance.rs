use std::{
    any::TypeId,
    fmt,
    marker::PhantomData,
    sync::{Arc, OnceLock},
};

use crate::{
    errors::{AccessError, DowncastError, ShutdownError, ShutdownFailure},
    ids::{NodeId, ScopeId, SlotId},
    plan::Plan,
    pool::ValuePool,
    types::{Injectable, Key, TypeInfo, Value},
};

/// A launched application, owning its populated pool
///
/// Values are read-only. Every launch of a plan produces its own instance, nothing is
/// shared between instances except values registered as pre-built instances.
pub struct RunningInstance {
    plan: Plan,
    pool: ValuePool,
}
impl fmt::Debug for RunningInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningInstance")
            .field("plan", &self.plan)
            .field("pool", &self.pool)
            .finish()
    }
}

impl RunningInstance {
    pub(crate) fn new(plan: Plan, pool: ValuePool) -> Self {
        Self { plan, pool }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Type of every slot, equal for all instances of one plan
    pub fn shape(&self) -> Vec<Option<TypeInfo>> {
        self.pool.shape()
    }

    /// Value constructed for `node`
    pub fn get(&self, node: NodeId) -> Result<&Value, AccessError> {
        let slot = self
            .plan
            .slot_of(node)
            .ok_or(AccessError::UnknownNode(node))?;
        Ok(self.pool.read(slot)?)
    }

    /// Requires the bean providing `T` in the application scope
    pub fn require<T: Injectable>(&self) -> Result<Arc<T>, AccessError> {
        self.require_key(self.plan.root(), &Key::of::<T>())
    }

    /// Requires the bean providing `T` as seen from `scope`
    ///
    /// The nearest scope providing it wins, the same way dependencies are resolved.
    pub fn require_in<T: Injectable>(&self, scope: ScopeId) -> Result<Arc<T>, AccessError> {
        self.require_key(scope, &Key::of::<T>())
    }

    pub fn require_key<T: Injectable>(
        &self,
        scope: ScopeId,
        key: &Key,
    ) -> Result<Arc<T>, AccessError> {
        let node = self
            .plan
            .lookup(scope, key)
            .ok_or(AccessError::Missing(*key))?;
        Ok(self.get(node)?.downcast::<T>()?)
    }

    /// Runs the shutdown hooks of all extensions and discards the pool
    ///
    /// Hooks run last activated extension first. A failing hook does not stop the others.
    pub fn shutdown(self) -> Result<(), ShutdownError> {
        let hooks = &self.plan.0.hooks;
        tracing::debug!("Shutting down, running {} hooks", hooks.len());

        let mut failures = Vec::new();
        for entry in hooks {
            if let Err(error) = (entry.hook)(&self) {
                tracing::warn!(
                    "Shutdown hook of '{}' in '{}' failed: {error}",
                    entry.extension,
                    entry.scope_path
                );
                failures.push(ShutdownFailure {
                    extension: entry.extension,
                    scope_path: entry.scope_path.clone(),
                    error: Arc::new(error),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }
}

/// Typed read access to one slot, usable on every instance of the plan it was created for
///
/// The slot's type is checked against the plan on first use, later reads only index the pool.
pub struct SlotAccessor<T> {
    plan: Plan,
    node: NodeId,
    slot: SlotId,
    checked: OnceLock<Result<(), AccessError>>,
    _marker: PhantomData<fn() -> T>,
}
impl<T> fmt::Debug for SlotAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAccessor")
            .field("type", &std::any::type_name::<T>())
            .field("node", &self.node)
            .field("slot", &self.slot)
            .finish()
    }
}

impl<T: Injectable> SlotAccessor<T> {
    pub(crate) fn new(plan: Plan, node: NodeId, slot: SlotId) -> Self {
        Self {
            plan,
            node,
            slot,
            checked: OnceLock::new(),
            _marker: PhantomData,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn get(&self, instance: &RunningInstance) -> Result<Arc<T>, AccessError> {
        if !self.plan.same_as(&instance.plan) {
            return Err(AccessError::ForeignPlan);
        }
        self.checked.get_or_init(|| self.check()).clone()?;
        Ok(instance.pool.read(self.slot)?.downcast::<T>()?)
    }

    fn check(&self) -> Result<(), AccessError> {
        let node = self
            .plan
            .node(self.node)
            .ok_or(AccessError::UnknownNode(self.node))?;
        if node.produces.type_id != TypeId::of::<T>() {
            return Err(DowncastError {
                required_type: std::any::type_name::<T>(),
                actual_type: node.produces.type_name,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{assembler::build, descriptor::ConstructionDescriptor, scope::ScopeHandle};

    fn plan() -> Plan {
        build(|assembler, root| {
            assembler.register_bean(root, ConstructionDescriptor::instance(3_u32))?;
            let child = assembler.container(root, "child")?;
            assembler.register_bean(child, ConstructionDescriptor::instance(4_u32))?;
            assembler.register_bean(
                child,
                ConstructionDescriptor::new(vec![Key::of::<u32>()], |inputs| {
                    Ok::<_, DowncastError>(format!("{}", inputs[0].downcast_ref::<u32>()?))
                }),
            )?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn require_follows_scope_chain() {
        let plan = plan();
        let instance = plan.launch().unwrap();
        let child = ScopeId::new(1);

        assert_eq!(*instance.require::<u32>().unwrap(), 3);
        assert_eq!(*instance.require_in::<u32>(child).unwrap(), 4);
        assert_eq!(*instance.require_in::<String>(child).unwrap(), "4");
        assert_eq!(
            instance.require::<String>().unwrap_err(),
            AccessError::Missing(Key::of::<String>())
        );
        assert_eq!(&*instance.require_in::<ScopeHandle>(child).unwrap().path, "app/child");
    }

    #[test]
    fn accessor_checks_type_once() {
        let plan = plan();
        let node = plan.lookup(plan.root(), &Key::of::<u32>()).unwrap();

        let wrong = plan.accessor::<u64>(node).unwrap();
        let instance = plan.launch().unwrap();
        assert!(matches!(wrong.get(&instance), Err(AccessError::Downcast(_))));

        let right = plan.accessor::<u32>(node).unwrap();
        assert_eq!(*right.get(&instance).unwrap(), 3);
        assert_eq!(*right.get(&plan.launch().unwrap()).unwrap(), 3);
    }

    #[test]
    fn accessor_rejects_other_plans() {
        let first = plan();
        let second = plan();
        let accessor = first.accessor_for::<u32>().unwrap();

        assert_eq!(
            accessor.get(&second.launch().unwrap()).unwrap_err(),
            AccessError::ForeignPlan
        );
    }

    #[test]
    fn shutdown_without_hooks_succeeds() {
        let plan = build(|assembler, root| {
            assembler.register_bean(
                root,
                ConstructionDescriptor::new(Vec::new(), |_| Ok::<_, Infallible>(1_u8)),
            )?;
            Ok(())
        })
        .unwrap();

        let instance = plan.launch().unwrap();
        assert_eq!(instance.shape().len(), plan.pool_size());
        assert!(instance.shutdown().is_ok());
    }
}
