use std::sync::Arc;

use crate::{
    errors::{ConstructionError, DowncastError, InternalPoolError, LaunchError},
    instance::RunningInstance,
    plan::{Plan, PlanNode},
    pool::ValuePool,
    types::{DynError, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    /// Nothing has been constructed yet
    Planned,
    /// `constructed` nodes of the plan order have been stored
    Building { constructed: usize },
    Built,
    /// A construct function failed, the pool has been discarded
    Aborted,
}

/// Executes a [`Plan`] against a fresh [`ValuePool`]
///
/// Every launch uses its own launcher, so one plan can be launched any number of times,
/// on any number of threads.
pub struct Launcher<'p> {
    plan: &'p Plan,
    state: LaunchState,
    pool: ValuePool,
    failure: Option<LaunchError>,
}

impl<'p> Launcher<'p> {
    pub fn new(plan: &'p Plan) -> Self {
        Self {
            plan,
            state: LaunchState::Planned,
            pool: ValuePool::new(plan.pool_size()),
            failure: None,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    /// The pool as populated so far
    pub fn pool(&self) -> &ValuePool {
        &self.pool
    }

    /// Constructs the next node of the plan order
    ///
    /// On failure the launcher is aborted and the partially populated pool is dropped,
    /// further steps report the same failure.
    pub fn step(&mut self) -> Result<LaunchState, LaunchError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let constructed = match self.state {
            LaunchState::Planned => {
                tracing::debug!(
                    "Launching plan with {} nodes into a pool of {} slots",
                    self.plan.order().len(),
                    self.plan.pool_size()
                );
                0
            }
            LaunchState::Building { constructed } => constructed,
            LaunchState::Built | LaunchState::Aborted => return Ok(self.state),
        };

        let Some(&id) = self.plan.order().get(constructed) else {
            self.state = LaunchState::Built;
            return Ok(self.state);
        };

        let plan = self.plan;
        if let Err(error) = self.construct(&plan.0.nodes[id.index()]) {
            self.state = LaunchState::Aborted;
            self.pool = ValuePool::new(0);
            self.failure = Some(error.clone());
            return Err(error);
        }

        self.state = if constructed + 1 == self.plan.order().len() {
            LaunchState::Built
        } else {
            LaunchState::Building {
                constructed: constructed + 1,
            }
        };
        Ok(self.state)
    }

    /// Runs the remaining plan and hands out the running instance
    pub fn run(mut self) -> Result<RunningInstance, LaunchError> {
        while self.step()? != LaunchState::Built {}

        tracing::debug!("Launched plan, {} slots populated", self.pool.size());
        Ok(RunningInstance::new(self.plan.clone(), self.pool))
    }

    fn construct(&mut self, node: &PlanNode) -> Result<(), LaunchError> {
        let plan = self.plan;
        let internal = |error: InternalPoolError| {
            tracing::error!(
                "Internal pool error while constructing {} in '{}': {error}",
                node.id,
                plan.scope_path(node.scope)
            );
            LaunchError::Internal {
                node: node.id,
                scope: node.scope,
                error,
            }
        };

        let result = {
            let mut inputs = Vec::with_capacity(node.inputs.len());
            for slot in &node.inputs {
                inputs.push(self.pool.read(*slot).map_err(internal)?);
            }
            (node.construct)(&inputs)
        };

        let value = result.and_then(|value| check_produced(node, value));
        let value = match value {
            Ok(value) => value,
            Err(error) => {
                let error = ConstructionError {
                    node: node.id,
                    key: node.key,
                    scope: node.scope,
                    scope_path: plan.scope_path(node.scope),
                    location: node.location,
                    error: Arc::new(error),
                };
                tracing::error!("{error}");
                return Err(error.into());
            }
        };

        tracing::debug!("Constructed '{}' into {}", node.key, node.output);
        self.pool.store(node.output, value).map_err(internal)
    }
}

/// Rejects values of a different type than the node declared
fn check_produced(node: &PlanNode, value: Value) -> Result<Value, DynError> {
    if value.info.type_id == node.produces.type_id {
        return Ok(value);
    }
    Err(Box::new(DowncastError {
        required_type: node.produces.type_name,
        actual_type: value.info.type_name,
    }))
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        assembler::build,
        descriptor::ConstructionDescriptor,
        types::{Key, TypeInfo},
    };

    #[test]
    fn steps_through_the_plan() {
        let plan = build(|assembler, root| {
            assembler.register_bean(root, ConstructionDescriptor::instance(7_u8))?;
            assembler.register_bean(
                root,
                ConstructionDescriptor::new(vec![Key::of::<u8>()], |inputs| {
                    let value = inputs[0].downcast_ref::<u8>()?;
                    Ok::<_, DynError>(u16::from(*value) * 2)
                }),
            )?;
            Ok(())
        })
        .unwrap();

        let mut launcher = Launcher::new(&plan);
        assert_eq!(launcher.state(), LaunchState::Planned);

        // Root scope handle first
        assert_eq!(launcher.step().unwrap(), LaunchState::Building { constructed: 1 });
        assert_eq!(launcher.step().unwrap(), LaunchState::Building { constructed: 2 });
        assert!(launcher.pool().is_written(plan.slot_of(plan.order()[1]).unwrap()));
        assert!(!launcher.pool().is_written(plan.slot_of(plan.order()[2]).unwrap()));
        assert_eq!(launcher.step().unwrap(), LaunchState::Built);

        let instance = launcher.run().unwrap();
        assert_eq!(*instance.require::<u16>().unwrap(), 14);
    }

    #[test]
    fn wrong_produced_type_is_a_construction_error() {
        let plan = build(|assembler, root| {
            let lying = ConstructionDescriptor::from_raw(
                TypeInfo::of::<u32>(),
                Vec::new(),
                Arc::new(|_: &[&Value]| Ok::<_, DynError>(Value::new("not a number"))),
            );
            assembler.register_bean(root, lying)?;
            Ok(())
        })
        .unwrap();

        let Err(LaunchError::Construction(error)) = plan.launch() else {
            panic!("expected a construction error");
        };
        assert_eq!(error.key, Key::of::<u32>());
        assert_eq!(error.scope_path, "app");
        assert!(error.error.to_string().contains("&str"));
    }

    #[test]
    fn failure_aborts_and_discards_pool() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let plan = build(|assembler, root| {
            assembler.register_bean(
                root,
                ConstructionDescriptor::new(Vec::new(), |_| Ok::<_, Infallible>(1_u8)),
            )?;
            assembler.register_bean(
                root,
                ConstructionDescriptor::new(vec![Key::of::<u8>()], |_| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                    Err::<u16, _>("broken")
                }),
            )?;
            Ok(())
        })
        .unwrap();

        let mut launcher = Launcher::new(&plan);
        let error = loop {
            match launcher.step() {
                Ok(LaunchState::Built) => panic!("launch must fail"),
                Ok(_) => {}
                Err(error) => break error,
            }
        };

        assert!(matches!(error, LaunchError::Construction(_)));
        assert_eq!(launcher.state(), LaunchState::Aborted);
        assert_eq!(launcher.pool().size(), 0);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
