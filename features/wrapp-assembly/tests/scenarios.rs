mod common;

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use pretty_assertions::assert_eq;
use wrapp_assembly::{
    build, launch, Assembler, AssemblyConfig, BuildError, ConfigurationError, ConstructionDescriptor,
    CycleError, DynError, Extension, Key, LaunchError, LaunchState, Launcher, NodeId,
};

#[derive(Debug, PartialEq)]
struct A;
#[derive(Debug, PartialEq)]
struct B;

#[test]
fn dependent_bean_is_constructed_after_its_dependency() {
    common::init_tracing();
    let mut ids = Vec::new();
    let plan = build(|assembler, root| {
        ids.push(assembler.register_bean(
            root,
            ConstructionDescriptor::new(Vec::new(), |_| Ok::<_, Infallible>(A)),
        )?);
        ids.push(assembler.register_bean(
            root,
            ConstructionDescriptor::new(vec![Key::of::<A>()], |inputs| {
                inputs[0].downcast_ref::<A>()?;
                Ok::<_, DynError>(B)
            }),
        )?);
        Ok(())
    })
    .unwrap();

    let (a, b) = (ids[0], ids[1]);
    let beans: Vec<NodeId> = plan
        .order()
        .iter()
        .copied()
        .filter(|node| ids.contains(node))
        .collect();
    assert_eq!(beans, vec![a, b]);

    let (a_slot, b_slot) = (plan.slot_of(a).unwrap(), plan.slot_of(b).unwrap());
    let mut launcher = Launcher::new(&plan);
    loop {
        let state = launcher.step().unwrap();
        if launcher.pool().is_written(b_slot) {
            assert!(launcher.pool().is_written(a_slot));
        }
        if state == LaunchState::Built {
            break;
        }
    }

    let instance = launcher.run().unwrap();
    assert_eq!(*instance.get(a).unwrap().downcast::<A>().unwrap(), A);
    assert_eq!(*instance.require::<B>().unwrap(), B);
}

#[test]
fn cycle_is_reported_in_declaration_order() {
    common::init_tracing();
    let mut ids = Vec::new();
    let err = build(|assembler, root| {
        for (node, dependency) in [(0, 1), (1, 2), (2, 0)] {
            let calls = Arc::new(AtomicUsize::new(0));
            ids.push(assembler.register_bean(root, common::counted_bean(node, &[dependency], calls))?);
        }
        Ok(())
    })
    .unwrap_err();

    let BuildError::Cycle(CycleError::Beans { cycle }) = err else {
        panic!("expected a bean cycle, got {err}");
    };
    let nodes: Vec<NodeId> = cycle.iter().map(|member| member.node).collect();
    assert_eq!(nodes, vec![ids[0], ids[1], ids[2], ids[0]]);

    let keys: Vec<Key> = cycle.iter().map(|member| member.key).collect();
    assert_eq!(
        keys,
        vec![common::key(0), common::key(1), common::key(2), common::key(0)]
    );
}

#[derive(Debug)]
struct Settings(Vec<&'static str>);
impl Extension for Settings {
    type Exposed = Vec<&'static str>;

    fn create(seed: Option<Self::Exposed>) -> Self {
        Settings(seed.unwrap_or_default())
    }

    fn expose(&self) -> Self::Exposed {
        self.0.clone()
    }

    fn inheritable() -> bool {
        true
    }
}

#[test]
fn child_extension_is_seeded_with_parent_state_at_request_time() {
    common::init_tracing();
    let mut assembler = Assembler::new(AssemblyConfig::default());
    let root = assembler.root();
    let child = assembler.container(root, "child").unwrap();

    let parent = assembler.request_extension::<Settings>(root).unwrap();
    assembler.extension_mut(parent).unwrap().0.push("tls");

    let inherited = assembler.request_extension::<Settings>(child).unwrap();
    assert_eq!(assembler.extension(inherited).unwrap().0, vec!["tls"]);

    assembler.extension_mut(parent).unwrap().0.push("gzip");
    assembler.extension_mut(inherited).unwrap().0.push("cors");
    assert_eq!(assembler.extension(parent).unwrap().0, vec!["tls", "gzip"]);
    assert_eq!(assembler.extension(inherited).unwrap().0, vec!["tls", "cors"]);

    let plan = assembler.finish().unwrap();
    let records = plan.extensions();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].inherited_from, Some(records[0].id));
    assert_eq!(records[1].scope, child);
}

#[test]
fn independent_beans_keep_declaration_order() {
    common::init_tracing();
    struct P;
    struct Q;

    let describe = |assembler: &mut Assembler, root| -> Result<Vec<NodeId>, BuildError> {
        let p = assembler.register_bean(
            root,
            ConstructionDescriptor::new(Vec::new(), |_| Ok::<_, Infallible>(P)),
        )?;
        let q = assembler.register_bean(
            root,
            ConstructionDescriptor::new(Vec::new(), |_| Ok::<_, Infallible>(Q)),
        )?;
        Ok(vec![p, q])
    };

    let mut first = None;
    for _ in 0..10 {
        let mut ids = Vec::new();
        let plan = build(|assembler, root| {
            ids = describe(assembler, root)?;
            Ok(())
        })
        .unwrap();

        let beans: Vec<NodeId> = plan
            .order()
            .iter()
            .copied()
            .filter(|node| ids.contains(node))
            .collect();
        assert_eq!(beans, ids);

        let layout = plan.layout();
        match &first {
            None => first = Some(layout),
            Some(first) => assert_eq!(first, &layout),
        }
    }
}

#[test]
fn failed_launch_leaves_plan_usable() {
    common::init_tracing();
    let failed_once = Arc::new(AtomicBool::new(false));
    let flaky = {
        let failed_once = failed_once.clone();
        ConstructionDescriptor::new(Vec::new(), move |_| {
            if failed_once.swap(true, Ordering::SeqCst) {
                Ok(7_u32)
            } else {
                Err("connection refused")
            }
        })
    };

    let mut node = None;
    let plan = build(|assembler, root| {
        node = Some(assembler.register_bean(root, flaky)?);
        Ok(())
    })
    .unwrap();
    let node = node.unwrap();

    let Err(LaunchError::Construction(error)) = launch(&plan) else {
        panic!("first launch must fail");
    };
    assert_eq!(error.node, node);
    assert_eq!(error.key, Key::of::<u32>());
    assert_eq!(error.scope, plan.root());
    assert_eq!(error.scope_path, "app");
    assert_eq!(error.location.file(), file!());
    assert_eq!(error.error.to_string(), "connection refused");

    let instance = launch(&plan).unwrap();
    assert_eq!(*instance.require::<u32>().unwrap(), 7);
}

#[test]
fn dependencies_never_resolve_sideways() {
    common::init_tracing();
    let err = build(|assembler, root| {
        let left = assembler.container(root, "left")?;
        let right = assembler.container(root, "right")?;
        assembler.register_instance(left, 1_u8)?;
        assembler.register_bean(
            right,
            ConstructionDescriptor::new(vec![Key::of::<u8>()], |_| Ok::<_, Infallible>(2_u16)),
        )?;
        Ok(())
    })
    .unwrap_err();

    assert_eq!(
        err,
        BuildError::Configuration(ConfigurationError::InvalidEdge {
            dependency: Key::of::<u8>(),
            required_by: Key::of::<u16>(),
            scope: "app/right".into(),
            provided_in: "app/left".into(),
        })
    );
}

#[test]
fn missing_dependency_fails_the_build() {
    common::init_tracing();
    let err = build(|assembler, root| {
        let child = assembler.container(root, "child")?;
        assembler.register_bean(
            child,
            ConstructionDescriptor::new(vec![Key::named::<u8>("port")], |_| {
                Ok::<_, Infallible>(2_u16)
            }),
        )?;
        Ok(())
    })
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "'u16' in 'app/child' needs 'u8@port' but it is missing"
    );
}

#[test]
fn sealed_child_waits_for_ancestor_to_provide() {
    common::init_tracing();
    let mut right = None;
    let plan = build(|assembler, root| {
        let left = assembler.container(root, "left")?;
        let scope = assembler.container(root, "right")?;
        assembler.register_instance(left, 1_u8)?;
        assembler.register_bean(
            scope,
            ConstructionDescriptor::new(vec![Key::of::<u8>()], |inputs| {
                Ok::<_, DynError>(u16::from(*inputs[0].downcast_ref::<u8>()?) + 100)
            }),
        )?;

        // The left sibling's u8 must not decide anything while the root is open
        assembler.seal(scope)?;
        assembler.register_instance(root, 5_u8)?;
        right = Some(scope);
        Ok(())
    })
    .unwrap();

    let instance = plan.launch().unwrap();
    assert_eq!(*instance.require_in::<u16>(right.unwrap()).unwrap(), 105);
}

#[test]
fn sealed_child_fails_once_ancestors_never_provide() {
    common::init_tracing();
    let needs_port = || {
        ConstructionDescriptor::new(vec![Key::of::<u8>()], |_| Ok::<_, Infallible>(2_u16))
    };

    let missing = build(|assembler, root| {
        let child = assembler.container(root, "child")?;
        assembler.register_bean(child, needs_port())?;
        assembler.seal(child)?;
        Ok(())
    })
    .unwrap_err();
    assert_eq!(
        missing,
        BuildError::Configuration(ConfigurationError::MissingDependency {
            dependency: Key::of::<u8>(),
            required_by: Key::of::<u16>(),
            scope: "app/child".into(),
        })
    );

    let sideways = build(|assembler, root| {
        let left = assembler.container(root, "left")?;
        let right = assembler.container(root, "right")?;
        assembler.register_instance(left, 1_u8)?;
        assembler.register_bean(right, needs_port())?;
        assembler.seal(right)?;
        Ok(())
    })
    .unwrap_err();
    assert_eq!(
        sideways,
        BuildError::Configuration(ConfigurationError::InvalidEdge {
            dependency: Key::of::<u8>(),
            required_by: Key::of::<u16>(),
            scope: "app/right".into(),
            provided_in: "app/left".into(),
        })
    );
}
