#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Once,
};

use tracing_subscriber::EnvFilter;
use wrapp_assembly::{ConstructionDescriptor, DynError, Key};

static TRACING: Once = Once::new();

/// Routes logs through the test harness, so they only show up for failing tests
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Qualifiers for generated beans, one per node
pub const NAMES: [&str; 12] = [
    "n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7", "n8", "n9", "n10", "n11",
];

pub fn key(node: usize) -> Key {
    Key::named::<u64>(NAMES[node])
}

/// A `u64` bean named after `node`, worth one more than the sum of its dependencies
///
/// Every construction is counted in `calls`.
pub fn counted_bean(node: usize, dependencies: &[usize], calls: Arc<AtomicUsize>) -> ConstructionDescriptor {
    let keys = dependencies.iter().map(|dependency| key(*dependency)).collect();
    ConstructionDescriptor::new(keys, move |inputs| {
        calls.fetch_add(1, Ordering::SeqCst);
        let mut sum = 1_u64;
        for input in inputs {
            sum += *input.downcast_ref::<u64>()?;
        }
        Ok::<_, DynError>(sum)
    })
    .named(NAMES[node])
}

/// Expected value of every node of an acyclic graph built from [`counted_bean`]s
pub fn expected_values(dependencies: &[Vec<usize>]) -> Vec<u64> {
    fn value(node: usize, dependencies: &[Vec<usize>], memo: &mut [Option<u64>]) -> u64 {
        if let Some(known) = memo[node] {
            return known;
        }
        let mut sum = 1;
        for dependency in &dependencies[node] {
            sum += value(*dependency, dependencies, memo);
        }
        memo[node] = Some(sum);
        sum
    }

    let mut memo = vec![None; dependencies.len()];
    (0..dependencies.len())
        .map(|node| value(node, dependencies, &mut memo))
        .collect()
}
