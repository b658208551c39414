//! Cycle detection and deterministic ordering, shared by beans and extensions.
//!
//! Graphs are given as a dependency list per vertex, vertices are numbered in declaration order.

use std::{cmp::Reverse, collections::BinaryHeap};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Orders the vertices so that every vertex comes after all of its dependencies
///
/// Independent vertices keep their declaration order. On failure returns the first cycle
/// found when walking the vertices in declaration order, closed by repeating its first vertex.
pub(crate) fn sort(dependencies: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    if let Some(cycle) = find_cycle(dependencies) {
        return Err(cycle);
    }
    Ok(order(dependencies))
}

/// Depth first walk with three colors, iterative so deep chains can't overflow the stack
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];
    // (vertex, next dependency to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..dependencies.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some((vertex, next)) = stack.last_mut() {
            let vertex = *vertex;
            let Some(&dependency) = dependencies[vertex].get(*next) else {
                marks[vertex] = Mark::Done;
                stack.pop();
                continue;
            };
            *next += 1;

            match marks[dependency] {
                Mark::Done => {}
                Mark::InProgress => {
                    let start = stack
                        .iter()
                        .position(|(on_path, _)| *on_path == dependency)
                        .unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].iter().map(|(v, _)| *v).collect();
                    cycle.push(dependency);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    marks[dependency] = Mark::InProgress;
                    stack.push((dependency, 0));
                }
            }
        }
    }

    None
}

/// Kahn's algorithm, always releasing the lowest ready vertex first
fn order(dependencies: &[Vec<usize>]) -> Vec<usize> {
    let mut pending: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); dependencies.len()];
    for (vertex, deps) in dependencies.iter().enumerate() {
        for &dependency in deps {
            dependents[dependency].push(vertex);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(vertex, _)| Reverse(vertex))
        .collect();

    let mut sorted = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(vertex)) = ready.pop() {
        sorted.push(vertex);
        for &dependent in &dependents[vertex] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    debug_assert_eq!(sorted.len(), dependencies.len(), "acyclic graph must sort fully");
    sorted
}
