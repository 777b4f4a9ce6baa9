// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Deferred task graphs.

A [`Graph`] is built by value: every node is a pure operation on the values of
earlier nodes, and adding a node returns a typed [`Handle`] to its (not yet
computed) output. Nothing runs until the graph is given to a [`Scheduler`].
Because a node can only depend on nodes that already exist, graphs are acyclic
by construction.

Nodes only ever read their inputs, and produce new values; two siblings reading
the same dataset never share a mutable alias.

```
use hyperstack::graph::{Graph, Parallel};

let mut graph = Graph::new();
let a = graph.constant("a", 2.0_f64);
let b = graph.constant("b", 3.0_f64);
let sum = graph.map2("sum", a, b, |a: &f64, b: &f64| Ok(a + b));
let computed = graph.compute(&Parallel).unwrap();
assert_eq!(*computed.get(sum).unwrap(), 5.0);
```
 */

mod error;
pub mod pipelines;
#[cfg(test)]
mod tests;

pub use error::GraphError;

use std::{any::Any, fmt, marker::PhantomData};

use log::{debug, trace};
use rayon::prelude::*;

use crate::imaging::ImagingError;

type Value = Box<dyn Any + Send + Sync>;

/// Why a node's operation failed, before the node's label is attached.
enum OpError {
    Imaging(ImagingError),
    WrongType,
}

impl From<ImagingError> for OpError {
    fn from(e: ImagingError) -> Self {
        OpError::Imaging(e)
    }
}

type Op<'a> = Box<dyn Fn(&[&(dyn Any + Send + Sync)]) -> Result<Value, OpError> + Send + Sync + 'a>;

fn op<'a, F>(f: F) -> Op<'a>
where
    F: Fn(&[&(dyn Any + Send + Sync)]) -> Result<Value, OpError> + Send + Sync + 'a,
{
    Box::new(f)
}

struct Node<'a> {
    label: String,
    deps: Vec<usize>,
    op: Op<'a>,
}

/// A typed reference to the output of a graph node.
pub struct Handle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize) -> Handle<T> {
        Handle {
            index,
            _marker: PhantomData,
        }
    }

    /// The position of the node in its graph.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Get input `i` of a node as a `T`.
fn arg<'v, T: Any>(inputs: &[&'v (dyn Any + Send + Sync)], i: usize) -> Result<&'v T, OpError> {
    inputs
        .get(i)
        .copied()
        .and_then(|v| v.downcast_ref::<T>())
        .ok_or(OpError::WrongType)
}

/// A graph of deferred operations. The lifetime `'a` bounds anything the
/// operations borrow, e.g. the transforms a pipeline was built with.
#[derive(Default)]
pub struct Graph<'a> {
    nodes: Vec<Node<'a>>,
}

impl<'a> Graph<'a> {
    pub fn new() -> Graph<'a> {
        Graph { nodes: vec![] }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push<T>(&mut self, label: String, deps: Vec<usize>, op: Op<'a>) -> Handle<T> {
        trace!("Adding graph node {}: {label}", self.nodes.len());
        self.nodes.push(Node { label, deps, op });
        Handle::new(self.nodes.len() - 1)
    }

    /// A node that yields a copy of `value` to each of its dependents.
    pub fn constant<T>(&mut self, label: impl Into<String>, value: T) -> Handle<T>
    where
        T: Any + Clone + Send + Sync,
    {
        self.push(
            label.into(),
            vec![],
            op(move |_| Ok(Box::new(value.clone()) as Value)),
        )
    }

    pub fn map<A, R, F>(&mut self, label: impl Into<String>, a: Handle<A>, f: F) -> Handle<R>
    where
        A: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&A) -> Result<R, ImagingError> + Send + Sync + 'a,
    {
        self.push(
            label.into(),
            vec![a.index],
            op(move |inputs| Ok(Box::new(f(arg(inputs, 0)?)?) as Value)),
        )
    }

    pub fn map2<A, B, R, F>(
        &mut self,
        label: impl Into<String>,
        a: Handle<A>,
        b: Handle<B>,
        f: F,
    ) -> Handle<R>
    where
        A: Any + Send + Sync,
        B: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&A, &B) -> Result<R, ImagingError> + Send + Sync + 'a,
    {
        self.push(
            label.into(),
            vec![a.index, b.index],
            op(move |inputs| {
                Ok(Box::new(f(arg(inputs, 0)?, arg(inputs, 1)?)?) as Value)
            }),
        )
    }

    pub fn map3<A, B, C, R, F>(
        &mut self,
        label: impl Into<String>,
        a: Handle<A>,
        b: Handle<B>,
        c: Handle<C>,
        f: F,
    ) -> Handle<R>
    where
        A: Any + Send + Sync,
        B: Any + Send + Sync,
        C: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&A, &B, &C) -> Result<R, ImagingError> + Send + Sync + 'a,
    {
        self.push(
            label.into(),
            vec![a.index, b.index, c.index],
            op(move |inputs| {
                Ok(Box::new(f(arg(inputs, 0)?, arg(inputs, 1)?, arg(inputs, 2)?)?) as Value)
            }),
        )
    }

    /// A node combining any number of inputs of the same type, in order.
    pub fn reduce<A, R, F>(
        &mut self,
        label: impl Into<String>,
        inputs: &[Handle<A>],
        f: F,
    ) -> Handle<R>
    where
        A: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&[&A]) -> Result<R, ImagingError> + Send + Sync + 'a,
    {
        self.push(
            label.into(),
            inputs.iter().map(|h| h.index).collect(),
            op(move |values| {
                let args = (0..values.len())
                    .map(|i| arg::<A>(values, i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(f(&args)?) as Value)
            }),
        )
    }

    /// Like [`Graph::reduce`], with one extra leading input of another type.
    pub fn reduce_with<B, A, R, F>(
        &mut self,
        label: impl Into<String>,
        first: Handle<B>,
        inputs: &[Handle<A>],
        f: F,
    ) -> Handle<R>
    where
        B: Any + Send + Sync,
        A: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&B, &[&A]) -> Result<R, ImagingError> + Send + Sync + 'a,
    {
        let deps = std::iter::once(first.index)
            .chain(inputs.iter().map(|h| h.index))
            .collect();
        self.push(
            label.into(),
            deps,
            op(move |values| {
                let first = arg::<B>(values, 0)?;
                let args = (1..values.len())
                    .map(|i| arg::<A>(values, i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(f(first, &args)?) as Value)
            }),
        )
    }

    /// The label of a node.
    pub fn label<T>(&self, handle: Handle<T>) -> Option<&str> {
        self.nodes.get(handle.index).map(|n| n.label.as_str())
    }

    /// The depth of each node: 0 for nodes without inputs, otherwise one more
    /// than the deepest input. An input that is not an earlier node of this
    /// graph is [`GraphError::Missing`].
    fn depths(&self) -> Result<Vec<usize>, GraphError> {
        let mut depths: Vec<usize> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut depth = 0;
            for &d in &node.deps {
                let dep_depth = depths.get(d).ok_or(GraphError::Missing { index: d })?;
                depth = depth.max(dep_depth + 1);
            }
            depths.push(depth);
        }
        Ok(depths)
    }

    /// The length of the longest dependency chain ending at this node.
    pub fn depth<T>(&self, handle: Handle<T>) -> Option<usize> {
        self.depths().ok()?.get(handle.index).copied()
    }

    /// Group the nodes into waves. Every node's inputs are in earlier waves,
    /// so the nodes of one wave are independent of each other.
    pub fn waves(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        let depths = self.depths()?;
        let num_waves = depths.iter().max().map(|d| d + 1).unwrap_or(0);
        let mut waves = vec![vec![]; num_waves];
        for (i, depth) in depths.into_iter().enumerate() {
            waves[depth].push(i);
        }
        Ok(waves)
    }

    /// Run node `i`, whose inputs must already be in `values`.
    fn run_node(&self, i: usize, values: &[Option<Value>]) -> Result<Value, GraphError> {
        let node = &self.nodes[i];
        let inputs = node
            .deps
            .iter()
            .map(|&d| {
                values
                    .get(d)
                    .and_then(|v| v.as_deref())
                    .ok_or(GraphError::Missing { index: d })
            })
            .collect::<Result<Vec<_>, _>>()?;
        trace!("Running graph node {i}: {}", node.label);
        (node.op)(&inputs).map_err(|e| match e {
            OpError::Imaging(source) => GraphError::Node {
                label: node.label.clone(),
                source,
            },
            OpError::WrongType => GraphError::WrongType {
                label: node.label.clone(),
            },
        })
    }

    /// Execute the graph with `scheduler`.
    pub fn compute<S: Scheduler + ?Sized>(&self, scheduler: &S) -> Result<Computed, GraphError> {
        scheduler.execute(self)
    }
}

impl fmt::Debug for Graph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.nodes
                    .iter()
                    .map(|n| format!("{} <- {:?}", n.label, n.deps)),
            )
            .finish()
    }
}

/// The values of every node of an executed graph.
pub struct Computed {
    values: Vec<Option<Value>>,
    labels: Vec<String>,
}

impl Computed {
    fn value(&self, index: usize) -> Result<&(dyn Any + Send + Sync), GraphError> {
        self.values
            .get(index)
            .and_then(|v| v.as_deref())
            .ok_or(GraphError::Missing { index })
    }

    fn wrong_type(&self, index: usize) -> GraphError {
        GraphError::WrongType {
            label: self.labels.get(index).cloned().unwrap_or_default(),
        }
    }

    pub fn get<T: Any>(&self, handle: Handle<T>) -> Result<&T, GraphError> {
        self.value(handle.index)?
            .downcast_ref::<T>()
            .ok_or_else(|| self.wrong_type(handle.index))
    }

    /// Move a value out. Taking it again gives [`GraphError::Missing`].
    pub fn take<T: Any>(&mut self, handle: Handle<T>) -> Result<T, GraphError> {
        let value = self
            .values
            .get_mut(handle.index)
            .and_then(|v| v.take())
            .ok_or(GraphError::Missing {
                index: handle.index,
            })?;
        match value.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(value) => {
                self.values[handle.index] = Some(value);
                Err(self.wrong_type(handle.index))
            }
        }
    }
}

/// Executes every node of a graph, after all of its inputs.
///
/// Execution is all or nothing: if any node fails, its error is returned and
/// no values are.
pub trait Scheduler: Send + Sync {
    fn execute(&self, graph: &Graph<'_>) -> Result<Computed, GraphError>;
}

/// Runs nodes one at a time, in the order they were added.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl Scheduler for Sequential {
    fn execute(&self, graph: &Graph<'_>) -> Result<Computed, GraphError> {
        debug!("Executing {} graph nodes sequentially", graph.len());
        let mut values: Vec<Option<Value>> = Vec::with_capacity(graph.len());
        for i in 0..graph.len() {
            let value = graph.run_node(i, &values)?;
            values.push(Some(value));
        }
        Ok(Computed {
            values,
            labels: graph.nodes.iter().map(|n| n.label.clone()).collect(),
        })
    }
}

/// Runs the graph wave by wave; the nodes of a wave run in parallel on the
/// rayon thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parallel;

impl Scheduler for Parallel {
    fn execute(&self, graph: &Graph<'_>) -> Result<Computed, GraphError> {
        let waves = graph.waves()?;
        debug!(
            "Executing {} graph nodes in {} waves",
            graph.len(),
            waves.len()
        );
        let mut values: Vec<Option<Value>> = (0..graph.len()).map(|_| None).collect();
        for (i_wave, wave) in waves.into_iter().enumerate() {
            trace!("Wave {i_wave}: {} nodes", wave.len());
            let results = wave
                .into_par_iter()
                .map(|i| graph.run_node(i, &values).map(|v| (i, v)))
                .collect::<Result<Vec<_>, _>>()?;
            for (i, value) in results {
                values[i] = Some(value);
            }
        }
        Ok(Computed {
            values,
            labels: graph.nodes.iter().map(|n| n.label.clone()).collect(),
        })
    }
}
