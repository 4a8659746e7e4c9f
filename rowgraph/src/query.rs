//!
//! Multi-recordset composition.
//!
//! A [`Query`] is an ordered list of steps, one per recordset the command
//! returns:
//!
//! ```text
//! Query::returns(records::<Invoice>())       recordset 0 -> Vec<Invoice>
//!     .then_children(Children::new())        recordset 1 -> invoice.lines
//!     .then(records::<Customer>())           recordset 2 -> Vec<Customer>
//!     .read(&mut reader)?                    -> (Vec<Invoice>, Vec<Customer>)
//! ```
//!
//! Children steps are attached once every recordset has been read, deepest
//! first, so grandchildren sit inside their parents before those are moved
//! into theirs.
//!

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::children::{self, Children, Relation, Resolved};
use crate::record::{AnyRecord, Record, Shape};
use crate::recordset::{Recordset, Recordsets, ResultReader};
use crate::source::AsyncResultReader;
use crate::split::{Assembled, Chain, OneToOne, ReadRecord, Single};
use crate::{RowGraphError, RowGraphResult};

type AssembleFn = Arc<dyn Fn(Recordset) -> RowGraphResult<Box<dyn Any + Send>> + Send + Sync>;

/// One recordset's worth of work in a [`Query`].
#[derive(Clone)]
pub struct Step {
    kind: StepKind,
}

#[derive(Clone)]
enum StepKind {
    Records { chain: Chain, single: bool },
    Assembled(AssembleFn),
    Children(Relation),
    Skip,
}

impl Step {
    pub(crate) fn records(chain: Chain, single: bool) -> Self {
        Self {
            kind: StepKind::Records { chain, single },
        }
    }

    pub(crate) fn assembled<R, F>(read: F) -> Self
    where
        R: Any + Send,
        F: Fn(Recordset) -> RowGraphResult<R> + Send + Sync + 'static,
    {
        Self {
            kind: StepKind::Assembled(Arc::new(move |recordset: Recordset| {
                read(recordset).map(|output| Box::new(output) as Box<dyn Any + Send>)
            })),
        }
    }
}

/// Something that reads one recordset into a top-level output.
pub trait Reader {
    type Output: FromSlot;

    fn into_step(self) -> Step;
}

impl<T: Record> Reader for OneToOne<T> {
    type Output = Vec<T>;

    fn into_step(self) -> Step {
        Step::records(self.chain, false)
    }
}

impl<T: Record> Reader for Single<T> {
    type Output = Option<T>;

    fn into_step(self) -> Step {
        Step::records(self.inner.chain, true)
    }
}

impl<R: Any + Send> Reader for Assembled<R> {
    type Output = Vec<R>;

    fn into_step(self) -> Step {
        Step::assembled(move |recordset| self.read(recordset))
    }
}

/// A top-level output before it is converted to its declared type.
pub struct Slot {
    kind: SlotKind,
}

enum SlotKind {
    Records(Vec<Box<dyn AnyRecord>>),
    Assembled(Box<dyn Any + Send>),
}

pub trait FromSlot: Sized {
    fn from_slot(slot: Slot) -> RowGraphResult<Self>;
}

impl<T: Any + Send> FromSlot for Vec<T> {
    fn from_slot(slot: Slot) -> RowGraphResult<Self> {
        match slot.kind {
            SlotKind::Records(records) => records.into_iter().map(downcast_any::<T>).collect(),
            SlotKind::Assembled(output) => output
                .downcast::<Vec<T>>()
                .map(|output| *output)
                .map_err(|_| mismatch::<Self>("assembled output")),
        }
    }
}

impl<T: Any + Send> FromSlot for Option<T> {
    fn from_slot(slot: Slot) -> RowGraphResult<Self> {
        match slot.kind {
            SlotKind::Records(records) => {
                records.into_iter().next().map(downcast_any::<T>).transpose()
            }
            SlotKind::Assembled(output) => output
                .downcast::<Option<T>>()
                .map(|output| *output)
                .map_err(|_| mismatch::<Self>("assembled output")),
        }
    }
}

fn downcast_any<T: Any>(record: Box<dyn AnyRecord>) -> RowGraphResult<T> {
    let found = record.record_shape().name();
    record
        .into_any()
        .downcast::<T>()
        .map(|record| *record)
        .map_err(|_| mismatch::<T>(found))
}

fn mismatch<T>(found: &'static str) -> RowGraphError {
    RowGraphError::TypeMismatch {
        expected: std::any::type_name::<T>(),
        found,
    }
}

/// The untyped outputs of a query, one per reading step.
pub struct ResultSets {
    slots: Vec<Option<Slot>>,
}

impl ResultSets {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Move out output `index`, e.g. `sets.take::<Vec<Beer>>(1)`.
    pub fn take<T: FromSlot>(&mut self, index: usize) -> RowGraphResult<T> {
        let slot = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(RowGraphError::MissingResultSet { index })?;

        T::from_slot(slot)
    }
}

/// Typed conversion of all outputs at once.
pub trait FromSlots: Sized {
    fn from_sets(sets: ResultSets) -> RowGraphResult<Self>;
}

/// Type-level list append, so `then` can grow the output tuple.
pub trait Append<T> {
    type Output;
}

impl<T> Append<T> for () {
    type Output = (T,);
}

macro_rules! tuples {
    ($(($($name:ident $index:tt),+))+) => {
        $(
            impl<$($name: FromSlot),+> FromSlots for ($($name,)+) {
                fn from_sets(mut sets: ResultSets) -> RowGraphResult<Self> {
                    Ok(($(sets.take::<$name>($index)?,)+))
                }
            }
        )+
    };
}

macro_rules! appends {
    ($(($($name:ident),+))+) => {
        $(
            impl<$($name,)+ T> Append<T> for ($($name,)+) {
                type Output = ($($name,)+ T);
            }
        )+
    };
}

tuples! {
    (A 0)
    (A 0, B 1)
    (A 0, B 1, C 2)
    (A 0, B 1, C 2, D 3)
    (A 0, B 1, C 2, D 3, E 4)
    (A 0, B 1, C 2, D 3, E 4, F 5)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11)
}

appends! {
    (A)
    (A, B)
    (A, B, C)
    (A, B, C, D)
    (A, B, C, D, E)
    (A, B, C, D, E, F)
    (A, B, C, D, E, F, G)
    (A, B, C, D, E, F, G, H)
    (A, B, C, D, E, F, G, H, I)
    (A, B, C, D, E, F, G, H, I, J)
    (A, B, C, D, E, F, G, H, I, J, K)
}

///
/// An ordered pipeline of recordset readers.
///
/// `Out` is the tuple of top-level outputs, grown by every `then`. Pipelines
/// longer than the tuple facade allows are read with [`Query::read_sets`].
///
pub struct Query<Out> {
    steps: Vec<Step>,
    output: std::marker::PhantomData<fn() -> Out>,
}

impl Query<()> {
    pub fn new() -> Self {
        Self {
            steps: vec![],
            output: std::marker::PhantomData,
        }
    }

    /// Start a pipeline with the reader of the first recordset.
    pub fn returns<R: Reader>(reader: R) -> Query<(R::Output,)> {
        Query::new().then(reader)
    }

    ///
    /// Build the pipeline from the `recordset` indexes declared on the
    /// collection members of `T` and, recursively, of their element types.
    ///
    /// Recordset 0 holds the `T` rows. Undeclared indexes are skipped.
    ///
    pub fn declared<T: Record>() -> RowGraphResult<Query<(Vec<T>,)>> {
        let mut relations = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut pending = vec![T::shape()];

        while let Some(shape) = pending.pop() {
            if !visited.insert(shape.type_id()) {
                continue;
            }

            for (index, member, child) in children::declared_collections(shape) {
                if index == 0 || relations.contains_key(&index) {
                    return Err(RowGraphError::DuplicateRecordset { index });
                }
                relations.insert(index, Relation::declared(shape, child, member));
                pending.push(child);
            }
        }

        let mut query = Query::returns(OneToOne::<T>::new());
        for (index, relation) in relations {
            while query.steps.len() < index {
                query = query.skip();
            }
            query.steps.push(Step {
                kind: StepKind::Children(relation),
            });
        }

        Ok(query)
    }
}

impl Default for Query<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out> Clone for Query<Out> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            output: std::marker::PhantomData,
        }
    }
}

/// How the steps of a query hang together, checked before reading.
struct Wiring {
    parents: Vec<Option<usize>>,
    resolved: Vec<Option<Resolved>>,
}

impl<Out> Query<Out> {
    /// Append an independent recordset.
    pub fn then<R>(mut self, reader: R) -> Query<<Out as Append<R::Output>>::Output>
    where
        R: Reader,
        Out: Append<R::Output>,
    {
        self.steps.push(reader.into_step());
        Query {
            steps: self.steps,
            output: std::marker::PhantomData,
        }
    }

    /// Append an independent recordset without growing `Out`. Its output is
    /// only reachable through [`Query::read_sets`].
    pub fn then_untyped<R: Reader>(mut self, reader: R) -> Self {
        self.steps.push(reader.into_step());
        self
    }

    /// Append a recordset of children of the nearest preceding `P` records.
    pub fn then_children<P: Record, C: Record>(mut self, children: Children<P, C>) -> Self {
        self.steps.push(Step {
            kind: StepKind::Children(children.relation),
        });
        self
    }

    /// Consume a recordset without reading it.
    pub fn skip(mut self) -> Self {
        self.steps.push(Step {
            kind: StepKind::Skip,
        });
        self
    }

    /// Number of recordsets the query consumes.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn wire(&self) -> RowGraphResult<Wiring> {
        let mut levels: Vec<(usize, &'static Shape, bool)> = vec![];
        let mut parents = vec![None; self.steps.len()];
        let mut resolved = Vec::with_capacity(self.steps.len());

        for (i, step) in self.steps.iter().enumerate() {
            match &step.kind {
                StepKind::Records { chain, single } => {
                    levels.push((i, chain.root(), *single));
                    resolved.push(None);
                }
                StepKind::Children(relation) => {
                    let parent = relation.parent();
                    let (p, _, single) = levels
                        .iter()
                        .rev()
                        .find(|&&(_, shape, _)| shape.type_id() == parent.type_id())
                        .copied()
                        .ok_or(RowGraphError::MissingParentSet { ty: parent.name() })?;

                    parents[i] = Some(p);
                    resolved.push(Some(relation.resolve(single)?));
                    levels.push((i, relation.child(), false));
                }
                StepKind::Assembled(_) | StepKind::Skip => resolved.push(None),
            }
        }

        Ok(Wiring { parents, resolved })
    }

    ///
    /// Read one recordset per step and assemble the outputs.
    ///
    /// Recordsets the reader never delivers read as empty.
    ///
    pub fn read_sets(&self, reader: &mut dyn ResultReader) -> RowGraphResult<ResultSets> {
        let wiring = self.wire()?;

        let mut levels: Vec<Vec<ReadRecord>> = Vec::with_capacity(self.steps.len());
        let mut assembled: Vec<Option<Box<dyn Any + Send>>> = Vec::with_capacity(self.steps.len());
        let mut exhausted = false;

        for (i, step) in self.steps.iter().enumerate() {
            let recordset = if exhausted {
                None
            } else {
                reader.next_recordset()?
            };

            let recordset = match recordset {
                Some(recordset) => recordset,
                None => {
                    if !exhausted {
                        log::debug!("no recordset {}; reading the rest as empty", i);
                    }
                    exhausted = true;
                    Recordset::empty()
                }
            };

            log::trace!("reading recordset {}: {:?}", i, recordset);

            let (level, output) = match &step.kind {
                StepKind::Records { chain, single } => {
                    let mut read = chain.read(recordset)?;
                    if *single {
                        read.truncate(1);
                    }
                    (read, None)
                }
                StepKind::Children(relation) => (relation.read(recordset)?, None),
                StepKind::Assembled(read) => (vec![], Some(read(recordset)?)),
                StepKind::Skip => (vec![], None),
            };

            levels.push(level);
            assembled.push(output);
        }

        for i in (0..self.steps.len()).rev() {
            let (p, resolved) = match (wiring.parents[i], &wiring.resolved[i]) {
                (Some(p), Some(resolved)) => (p, resolved),
                _ => continue,
            };

            if let StepKind::Children(relation) = &self.steps[i].kind {
                let children = std::mem::take(&mut levels[i]);
                let parents = levels[p]
                    .iter_mut()
                    .map(|read| read.record.as_mut())
                    .collect();

                relation.attach(resolved, parents, children)?;
            }
        }

        let slots = self
            .steps
            .iter()
            .zip(levels.into_iter().zip(assembled))
            .filter_map(|(step, (level, output))| match &step.kind {
                StepKind::Records { .. } => Some(Slot {
                    kind: SlotKind::Records(level.into_iter().map(|read| read.record).collect()),
                }),
                StepKind::Assembled(_) => output.map(|output| Slot {
                    kind: SlotKind::Assembled(output),
                }),
                StepKind::Children(_) | StepKind::Skip => None,
            })
            .map(Some)
            .collect();

        Ok(ResultSets { slots })
    }

    pub fn read(&self, reader: &mut dyn ResultReader) -> RowGraphResult<Out>
    where
        Out: FromSlots,
    {
        Out::from_sets(self.read_sets(reader)?)
    }

    /// Await one recordset per step from an async collaborator, then read
    /// them like [`Query::read`].
    pub async fn read_async<A>(&self, reader: &mut A) -> RowGraphResult<Out>
    where
        A: AsyncResultReader + ?Sized,
        Out: FromSlots,
    {
        let mut recordsets = Recordsets::default();

        for _ in 0..self.steps.len() {
            match reader.next_recordset().await? {
                Some(recordset) => recordsets.push(recordset),
                None => break,
            }
        }

        self.read(&mut recordsets)
    }
}
