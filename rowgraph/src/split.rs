//!
//! Splitting wide rows into chains of sub-objects.
//!
//! ```text
//!  id  name  city  country   id  brewery
//! |---Person-----------------|---Beer------|
//!       |--Address--|
//! ```
//!
//! A chain of N types cuts each row into N contiguous column groups. Each group
//! is bound through the binding plan of its type, and by default every group
//! after the first is stored in the nearest preceding type holding a sub-object
//! of its type.
//!

use lazy_static::lazy_static;
use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::Memo;
use crate::mapping::ColumnMapping;
use crate::plan::{self, BindingPlan};
use crate::record::{self, AnyRecord, Record, Shape};
use crate::recordset::{Recordset, Row, Schema};
use crate::value::Value;
use crate::{RowGraphError, RowGraphResult};

/// A record read from one row, with the row's first column kept for
/// positional correlation.
pub(crate) struct ReadRecord {
    pub record: Box<dyn AnyRecord>,
    pub leading: Option<Value>,
}

/// Untyped chain description shared by every reader built on it.
#[derive(Clone, Debug)]
pub(crate) struct Chain {
    shapes: Vec<&'static Shape>,
    split_on: Vec<String>,
    links: Vec<Option<String>>,
    linked: bool,
}

type ChainKey = (
    Vec<TypeId>,
    Vec<String>,
    Vec<Option<String>>,
    bool,
    u64,
    Arc<[String]>,
);

lazy_static! {
    static ref CHAINS: Memo<ChainKey, ChainPlan> = Memo::new();
}

/// Resolved column groups and links for one chain and column signature.
#[derive(Debug)]
struct ChainPlan {
    bounds: Vec<usize>,
    groups: Vec<Arc<BindingPlan>>,
    /// For each group after the first: (holder group, member of the holder).
    links: Vec<Option<(usize, usize)>>,
}

impl Chain {
    pub fn new(root: &'static Shape) -> Self {
        Self {
            shapes: vec![root],
            split_on: vec![],
            links: vec![None],
            linked: true,
        }
    }

    pub fn root(&self) -> &'static Shape {
        self.shapes[0]
    }

    fn push(&mut self, shape: &'static Shape) {
        self.shapes.push(shape);
        self.links.push(None);
    }

    fn plan(&self, schema: &Schema) -> RowGraphResult<Arc<ChainPlan>> {
        let mapping = ColumnMapping::tables();
        let key = (
            self.shapes.iter().map(|shape| shape.type_id()).collect(),
            self.split_on.clone(),
            self.links.clone(),
            self.linked,
            mapping.generation(),
            schema.signature().clone(),
        );

        CHAINS.get_or_derive(key, |(_, _, _, _, _, names)| {
            self.derive(names, &mapping)
        })
    }

    fn derive(&self, names: &[String], mapping: &ColumnMapping) -> RowGraphResult<ChainPlan> {
        let links = if self.linked {
            self.resolve_links()?
        } else {
            vec![None; self.shapes.len()]
        };

        let bounds = if self.split_on.is_empty() {
            self.detect_bounds(names, mapping)
        } else {
            self.explicit_bounds(names)
        };

        let groups = self
            .shapes
            .iter()
            .enumerate()
            .map(|(k, shape)| {
                plan::binding_plan_with(*shape, &names[bounds[k]..bounds[k + 1]], mapping)
            })
            .collect::<RowGraphResult<Vec<_>>>()?;

        log::debug!(
            "split {:?} into {:?} at {:?}",
            names,
            self.shapes,
            &bounds[1..self.shapes.len()]
        );

        Ok(ChainPlan {
            bounds,
            groups,
            links,
        })
    }

    fn resolve_links(&self) -> RowGraphResult<Vec<Option<(usize, usize)>>> {
        let mut links = vec![None];

        for (k, target) in self.shapes.iter().enumerate().skip(1) {
            let link = match &self.links[k] {
                Some(name) => {
                    let holder = self.shapes[k - 1];
                    let member = holder.find_or_err(name)?;
                    check_link(holder, member, target)?;
                    (k - 1, member)
                }
                None => self.nearest_holder(k, target)?,
            };
            links.push(Some(link));
        }

        Ok(links)
    }

    fn nearest_holder(&self, k: usize, target: &Shape) -> RowGraphResult<(usize, usize)> {
        let mut read_only = None;

        for j in (0..k).rev() {
            let holder = self.shapes[j];
            for (index, member) in holder.members().iter().enumerate() {
                if member.holds(target) {
                    if member.settable {
                        return Ok((j, index));
                    }
                    read_only.get_or_insert((holder, member.name));
                }
            }
        }

        match read_only {
            Some((holder, member)) => Err(RowGraphError::ReadOnlyMember {
                ty: holder.name(),
                member,
            }),
            None => Err(RowGraphError::MissingLink {
                target: target.name(),
                holders: self.shapes[..k].iter().map(|shape| shape.name()).collect(),
            }),
        }
    }

    fn detect_bounds(&self, names: &[String], mapping: &ColumnMapping) -> Vec<usize> {
        let count = self.shapes.len();
        let mut bounds = vec![0; count + 1];
        let mut current = 0;
        let mut seen = HashSet::new();

        for (i, name) in names.iter().enumerate() {
            let folded = name.to_lowercase();

            if current + 1 < count {
                let next = if seen.contains(&folded) {
                    Some(current + 1)
                } else if !plan::accepts(self.shapes[current], mapping, name) {
                    (current + 1..count).find(|t| plan::accepts(self.shapes[*t], mapping, name))
                } else {
                    None
                };

                if let Some(next) = next {
                    for bound in &mut bounds[current + 1..=next] {
                        *bound = i;
                    }
                    current = next;
                    seen.clear();
                }
            }

            seen.insert(folded);
        }

        for bound in &mut bounds[current + 1..] {
            *bound = names.len();
        }

        bounds
    }

    fn explicit_bounds(&self, names: &[String]) -> Vec<usize> {
        let count = self.shapes.len();
        let mut bounds = vec![names.len(); count + 1];
        bounds[0] = 0;

        for k in 1..count {
            let column = match self.split_on.get(k - 1).or_else(|| self.split_on.last()) {
                Some(column) => column,
                None => break,
            };

            let from = bounds[k - 1] + 1;
            let found = names
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, name)| name.eq_ignore_ascii_case(column))
                .map(|(i, _)| i);

            match found {
                Some(i) => bounds[k] = i,
                None => {
                    log::debug!("split column {} not found after column {}", column, from);
                    break;
                }
            }
        }

        bounds
    }

    fn instantiate(plan: &ChainPlan, row: &Row) -> RowGraphResult<Vec<Option<Box<dyn AnyRecord>>>> {
        let values = row.values();

        plan.groups
            .iter()
            .enumerate()
            .map(|(k, group)| {
                let columns = &values[plan.bounds[k]..plan.bounds[k + 1]];

                if k > 0 && columns.iter().all(Value::is_null) {
                    return Ok(None);
                }

                let mut record = group.shape().create();
                group.bind(record.as_mut(), columns)?;
                Ok(Some(record))
            })
            .collect()
    }

    /// Read every row into its group instances.
    pub fn read_parts(&self, recordset: Recordset) -> RowGraphResult<Vec<(Parts, Option<Value>)>> {
        let plan = self.plan(recordset.schema())?;

        recordset
            .map(|row| {
                let leading = row.values().first().cloned();
                let records = Self::instantiate(&plan, &row)?;
                Ok((Parts { records }, leading))
            })
            .collect()
    }

    /// Read every row into a linked root record.
    pub fn read(&self, recordset: Recordset) -> RowGraphResult<Vec<ReadRecord>> {
        let plan = self.plan(recordset.schema())?;

        recordset
            .map(|row| {
                let mut records = Self::instantiate(&plan, &row)?;

                for k in (1..records.len()).rev() {
                    let (j, member) = match plan.links[k] {
                        Some(link) => link,
                        None => continue,
                    };
                    if let Some(object) = records[k].take() {
                        if let Some(holder) = records[j].as_mut() {
                            holder.set_object(member, Some(object))?;
                        }
                    }
                }

                let record = match records.into_iter().next().flatten() {
                    Some(record) => record,
                    None => self.root().create(),
                };

                Ok(ReadRecord {
                    record,
                    leading: row.values().first().cloned(),
                })
            })
            .collect()
    }
}

fn check_link(holder: &'static Shape, member: usize, target: &Shape) -> RowGraphResult<()> {
    match holder.member(member) {
        Some(m) if !m.holds(target) => Err(RowGraphError::MissingLink {
            target: target.name(),
            holders: vec![holder.name()],
        }),
        Some(m) if !m.settable => Err(RowGraphError::ReadOnlyMember {
            ty: holder.name(),
            member: m.name,
        }),
        _ => Ok(()),
    }
}

/// The instances of one row, one per chain type. Groups that were absent
/// or entirely NULL are `None`.
pub struct Parts {
    records: Vec<Option<Box<dyn AnyRecord>>>,
}

impl Parts {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Move out the instance of chain position `index`.
    pub fn take<U: Record>(&mut self, index: usize) -> RowGraphResult<Option<U>> {
        match self.records.get_mut(index) {
            Some(slot) => slot.take().map(record::downcast::<U>).transpose(),
            None => Ok(None),
        }
    }
}

///
/// Reads each row into a `T`, optionally followed by more types whose
/// instances are linked into `T` (or into each other) as sub-objects.
///
/// ```ignore
/// let beers = OneToOne::<Beer>::new()
///     .with::<Glass>()
///     .split_on(&["GlassId"])
///     .read(recordset)?;
/// ```
///
#[derive(Clone, Debug)]
pub struct OneToOne<T> {
    pub(crate) chain: Chain,
    record: std::marker::PhantomData<fn() -> T>,
}

/// Reader of plain `T` rows.
pub fn records<T: Record>() -> OneToOne<T> {
    OneToOne::new()
}

impl<T: Record> OneToOne<T> {
    pub fn new() -> Self {
        Self {
            chain: Chain::new(T::shape()),
            record: std::marker::PhantomData,
        }
    }

    /// Append a type to the chain.
    pub fn with<U: Record>(mut self) -> Self {
        self.chain.push(U::shape());
        self
    }

    /// Store the most recently appended type in this member of its predecessor.
    pub fn link(mut self, member: &str) -> Self {
        if let Some(link) = self.chain.links.last_mut() {
            *link = Some(member.to_owned());
        }
        self
    }

    /// Column names starting each group after the first. The last name is
    /// reused when there are more groups than names.
    pub fn split_on<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.chain.split_on = columns.iter().map(|c| c.as_ref().to_owned()).collect();
        self
    }

    /// Read at most one record.
    pub fn single(self) -> Single<T> {
        Single { inner: self }
    }

    /// Build each output from the row's instances instead of linking them.
    /// Rows for which `assemble` returns `None` are skipped.
    pub fn assemble<R, F>(mut self, assemble: F) -> Assembled<R>
    where
        F: Fn(&mut Parts) -> RowGraphResult<Option<R>> + Send + Sync + 'static,
    {
        self.chain.linked = false;
        Assembled {
            chain: self.chain,
            assemble: Arc::new(assemble),
        }
    }

    pub fn read(&self, recordset: Recordset) -> RowGraphResult<Vec<T>> {
        self.chain
            .read(recordset)?
            .into_iter()
            .map(|read| record::downcast::<T>(read.record))
            .collect()
    }
}

impl<T: Record> Default for OneToOne<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader of the first row only.
#[derive(Clone, Debug)]
pub struct Single<T> {
    pub(crate) inner: OneToOne<T>,
}

impl<T: Record> Single<T> {
    pub fn read(&self, recordset: Recordset) -> RowGraphResult<Option<T>> {
        Ok(self.inner.read(recordset)?.into_iter().next())
    }
}

pub struct Assembled<R> {
    pub(crate) chain: Chain,
    assemble: Arc<dyn Fn(&mut Parts) -> RowGraphResult<Option<R>> + Send + Sync>,
}

impl<R> Assembled<R> {
    pub fn read(&self, recordset: Recordset) -> RowGraphResult<Vec<R>> {
        let mut output = vec![];
        for (mut parts, _) in self.chain.read_parts(recordset)? {
            if let Some(assembled) = (self.assemble)(&mut parts)? {
                output.push(assembled);
            }
        }
        Ok(output)
    }
}

impl<R> Clone for Assembled<R> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            assemble: self.assemble.clone(),
        }
    }
}
