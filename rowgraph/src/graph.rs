//!
//! Self-referencing rows: one recordset of `T` whose rows point at each
//! other, resolved into a forest of `Arc<T>`.
//!
//! ```text
//!  { id: 1, parent_id: NULL }  <--+
//!  { id: 2, parent_id: 1 }  ------+
//! ```
//!

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::identity::{self, KeyMembers};
use crate::query::{Reader, Step};
use crate::record::{Access, AnyRecord, Record};
use crate::recordset::Recordset;
use crate::split::OneToOne;
use crate::value::Key;
use crate::{RowGraphError, RowGraphResult};

type KeyFn<T> = Arc<dyn Fn(&T) -> Key + Send + Sync>;

enum KeySource<T> {
    Infer,
    Named(Vec<String>),
    Function(KeyFn<T>),
}

impl<T> Clone for KeySource<T> {
    fn clone(&self) -> Self {
        match self {
            KeySource::Infer => KeySource::Infer,
            KeySource::Named(names) => KeySource::Named(names.clone()),
            KeySource::Function(function) => KeySource::Function(function.clone()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnPath,
    Done,
}

///
/// Points every row's parent member at the row whose identity equals the
/// row's parent reference.
///
/// Parents are shared, so the parent member must be an `Option<Arc<T>>`.
/// Rows without a matching parent are roots.
///
pub struct SelfReference<T> {
    reader: OneToOne<T>,
    id: KeySource<T>,
    parent_id: KeySource<T>,
    into: Option<String>,
}

impl<T: Record> SelfReference<T> {
    pub fn new() -> Self {
        Self {
            reader: OneToOne::new(),
            id: KeySource::Infer,
            parent_id: KeySource::Infer,
            into: None,
        }
    }

    pub fn read_with(mut self, reader: OneToOne<T>) -> Self {
        self.reader = reader;
        self
    }

    pub fn id<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.id = KeySource::Named(names.iter().map(|n| n.as_ref().to_owned()).collect());
        self
    }

    pub fn id_by<F>(mut self, id: F) -> Self
    where
        F: Fn(&T) -> Key + Send + Sync + 'static,
    {
        self.id = KeySource::Function(Arc::new(id));
        self
    }

    pub fn parent_id<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.parent_id = KeySource::Named(names.iter().map(|n| n.as_ref().to_owned()).collect());
        self
    }

    pub fn parent_id_by<F>(mut self, parent_id: F) -> Self
    where
        F: Fn(&T) -> Key + Send + Sync + 'static,
    {
        self.parent_id = KeySource::Function(Arc::new(parent_id));
        self
    }

    /// The `Option<Arc<T>>` member receiving the parent.
    pub fn into(mut self, member: &str) -> Self {
        self.into = Some(member.to_owned());
        self
    }

    pub fn read(&self, recordset: Recordset) -> RowGraphResult<Vec<Arc<T>>> {
        self.resolve(self.reader.read(recordset)?)
    }

    pub fn resolve(&self, rows: Vec<T>) -> RowGraphResult<Vec<Arc<T>>> {
        let shape = T::shape();
        let member = self.parent_member()?;

        let id = self.keys(&self.id, || identity::identity(shape))?;
        let parent_id = self.keys(&self.parent_id, || {
            let reference = identity::parent_reference(shape, shape)?;
            if reference.is_empty() {
                return Err(RowGraphError::MissingParentReference { ty: shape.name() });
            }
            Ok(reference)
        })?;

        let mut index = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            let key = id(row)?;
            if !key.has_null() {
                index.entry(key).or_insert(i);
            }
        }

        let mut parents = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let key = parent_id(row)?;
                Ok(index.get(&key).copied().filter(|parent| *parent != i))
            })
            .collect::<RowGraphResult<Vec<Option<usize>>>>()?;

        let mut rows = rows.into_iter().map(Some).collect::<Vec<_>>();
        let mut built: Vec<Option<Arc<T>>> = vec![None; rows.len()];
        let mut visits = vec![Visit::New; rows.len()];

        for start in 0..rows.len() {
            let mut path = vec![];
            let mut current = start;

            loop {
                match visits[current] {
                    Visit::Done => break,
                    Visit::OnPath => {
                        if let Some(last) = path.last() {
                            log::warn!(
                                "{} rows form a reference cycle; resolving row {} as a root",
                                shape.name(),
                                last
                            );
                            parents[*last] = None;
                        }
                        break;
                    }
                    Visit::New => {
                        visits[current] = Visit::OnPath;
                        path.push(current);
                        match parents[current] {
                            Some(parent) => current = parent,
                            None => break,
                        }
                    }
                }
            }

            for i in path.into_iter().rev() {
                if let Some(mut row) = rows[i].take() {
                    if let Some(parent) = parents[i].and_then(|parent| built[parent].clone()) {
                        row.set_shared(member, Some(parent as Arc<dyn Any + Send + Sync>))?;
                    }
                    built[i] = Some(Arc::new(row));
                }
                visits[i] = Visit::Done;
            }
        }

        Ok(built.into_iter().flatten().collect())
    }

    fn parent_member(&self) -> RowGraphResult<usize> {
        let shape = T::shape();

        let candidates = shape
            .members()
            .iter()
            .enumerate()
            .filter(|(_, member)| member.shares(shape))
            .filter(|(_, member)| match &self.into {
                Some(name) => member.name.eq_ignore_ascii_case(name),
                None => true,
            })
            .collect::<Vec<_>>();

        match candidates.as_slice() {
            [(index, member)] if member.settable => Ok(*index),
            [(_, member)] => Err(RowGraphError::ReadOnlyMember {
                ty: shape.name(),
                member: member.name,
            }),
            [] => {
                if let Some(name) = &self.into {
                    shape.find_or_err(name)?;
                }
                Err(RowGraphError::MissingLink {
                    target: shape.name(),
                    holders: vec![shape.name()],
                })
            }
            candidates => Err(RowGraphError::AmbiguousCollection {
                ty: shape.name(),
                child: shape.name(),
                candidates: candidates.iter().map(|(_, member)| member.name).collect(),
            }),
        }
    }

    fn keys<F>(
        &self,
        source: &KeySource<T>,
        infer: F,
    ) -> RowGraphResult<Box<dyn Fn(&T) -> RowGraphResult<Key>>>
    where
        F: FnOnce() -> RowGraphResult<Arc<KeyMembers>>,
    {
        let members = match source {
            KeySource::Function(function) => {
                let function = function.clone();
                return Ok(Box::new(move |row: &T| Ok(function(row))));
            }
            KeySource::Named(names) => Arc::new(identity::named(T::shape(), names)?),
            KeySource::Infer => infer()?,
        };

        Ok(Box::new(move |row: &T| members.key(row as &dyn AnyRecord)))
    }
}

impl<T: Record> Default for SelfReference<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Clone for SelfReference<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            into: self.into.clone(),
        }
    }
}

impl<T: Record> Reader for SelfReference<T> {
    type Output = Vec<Arc<T>>;

    fn into_step(self) -> Step {
        Step::assembled(move |recordset| self.read(recordset))
    }
}
