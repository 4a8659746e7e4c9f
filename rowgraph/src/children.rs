//!
//! Child reconciliation: attaching the rows of one recordset to the records
//! of an earlier one.
//!
//! ```text
//!  Invoice { id: 1 }  <----  InvoiceLine { invoice_id: 1, .. }
//!                    <----  InvoiceLine { invoice_id: 1, .. }
//!  Invoice { id: 2 }        (no lines: empty Vec)
//! ```
//!
//! The parent key is the parent's identity, the child key its parent
//! reference (see [`crate::identity`]). Children without a parent reference
//! correlate on the first column of their recordset.
//!

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::identity::{self, KeyMembers};
use crate::record::{self, AnyRecord, MemberKind, Record, Shape};
use crate::recordset::Recordset;
use crate::split::{Chain, OneToOne, ReadRecord};
use crate::value::Key;
use crate::{RowGraphError, RowGraphResult};

type KeyFn = Arc<dyn Fn(&dyn AnyRecord) -> RowGraphResult<Key> + Send + Sync>;
type IntoFn =
    Arc<dyn Fn(&mut dyn AnyRecord, Vec<Box<dyn AnyRecord>>) -> RowGraphResult<()> + Send + Sync>;

#[derive(Clone)]
enum KeySpec {
    Infer,
    Named(Vec<String>),
    Function(KeyFn),
}

#[derive(Clone)]
enum IntoSpec {
    Infer,
    Named(String),
    Function(IntoFn),
}

/// How parents and children of one recordset pair relate, type-erased.
#[derive(Clone)]
pub(crate) struct Relation {
    parent: &'static Shape,
    child: Chain,
    id: KeySpec,
    parent_id: KeySpec,
    into: IntoSpec,
    single_parent: bool,
    strict: bool,
}

enum ParentKey {
    Members(Arc<KeyMembers>),
    Function(KeyFn),
}

enum ChildKey {
    Members(Arc<KeyMembers>),
    Positional,
    Function(KeyFn),
}

enum Target {
    Member(usize),
    Function(IntoFn),
}

/// A relation with every member lookup done.
pub(crate) struct Resolved {
    keys: Result<(ParentKey, ChildKey), RowGraphError>,
    target: Target,
    single_parent: bool,
}

impl Relation {
    fn new(parent: &'static Shape, child: Chain) -> Self {
        Self {
            parent,
            child,
            id: KeySpec::Infer,
            parent_id: KeySpec::Infer,
            into: IntoSpec::Infer,
            single_parent: false,
            strict: false,
        }
    }

    /// A relation filling `member` of `parent` from a recordset of `child` rows.
    pub fn declared(parent: &'static Shape, child: &'static Shape, member: &'static str) -> Self {
        let mut relation = Self::new(parent, Chain::new(child));
        relation.into = IntoSpec::Named(member.to_owned());
        relation
    }

    pub fn parent(&self) -> &'static Shape {
        self.parent
    }

    pub fn child(&self) -> &'static Shape {
        self.child.root()
    }

    pub fn read(&self, recordset: Recordset) -> RowGraphResult<Vec<ReadRecord>> {
        self.child.read(recordset)
    }

    /// Look up every member the relation needs. `single` tells whether the
    /// parents were read as a single record.
    pub fn resolve(&self, single: bool) -> RowGraphResult<Resolved> {
        let single_parent = single || self.single_parent;
        let target = self.resolve_target()?;

        let keys = self.resolve_keys();
        if let Err(error) = &keys {
            if !single_parent {
                return Err(error.clone());
            }
        }

        Ok(Resolved {
            keys,
            target,
            single_parent,
        })
    }

    fn resolve_keys(&self) -> RowGraphResult<(ParentKey, ChildKey)> {
        let child = self.child();

        let parent_key = match &self.id {
            KeySpec::Infer => ParentKey::Members(identity::identity(self.parent)?),
            KeySpec::Named(names) => {
                ParentKey::Members(Arc::new(identity::named(self.parent, names)?))
            }
            KeySpec::Function(function) => ParentKey::Function(function.clone()),
        };

        let child_key = match &self.parent_id {
            KeySpec::Infer => {
                let reference = identity::parent_reference(child, self.parent)?;
                if reference.is_empty() {
                    ChildKey::Positional
                } else {
                    ChildKey::Members(reference)
                }
            }
            KeySpec::Named(names) => ChildKey::Members(Arc::new(identity::named(child, names)?)),
            KeySpec::Function(function) => ChildKey::Function(function.clone()),
        };

        Ok((parent_key, child_key))
    }

    fn resolve_target(&self) -> RowGraphResult<Target> {
        let parent = self.parent;
        let child = self.child();

        let member = match &self.into {
            IntoSpec::Function(function) => return Ok(Target::Function(function.clone())),
            IntoSpec::Named(name) => {
                let member = parent.find_or_err(name)?;
                if !parent.members()[member].collects(child) {
                    return Err(RowGraphError::MissingCollection {
                        ty: parent.name(),
                        child: child.name(),
                    });
                }
                member
            }
            IntoSpec::Infer => {
                let candidates = parent
                    .members()
                    .iter()
                    .enumerate()
                    .filter(|(_, member)| member.collects(child))
                    .collect::<Vec<_>>();

                let marked = candidates
                    .iter()
                    .filter(|(_, member)| member.child_collection)
                    .collect::<Vec<_>>();

                match (marked.as_slice(), candidates.as_slice()) {
                    ([(index, _)], _) => *index,
                    (_, [(index, _)]) => *index,
                    (_, []) => {
                        return Err(RowGraphError::MissingCollection {
                            ty: parent.name(),
                            child: child.name(),
                        })
                    }
                    (_, candidates) => {
                        return Err(RowGraphError::AmbiguousCollection {
                            ty: parent.name(),
                            child: child.name(),
                            candidates: candidates.iter().map(|(_, member)| member.name).collect(),
                        })
                    }
                }
            }
        };

        let target = &parent.members()[member];
        if !target.settable {
            return Err(RowGraphError::ReadOnlyMember {
                ty: parent.name(),
                member: target.name,
            });
        }

        Ok(Target::Member(member))
    }

    ///
    /// Distribute `children` over `parents`.
    ///
    /// Every child lands in every parent whose key equals its own, in
    /// recordset order. Parents sharing a key each receive their own copy.
    ///
    pub fn attach(
        &self,
        resolved: &Resolved,
        mut parents: Vec<&mut (dyn AnyRecord + 'static)>,
        children: Vec<ReadRecord>,
    ) -> RowGraphResult<()> {
        let parent = self.parent;
        let child = self.child();

        if resolved.single_parent {
            match parents.len() {
                0 => {
                    log::debug!(
                        "dropped {} {} rows without a {}",
                        children.len(),
                        child.name(),
                        parent.name()
                    );
                    return Ok(());
                }
                1 => {
                    let children = children.into_iter().map(|read| read.record).collect();
                    return resolved.target.fill(parents[0], children);
                }
                _ => {}
            }
        }

        let (parent_key, child_key) = resolved.keys.as_ref().map_err(Clone::clone)?;

        let parent_keys = parents
            .iter()
            .map(|parent| parent_key.key(&**parent))
            .collect::<RowGraphResult<Vec<_>>>()?;

        let known = parent_keys
            .iter()
            .filter(|key| !key.has_null())
            .collect::<HashSet<_>>();

        let mut groups: HashMap<Key, Vec<Box<dyn AnyRecord>>> = HashMap::new();
        let mut unmatched = 0;

        for read in children {
            let key = child_key.key(child, &read)?;

            if key.has_null() || !known.contains(&key) {
                if self.strict {
                    return Err(RowGraphError::UnmatchedChild {
                        ty: child.name(),
                        key: key.to_string(),
                    });
                }
                unmatched += 1;
                continue;
            }

            groups.entry(key).or_default().push(read.record);
        }

        if unmatched > 0 {
            log::debug!(
                "dropped {} {} rows without a matching {}",
                unmatched,
                child.name(),
                parent.name()
            );
        }

        let mut remaining = HashMap::new();
        for key in &parent_keys {
            *remaining.entry(key.clone()).or_insert(0usize) += 1;
        }

        for (parent, key) in parents.iter_mut().zip(parent_keys) {
            let last = match remaining.get_mut(&key) {
                Some(count) => {
                    *count -= 1;
                    *count == 0
                }
                None => true,
            };

            let group = if key.has_null() {
                vec![]
            } else if last {
                groups.remove(&key).unwrap_or_default()
            } else {
                groups
                    .get(&key)
                    .map(|group| group.iter().map(|child| child.clone_record()).collect())
                    .unwrap_or_default()
            };

            resolved.target.fill(&mut **parent, group)?;
        }

        Ok(())
    }
}

impl ParentKey {
    fn key(&self, parent: &dyn AnyRecord) -> RowGraphResult<Key> {
        match self {
            ParentKey::Members(members) => members.key(parent),
            ParentKey::Function(function) => function(parent),
        }
    }
}

impl ChildKey {
    fn key(&self, child: &Shape, read: &ReadRecord) -> RowGraphResult<Key> {
        match self {
            ChildKey::Members(members) => members.key(read.record.as_ref()),
            ChildKey::Function(function) => function(read.record.as_ref()),
            ChildKey::Positional => match &read.leading {
                Some(leading) => Ok(Key::from(leading.clone())),
                None => Err(RowGraphError::MissingParentReference { ty: child.name() }),
            },
        }
    }
}

impl Target {
    fn fill(
        &self,
        parent: &mut dyn AnyRecord,
        children: Vec<Box<dyn AnyRecord>>,
    ) -> RowGraphResult<()> {
        match self {
            Target::Member(member) => parent.set_children(*member, children),
            Target::Function(function) => function(parent, children),
        }
    }
}

///
/// Attaches `C` records to the collections of `P` records.
///
/// ```ignore
/// Children::<Invoice, InvoiceLine>::new()
///     .parent_id(&["InvoiceId"])
///     .into("lines")
///     .read(&mut invoices, recordset)?;
/// ```
///
pub struct Children<P, C> {
    pub(crate) relation: Relation,
    types: std::marker::PhantomData<fn() -> (P, C)>,
}

impl<P: Record, C: Record> Children<P, C> {
    pub fn new() -> Self {
        Self {
            relation: Relation::new(P::shape(), Chain::new(C::shape())),
            types: std::marker::PhantomData,
        }
    }

    /// Read children through a chain of sub-objects.
    pub fn read_with(mut self, reader: OneToOne<C>) -> Self {
        self.relation.child = reader.chain;
        self
    }

    /// Parent identity members, by name.
    pub fn id<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.relation.id = KeySpec::Named(names.iter().map(|n| n.as_ref().to_owned()).collect());
        self
    }

    pub fn id_by<F>(mut self, id: F) -> Self
    where
        F: Fn(&P) -> Key + Send + Sync + 'static,
    {
        self.relation.id = KeySpec::Function(Arc::new(move |parent: &dyn AnyRecord| {
            downcast_ref::<P>(parent).map(&id)
        }));
        self
    }

    /// Child members referencing the parent, by name.
    pub fn parent_id<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.relation.parent_id =
            KeySpec::Named(names.iter().map(|n| n.as_ref().to_owned()).collect());
        self
    }

    pub fn parent_id_by<F>(mut self, parent_id: F) -> Self
    where
        F: Fn(&C) -> Key + Send + Sync + 'static,
    {
        self.relation.parent_id = KeySpec::Function(Arc::new(move |child: &dyn AnyRecord| {
            downcast_ref::<C>(child).map(&parent_id)
        }));
        self
    }

    /// The parent's collection member receiving the children.
    pub fn into(mut self, member: &str) -> Self {
        self.relation.into = IntoSpec::Named(member.to_owned());
        self
    }

    pub fn into_by<F>(mut self, into: F) -> Self
    where
        F: Fn(&mut P, Vec<C>) + Send + Sync + 'static,
    {
        self.relation.into = IntoSpec::Function(Arc::new(
            move |parent: &mut dyn AnyRecord, children: Vec<Box<dyn AnyRecord>>| {
                let children = record::downcast_children::<C>(children)?;
                let found = parent.record_shape().name();
                let parent = parent.as_any_mut().downcast_mut::<P>().ok_or_else(|| {
                    RowGraphError::TypeMismatch {
                        expected: P::shape().name(),
                        found,
                    }
                })?;
                into(parent, children);
                Ok(())
            },
        ));
        self
    }

    /// Attach every child to the only parent, ignoring keys.
    pub fn single_parent(mut self) -> Self {
        self.relation.single_parent = true;
        self
    }

    /// Fail on children whose key matches no parent, instead of dropping them.
    pub fn strict(mut self) -> Self {
        self.relation.strict = true;
        self
    }

    /// Attach already materialized children. Without a parent reference
    /// there is nothing to correlate on, unless there is a single parent.
    pub fn attach(&self, parents: &mut [P], children: Vec<C>) -> RowGraphResult<()> {
        let resolved = self.relation.resolve(false)?;
        let children = children
            .into_iter()
            .map(|child| ReadRecord {
                record: Box::new(child),
                leading: None,
            })
            .collect();

        self.attach_read(&resolved, parents, children)
    }

    /// Read a child recordset and attach it. Member lookups fail before any
    /// row is bound.
    pub fn read(&self, parents: &mut [P], recordset: Recordset) -> RowGraphResult<()> {
        let resolved = self.relation.resolve(false)?;
        let children = self.relation.read(recordset)?;
        self.attach_read(&resolved, parents, children)
    }

    fn attach_read(
        &self,
        resolved: &Resolved,
        parents: &mut [P],
        children: Vec<ReadRecord>,
    ) -> RowGraphResult<()> {
        let parents = parents
            .iter_mut()
            .map(|parent| parent as &mut dyn AnyRecord)
            .collect();

        self.relation.attach(resolved, parents, children)
    }
}

impl<P: Record, C: Record> Default for Children<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, C> Clone for Children<P, C> {
    fn clone(&self) -> Self {
        Self {
            relation: self.relation.clone(),
            types: std::marker::PhantomData,
        }
    }
}

fn downcast_ref<T: Record>(record: &dyn AnyRecord) -> RowGraphResult<&T> {
    record
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RowGraphError::TypeMismatch {
            expected: T::shape().name(),
            found: record.record_shape().name(),
        })
}

/// Collection members of `shape` with a declared recordset index.
pub(crate) fn declared_collections(
    shape: &'static Shape,
) -> impl Iterator<Item = (usize, &'static str, &'static Shape)> {
    shape.members().iter().filter_map(|member| match member.kind {
        MemberKind::Collection(target) => member
            .recordset
            .map(|recordset| (recordset, member.name, target())),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Parent {
        id: i64,
        #[rowgraph(children)]
        children: Vec<Child>,
    }

    #[derive(Clone, Default, Debug, PartialEq, crate::Record)]
    struct Child {
        parent_id: i64,
        value: i64,
    }

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Twins {
        id: i64,
        left: Vec<Child>,
        right: Vec<Child>,
    }

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Frozen {
        id: i64,
        #[rowgraph(readonly)]
        children: Vec<Child>,
    }

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Anonymous {
        code: i64,
        value: i64,
    }

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Holder {
        id: i64,
        anonymous: Vec<Anonymous>,
    }

    fn parents(ids: &[i64]) -> Vec<Parent> {
        ids.iter()
            .map(|id| Parent {
                id: *id,
                children: vec![],
            })
            .collect()
    }

    fn child_rows(rows: &[(i64, i64)]) -> Recordset {
        Recordset::from_rows(
            &["ParentID", "Value"],
            rows.iter()
                .map(|(parent, value)| vec![Value::Int(*parent), Value::Int(*value)])
                .collect(),
        )
    }

    fn values(parent: &Parent) -> Vec<i64> {
        parent.children.iter().map(|child| child.value).collect()
    }

    #[test]
    fn groups_in_recordset_order() {
        let mut parents = parents(&[1, 2, 3]);

        Children::<Parent, Child>::new()
            .read(&mut parents, child_rows(&[(1, 2), (2, 7), (1, 3)]))
            .unwrap();

        assert_eq!(values(&parents[0]), vec![2, 3]);
        assert_eq!(values(&parents[1]), vec![7]);
        assert!(parents[2].children.is_empty());
    }

    #[test]
    fn unmatched_children_are_dropped() {
        let mut parents = parents(&[1]);

        Children::<Parent, Child>::new()
            .read(&mut parents, child_rows(&[(9, 1), (1, 2)]))
            .unwrap();

        assert_eq!(values(&parents[0]), vec![2]);
    }

    #[test]
    fn strict_mode_rejects_unmatched_children() {
        let mut parents = parents(&[1]);

        let result = Children::<Parent, Child>::new()
            .strict()
            .read(&mut parents, child_rows(&[(9, 1)]));

        match result {
            Err(RowGraphError::UnmatchedChild { ty, key }) => {
                assert_eq!(ty, "Child");
                assert_eq!(key, "9");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn duplicate_parents_receive_copies() {
        let mut parents = parents(&[1, 1]);

        Children::<Parent, Child>::new()
            .read(&mut parents, child_rows(&[(1, 5)]))
            .unwrap();

        assert_eq!(values(&parents[0]), vec![5]);
        assert_eq!(values(&parents[1]), vec![5]);
    }

    #[test]
    fn single_parent_ignores_keys() {
        let mut parents = parents(&[1]);

        Children::<Parent, Child>::new()
            .single_parent()
            .read(&mut parents, child_rows(&[(7, 1), (8, 2)]))
            .unwrap();

        assert_eq!(values(&parents[0]), vec![1, 2]);
    }

    #[test]
    fn ambiguous_collections_need_a_name() {
        let mut twins = vec![Twins::default()];

        assert!(matches!(
            Children::<Twins, Child>::new().attach(&mut twins, vec![]),
            Err(RowGraphError::AmbiguousCollection { .. })
        ));

        Children::<Twins, Child>::new()
            .into("right")
            .parent_id(&["parent_id"])
            .attach(
                &mut twins,
                vec![Child {
                    parent_id: 0,
                    value: 4,
                }],
            )
            .unwrap();

        assert!(twins[0].left.is_empty());
        assert_eq!(twins[0].right.len(), 1);
    }

    #[test]
    fn read_only_collection_fails_fast() {
        let mut frozen = vec![Frozen::default()];

        assert!(matches!(
            Children::<Frozen, Child>::new().attach(&mut frozen, vec![]),
            Err(RowGraphError::ReadOnlyMember {
                member: "children",
                ..
            })
        ));
    }

    #[test]
    fn first_column_correlates_without_a_reference() {
        let mut holders = vec![
            Holder {
                id: 10,
                anonymous: vec![],
            },
            Holder {
                id: 20,
                anonymous: vec![],
            },
        ];

        let recordset = Recordset::from_rows(
            &["code", "value"],
            vec![vec![Value::Int(20), Value::Int(1)]],
        );

        Children::<Holder, Anonymous>::new()
            .read(&mut holders, recordset)
            .unwrap();

        assert!(holders[0].anonymous.is_empty());
        assert_eq!(holders[1].anonymous[0].value, 1);
    }

    #[test]
    fn closures_replace_inference() {
        let mut parents = parents(&[1, 2]);

        Children::<Parent, Child>::new()
            .id_by(|parent| Key::of(&(parent.id * 10)))
            .parent_id_by(|child| Key::of(&child.value))
            .into_by(|parent, children| parent.children.extend(children))
            .attach(
                &mut parents,
                vec![
                    Child {
                        parent_id: 0,
                        value: 20,
                    },
                    Child {
                        parent_id: 0,
                        value: 10,
                    },
                ],
            )
            .unwrap();

        assert_eq!(values(&parents[0]), vec![10]);
        assert_eq!(values(&parents[1]), vec![20]);
    }

    #[test]
    fn unknown_names_fail_with_the_name() {
        let mut parents = parents(&[1]);

        assert!(matches!(
            Children::<Parent, Child>::new()
                .parent_id(&["ParentKey"])
                .attach(&mut parents, vec![]),
            Err(RowGraphError::UnknownMember { ty: "Child", .. })
        ));
    }

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Settings {
        theme: String,
        entries: Vec<Entry>,
    }

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Entry {
        key: String,
    }

    #[test]
    fn member_lookups_fail_before_rows_are_bound() {
        let mut anonymous = vec![Anonymous::default()];
        let recordset = Recordset::from_rows(
            &["ParentID", "Value"],
            vec![vec![Value::Int(1), "seven".into()]],
        );

        assert!(matches!(
            Children::<Anonymous, Child>::new().read(&mut anonymous, recordset),
            Err(RowGraphError::MissingCollection { ty: "Anonymous", child: "Child" })
        ));
    }

    #[test]
    fn single_parent_without_keys() {
        let entries = || Recordset::from_rows(&["key"], vec![vec!["a".into()]]);
        let children = Children::<Settings, Entry>::new().single_parent();

        let mut none: Vec<Settings> = vec![];
        children.read(&mut none, entries()).unwrap();

        let mut one = vec![Settings::default()];
        children.read(&mut one, entries()).unwrap();
        assert_eq!(one[0].entries[0].key, "a");

        assert!(Children::<Settings, Entry>::new()
            .read(&mut one, entries())
            .is_err());
    }
}
