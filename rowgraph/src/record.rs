//!
//! Target types and their compiled accessor tables.
//!
//! `#[derive(Record)]` describes a struct as a [`Shape`]: the ordered list of
//! bindable members together with the declarative metadata attached to them.
//! Members are addressed by their index in the shape, and the generated
//! [`Access`] implementation dispatches on that index, so binding a row never
//! looks anything up by name.
//!

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::value::{FromValue, Value};
use crate::{RowGraphError, RowGraphResult};

/// A struct that rows can be bound to.
///
/// Implemented by `#[derive(Record)]`.
pub trait Record: Access + Any + Clone + Default + Send + Sync {
    fn shape() -> &'static Shape;
}

/// Member access addressed by member index.
///
/// Every operation is fallible: an index that does not denote a member of the
/// right kind, or a member that is read-only, is reported, never ignored.
pub trait Access: Send + Sync + 'static {
    fn set_value(&mut self, member: usize, value: Value) -> RowGraphResult<()>;

    fn get_value(&self, member: usize) -> RowGraphResult<Value>;

    fn set_object(
        &mut self,
        member: usize,
        object: Option<Box<dyn AnyRecord>>,
    ) -> RowGraphResult<()>;

    fn object(&self, member: usize) -> Option<&dyn AnyRecord>;

    fn set_children(
        &mut self,
        member: usize,
        children: Vec<Box<dyn AnyRecord>>,
    ) -> RowGraphResult<()>;

    fn set_shared(
        &mut self,
        member: usize,
        shared: Option<Arc<dyn Any + Send + Sync>>,
    ) -> RowGraphResult<()>;
}

/// Type-erased record, so chains and pipelines can be
/// lists of steps instead of generic parameter lists.
pub trait AnyRecord: Access {
    fn record_shape(&self) -> &'static Shape;

    fn clone_record(&self) -> Box<dyn AnyRecord>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn into_shared(self: Box<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Record> AnyRecord for T {
    fn record_shape(&self) -> &'static Shape {
        T::shape()
    }

    fn clone_record(&self) -> Box<dyn AnyRecord> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn into_shared(self: Box<Self>) -> Arc<dyn Any + Send + Sync> {
        Arc::new(*self)
    }
}

/// Metadata of a target type, built once per type.
pub struct Shape {
    name: &'static str,
    type_id: TypeId,
    members: Vec<Member>,
    create: fn() -> Box<dyn AnyRecord>,
}

impl Shape {
    pub fn new<T: Record>(name: &'static str, members: Vec<Member>) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>(),
            members,
            create: create::<T>,
        }
    }

    /// Type name used by identity inference.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    /// Member by field name, case-insensitive.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|member| member.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn find_or_err(&self, name: &str) -> RowGraphResult<usize> {
        self.find(name).ok_or_else(|| RowGraphError::UnknownMember {
            ty: self.name,
            name: name.to_owned(),
        })
    }

    /// A fresh default instance.
    pub fn create(&self) -> Box<dyn AnyRecord> {
        (self.create)()
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(fmt, "Shape({})", self.name)
    }
}

fn create<T: Record>() -> Box<dyn AnyRecord> {
    Box::new(T::default())
}

#[derive(Clone, Copy)]
pub enum MemberKind {
    Scalar,
    /// Sub-object filled from a later group of the same row.
    Object(fn() -> &'static Shape),
    /// Children filled from a later recordset.
    Collection(fn() -> &'static Shape),
    /// Reference to another record of the same result, shared by `Arc`.
    Shared(fn() -> &'static Shape),
}

impl MemberKind {
    /// Shape of the record type the member holds, if any.
    pub fn target(&self) -> Option<&'static Shape> {
        match self {
            MemberKind::Scalar => None,
            MemberKind::Object(shape)
            | MemberKind::Collection(shape)
            | MemberKind::Shared(shape) => Some(shape()),
        }
    }
}

impl std::fmt::Debug for MemberKind {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            MemberKind::Scalar => write!(fmt, "Scalar"),
            MemberKind::Object(shape) => write!(fmt, "Object({})", shape().name()),
            MemberKind::Collection(shape) => write!(fmt, "Collection({})", shape().name()),
            MemberKind::Shared(shape) => write!(fmt, "Shared({})", shape().name()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Member {
    pub name: &'static str,
    pub column: Option<&'static str>,
    pub kind: MemberKind,
    pub settable: bool,
    pub identity: Option<u16>,
    pub parent_reference: Option<u16>,
    pub child_collection: bool,
    pub recordset: Option<usize>,
}

impl Member {
    fn new(name: &'static str, kind: MemberKind) -> Self {
        Self {
            name,
            column: None,
            kind,
            settable: true,
            identity: None,
            parent_reference: None,
            child_collection: false,
            recordset: None,
        }
    }

    pub fn scalar(name: &'static str) -> Self {
        Self::new(name, MemberKind::Scalar)
    }

    pub fn object(name: &'static str, shape: fn() -> &'static Shape) -> Self {
        Self::new(name, MemberKind::Object(shape))
    }

    pub fn collection(name: &'static str, shape: fn() -> &'static Shape) -> Self {
        Self::new(name, MemberKind::Collection(shape))
    }

    pub fn shared(name: &'static str, shape: fn() -> &'static Shape) -> Self {
        Self::new(name, MemberKind::Shared(shape))
    }

    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.settable = false;
        self
    }

    pub fn identity(mut self, ordinal: u16) -> Self {
        self.identity = Some(ordinal);
        self
    }

    pub fn parent_reference(mut self, ordinal: u16) -> Self {
        self.parent_reference = Some(ordinal);
        self
    }

    pub fn child_collection(mut self) -> Self {
        self.child_collection = true;
        self
    }

    pub fn recordset(mut self, index: usize) -> Self {
        self.recordset = Some(index);
        self
    }

    /// Name matched against column names.
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, MemberKind::Scalar)
    }

    pub(crate) fn holds(&self, shape: &Shape) -> bool {
        matches!(self.kind, MemberKind::Object(target) if target().type_id() == shape.type_id())
    }

    pub(crate) fn collects(&self, shape: &Shape) -> bool {
        matches!(self.kind, MemberKind::Collection(target) if target().type_id() == shape.type_id())
    }

    pub(crate) fn shares(&self, shape: &Shape) -> bool {
        matches!(self.kind, MemberKind::Shared(target) if target().type_id() == shape.type_id())
    }
}

pub(crate) fn downcast<T: Record>(record: Box<dyn AnyRecord>) -> RowGraphResult<T> {
    let found = record.record_shape().name();
    record
        .into_any()
        .downcast::<T>()
        .map(|record| *record)
        .map_err(|_| RowGraphError::TypeMismatch {
            expected: T::shape().name(),
            found,
        })
}

//
// Support functions called from derived code.
//

#[doc(hidden)]
pub fn convert<T: FromValue>(
    value: Value,
    ty: &'static str,
    member: &'static str,
) -> RowGraphResult<T> {
    T::from_value(value).map_err(|value| RowGraphError::Conversion {
        ty,
        member,
        value: value.to_string(),
    })
}

#[doc(hidden)]
pub fn downcast_object<T: Record>(object: Option<Box<dyn AnyRecord>>) -> RowGraphResult<Option<T>> {
    object.map(downcast::<T>).transpose()
}

#[doc(hidden)]
pub fn downcast_children<T: Record>(children: Vec<Box<dyn AnyRecord>>) -> RowGraphResult<Vec<T>> {
    children.into_iter().map(downcast::<T>).collect()
}

#[doc(hidden)]
pub fn downcast_shared<T: Record>(
    shared: Option<Arc<dyn Any + Send + Sync>>,
) -> RowGraphResult<Option<Arc<T>>> {
    shared
        .map(|shared| {
            shared
                .downcast::<T>()
                .map_err(|_| RowGraphError::TypeMismatch {
                    expected: T::shape().name(),
                    found: "shared record",
                })
        })
        .transpose()
}

/// Error for an access the member at `index` does not support.
#[doc(hidden)]
pub fn unsupported(shape: &'static Shape, index: usize) -> RowGraphError {
    match shape.member(index) {
        Some(member) if !member.settable => RowGraphError::ReadOnlyMember {
            ty: shape.name(),
            member: member.name,
        },
        Some(member) => RowGraphError::TypeMismatch {
            expected: shape.name(),
            found: member.name,
        },
        None => RowGraphError::UnknownMember {
            ty: shape.name(),
            name: format!("#{}", index),
        },
    }
}
