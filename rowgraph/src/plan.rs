//!
//! Binding plans: which column feeds which member.
//!
//! A plan is derived once per (type, column signature, mapping generation) and
//! shared by every later read with the same key.
//!

use lazy_static::lazy_static;
use std::any::TypeId;
use std::sync::Arc;

use crate::cache::Memo;
use crate::mapping::{loose, ColumnMapping, Target};
use crate::record::{AnyRecord, Member, Shape};
use crate::value::Value;
use crate::RowGraphResult;

/// Column index → member index for one target type.
#[derive(Debug)]
pub struct BindingPlan {
    shape: &'static Shape,
    columns: Vec<Option<usize>>,
}

impl BindingPlan {
    pub fn shape(&self) -> &'static Shape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Member bound to the column at `index`, relative to the plan.
    pub fn member_for(&self, index: usize) -> Option<usize> {
        self.columns.get(index).copied().flatten()
    }

    pub fn bound_count(&self) -> usize {
        self.columns.iter().filter(|member| member.is_some()).count()
    }

    /// Write the bound values into `target`. `values` starts at the plan's first column.
    pub fn bind(&self, target: &mut dyn AnyRecord, values: &[Value]) -> RowGraphResult<()> {
        for (member, value) in self.columns.iter().zip(values) {
            if let Some(member) = member {
                target.set_value(*member, value.clone())?;
            }
        }
        Ok(())
    }
}

type PlanKey = (TypeId, u64, Arc<[String]>);

lazy_static! {
    static ref PLANS: Memo<PlanKey, BindingPlan> = Memo::new();
}

/// The cached plan binding `names` to `shape` under the table mapping.
pub fn binding_plan(shape: &'static Shape, names: &[String]) -> RowGraphResult<Arc<BindingPlan>> {
    binding_plan_with(shape, names, &ColumnMapping::tables())
}

pub fn binding_plan_with(
    shape: &'static Shape,
    names: &[String],
    mapping: &ColumnMapping,
) -> RowGraphResult<Arc<BindingPlan>> {
    let key = (shape.type_id(), mapping.generation(), Arc::from(names));

    PLANS.get_or_derive(key, |(_, _, names)| Ok(derive(shape, names, mapping)))
}

fn derive(shape: &'static Shape, names: &[String], mapping: &ColumnMapping) -> BindingPlan {
    let mut taken = vec![false; shape.members().len()];

    let columns = names
        .iter()
        .map(|name| {
            let member = match_member(shape, mapping, name, |member| {
                member.is_scalar() && member.settable
            })?;

            if taken[member] {
                return None;
            }
            taken[member] = true;
            Some(member)
        })
        .collect::<Vec<_>>();

    let plan = BindingPlan { shape, columns };

    log::debug!(
        "derived binding plan for {} over {:?}: {} of {} columns bound",
        shape.name(),
        names,
        plan.bound_count(),
        plan.len()
    );

    plan
}

///
/// Find the member a column binds to.
///
/// The column runs through the mapping chain first. A plain name then matches
/// a member's column name case-insensitively, and failing that, ignoring
/// underscores as well. A member picked by a callback is looked up by field
/// name.
///
pub fn match_member<F>(
    shape: &Shape,
    mapping: &ColumnMapping,
    column: &str,
    accepts: F,
) -> Option<usize>
where
    F: Fn(&Member) -> bool,
{
    let members = shape.members();

    match mapping.apply(shape, column) {
        Target::Unmapped => None,
        Target::Member(name) => members
            .iter()
            .position(|member| member.name.eq_ignore_ascii_case(&name) && accepts(member)),
        Target::Name(name) => members
            .iter()
            .position(|member| member.column_name().eq_ignore_ascii_case(&name) && accepts(member))
            .or_else(|| {
                let name = loose(&name);
                members
                    .iter()
                    .position(|member| loose(member.column_name()) == name && accepts(member))
            }),
    }
}

/// Whether any scalar member of `shape` takes the column.
pub(crate) fn accepts(shape: &Shape, mapping: &ColumnMapping, column: &str) -> bool {
    match_member(shape, mapping, column, Member::is_scalar).is_some()
}
