//!
//! Identity and parent-reference inference.
//!
//! Absent explicit markers, a type's identity is found by name:
//!
//! ```text
//! 1. members marked #[rowgraph(id)]        (ordered by ordinal)
//! 2. a member named `id`
//! 3. `{type}_id`, then `{type}id`           (never a mere "...id" suffix)
//! ```
//!
//! A child's reference to its parent is found by:
//!
//! ```text
//! 1. members marked #[rowgraph(parent_id)] (ordered by ordinal)
//! 2. the parent's own identity names        (when those are not a bare `id`)
//! 3. `parent_id`, or a name ending in it
//! 4. `{parent}_id`, then `{parent}id`
//! ```
//!
//! A missing identity is a configuration error. A missing parent reference is
//! not: the caller falls back to correlating on the first column.
//!

use lazy_static::lazy_static;
use std::any::TypeId;
use std::sync::Arc;

use crate::cache::Memo;
use crate::mapping::loose;
use crate::record::{AnyRecord, Member, Shape};
use crate::value::Key;
use crate::{RowGraphError, RowGraphResult};

/// Ordered members forming a (possibly composite) key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMembers {
    members: Vec<usize>,
}

impl KeyMembers {
    pub fn new(members: Vec<usize>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn names(&self, shape: &Shape) -> Vec<&'static str> {
        self.members
            .iter()
            .filter_map(|index| shape.member(*index))
            .map(|member| member.name)
            .collect()
    }

    pub fn key(&self, record: &dyn AnyRecord) -> RowGraphResult<Key> {
        self.members
            .iter()
            .map(|member| record.get_value(*member))
            .collect::<RowGraphResult<Vec<_>>>()
            .map(Key::new)
    }
}

lazy_static! {
    static ref IDENTITIES: Memo<TypeId, KeyMembers> = Memo::new();
    static ref PARENT_REFERENCES: Memo<(TypeId, TypeId), KeyMembers> = Memo::new();
}

/// The identity members of `shape`, cached per type.
pub fn identity(shape: &'static Shape) -> RowGraphResult<Arc<KeyMembers>> {
    IDENTITIES.get_or_derive(shape.type_id(), |_| infer_identity(shape))
}

/// The members of `child` referencing a `parent`, cached per pair.
/// Empty when nothing qualifies.
pub fn parent_reference(
    child: &'static Shape,
    parent: &'static Shape,
) -> RowGraphResult<Arc<KeyMembers>> {
    PARENT_REFERENCES.get_or_derive((child.type_id(), parent.type_id()), |_| {
        infer_parent_reference(child, parent)
    })
}

/// Explicitly named members, failing on the first name that matches nothing.
pub fn named<S: AsRef<str>>(shape: &Shape, names: &[S]) -> RowGraphResult<KeyMembers> {
    names
        .iter()
        .map(|name| shape.find_or_err(name.as_ref()))
        .collect::<RowGraphResult<Vec<_>>>()
        .map(KeyMembers::new)
}

fn scalars(shape: &Shape) -> impl Iterator<Item = (usize, &Member)> {
    shape
        .members()
        .iter()
        .enumerate()
        .filter(|(_, member)| member.is_scalar())
}

fn marked<F>(shape: &Shape, ordinal: F) -> Vec<usize>
where
    F: Fn(&Member) -> Option<u16>,
{
    let mut marked = scalars(shape)
        .filter_map(|(index, member)| ordinal(member).map(|ordinal| (ordinal, index)))
        .collect::<Vec<_>>();
    marked.sort();
    marked.into_iter().map(|(_, index)| index).collect()
}

fn named_like(shape: &Shape, exclude: &[usize], names: &[String]) -> Vec<usize> {
    scalars(shape)
        .filter(|(index, _)| !exclude.contains(index))
        .filter(|(_, member)| names.iter().any(|name| member.name.eq_ignore_ascii_case(name)))
        .map(|(index, _)| index)
        .collect()
}

/// `{type}_id` spellings, preferred over `{type}id`.
fn underscored_id(type_name: &str) -> Vec<String> {
    vec![
        format!("{}_id", type_name),
        format!("{}_id", snake_case(type_name)),
    ]
}

fn suffixed_id(type_name: &str) -> Vec<String> {
    vec![format!("{}id", type_name)]
}

enum Found {
    One(Vec<usize>),
    Many(Vec<usize>),
    None,
}

fn found(candidates: Vec<usize>) -> Found {
    match candidates.len() {
        0 => Found::None,
        1 => Found::One(candidates),
        _ => Found::Many(candidates),
    }
}

fn infer_identity(shape: &'static Shape) -> RowGraphResult<KeyMembers> {
    let explicit = marked(shape, |member| member.identity);
    if !explicit.is_empty() {
        return Ok(KeyMembers::new(explicit));
    }

    let rules: [Vec<String>; 3] = [
        vec!["id".to_owned()],
        underscored_id(shape.name()),
        suffixed_id(shape.name()),
    ];

    for names in rules.iter() {
        match found(named_like(shape, &[], names)) {
            Found::One(members) => {
                log::debug!(
                    "inferred identity {:?} for {}",
                    KeyMembers::new(members.clone()).names(shape),
                    shape.name()
                );
                return Ok(KeyMembers::new(members));
            }
            Found::Many(members) => {
                return Err(RowGraphError::AmbiguousIdentity {
                    ty: shape.name(),
                    candidates: KeyMembers::new(members).names(shape),
                })
            }
            Found::None => {}
        }
    }

    Err(RowGraphError::MissingIdentity { ty: shape.name() })
}

fn infer_parent_reference(
    child: &'static Shape,
    parent: &'static Shape,
) -> RowGraphResult<KeyMembers> {
    let explicit = marked(child, |member| member.parent_reference);
    if !explicit.is_empty() {
        return Ok(KeyMembers::new(explicit));
    }

    // A self-referencing type must not find its own identity.
    let exclude = if child.type_id() == parent.type_id() {
        identity(child)
            .map(|identity| identity.members().to_vec())
            .unwrap_or_default()
    } else {
        vec![]
    };

    if child.type_id() != parent.type_id() {
        if let Some(members) = same_names_as_identity(child, parent) {
            return Ok(members);
        }
    }

    let rules: [Box<dyn Fn(&Member) -> bool>; 3] = [
        Box::new(|member: &Member| loose(member.name).ends_with("parentid")),
        Box::new(|member: &Member| {
            underscored_id(parent.name())
                .iter()
                .any(|name| member.name.eq_ignore_ascii_case(name))
        }),
        Box::new(|member: &Member| {
            suffixed_id(parent.name())
                .iter()
                .any(|name| member.name.eq_ignore_ascii_case(name))
        }),
    ];

    for rule in rules.iter() {
        let candidates = scalars(child)
            .filter(|(index, member)| !exclude.contains(index) && rule(member))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        match found(candidates) {
            Found::One(members) => return Ok(KeyMembers::new(members)),
            Found::Many(members) => {
                log::warn!(
                    "{} has several candidate references to {}: {:?}; correlating on the first column",
                    child.name(),
                    parent.name(),
                    KeyMembers::new(members).names(child)
                );
                return Ok(KeyMembers::new(vec![]));
            }
            Found::None => {}
        }
    }

    log::debug!(
        "{} has no reference to {}; correlating on the first column",
        child.name(),
        parent.name()
    );
    Ok(KeyMembers::new(vec![]))
}

/// Child members named like each of the parent's identity members, in the
/// parent's order. Skipped for a bare `id` identity.
fn same_names_as_identity(child: &Shape, parent: &'static Shape) -> Option<KeyMembers> {
    let identity = identity(parent).ok()?;
    let names = identity.names(parent);

    if names.len() == 1 && names[0].eq_ignore_ascii_case("id") {
        return None;
    }

    names
        .iter()
        .map(|name| match named_like(child, &[], &[name.to_string()]).as_slice() {
            [index] => Some(*index),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(KeyMembers::new)
}

/// `InvoiceLine` → `invoice_line`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;

    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if previous_lower {
                snake.push('_');
            }
            snake.push(c.to_ascii_lowercase());
            previous_lower = false;
        } else {
            previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            snake.push(c);
        }
    }

    snake
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[derive(Clone, Default, crate::Record)]
    struct ExactId {
        another_id: i64,
        id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct ClassWithSuffixed {
        paid: bool,
        class_with_suffixed_id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Both {
        bothid: i64,
        both_id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Nothing {
        paid: bool,
        name: String,
    }

    #[derive(Clone, Default, crate::Record)]
    #[rowgraph(name = "Beer")]
    struct NakedBeer {
        id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Glass {
        id: i64,
        beer_id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Invoice {
        invoice_id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct InvoiceLine {
        id: i64,
        parent_id: i64,
        invoice_id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Order {
        #[rowgraph(id = 2)]
        region: String,
        #[rowgraph(id = 1)]
        number: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct OrderLine {
        #[rowgraph(parent_id = 1)]
        order_number: i64,
        #[rowgraph(parent_id = 2)]
        order_region: String,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Node {
        id: i64,
        parent_id: Option<i64>,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Orphan {
        name: String,
    }

    #[test]
    fn exact_id_beats_suffix() {
        let identity = identity(ExactId::shape()).unwrap();
        assert_eq!(identity.names(ExactId::shape()), vec!["id"]);
    }

    #[test]
    fn type_prefixed_id_beats_reserved_suffix() {
        let shape = ClassWithSuffixed::shape();
        assert_eq!(
            identity(shape).unwrap().names(shape),
            vec!["class_with_suffixed_id"]
        );
    }

    #[test]
    fn underscored_beats_concatenated() {
        let shape = Both::shape();
        assert_eq!(identity(shape).unwrap().names(shape), vec!["both_id"]);
    }

    #[test]
    fn missing_identity_is_an_error() {
        assert!(matches!(
            identity(Nothing::shape()),
            Err(RowGraphError::MissingIdentity { ty: "Nothing" })
        ));
    }

    #[test]
    fn composite_identity_follows_ordinals() {
        let shape = Order::shape();
        assert_eq!(identity(shape).unwrap().names(shape), vec!["number", "region"]);

        let child = OrderLine::shape();
        assert_eq!(
            parent_reference(child, shape).unwrap().names(child),
            vec!["order_number", "order_region"]
        );
    }

    #[test]
    fn naked_parent_id_is_type_prefixed() {
        let child = Glass::shape();
        let reference = parent_reference(child, NakedBeer::shape()).unwrap();
        assert_eq!(reference.names(child), vec!["beer_id"]);
    }

    #[test]
    fn identity_name_beats_parent_id() {
        let child = InvoiceLine::shape();
        let reference = parent_reference(child, Invoice::shape()).unwrap();
        assert_eq!(reference.names(child), vec!["invoice_id"]);
    }

    #[test]
    fn parent_id_for_bare_identities() {
        let child = InvoiceLine::shape();
        let reference = parent_reference(child, ExactId::shape()).unwrap();
        assert_eq!(reference.names(child), vec!["parent_id"]);
    }

    #[test]
    fn self_reference_skips_own_identity() {
        let shape = Node::shape();
        let reference = parent_reference(shape, shape).unwrap();
        assert_eq!(reference.names(shape), vec!["parent_id"]);
    }

    #[test]
    fn no_reference_is_empty() {
        let reference = parent_reference(Orphan::shape(), Invoice::shape()).unwrap();
        assert!(reference.is_empty());
    }

    #[test]
    fn named_lookup_reports_the_name() {
        match named(Glass::shape(), &["beer_id", "brewery_id"]) {
            Err(RowGraphError::UnknownMember { ty, name }) => {
                assert_eq!(ty, "Glass");
                assert_eq!(name, "brewery_id");
            }
            other => panic!("unexpected {:?}", other.map(|k| k.members().to_vec())),
        }
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(snake_case("InvoiceLine"), "invoice_line");
        assert_eq!(snake_case("Beer"), "beer");
        assert_eq!(snake_case("ABC"), "abc");
    }
}
