//!
//! Column name transforms.
//!
//! A [`ColumnMapping`] is an ordered chain of rules that rewrites a column name
//! before it is matched against member names. Two process-wide chains exist,
//! one for inbound table columns and one for outbound parameters.
//!

use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use regex::Regex;

use crate::record::{Record, Shape};

/// Outcome of a mapping callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mapped {
    /// Let the next rule decide.
    Defer,
    /// Bind the column to the member with this field name.
    Member(String),
    /// Leave the column unbound, without fallback matching.
    Unmapped,
}

/// Canonical form of a column name after all rules ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Match by column name.
    Name(String),
    /// A callback picked the member.
    Member(String),
    Unmapped,
}

type Callback = Arc<dyn Fn(&Shape, &str) -> Mapped + Send + Sync>;

#[derive(Clone)]
enum Action {
    Replace(Regex, String),
    StripPrefix(String),
    StripSuffix(String),
    Callback(Callback),
}

#[derive(Clone)]
struct Rule {
    action: Action,
    only: Option<TypeId>,
}

static GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

///
/// Ordered, chainable name rewrite rules.
///
/// Every modification yields a new generation number, which is part of the key
/// of every plan derived with the mapping, so a changed chain never reuses a
/// plan derived under older rules.
///
#[derive(Clone)]
pub struct ColumnMapping {
    rules: Vec<Rule>,
    generation: u64,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self {
            rules: vec![],
            generation: 0,
        }
    }

    fn push(mut self, action: Action) -> Self {
        self.rules.push(Rule { action, only: None });
        self.generation = next_generation();
        self
    }

    /// Regex substitution of every match.
    pub fn replace(self, regex: Regex, replacement: &str) -> Self {
        self.push(Action::Replace(regex, replacement.to_owned()))
    }

    /// Remove a literal prefix, case-insensitive.
    pub fn strip_prefix(self, prefix: &str) -> Self {
        self.push(Action::StripPrefix(prefix.to_owned()))
    }

    /// Remove a literal suffix, case-insensitive.
    pub fn strip_suffix(self, suffix: &str) -> Self {
        self.push(Action::StripSuffix(suffix.to_owned()))
    }

    pub fn map<F>(self, callback: F) -> Self
    where
        F: Fn(&Shape, &str) -> Mapped + Send + Sync + 'static,
    {
        self.push(Action::Callback(Arc::new(callback)))
    }

    /// Restrict the most recently added rule to one target type.
    pub fn for_type<T: Record>(mut self) -> Self {
        if let Some(rule) = self.rules.last_mut() {
            rule.only = Some(TypeId::of::<T>());
            self.generation = next_generation();
        }
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run the chain over one column name.
    pub fn apply(&self, shape: &Shape, column: &str) -> Target {
        let mut name = column.to_owned();

        for rule in &self.rules {
            if let Some(only) = rule.only {
                if only != shape.type_id() {
                    continue;
                }
            }

            match &rule.action {
                Action::Replace(regex, replacement) => {
                    name = regex.replace_all(&name, replacement.as_str()).into_owned();
                }
                Action::StripPrefix(prefix) => {
                    if starts_with_ignore_case(&name, prefix) {
                        name = name[prefix.len()..].to_owned();
                    }
                }
                Action::StripSuffix(suffix) => {
                    if ends_with_ignore_case(&name, suffix) {
                        name.truncate(name.len() - suffix.len());
                    }
                }
                Action::Callback(callback) => match callback(shape, &name) {
                    Mapped::Defer => {}
                    Mapped::Member(member) => return Target::Member(member),
                    Mapped::Unmapped => return Target::Unmapped,
                },
            }
        }

        Target::Name(name)
    }

    /// Process-wide chain for inbound table columns.
    pub fn tables() -> Arc<ColumnMapping> {
        TABLES.read().clone()
    }

    /// Process-wide chain for outbound parameters.
    pub fn parameters() -> Arc<ColumnMapping> {
        PARAMETERS.read().clone()
    }

    /// Extend or replace the table chain, e.g.
    /// `ColumnMapping::configure_tables(|m| m.strip_prefix("int"))`.
    pub fn configure_tables<F>(configure: F)
    where
        F: FnOnce(ColumnMapping) -> ColumnMapping,
    {
        configure_global(&TABLES, "table", configure);
    }

    pub fn configure_parameters<F>(configure: F)
    where
        F: FnOnce(ColumnMapping) -> ColumnMapping,
    {
        configure_global(&PARAMETERS, "parameter", configure);
    }

    /// Drop every global rule.
    pub fn reset() {
        *TABLES.write() = Arc::new(ColumnMapping::new().bump());
        *PARAMETERS.write() = Arc::new(ColumnMapping::new().bump());
    }

    fn bump(mut self) -> Self {
        self.generation = next_generation();
        self
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ColumnMapping {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(
            fmt,
            "ColumnMapping({} rules, generation {})",
            self.rules.len(),
            self.generation
        )
    }
}

lazy_static! {
    static ref TABLES: RwLock<Arc<ColumnMapping>> = RwLock::new(Arc::new(ColumnMapping::new()));
    static ref PARAMETERS: RwLock<Arc<ColumnMapping>> =
        RwLock::new(Arc::new(ColumnMapping::new()));
}

/// Runs `configure` without holding the lock, so it may read the globals.
/// A concurrent configuration in between is overwritten.
fn configure_global<F>(global: &RwLock<Arc<ColumnMapping>>, kind: &str, configure: F)
where
    F: FnOnce(ColumnMapping) -> ColumnMapping,
{
    let current = (**global.read()).clone();
    let configured = configure(current);
    log::debug!(
        "{} column mapping now has {} rules (generation {})",
        kind,
        configured.len(),
        configured.generation
    );
    *global.write() = Arc::new(configured);
}

fn starts_with_ignore_case(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.is_char_boundary(prefix.len())
        && name[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    let start = match name.len().checked_sub(suffix.len()) {
        Some(start) => start,
        None => return false,
    };
    name.is_char_boundary(start) && name[start..].eq_ignore_ascii_case(suffix)
}

/// Lowercase with underscores removed, so `BeerID` meets `beer_id`.
pub(crate) fn loose(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, crate::Record)]
    struct Invoice {
        id: i64,
    }

    #[derive(Clone, Default, crate::Record)]
    struct Line {
        id: i64,
    }

    #[test]
    fn rules_apply_in_order() {
        let mapping = ColumnMapping::new()
            .strip_prefix("int")
            .replace(Regex::new("_+").unwrap(), "")
            .strip_suffix("Code");

        assert_eq!(
            mapping.apply(Invoice::shape(), "INTinvoice_number_code"),
            Target::Name("invoicenumber".into())
        );
        assert_eq!(
            mapping.apply(Invoice::shape(), "name"),
            Target::Name("name".into())
        );
    }

    #[test]
    fn callbacks_defer_pick_or_suppress() {
        let mapping = ColumnMapping::new()
            .map(|_, column| match column {
                "legacy" => Mapped::Unmapped,
                "Key" => Mapped::Member("id".into()),
                _ => Mapped::Defer,
            })
            .strip_prefix("x");

        assert_eq!(mapping.apply(Invoice::shape(), "legacy"), Target::Unmapped);
        assert_eq!(
            mapping.apply(Invoice::shape(), "Key"),
            Target::Member("id".into())
        );
        assert_eq!(
            mapping.apply(Invoice::shape(), "xid"),
            Target::Name("id".into())
        );
    }

    #[test]
    fn rules_can_target_one_type() {
        let mapping = ColumnMapping::new().strip_prefix("Line").for_type::<Line>();

        assert_eq!(
            mapping.apply(Line::shape(), "LineId"),
            Target::Name("Id".into())
        );
        assert_eq!(
            mapping.apply(Invoice::shape(), "LineId"),
            Target::Name("LineId".into())
        );
    }

    #[test]
    fn every_change_is_a_new_generation() {
        let a = ColumnMapping::new().strip_prefix("a");
        let b = a.clone().strip_suffix("b");

        assert_ne!(a.generation(), b.generation());
        assert_eq!(a.clone().generation(), a.generation());
    }

    #[test]
    fn loose_names() {
        assert_eq!(loose("BeerID"), loose("beer_id"));
        assert_ne!(loose("Paid"), loose("p_id_x"));
    }
}
