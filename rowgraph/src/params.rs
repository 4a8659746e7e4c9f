//!
//! Outbound parameters: the reverse direction, from a record to the
//! `(name, value)` pairs a command is parameterized with.
//!

use crate::mapping::ColumnMapping;
use crate::plan::match_member;
use crate::record::{AnyRecord, Member, MemberKind};
use crate::value::Value;
use crate::RowGraphResult;

#[derive(Clone, Copy, Debug, Default)]
pub struct ParameterOptions {
    /// Also emit the scalar members of sub-objects, under their own names.
    /// A name already taken by an enclosing record is not repeated.
    pub flatten_objects: bool,
}

/// Every scalar member of `record`, named by its column name.
pub fn to_parameters(
    record: &dyn AnyRecord,
    options: ParameterOptions,
) -> RowGraphResult<Vec<(String, Value)>> {
    let mut parameters = vec![];
    collect(record, options, &mut parameters)?;
    Ok(parameters)
}

fn collect(
    record: &dyn AnyRecord,
    options: ParameterOptions,
    parameters: &mut Vec<(String, Value)>,
) -> RowGraphResult<()> {
    let members = record.record_shape().members();

    for (index, member) in members.iter().enumerate() {
        if !member.is_scalar() {
            continue;
        }
        let name = member.column_name();
        if parameters
            .iter()
            .any(|(taken, _)| taken.eq_ignore_ascii_case(name))
        {
            continue;
        }
        parameters.push((name.to_owned(), record.get_value(index)?));
    }

    if options.flatten_objects {
        for (index, _) in objects(members) {
            if let Some(object) = record.object(index) {
                collect(object, options, parameters)?;
            }
        }
    }

    Ok(())
}

fn objects(members: &[Member]) -> impl Iterator<Item = (usize, &Member)> {
    members
        .iter()
        .enumerate()
        .filter(|(_, member)| matches!(member.kind, MemberKind::Object(_)))
}

/// Values for the parameter `names` a command declares, matched through the
/// process-wide parameter mapping.
pub fn bind_parameters<S: AsRef<str>>(
    record: &dyn AnyRecord,
    names: &[S],
    options: ParameterOptions,
) -> RowGraphResult<Vec<(String, Value)>> {
    bind_parameters_with(record, names, &ColumnMapping::parameters(), options)
}

///
/// Values for the parameter `names`, matched like inbound columns are.
///
/// A name no member matches binds NULL. With `flatten_objects`, names the
/// record itself does not match are looked up in its sub-objects, depth first.
///
pub fn bind_parameters_with<S: AsRef<str>>(
    record: &dyn AnyRecord,
    names: &[S],
    mapping: &ColumnMapping,
    options: ParameterOptions,
) -> RowGraphResult<Vec<(String, Value)>> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let value = lookup(record, name, mapping, options)?.unwrap_or(Value::Null);
            Ok((name.to_owned(), value))
        })
        .collect()
}

fn lookup(
    record: &dyn AnyRecord,
    name: &str,
    mapping: &ColumnMapping,
    options: ParameterOptions,
) -> RowGraphResult<Option<Value>> {
    let shape = record.record_shape();

    if let Some(index) = match_member(shape, mapping, name, Member::is_scalar) {
        return record.get_value(index).map(Some);
    }

    if options.flatten_objects {
        for (index, _) in objects(shape.members()) {
            if let Some(object) = record.object(index) {
                if let Some(value) = lookup(object, name, mapping, options)? {
                    return Ok(Some(value));
                }
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Regex;

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Address {
        id: i64,
        city: String,
    }

    #[derive(Clone, Default, Debug, crate::Record)]
    struct Customer {
        id: i64,
        #[rowgraph(column = "CustomerName")]
        name: String,
        #[rowgraph(readonly)]
        rating: Option<f64>,
        address: Option<Box<Address>>,
    }

    fn customer() -> Customer {
        Customer {
            id: 3,
            name: "ada".into(),
            rating: None,
            address: Some(Box::new(Address {
                id: 9,
                city: "london".into(),
            })),
        }
    }

    #[test]
    fn scalars_become_parameters() {
        let parameters = to_parameters(&customer(), ParameterOptions::default()).unwrap();

        assert_eq!(
            parameters,
            vec![
                ("id".to_owned(), Value::Int(3)),
                ("CustomerName".to_owned(), Value::Text("ada".into())),
                ("rating".to_owned(), Value::Null),
            ]
        );
    }

    #[test]
    fn flattening_keeps_the_first_name() {
        let options = ParameterOptions {
            flatten_objects: true,
        };
        let parameters = to_parameters(&customer(), options).unwrap();

        assert_eq!(parameters.len(), 4);
        assert_eq!(parameters[0], ("id".to_owned(), Value::Int(3)));
        assert_eq!(parameters[3], ("city".to_owned(), Value::Text("london".into())));
    }

    #[test]
    fn declared_names_are_matched() {
        let mapping = ColumnMapping::new().replace(Regex::new("^@").unwrap(), "");
        let options = ParameterOptions {
            flatten_objects: true,
        };

        let parameters = bind_parameters_with(
            &customer(),
            &["@customer_name", "@City", "@Unknown"],
            &mapping,
            options,
        )
        .unwrap();

        assert_eq!(parameters[0].1, Value::Text("ada".into()));
        assert_eq!(parameters[1].1, Value::Text("london".into()));
        assert_eq!(parameters[2], ("@Unknown".to_owned(), Value::Null));
    }
}
