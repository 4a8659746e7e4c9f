pub use crate::children::Children;
pub use crate::graph::SelfReference;
pub use crate::mapping::{ColumnMapping, Mapped};
pub use crate::params::{bind_parameters, to_parameters, ParameterOptions};
pub use crate::query::{Query, ResultSets};
pub use crate::record::AnyRecord;
pub use crate::recordset::{Recordset, Recordsets, ResultReader, Row};
pub use crate::source::{AsyncResultReader, StreamReader};
pub use crate::split::{records, OneToOne, Parts};
pub use crate::value::{Key, Value};
pub use crate::Record;
pub use crate::{RowGraphError, RowGraphResult};
