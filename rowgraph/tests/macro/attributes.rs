use std::sync::Arc;

use rowgraph::prelude::*;

#[derive(Clone, Default, Debug, Record)]
#[rowgraph(name = "Invoice")]
pub struct InvoiceRow {
    #[rowgraph(id = 1)]
    pub region: String,
    #[rowgraph(id = 2)]
    pub number: i64,
    #[rowgraph(column = "InvoiceTotal", readonly)]
    pub total: f64,
    pub customer: Option<Box<Customer>>,
    #[rowgraph(children, recordset = 1)]
    pub lines: Vec<Line>,
    pub previous: Option<Arc<InvoiceRow>>,
    pub attachment: Vec<u8>,
    #[rowgraph(skip)]
    pub dirty: bool,
}

#[derive(Clone, Default, Debug, Record)]
pub struct Customer {
    pub id: i64,
    pub r#type: Option<String>,
    #[rowgraph(object)]
    pub address: Option<Address>,
}

#[derive(Clone, Default, Debug, Record)]
pub struct Address {
    pub city: String,
}

#[derive(Clone, Default, Debug, Record)]
pub struct Line {
    #[rowgraph(parent_id = 1)]
    pub invoice_region: String,
    #[rowgraph(parent_id = 2)]
    pub invoice_number: i64,
    #[rowgraph(scalar)]
    pub amount: Option<i64>,
}

fn main() {
    let shape = InvoiceRow::shape();
    assert_eq!(shape.name(), "Invoice");
    assert_eq!(shape.members().len(), 7);
    assert_eq!(Customer::shape().members()[1].name, "type");
}
