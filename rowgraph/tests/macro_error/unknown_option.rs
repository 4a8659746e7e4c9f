#![allow(dead_code)]

#[derive(rowgraph::Record)]
struct Order {
    #[rowgraph(primary)]
    id: i64,
}

fn main() {}
