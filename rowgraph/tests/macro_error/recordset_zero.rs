#![allow(dead_code)]

struct Line;

#[derive(rowgraph::Record)]
struct Order {
    #[rowgraph(recordset = 0)]
    lines: Vec<Line>,
}

fn main() {}
