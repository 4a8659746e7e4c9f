#![allow(dead_code)]

struct Line;

#[derive(rowgraph::Record)]
struct Order {
    #[rowgraph(id)]
    lines: Vec<Line>,
}

fn main() {}
