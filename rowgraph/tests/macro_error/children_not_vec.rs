#![allow(dead_code)]

#[derive(rowgraph::Record)]
struct Order {
    #[rowgraph(children)]
    name: String,
}

fn main() {}
