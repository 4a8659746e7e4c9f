#![allow(dead_code)]

#[derive(rowgraph::Record)]
struct Customer {
    #[rowgraph(object)]
    address: String,
}

fn main() {}
