#![allow(dead_code)]

#[derive(rowgraph::Record)]
struct Wrapper<T> {
    value: T,
}

fn main() {}
