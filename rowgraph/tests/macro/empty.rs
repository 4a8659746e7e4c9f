use rowgraph::Record;

#[derive(Clone, Default, Debug, Record)]
struct Marker {}

fn main() {
    assert!(<Marker as Record>::shape().members().is_empty());
}
