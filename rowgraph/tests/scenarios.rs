use std::sync::Arc;

use rowgraph::identity;
use rowgraph::plan::binding_plan;
use rowgraph::prelude::*;
use serial_test::serial;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int(value: i64) -> Value {
    Value::Int(value)
}

#[derive(Clone, Default, Debug, Record)]
struct Parent {
    id: i64,
    children: Vec<Child>,
}

#[derive(Clone, Default, Debug, Record)]
struct Child {
    parent_id: i64,
    value: i64,
}

fn parents(ids: &[i64]) -> Recordset {
    Recordset::from_rows(&["ID"], ids.iter().map(|id| vec![int(*id)]).collect())
}

fn children(rows: &[(i64, i64)]) -> Recordset {
    Recordset::from_rows(
        &["ParentID", "Value"],
        rows.iter()
            .map(|(parent, value)| vec![int(*parent), int(*value)])
            .collect(),
    )
}

fn values(parent: &Parent) -> Vec<i64> {
    parent.children.iter().map(|child| child.value).collect()
}

#[test]
fn parent_with_two_children() {
    init();
    let mut reader = Recordsets::new(vec![parents(&[1]), children(&[(1, 2), (1, 3)])]);

    let (parents,) = Query::returns(records::<Parent>())
        .then_children(Children::<Parent, Child>::new())
        .read(&mut reader)
        .unwrap();

    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, 1);
    assert_eq!(values(&parents[0]), vec![2, 3]);
}

#[test]
fn unmatched_children_are_dropped_unless_strict() {
    init();
    let mut list = vec![Parent::default(), Parent::default()];
    list[0].id = 1;
    list[1].id = 2;

    Children::<Parent, Child>::new()
        .read(&mut list, children(&[(1, 10), (7, 70), (2, 20)]))
        .unwrap();
    assert_eq!(values(&list[0]), vec![10]);
    assert_eq!(values(&list[1]), vec![20]);

    let result = Children::<Parent, Child>::new()
        .strict()
        .read(&mut list, children(&[(7, 70)]));
    assert!(matches!(result, Err(RowGraphError::UnmatchedChild { ty: "Child", .. })));
}

#[test]
fn duplicate_parents_each_receive_the_children() {
    init();
    let mut list = vec![Parent::default(), Parent::default()];
    list[0].id = 5;
    list[1].id = 5;

    Children::<Parent, Child>::new()
        .read(&mut list, children(&[(5, 1), (5, 2)]))
        .unwrap();

    assert_eq!(values(&list[0]), vec![1, 2]);
    assert_eq!(values(&list[1]), vec![1, 2]);
}

#[derive(Clone, Default, Debug, Record)]
struct Note {
    text: String,
}

#[derive(Clone, Default, Debug, Record)]
struct Order {
    id: i64,
    notes: Vec<Note>,
}

#[test]
fn single_parent_needs_no_reference() {
    init();
    let mut reader = Recordsets::new(vec![
        parents(&[9]),
        Recordset::from_rows(&["Text"], vec![vec!["a".into()], vec!["b".into()]]),
    ]);

    let (orders,) = Query::returns(records::<Order>())
        .then_children(Children::<Order, Note>::new().single_parent())
        .read(&mut reader)
        .unwrap();

    let texts = orders[0]
        .notes
        .iter()
        .map(|note| note.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(texts, vec!["a", "b"]);
}

#[derive(Clone, Default, Debug, Record)]
struct Brewery {
    id: i64,
    beers: Vec<Beer>,
}

#[derive(Clone, Default, Debug, Record)]
struct Beer {
    id: i64,
    brewery_id: i64,
    glasses: Vec<Glass>,
}

#[derive(Clone, Default, Debug, Record)]
struct Glass {
    id: i64,
    beer_id: i64,
}

#[test]
fn grandchildren_reach_the_root() {
    init();
    let mut reader = Recordsets::new(vec![
        Recordset::from_rows(&["id"], vec![vec![int(1)], vec![int(2)]]),
        Recordset::from_rows(
            &["id", "brewery_id"],
            vec![vec![int(10), int(1)], vec![int(20), int(2)]],
        ),
        Recordset::from_rows(
            &["id", "beer_id"],
            vec![vec![int(100), int(20)], vec![int(101), int(20)]],
        ),
    ]);

    let (breweries,) = Query::returns(records::<Brewery>())
        .then_children(Children::<Brewery, Beer>::new())
        .then_children(Children::<Beer, Glass>::new())
        .read(&mut reader)
        .unwrap();

    assert!(breweries[0].beers[0].glasses.is_empty());
    let glasses = &breweries[1].beers[0].glasses;
    assert_eq!(
        glasses.iter().map(|glass| glass.id).collect::<Vec<_>>(),
        vec![100, 101]
    );
}

#[derive(Clone, Default, Debug, Record)]
struct Shipment {
    #[rowgraph(id = 1)]
    region: String,
    #[rowgraph(id = 2)]
    number: i64,
    parcels: Vec<Parcel>,
}

#[derive(Clone, Default, Debug, Record)]
struct Parcel {
    #[rowgraph(parent_id = 2)]
    shipment_number: i64,
    #[rowgraph(parent_id = 1)]
    shipment_region: String,
    weight: f64,
}

#[test]
fn composite_keys_pair_by_ordinal() {
    init();
    let mut shipments = vec![
        Shipment {
            region: "north".into(),
            number: 1,
            parcels: vec![],
        },
        Shipment {
            region: "south".into(),
            number: 1,
            parcels: vec![],
        },
    ];

    let parcels = Recordset::from_rows(
        &["shipment_number", "shipment_region", "weight"],
        vec![
            vec![int(1), "south".into(), Value::Float(2.5)],
            vec![int(1), "north".into(), Value::Float(1.0)],
        ],
    );

    Children::<Shipment, Parcel>::new()
        .read(&mut shipments, parcels)
        .unwrap();

    assert_eq!(shipments[0].parcels.len(), 1);
    assert_eq!(shipments[0].parcels[0].weight, 1.0);
    assert_eq!(shipments[1].parcels[0].weight, 2.5);
}

#[derive(Clone, Default, Debug, Record)]
struct Category {
    id: i64,
    parent_id: Option<i64>,
    parent: Option<Arc<Category>>,
}

#[test]
fn self_reference_points_at_the_parent() {
    init();
    let rows = Recordset::from_rows(
        &["ID", "ParentID"],
        vec![vec![int(2), int(1)], vec![int(1), Value::Null]],
    );

    let categories = SelfReference::<Category>::new().read(rows).unwrap();

    assert_eq!(categories[0].id, 2);
    assert!(Arc::ptr_eq(
        categories[0].parent.as_ref().unwrap(),
        &categories[1]
    ));
    assert!(categories[1].parent.is_none());
}

#[derive(Clone, Default, Debug, Record)]
struct Widget {
    another_id: i64,
    id: i64,
}

#[derive(Clone, Default, Debug, Record)]
struct ClassWithSuffixed {
    paid: bool,
    class_with_suffixed_id: i64,
}

#[test]
fn identity_prefers_exact_names() {
    let widget = identity::identity(Widget::shape()).unwrap();
    assert_eq!(widget.names(Widget::shape()), vec!["id"]);

    let suffixed = identity::identity(ClassWithSuffixed::shape()).unwrap();
    assert_eq!(
        suffixed.names(ClassWithSuffixed::shape()),
        vec!["class_with_suffixed_id"]
    );
}

#[derive(Clone, Default, Debug, Record)]
struct Person {
    id: i64,
    name: String,
    address: Option<Box<Address>>,
}

#[derive(Clone, Default, Debug, Record)]
struct Address {
    city: Option<String>,
    country: Option<String>,
}

#[test]
fn null_groups_leave_the_sub_object_empty() {
    init();
    let rows = Recordset::from_rows(
        &["id", "name", "city", "country"],
        vec![
            vec![int(1), "x".into(), Value::Null, Value::Null],
            vec![int(2), "y".into(), Value::Null, "usa".into()],
        ],
    );

    let people = records::<Person>().with::<Address>().read(rows).unwrap();

    assert!(people[0].address.is_none());
    let address = people[1].address.as_ref().unwrap();
    assert_eq!(address.city, None);
    assert_eq!(address.country.as_deref(), Some("usa"));
}

#[derive(Clone, Default, Debug, Record)]
struct Pint {
    id: i64,
    name: String,
    brewery: Option<Box<Tap>>,
}

#[derive(Clone, Default, Debug, Record)]
struct Tap {
    id: i64,
    title: String,
}

#[test]
fn repeated_columns_start_the_next_group() {
    init();
    let rows = Recordset::from_rows(
        &["id", "name", "id", "title"],
        vec![vec![int(1), "pils".into(), int(7), "tap seven".into()]],
    );

    let pints = records::<Pint>().with::<Tap>().read(rows).unwrap();

    assert_eq!(pints[0].id, 1);
    let tap = pints[0].brewery.as_ref().unwrap();
    assert_eq!((tap.id, tap.title.as_str()), (7, "tap seven"));

    let assembled = records::<Pint>()
        .with::<Tap>()
        .split_on(&["id"])
        .assemble(|parts| {
            let pint = parts.take::<Pint>(0)?;
            let tap = parts.take::<Tap>(1)?;
            Ok(pint.zip(tap))
        })
        .read(Recordset::from_rows(
            &["id", "name", "id", "title"],
            vec![vec![int(2), "ale".into(), int(8), "tap eight".into()]],
        ))
        .unwrap();

    assert_eq!(assembled[0].0.name, "ale");
    assert!(assembled[0].0.brewery.is_none());
    assert_eq!(assembled[0].1.id, 8);
}

#[test]
#[serial]
fn plans_are_memoized_per_column_signature() {
    let names = vec!["id".to_owned(), "title".to_owned()];

    let first = binding_plan(Tap::shape(), &names).unwrap();
    let second = binding_plan(Tap::shape(), &names).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other = binding_plan(Tap::shape(), &names[..1]).unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(other.bound_count(), 1);
}

#[test]
#[serial]
fn global_table_mapping_applies_to_new_plans() {
    init();
    let rows = || {
        Recordset::from_rows(
            &["tap_id", "tap_title"],
            vec![vec![int(3), "tap three".into()]],
        )
    };

    let unmapped = records::<Tap>().read(rows()).unwrap();
    assert_eq!(unmapped[0].title, "");

    ColumnMapping::configure_tables(|mapping| {
        assert_eq!(ColumnMapping::tables().len(), mapping.len());
        mapping.strip_prefix("tap_")
    });
    let mapped = records::<Tap>().read(rows());
    ColumnMapping::reset();

    let mapped = mapped.unwrap();
    assert_eq!((mapped[0].id, mapped[0].title.as_str()), (3, "tap three"));
}

#[test]
#[serial]
fn global_parameter_mapping() {
    let tap = Tap {
        id: 4,
        title: "four".into(),
    };

    ColumnMapping::configure_parameters(|mapping| mapping.strip_prefix("@"));
    let parameters = bind_parameters(&tap, &["@id", "@title"], ParameterOptions::default());
    ColumnMapping::reset();

    assert_eq!(
        parameters.unwrap(),
        vec![
            ("@id".to_owned(), int(4)),
            ("@title".to_owned(), Value::Text("four".into())),
        ]
    );
}

#[test]
fn missing_recordsets_yield_empty_outputs() {
    init();
    let mut reader = Recordsets::new(vec![parents(&[1])]);

    let (parents, taps) = Query::returns(records::<Parent>())
        .then_children(Children::<Parent, Child>::new())
        .then(records::<Tap>())
        .read(&mut reader)
        .unwrap();

    assert!(parents[0].children.is_empty());
    assert!(taps.is_empty());
}

#[tokio::test]
async fn async_readers_feed_the_same_pipeline() {
    init();
    let mut reader = Recordsets::new(vec![parents(&[1, 2]), children(&[(2, 4)])]);

    let (parents,) = Query::returns(records::<Parent>())
        .then_children(Children::<Parent, Child>::new())
        .read_async(&mut reader)
        .await
        .unwrap();

    assert!(parents[0].children.is_empty());
    assert_eq!(values(&parents[1]), vec![4]);
}

#[derive(Clone, Default, Debug, Record)]
struct Settings {
    theme: String,
    entries: Vec<Entry>,
}

#[derive(Clone, Default, Debug, Record)]
struct Entry {
    key: String,
}

#[test]
fn empty_single_parent_reads_as_none() {
    init();
    let mut reader = Recordsets::new(vec![
        Recordset::from_rows(&["theme"], vec![]),
        Recordset::from_rows(&["key"], vec![vec!["a".into()]]),
    ]);

    let (settings,) = Query::returns(records::<Settings>().single())
        .then_children(Children::<Settings, Entry>::new())
        .read(&mut reader)
        .unwrap();

    assert!(settings.is_none());
}

#[derive(Clone, Default, Debug, Record)]
struct Catalog {
    id: i64,
    #[rowgraph(recordset = 1)]
    listings: Vec<Listing>,
}

#[derive(Clone, Default, Debug, Record)]
struct Listing {
    id: i64,
    catalog_id: i64,
}

#[test]
fn declared_recordsets_fill_collections() {
    init();
    let mut reader = Recordsets::new(vec![
        Recordset::from_rows(&["id"], vec![vec![int(3)]]),
        Recordset::from_rows(&["id", "catalog_id"], vec![vec![int(1), int(3)]]),
    ]);

    let (catalogs,) = Query::declared::<Catalog>()
        .unwrap()
        .read(&mut reader)
        .unwrap();

    assert_eq!(catalogs[0].listings[0].id, 1);
}
