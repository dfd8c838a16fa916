use chrono::NaiveDate;
use tsinsar::core::{Pair, Pairs, PairsFactory, PairsSelector, SortKey};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
}

fn network() -> Pairs {
    Pairs::from_names(&[
        "20200101_20200113",
        "20200113_20200125",
        "20200101_20200125",
        "20200125_20200206",
        "20200113_20200218",
    ])
    .unwrap()
}

#[test]
fn test_names_round_trip() {
    let pairs = network();
    let names = pairs.names();
    let again = Pairs::from_names(&names).unwrap();
    assert_eq!(pairs, again);

    let prefixed = pairs.to_names(Some("ifg"));
    assert!(prefixed.iter().all(|n| n.starts_with("ifg_")));
    assert_eq!(prefixed[0], "ifg_20200101_20200113");
}

#[test]
fn test_edge_index_matches_dates() {
    let pairs = network();
    assert_eq!(pairs.dates().len(), 5);
    for (pair, [i, j]) in pairs.iter().zip(pairs.edge_index()) {
        assert_eq!(pairs.dates()[*i], pair.primary());
        assert_eq!(pairs.dates()[*j], pair.secondary());
        assert!(i < j);
    }

    // each SBAS row spans exactly the intervals of its pair
    let matrix = pairs.to_matrix();
    assert_eq!(matrix.dim(), (5, 4));
    for (row, [i, j]) in matrix.rows().into_iter().zip(pairs.edge_index()) {
        assert_eq!(row.sum(), (j - i) as f64);
    }
}

#[test]
fn test_set_algebra() {
    let pairs = network();
    let first = pairs
        .select(PairsSelector::Slice {
            start: Some(0),
            stop: Some(3),
            step: None,
        })
        .unwrap();
    let rest = pairs.difference(&first);

    assert_eq!(first.len() + rest.len(), pairs.len());
    assert!(first.intersect(&rest).is_empty());

    let mut whole = pairs.clone();
    whole.sort(&[SortKey::Pairs], true).unwrap();
    assert_eq!(first.union(&rest), whole);
    assert_eq!(&first + &rest, whole);
    assert_eq!(&pairs - &first, rest);
}

#[test]
fn test_sort_by_days_descending() {
    let (sorted, index) = network().sorted(&[SortKey::Days], false).unwrap();
    let days = sorted.days();
    assert!(days.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(days[0], 36);
    assert_eq!(index[0], 4);
}

#[test]
fn test_parse_gaps() {
    let pairs = Pairs::new(vec![
        (date("20200101"), date("20200113")),
        (date("20200101"), date("20200206")),
        (date("20200125"), date("20200206")),
    ])
    .unwrap();
    assert_eq!(pairs.parse_gaps(None), vec![date("20200125")]);

    let removed = Pairs::from(Pair::new(date("20200101"), date("20200113")).unwrap());
    assert_eq!(
        pairs.parse_gaps(Some(&removed)),
        vec![date("20200113"), date("20200125")]
    );
}

#[test]
fn test_factory_network_is_connected() {
    let dates: Vec<NaiveDate> = (0..10)
        .map(|i| date("20200101") + chrono::Duration::days(12 * i))
        .collect();
    let pairs = PairsFactory::new(dates.clone()).from_interval(3, 365).unwrap();
    assert_eq!(pairs.dates(), &dates[..]);
    assert!(pairs.parse_gaps(None).is_empty());
    // 9 + 8 + 7 pairs for the first three neighbours
    assert_eq!(pairs.len(), 24);
}
