use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use strata::dimension::TemporalUnit;
use strata::{
    BasicQueryFilter, CompareOperation, IndexConfig, KeyPartitioning, MultiDimensionalNumericData,
    NumericRange, Persistable, SfcType, TierMetadata, TieredIndexStrategy, Tiering,
};

const DAY: f64 = 86_400_000.0;
const T0: f64 = 1_600_000_000_000.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic pseudo-random values in `[0, 1)`.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn between(&mut self, min: f64, max: f64) -> f64 {
        min + self.next() * (max - min)
    }
}

/// A sorted key-value store standing in for the storage engine.
#[derive(Default)]
struct Store {
    rows: BTreeMap<Bytes, usize>,
    metadata: TierMetadata,
}

impl Store {
    fn insert(&mut self, strategy: &TieredIndexStrategy, id: usize, data: &MultiDimensionalNumericData) {
        let ids = strategy.insertion_ids(data).unwrap();
        assert!(!ids.is_empty(), "entry {id} produced no row keys");
        self.metadata.record(&ids);
        for key in ids.composite_keys() {
            self.rows.insert(key, id);
        }
    }

    fn scan(&self, strategy: &TieredIndexStrategy, query: &MultiDimensionalNumericData, max_ranges: usize) -> BTreeSet<usize> {
        let ranges = strategy
            .query_ranges_with_hints(query, max_ranges, Some(&self.metadata))
            .unwrap();
        let mut found = BTreeSet::new();
        for range in ranges.composite_ranges() {
            for (_, &id) in self.rows.range(range.start..=range.end) {
                found.insert(id);
            }
        }
        found
    }
}

fn brute_force(entries: &[MultiDimensionalNumericData], query: &MultiDimensionalNumericData) -> BTreeSet<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.intersects(query))
        .map(|(id, _)| id)
        .collect()
}

fn refine(
    filter: &BasicQueryFilter,
    entries: &[MultiDimensionalNumericData],
    candidates: &BTreeSet<usize>,
) -> BTreeSet<usize> {
    candidates
        .iter()
        .copied()
        .filter(|&id| filter.accept(&entries[id]).unwrap())
        .collect()
}

#[test]
fn test_spatial_points_end_to_end() {
    init_logging();
    let strategy = IndexConfig::spatial().build().unwrap();
    let mut rng = Lcg(7);
    let entries: Vec<_> = (0..500)
        .map(|_| {
            MultiDimensionalNumericData::from_values(&[
                rng.between(-20.0, 20.0),
                rng.between(-10.0, 10.0),
            ])
        })
        .collect();

    let mut store = Store::default();
    for (id, entry) in entries.iter().enumerate() {
        store.insert(&strategy, id, entry);
    }
    assert_eq!(store.rows.len(), entries.len());

    let query = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-5.5, 7.25),
        NumericRange::new(-3.0, 4.5),
    ]);
    let expected = brute_force(&entries, &query);
    assert!(!expected.is_empty());

    for max_ranges in [1, 16, 2000] {
        let candidates = store.scan(&strategy, &query, max_ranges);
        assert!(candidates.is_superset(&expected), "max_ranges {max_ranges}");

        let filter = BasicQueryFilter::new(&query, strategy.dimensions().to_vec(), CompareOperation::Intersects)
            .unwrap();
        assert_eq!(refine(&filter, &entries, &candidates), expected);
    }
}

#[test]
fn test_spatial_boxes_use_coarser_tiers() {
    init_logging();
    let strategy = IndexConfig::spatial().build().unwrap();
    let mut rng = Lcg(11);
    let entries: Vec<_> = (0..200)
        .map(|_| {
            let lon = rng.between(-170.0, 160.0);
            let lat = rng.between(-80.0, 70.0);
            let size = rng.between(0.01, 10.0);
            MultiDimensionalNumericData::new(vec![
                NumericRange::new(lon, lon + size),
                NumericRange::new(lat, lat + size / 2.0),
            ])
        })
        .collect();

    let mut store = Store::default();
    for (id, entry) in entries.iter().enumerate() {
        store.insert(&strategy, id, entry);
        let ids = strategy.insertion_ids(entry).unwrap();
        assert!(ids.len() <= 4, "entry {id} was written {} times", ids.len());
    }

    let query = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-30.0, 45.0),
        NumericRange::new(-20.0, 35.0),
    ]);
    let expected = brute_force(&entries, &query);
    let candidates = store.scan(&strategy, &query, 256);
    assert!(candidates.is_superset(&expected));

    let filter = BasicQueryFilter::new(&query, strategy.dimensions().to_vec(), CompareOperation::Intersects)
        .unwrap();
    assert_eq!(refine(&filter, &entries, &candidates), expected);
}

#[test]
fn test_spatial_temporal_with_hash_partitions() {
    init_logging();
    let config = IndexConfig::spatial_temporal(TemporalUnit::Day)
        .with_partitioning(KeyPartitioning::Hash { partitions: 4 });
    let strategy = config.build().unwrap();
    assert_eq!(strategy.partition_key_len(), 6);

    let mut rng = Lcg(23);
    let entries: Vec<_> = (0..400)
        .map(|_| {
            MultiDimensionalNumericData::from_values(&[
                rng.between(-10.0, 10.0),
                rng.between(40.0, 50.0),
                rng.between(T0, T0 + 6.0 * DAY).floor(),
            ])
        })
        .collect();

    let mut store = Store::default();
    for (id, entry) in entries.iter().enumerate() {
        store.insert(&strategy, id, entry);
    }
    let partitions: BTreeSet<u8> = store.rows.keys().map(|key| key[5]).collect();
    assert!(partitions.len() > 1 && partitions.iter().all(|&p| p < 4));

    let query = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-4.0, 6.0),
        NumericRange::new(42.0, 48.0),
        NumericRange::new(T0 + 1.5 * DAY, T0 + 3.25 * DAY),
    ]);
    let ranges = strategy.query_ranges(&query, config.max_ranges).unwrap();
    let bins: BTreeSet<Vec<u8>> = ranges
        .partition_keys()
        .map(|key| key[1..5].to_vec())
        .collect();
    assert!(bins.len() >= 2, "a multi-day query should span several bins");

    let expected = brute_force(&entries, &query);
    assert!(!expected.is_empty());
    let candidates = store.scan(&strategy, &query, config.max_ranges);
    assert!(candidates.is_superset(&expected));

    let filter = BasicQueryFilter::new(&query, strategy.dimensions().to_vec(), CompareOperation::Intersects)
        .unwrap();
    assert_eq!(refine(&filter, &entries, &candidates), expected);
}

#[test]
fn test_date_line_query() {
    init_logging();
    let strategy = IndexConfig::spatial()
        .with_curve(SfcType::ZOrder)
        .build()
        .unwrap();
    let east = MultiDimensionalNumericData::from_values(&[179.5, 10.0]);
    let west = MultiDimensionalNumericData::from_values(&[-179.5, 10.0]);
    let greenwich = MultiDimensionalNumericData::from_values(&[0.0, 10.0]);

    let mut store = Store::default();
    for (id, entry) in [&east, &west, &greenwich].into_iter().enumerate() {
        store.insert(&strategy, id, entry);
    }

    let query = MultiDimensionalNumericData::new(vec![
        NumericRange::new(179.0, -179.0),
        NumericRange::new(5.0, 15.0),
    ]);
    let candidates = store.scan(&strategy, &query, 64);
    assert!(candidates.contains(&0) && candidates.contains(&1));

    let filter = BasicQueryFilter::new(&query, strategy.dimensions().to_vec(), CompareOperation::Intersects)
        .unwrap();
    assert!(filter.accept(&east).unwrap());
    assert!(filter.accept(&west).unwrap());
    assert!(!filter.accept(&greenwich).unwrap());
}

#[test]
fn test_tier_hints_skip_empty_tiers() {
    init_logging();
    let strategy = IndexConfig::spatial().build().unwrap();
    let point = MultiDimensionalNumericData::from_values(&[12.5, 41.9]);
    let mut metadata = TierMetadata::new();
    metadata.record(&strategy.insertion_ids(&point).unwrap());

    let query = MultiDimensionalNumericData::new(vec![
        NumericRange::new(12.0, 13.0),
        NumericRange::new(41.0, 42.0),
    ]);
    let all = strategy.query_ranges(&query, 100).unwrap();
    let hinted = strategy
        .query_ranges_with_hints(&query, 100, Some(&metadata))
        .unwrap();
    assert_eq!(all.partitions().len(), 32);
    assert_eq!(hinted.partitions().len(), 1);
    assert_eq!(hinted.partitions()[0].partition_key.as_ref(), &[31]);
}

#[test]
fn test_row_key_decodes_to_covering_range() {
    init_logging();
    let strategy = IndexConfig::spatial_temporal(TemporalUnit::Hour)
        .build()
        .unwrap();
    let point = MultiDimensionalNumericData::from_values(&[139.6917, 35.6895, T0 + 1234.0]);
    for key in strategy.insertion_ids(&point).unwrap().composite_keys() {
        let range = strategy.range_for_key(&key).unwrap();
        for (decoded, original) in range.ranges().iter().zip(point.ranges()) {
            assert!(
                decoded.min <= original.min && decoded.max >= original.max,
                "{decoded:?} does not cover {original:?}"
            );
        }
    }
}

#[test]
fn test_persisted_strategy_writes_same_keys() {
    init_logging();
    let strategy = IndexConfig::spatial_temporal(TemporalUnit::Week)
        .with_tiering(Tiering::equal_interval([24, 24, 16], 4))
        .with_partitioning(KeyPartitioning::Hash { partitions: 8 })
        .build()
        .unwrap();
    let restored = TieredIndexStrategy::from_binary(&strategy.to_binary()).unwrap();
    assert_eq!(restored, strategy);

    let entry = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-1.0, 1.0),
        NumericRange::new(50.0, 51.0),
        NumericRange::new(T0, T0 + 3.0 * DAY),
    ]);
    assert_eq!(
        restored.insertion_ids(&entry).unwrap(),
        strategy.insertion_ids(&entry).unwrap()
    );
}

#[test]
fn test_persisted_filter_accepts_same_rows() {
    let strategy = IndexConfig::spatial_temporal(TemporalUnit::Day).build().unwrap();
    let query = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-1.0, 1.0),
        NumericRange::new(-1.0, 1.0),
        NumericRange::new(T0, T0 + 2.0 * DAY),
    ]);
    let filter = BasicQueryFilter::new(&query, strategy.dimensions().to_vec(), CompareOperation::Intersects)
        .unwrap();
    let restored = BasicQueryFilter::from_binary(&filter.to_binary()).unwrap();

    let inside = MultiDimensionalNumericData::from_values(&[0.5, 0.5, T0 + DAY]);
    let late = MultiDimensionalNumericData::from_values(&[0.5, 0.5, T0 + 5.0 * DAY]);
    assert!(restored.accept(&inside).unwrap());
    assert!(!restored.accept(&late).unwrap());
}

#[test]
fn test_config_file_drives_strategy() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.json");
    std::fs::write(
        &path,
        r#"{
            "dimensions": [
                { "type": "longitude" },
                { "type": "latitude" },
                { "type": "binned_numeric", "interval": 100.0 }
            ],
            "curve": "z_order",
            "tiering": { "type": "single_tier", "bits": [16, 16, 8] },
            "max_duplicates_per_dimension": 3
        }"#,
    )
    .unwrap();

    let config = IndexConfig::from_path(&path).unwrap();
    assert_eq!(config.max_ranges, 2000);
    let strategy = config.build().unwrap();
    assert_eq!(strategy.partition_key_len(), 1 + 8);

    let ids = strategy
        .insertion_ids(&MultiDimensionalNumericData::from_values(&[1.0, 2.0, 250.0]))
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids.partitions()[0].partition_key[0], 16);
}
