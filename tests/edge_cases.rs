use strata::dimension::{TemporalBinning, TemporalUnit};
use strata::{
    DecodeError, DimensionDefinition, IndexConfig, IndexError, MultiDimensionalNumericData,
    NumericRange, Persistable, TierMetadata, TieredIndexStrategy, TieredStrategyBuilder, Tiering,
};

const DAY: f64 = 86_400_000.0;

fn covers(range: &MultiDimensionalNumericData, point: &MultiDimensionalNumericData) -> bool {
    range
        .ranges()
        .iter()
        .zip(point.ranges())
        .all(|(r, p)| r.min <= p.min && r.max >= p.max)
}

/// Poles and the antimeridian encode into the outermost cells and decode back
#[test]
fn test_extreme_coordinates() {
    let strategy = IndexConfig::spatial().build().unwrap();
    for (lon, lat) in [(0.0, 90.0), (0.0, -90.0), (180.0, 0.0), (-180.0, 0.0), (180.0, 90.0)] {
        let point = MultiDimensionalNumericData::from_values(&[lon, lat]);
        let ids = strategy.insertion_ids(&point).unwrap();
        assert_eq!(ids.len(), 1, "({lon}, {lat})");
        for key in ids.composite_keys() {
            let decoded = strategy.range_for_key(&key).unwrap();
            assert!(covers(&decoded, &point), "{decoded:?} misses ({lon}, {lat})");
        }
    }
}

#[test]
fn test_out_of_range_latitude_is_clamped() {
    let strategy = IndexConfig::spatial().build().unwrap();
    let clamped = strategy
        .insertion_ids(&MultiDimensionalNumericData::from_values(&[10.0, 95.0]))
        .unwrap();
    let pole = strategy
        .insertion_ids(&MultiDimensionalNumericData::from_values(&[10.0, 90.0]))
        .unwrap();
    assert_eq!(clamped, pole);
}

#[test]
fn test_wrapped_longitude_range_matches_canonical_range() {
    let strategy = IndexConfig::spatial().build().unwrap();
    let wrapped = strategy
        .insertion_ids(&MultiDimensionalNumericData::new(vec![
            NumericRange::new(350.0, 370.0),
            NumericRange::new(5.0, 6.0),
        ]))
        .unwrap();
    let canonical = strategy
        .insertion_ids(&MultiDimensionalNumericData::new(vec![
            NumericRange::new(-10.0, 10.0),
            NumericRange::new(5.0, 6.0),
        ]))
        .unwrap();
    assert_eq!(wrapped, canonical);

    // a single value is clamped rather than wrapped
    let clamped = strategy
        .insertion_ids(&MultiDimensionalNumericData::from_values(&[370.0, 5.0]))
        .unwrap();
    let edge = strategy
        .insertion_ids(&MultiDimensionalNumericData::from_values(&[180.0, 5.0]))
        .unwrap();
    assert_eq!(clamped, edge);
}

#[test]
fn test_whole_world_box() {
    let strategy = IndexConfig::spatial().build().unwrap();
    let world = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-180.0, 180.0),
        NumericRange::new(-90.0, 90.0),
    ]);
    let ids = strategy.insertion_ids(&world).unwrap();
    assert_eq!(ids.len(), 4);
    assert_eq!(ids.partitions().len(), 1);
    assert_eq!(ids.partitions()[0].partition_key.as_ref(), &[1]);

    let ranges = strategy.query_ranges(&world, 10).unwrap();
    assert_eq!(ranges.len(), strategy.tiers().len());
}

#[test]
fn test_oversized_entry_on_single_tier_is_rejected() {
    let strategy = IndexConfig::spatial()
        .with_tiering(Tiering::single_tier([16, 16]))
        .build()
        .unwrap();
    let world = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-180.0, 180.0),
        NumericRange::new(-90.0, 90.0),
    ]);
    match strategy.insertion_ids(&world) {
        Err(IndexError::TooManyIds { count, limit }) => {
            assert_eq!(count, 1 << 32);
            assert_eq!(limit, 1 << 16);
        }
        other => panic!("expected TooManyIds, got {other:?}"),
    }
}

#[test]
fn test_nan_entry_has_no_ids() {
    let strategy = IndexConfig::spatial().build().unwrap();
    let ids = strategy
        .insertion_ids(&MultiDimensionalNumericData::from_values(&[f64::NAN, 1.0]))
        .unwrap();
    assert!(ids.is_empty());
}

#[test]
fn test_dimension_mismatch() {
    let strategy = IndexConfig::spatial().build().unwrap();
    let data = MultiDimensionalNumericData::from_values(&[1.0, 2.0, 3.0]);
    assert!(matches!(
        strategy.insertion_ids(&data),
        Err(IndexError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    assert!(matches!(
        strategy.query_ranges(&data, 10),
        Err(IndexError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_times_before_origin_use_negative_bins() {
    let strategy = IndexConfig::spatial_temporal(TemporalUnit::Day)
        .build()
        .unwrap();
    let before_epoch = MultiDimensionalNumericData::from_values(&[0.0, 0.0, -1.0]);
    let ids = strategy.insertion_ids(&before_epoch).unwrap();
    let partition_key = &ids.partitions()[0].partition_key;
    assert_eq!(&partition_key[1..5], &(-1i32).to_be_bytes());

    let key = &ids.composite_keys()[0];
    let decoded = strategy.range_for_key(key).unwrap();
    assert!(decoded.ranges()[2].min >= -DAY && decoded.ranges()[2].max <= 0.0);
}

#[test]
fn test_entry_spanning_days_is_written_per_day() {
    let strategy = IndexConfig::spatial_temporal(TemporalUnit::Day)
        .with_tiering(Tiering::full_incremental([20, 20, 20]))
        .build()
        .unwrap();
    let entry = MultiDimensionalNumericData::new(vec![
        NumericRange::value(1.0),
        NumericRange::value(1.0),
        NumericRange::new(10.5 * DAY, 12.5 * DAY),
    ]);
    let keys = strategy.insertion_partition_keys(&entry).unwrap();
    let bins: Vec<i32> = keys
        .iter()
        .map(|key| i32::from_be_bytes([key[1], key[2], key[3], key[4]]))
        .collect();
    assert_eq!(bins, vec![10, 11, 12]);
}

#[test]
fn test_malformed_keys() {
    let strategy = IndexConfig::spatial_temporal(TemporalUnit::Day)
        .build()
        .unwrap();
    assert!(matches!(
        strategy.range_for_key(&[20, 0, 0]),
        Err(DecodeError::Truncated {
            what: "partition key",
            expected: 5,
            available: 3
        })
    ));
    assert!(matches!(
        strategy.range_for_key(&[7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]),
        Err(DecodeError::UnknownTag { kind: "tier", tag: 7 })
    ));
    assert!(strategy.range_for_key(&[20, 0, 0, 0, 1, 0]).is_err());
}

#[test]
fn test_corrupt_strategy_binary() {
    let strategy = IndexConfig::spatial().build().unwrap();
    let binary = strategy.to_binary();

    let truncated = &binary[..binary.len() / 2];
    assert!(TieredIndexStrategy::from_binary(truncated).is_err());

    let mut padded = binary.to_vec();
    padded.push(0);
    assert!(matches!(
        TieredIndexStrategy::from_binary(&padded),
        Err(DecodeError::TrailingBytes { remaining: 1 })
    ));
}

#[test]
fn test_overlong_varint_in_binary_is_an_error() {
    let mut binary = vec![0x80u8; 11];
    binary.push(0x00);
    assert_eq!(
        TierMetadata::from_binary(&binary),
        Err(DecodeError::MalformedVarint)
    );
    assert!(matches!(
        TieredIndexStrategy::from_binary(&binary),
        Err(DecodeError::MalformedVarint)
    ));
}

#[test]
fn test_entry_without_dimensions_has_no_ids() {
    let strategy = IndexConfig::spatial().build().unwrap();
    let ids = strategy
        .insertion_ids(&MultiDimensionalNumericData::default())
        .unwrap();
    assert!(ids.is_empty());
}

#[test]
fn test_unbounded_time_query_is_rejected() {
    let strategy = IndexConfig::spatial_temporal(TemporalUnit::Day)
        .build()
        .unwrap();
    let query = MultiDimensionalNumericData::new(vec![
        NumericRange::new(-1.0, 1.0),
        NumericRange::new(-1.0, 1.0),
        NumericRange::new(f64::NEG_INFINITY, f64::INFINITY),
    ]);
    assert!(matches!(
        strategy.query_ranges(&query, 100),
        Err(IndexError::TooManyBins { .. })
    ));

    // far-future instants stay on the last nameable day
    let far = MultiDimensionalNumericData::from_values(&[0.0, 0.0, f64::MAX]);
    let keys = strategy.insertion_partition_keys(&far).unwrap();
    assert_eq!(&keys[0][1..5], &i32::MAX.to_be_bytes());
}

#[test]
fn test_landsat_calendar() {
    let strategy = TieredStrategyBuilder::new()
        .dimensions([
            DimensionDefinition::longitude(),
            DimensionDefinition::latitude(),
            DimensionDefinition::time(TemporalBinning::landsat8()),
        ])
        .tiering(Tiering::single_tier([18, 18, 12]))
        .build()
        .unwrap();
    let origin = TemporalBinning::LANDSAT8_ORIGIN_MILLIS as f64;
    let cycle = TemporalBinning::LANDSAT8_BIN_SIZE_MILLIS as f64;

    let first = MultiDimensionalNumericData::from_values(&[0.0, 0.0, origin + 1.0]);
    let second = MultiDimensionalNumericData::from_values(&[0.0, 0.0, origin + cycle + 1.0]);
    let first_key = &strategy.insertion_partition_keys(&first).unwrap()[0];
    let second_key = &strategy.insertion_partition_keys(&second).unwrap()[0];
    assert_eq!(&first_key[1..5], &0i32.to_be_bytes());
    assert_eq!(&second_key[1..5], &1i32.to_be_bytes());
}
