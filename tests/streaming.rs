mod common;

use common::{Sale, YearlySale, sales, two_years};
use hivequet::testing::HiveFixture;
use hivequet::{ErrorKind, ReadBuilder, RowRecord, StreamState, Value, col, read_partitioned};
use serde::Deserialize;
use std::collections::BTreeMap;

#[test]
fn flat_file_streams_rows_in_order() -> anyhow::Result<()> {
    let fixture = HiveFixture::new()?;
    let path = fixture.write_file("sales.parquet", &sales(0..4))?;

    let rows: Vec<Sale> = ReadBuilder::new()
        .read_as::<Sale>(path.to_string_lossy())
        .collect_vec()?;
    assert_eq!(rows, sales(0..4));
    Ok(())
}

#[test]
fn empty_flat_file_is_an_empty_stream() -> anyhow::Result<()> {
    let fixture = HiveFixture::new()?;
    let path = fixture.write_file("empty.parquet", &Vec::<Sale>::new())?;

    let mut stream = ReadBuilder::new().read(path.to_string_lossy());
    assert!(stream.next().is_none());
    assert_eq!(stream.state(), StreamState::Exhausted);
    Ok(())
}

#[test]
fn empty_directory_is_an_empty_stream() -> anyhow::Result<()> {
    let fixture = HiveFixture::new()?;
    let rows = ReadBuilder::new()
        .columns(["id"])
        .read(fixture.uri())
        .collect_vec()?;
    assert!(rows.is_empty());
    Ok(())
}

#[test]
fn partitions_are_concatenated_in_directory_order() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let rows: Vec<YearlySale> = read_partitioned(fixture.uri()).collect_vec()?;

    let ids: Vec<(i64, i64)> = rows.iter().map(|r| (r.year, r.id)).collect();
    assert_eq!(
        ids,
        vec![(2020, 0), (2020, 1), (2020, 2), (2021, 3), (2021, 4)]
    );
    Ok(())
}

#[test]
fn partition_filter_selects_one_year() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let mut stream = ReadBuilder::new()
        .filter(col("year").eq(2021))
        .read_as::<YearlySale>(fixture.uri());
    let rows: Vec<YearlySale> = stream.by_ref().collect::<Result<_, _>>()?;

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.year == 2021));
    assert_eq!(stream.stats().partitions_discovered, 2);
    assert_eq!(stream.stats().partitions_pruned, 1);
    assert_eq!(stream.stats().records_yielded, 2);
    Ok(())
}

#[test]
fn residual_filter_is_applied_inside_files() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let rows: Vec<YearlySale> = ReadBuilder::new()
        .filter(col("amount").gt_eq(20.0) & col("year").is_in([2020, 2021]))
        .read_as(fixture.uri())
        .collect_vec()?;

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3, 4]);
    Ok(())
}

#[test]
fn filter_mixing_partition_and_file_columns() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let filter = (col("year").eq(2020) & col("item").eq("item-1")) | col("year").eq(2021);
    let rows: Vec<YearlySale> = ReadBuilder::new()
        .filter(filter)
        .read_as(fixture.uri())
        .collect_vec()?;

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3, 4]);
    Ok(())
}

#[test]
fn filter_excluding_everything_is_empty_not_an_error() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let mut stream = ReadBuilder::new()
        .filter(col("year").gt(2030))
        .read(fixture.uri());
    assert!(stream.next().is_none());
    assert_eq!(stream.state(), StreamState::Exhausted);
    assert_eq!(stream.stats().partitions_opened, 0);
    Ok(())
}

#[test]
fn injected_values_match_the_path() -> anyhow::Result<()> {
    let fixture = HiveFixture::new()?;
    fixture.write_partition(
        &[("region", "eu west"), ("day", "2021-03-04")],
        "a.parquet",
        &sales(0..1),
    )?;
    fixture.write_partition(
        &[("region", "us"), ("day", "2021-03-05")],
        "a.parquet",
        &sales(1..2),
    )?;

    let rows: Vec<RowRecord> = ReadBuilder::new().read(fixture.uri()).collect_vec()?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("region"), Some(&Value::String("eu west".into())));
    assert_eq!(rows[1].get("region"), Some(&Value::String("us".into())));
    assert!(matches!(rows[0].get("day"), Some(Value::Date(_))));

    let names: Vec<&str> = rows[0].column_names().collect();
    assert_eq!(names, vec!["id", "amount", "item", "region", "day"]);
    Ok(())
}

#[test]
fn default_partition_reads_as_null() -> anyhow::Result<()> {
    let fixture = HiveFixture::new()?;
    fixture.write_partition(&[("country", "NO")], "a.parquet", &sales(0..1))?;
    fixture.write_partition(
        &[("country", "__HIVE_DEFAULT_PARTITION__")],
        "a.parquet",
        &sales(1..3),
    )?;

    let rows: Vec<RowRecord> = ReadBuilder::new()
        .filter(col("country").is_null())
        .read(fixture.uri())
        .collect_vec()?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.get("country") == Some(&Value::Null)));
    Ok(())
}

#[test]
fn builder_reads_are_independent_and_repeatable() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let builder = ReadBuilder::new().filter(col("amount").lt(40.0));

    let first: Vec<YearlySale> = builder.read_as(fixture.uri()).collect_vec()?;
    let second: Vec<YearlySale> = builder.read_as(fixture.uri()).collect_vec()?;
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
    Ok(())
}

#[test]
fn projection_limits_file_columns_but_keeps_partitions() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let rows: Vec<RowRecord> = ReadBuilder::new()
        .columns(["id"])
        .read(fixture.uri())
        .collect_vec()?;

    assert_eq!(rows.len(), 5);
    let names: Vec<&str> = rows[0].column_names().collect();
    assert_eq!(names, vec!["id", "year"]);
    Ok(())
}

#[test]
fn plain_paths_and_file_uris_agree() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let by_uri: Vec<RowRecord> = ReadBuilder::new().read(fixture.uri()).collect_vec()?;
    let by_path: Vec<RowRecord> = ReadBuilder::new()
        .read(fixture.root().to_string_lossy())
        .collect_vec()?;
    assert_eq!(by_uri, by_path);
    Ok(())
}

#[test]
fn residual_filter_on_non_nullable_columns() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let rows: Vec<YearlySale> = ReadBuilder::new()
        .filter(col("id").is_not_null() & (col("id").lt(1) | col("id").gt_eq(4)))
        .read_as(fixture.uri())
        .collect_vec()?;

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 4]);

    let none: Vec<RowRecord> = ReadBuilder::new()
        .filter(col("id").is_null())
        .read(fixture.uri())
        .collect_vec()?;
    assert!(none.is_empty());
    Ok(())
}

#[test]
fn partition_column_has_one_type_across_partitions() -> anyhow::Result<()> {
    #[derive(Debug, Deserialize)]
    struct Coded {
        id: i64,
        code: String,
    }

    let fixture = HiveFixture::new()?;
    fixture.write_partition(&[("code", "007")], "a.parquet", &sales(0..1))?;
    fixture.write_partition(&[("code", "123")], "a.parquet", &sales(1..2))?;

    let rows: Vec<Coded> = ReadBuilder::new().read_as(fixture.uri()).collect_vec()?;
    let codes: Vec<(i64, &str)> = rows.iter().map(|r| (r.id, r.code.as_str())).collect();
    assert_eq!(codes, vec![(0, "007"), (1, "123")]);

    let matched: Vec<Coded> = ReadBuilder::new()
        .filter(col("code").eq("123"))
        .read_as(fixture.uri())
        .collect_vec()?;
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, 1);
    Ok(())
}

#[test]
fn string_literal_matches_date_partition() -> anyhow::Result<()> {
    let fixture = HiveFixture::new()?;
    fixture.write_partition(&[("day", "2021-03-04")], "a.parquet", &sales(0..2))?;
    fixture.write_partition(&[("day", "2021-03-05")], "a.parquet", &sales(2..3))?;

    let rows: Vec<RowRecord> = ReadBuilder::new()
        .filter(col("day").eq("2021-03-04"))
        .read(fixture.uri())
        .collect_vec()?;
    assert_eq!(rows.len(), 2);

    let err = ReadBuilder::new()
        .filter(col("day").eq("yesterday"))
        .read(fixture.uri())
        .collect_vec()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FilterCompilation);
    Ok(())
}

#[test]
fn negated_filter_does_not_admit_null_partition() -> anyhow::Result<()> {
    let fixture = HiveFixture::new()?;
    fixture.write_partition(&[("country", "NO")], "a.parquet", &sales(0..1))?;
    fixture.write_partition(
        &[("country", "__HIVE_DEFAULT_PARTITION__")],
        "a.parquet",
        &sales(1..3),
    )?;

    let negated: Vec<RowRecord> = ReadBuilder::new()
        .filter(!col("country").eq("NO"))
        .read(fixture.uri())
        .collect_vec()?;
    let not_eq: Vec<RowRecord> = ReadBuilder::new()
        .filter(col("country").not_eq("NO"))
        .read(fixture.uri())
        .collect_vec()?;
    assert!(negated.is_empty());
    assert_eq!(negated, not_eq);
    Ok(())
}

#[test]
fn map_targets_read_every_column() -> anyhow::Result<()> {
    let fixture = two_years()?;
    let rows: Vec<BTreeMap<String, serde_json::Value>> =
        ReadBuilder::new().read_as(fixture.uri()).collect_vec()?;

    assert_eq!(rows.len(), 5);
    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["amount", "id", "item", "year"]);
    assert_eq!(rows[4]["year"], 2021);
    assert_eq!(rows[4]["item"], "item-4");
    Ok(())
}
