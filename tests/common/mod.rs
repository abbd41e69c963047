#![allow(dead_code)]

use hivequet::testing::HiveFixture;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub amount: f64,
    pub item: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct YearlySale {
    pub id: i64,
    pub amount: f64,
    pub year: i64,
}

pub fn sales(ids: std::ops::Range<i64>) -> Vec<Sale> {
    ids.map(|id| Sale {
        id,
        amount: id as f64 * 10.0,
        item: format!("item-{id}"),
    })
    .collect()
}

/// `year=2020` holds ids 0..3, `year=2021` holds ids 3..5.
pub fn two_years() -> anyhow::Result<HiveFixture> {
    let fixture = HiveFixture::new()?;
    fixture.write_partition(&[("year", "2020")], "part-0.parquet", &sales(0..3))?;
    fixture.write_partition(&[("year", "2021")], "part-0.parquet", &sales(3..5))?;
    Ok(fixture)
}
