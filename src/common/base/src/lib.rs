#[macro_use]
extern crate anyhow;

pub mod influxql;
pub mod point;
