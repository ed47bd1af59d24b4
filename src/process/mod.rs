// src/process/mod.rs
pub mod normalize;
pub mod raw_table;
pub mod utils;

pub use normalize::{normalize, NormalizedTable, TableLayout, TPEX_LAYOUT, TWSE_LAYOUT};
pub use raw_table::RawTable;
