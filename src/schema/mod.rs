pub mod map;
pub mod types;

pub use map::{map_record, map_records, map_tpex, map_twse};
pub use types::{CanonicalRecord, Column};
