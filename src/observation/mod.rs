//! Ground observation tables (10-minute AMeDAS pages).

pub mod markup;
pub mod table;

pub use markup::{parse_markup, MarkupChild, MarkupNode};
pub use table::{
    flatten_header, interval_index, parse, DataRow, HeaderCell, HeaderRow, ObservationTable,
    INTERVALS_PER_DAY, INTERVAL_MINUTES,
};
