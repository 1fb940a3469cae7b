//! Domain types shared by the row store, the pipeline and the front ends.

mod outcome;
mod row;

pub use outcome::{Disposition, Outcome, PageContext};
pub use row::{Row, RowId, RowUpdate};
