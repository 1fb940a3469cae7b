//! Durable storage for row records.

mod row_store;

pub use row_store::{
    RowStore, StoreError, ADJACENT_TEXT_COLUMN, ALT_TEXT_COLUMN, DESTINATION_COLUMN,
    HEADING_COLUMN, MESSAGE_COLUMN, SIZE_COLUMN_ALIASES, SOURCE_COLUMN, TITLE_COLUMN,
};
