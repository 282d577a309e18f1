//! Tabular record store over the range-addressed sheet transport

mod error;
mod table_store;

pub use error::StoreError;
pub use table_store::TableStore;
