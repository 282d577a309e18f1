//! Remote sheet store plumbing
//!
//! ```text
//! Record ──encode──► text cells ──► SheetTransport ──► remote ranges
//! Record ◄──decode── JSON cells ◄──┘
//! ```

pub mod codec;
#[cfg(feature = "sheets-http")]
pub mod http;
pub mod range;
pub mod simulated;
pub mod transport;

pub use codec::{decode_rows, encode_record, encode_rows, Cell, Key, Record};
#[cfg(feature = "sheets-http")]
pub use http::HttpSheets;
pub use range::{SheetRange, FIRST_DATA_ROW};
pub use simulated::{SimulatedSheets, SimulatedSheetsConfig, SimulatedSheetsStats};
pub use transport::{InMemorySheets, Rows, SheetTransport, TransportError, TransportFuture};
