//! Core data types shared by every pipeline stage.
//!
//! - **[`Value`]**: one scalar cell
//! - **[`Row`]**: an ordered mapping from lowercase field name to an optional value
//! - **[`ValidatedRow`]**: a row plus its `Valid` verdict and `Remarks`

pub mod row;
pub mod value;

pub use row::{Headers, Row, ValidatedRow, Verdict, REMARKS_FIELD, SUCCESS_REMARK, VALID_FIELD};
pub use value::{KeyPart, Value};
