use crate::core::ValidatedRow;
use crate::error::Result;

/// Pretty-printed JSON array, fields in header order.
pub(super) fn render(rows: &[ValidatedRow]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(rows)?)
}
