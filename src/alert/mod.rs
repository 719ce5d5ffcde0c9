/// Flood classification and reading freshness.
///
/// - `thresholds` - level → safe / watch / warning / danger.
/// - `staleness`  - the freshness gate applied before a reading is accepted.
/// - `warnings`   - summary of stations at watch or above.

pub mod staleness;
pub mod thresholds;
pub mod warnings;
