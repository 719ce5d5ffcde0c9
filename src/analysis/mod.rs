/// Data analysis for the hydrowatch service.
///
/// Submodules:
/// - `trend`     - rate-of-change and rising/falling/stable classification.
/// - `groupings` - folds flat extended-attribute readings into per-station
///   structures.

pub mod groupings;
pub mod trend;
