/// Data layer: the trace model, its JSON document form, and CSV ingestion.
///
/// Architecture:
/// ```text
///  labeled CSV tree          headerless matrix CSV
///        │                          │
///        ▼                          ▼
///   ┌──────────┐            ┌─────────────────┐
///   │  loader   │            │ Dataset::load_* │  one channel per row/column
///   └──────────┘            └─────────────────┘
///        │                          │
///        ▼                          ▼
///   ┌──────────────────────────────────────┐
///   │ Dataset → Trace → Channel (+Metadata) │  model / dataset
///   └──────────────────────────────────────┘
///        │  to_map / from_map
///        ▼
///   ┌──────────┐
///   │  format   │  JSON document read/write
///   └──────────┘
/// ```

pub mod dataset;
pub mod format;
pub mod loader;
pub mod model;
