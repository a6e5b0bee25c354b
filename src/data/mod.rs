/// Data layer: table model, ingestion, enrichment, filtering, summaries and export.
///
/// Architecture:
/// ```text
///  dir/*.csv / *.json / *.parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse each extract, tag `source`, union columns → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  enrich   │  synthesize traffic_volume, derive hour
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  source / city / category / hour predicates → WorkingSet
///   └──────────┘
///        │
///        ▼
///   summary, cluster, ml  ──▶  export (csv bytes)
/// ```

pub mod enrich;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod summary;
