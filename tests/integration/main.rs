//! End-to-end tests: the full run pipeline against an in-memory market
//! source and real ledger backends.

mod mock_source;
mod pipeline;
