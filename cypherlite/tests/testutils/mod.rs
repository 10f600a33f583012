//! Test utilities for CypherLite integration tests
//!
//! TestFixture owns a temporary data directory and a coordinator opened on
//! it, and can close and reopen the database to exercise recovery.

pub mod test_fixture;
