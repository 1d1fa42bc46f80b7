//! Integration tests for cvx crates.
//!
//! Besides the tests under `tests/`, this crate provides what they share:
//!
//! - [`corpus`]: synthetic inputs over every pattern and channel count
//! - [`oracle`]: a scalar reference implementation of every operation, used
//!   to pass or fail a backend result within the operation tolerance
//! - [`golden`]: SHA256 digests of images, checked against
//!   `golden/digests.json`

pub mod corpus;
pub mod golden;
pub mod oracle;

pub use corpus::{corpus, Case};
pub use golden::{digest, GoldenSet, GoldenStatus};
pub use oracle::{check, reference, Verdict};
