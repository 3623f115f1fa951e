pub mod entry;
pub mod error;
pub mod fork;
pub mod git;
pub mod github;
pub mod publish;
pub mod repository;
pub mod ruleset;
pub mod secrets;
pub mod token_cache;
pub mod user;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
