pub mod config;
pub mod error;
pub mod ruleset;

#[cfg(test)]
pub mod test_utils;
