pub mod artifact;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod retry;
pub mod utils;
pub mod xz;

#[cfg(test)]
pub(crate) mod test_utils;
