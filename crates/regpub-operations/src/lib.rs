pub mod logging;
pub mod notifications;
pub mod release;
pub mod startup;

pub use release::{ReleaseEvent, ReleaseEventHandler, ReleaseOutcome};

#[cfg(test)]
mod test_utils;
