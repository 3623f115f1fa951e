pub mod archive;
pub mod attestations;
pub mod document;
pub mod error;
pub mod metadata;
pub mod module_file;
pub mod patch;
pub mod source;
pub mod substitution;
pub mod version;
