// Resource pipeline
pub mod resources;

// Air-gapped image delivery
pub mod push;
pub mod cache;

// Controller and local state
pub mod catalog;
pub mod namespace;
