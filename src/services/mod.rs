pub mod application;
pub mod metadata_store;
pub mod object_store;
pub mod reconcile;
pub mod repository;
