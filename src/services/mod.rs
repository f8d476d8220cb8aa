//! Business logic services layer

pub mod authority_service;

pub use authority_service::AuthorityService;
