//! 权限中心库
//! 角色、权限与用户-角色关联的一致性引擎

pub mod config;
pub mod db;
pub mod error;
pub mod global;
pub mod models;
pub mod repository;
pub mod services;
pub mod telemetry;

pub use error::{AuthorityError, ErrorKind, Result, StoreError};
pub use services::AuthorityService;
