//! 数据模型模块
//! 角色、权限及其关联关系

pub mod permission;
pub mod role;
pub mod role_permission;
pub mod user_role;

pub use permission::*;
pub use role::*;
pub use role_permission::*;
pub use user_role::*;
