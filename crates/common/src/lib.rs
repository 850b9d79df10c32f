/// Strato Cloud - 公共库
///
/// 提供 Server 和 vSphere 客户端共享的类型、错误处理、工具函数等

pub mod errors;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use models::{CustomSpec, HardwareSpec, Placement, RouteBinding, SshInfo, SshMode, Tool};
