/// Strato Cloud - vSphere 客户端
///
/// 封装 vSphere 风格虚拟化平台的 REST 接口：会话管理、资源清单查询、
/// 虚拟机克隆与电源操作、客户机操作通道、主机证书管理、任务轮询。

pub mod cert;
pub mod client;
pub mod guest;
pub mod inventory;
pub mod task;
pub mod types;
pub mod vm;

pub use client::VsphereClient;
pub use types::{
    CloneSpec, ClusterInventory, DatacenterInventory, PowerState, VmQuickStats,
};
