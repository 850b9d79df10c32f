/// 生命周期管理 (C11)
///
/// 开机、重启、关机、销毁，全部先校验属主再驱动平台任务（10 秒限期），
/// 成功后更新目录状态。空转换（对运行中的虚拟机再开机）直接返回成功，
/// 不向平台重发任务。销毁额外注销边缘路由，没有绑定也照常推进。

use std::time::Duration;

use common::models::VmState;
use common::{Error, Result};
use sea_orm::EntityTrait;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};
use vsphere::types::PowerState;

use crate::app_state::AppState;
use crate::db::models::customer::Entity as CustomerEntity;
use crate::db::models::virtual_machine::Vm;
use crate::services::catalog::VmCatalog;
use crate::services::edge::{derive_service_name, EdgeRouterController};

/// 平台控制类调用限期
const CONTROL_DEADLINE: Duration = Duration::from_secs(10);

/// 生命周期操作结果；`already` 表示这是一次空转换
#[derive(Debug, Serialize)]
pub struct LifecycleOutcome {
    pub already: bool,
}

/// 健康状态投影（平台快速统计的直接映射）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub cpu: CpuHealth,
    pub mem: MemHealth,
    pub storage: StorageHealth,
    pub alive: AliveHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuHealth {
    pub usage_mhz: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemHealth {
    pub usage_mb: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHealth {
    pub committed_kb: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliveHealth {
    pub power_state: String,
    pub tools_running: bool,
}

pub struct LifecycleManager {
    state: AppState,
    catalog: VmCatalog,
}

impl LifecycleManager {
    pub fn new(state: AppState) -> Self {
        let catalog = VmCatalog::new(state.clone());
        Self { state, catalog }
    }

    /// 开机；已在运行则为空转换
    pub async fn start(&self, customer_id: &str, vm_id: &str) -> Result<LifecycleOutcome> {
        let vm = self.catalog.get_owned(vm_id, customer_id).await?;
        match vm.vm_state() {
            VmState::Running => Ok(LifecycleOutcome { already: true }),
            VmState::Stopped => {
                let vm_ref = require_vm_ref(&vm)?;
                self.control("开机", self.state.vsphere().power_on(&vm_ref)).await?;
                self.catalog
                    .set_state(&self.state.sea_db, vm_id, VmState::Running)
                    .await?;
                info!("虚拟机 {} 已开机", vm_id);
                Ok(LifecycleOutcome { already: false })
            }
            other => Err(Error::Conflict(format!(
                "虚拟机 {} 当前状态 {} 不允许开机",
                vm_id,
                other.as_str()
            ))),
        }
    }

    /// 重启；只对运行中的虚拟机有效
    pub async fn reboot(&self, customer_id: &str, vm_id: &str) -> Result<LifecycleOutcome> {
        let vm = self.catalog.get_owned(vm_id, customer_id).await?;
        if vm.vm_state() != VmState::Running {
            return Err(Error::Conflict(format!("虚拟机 {} 未在运行，无法重启", vm_id)));
        }

        let vm_ref = require_vm_ref(&vm)?;
        self.control("重启", self.state.vsphere().reboot_guest(&vm_ref)).await?;
        info!("虚拟机 {} 已重启", vm_id);
        Ok(LifecycleOutcome { already: false })
    }

    /// 关机；已停止则为空转换。先软关机，失败退回硬关机。
    pub async fn shutdown(&self, customer_id: &str, vm_id: &str) -> Result<LifecycleOutcome> {
        let vm = self.catalog.get_owned(vm_id, customer_id).await?;
        match vm.vm_state() {
            VmState::Stopped => Ok(LifecycleOutcome { already: true }),
            VmState::Running => {
                let vm_ref = require_vm_ref(&vm)?;
                let vsphere = self.state.vsphere();

                if let Err(e) = self.control("软关机", vsphere.shutdown_guest(&vm_ref)).await {
                    warn!("虚拟机 {} 软关机失败: {}，改为硬关机", vm_id, e);
                    self.control("硬关机", vsphere.power_off(&vm_ref)).await?;
                }

                self.catalog
                    .set_state(&self.state.sea_db, vm_id, VmState::Stopped)
                    .await?;
                info!("虚拟机 {} 已关机", vm_id);
                Ok(LifecycleOutcome { already: false })
            }
            other => Err(Error::Conflict(format!(
                "虚拟机 {} 当前状态 {} 不允许关机",
                vm_id,
                other.as_str()
            ))),
        }
    }

    /// 销毁；已销毁则为空转换，且不再触发任何边缘调用
    pub async fn destroy(&self, customer_id: &str, vm_id: &str) -> Result<LifecycleOutcome> {
        let vm = self.catalog.get_owned(vm_id, customer_id).await?;
        if vm.vm_state() == VmState::Destroyed {
            return Ok(LifecycleOutcome { already: true });
        }

        // 先注销边缘路由；目录缺少绑定时按派生名注销，照常推进
        let edge = EdgeRouterController::new(&self.state.config().edge_socket_path);
        let service_name = match self.catalog.route_binding(vm_id).await? {
            Some(binding) => binding.service_name,
            None => {
                let owner = CustomerEntity::find_by_id(vm.owner_id.clone())
                    .one(&self.state.sea_db)
                    .await
                    .map_err(|e| Error::Internal(format!("数据库错误: {}", e)))?
                    .map(|c| c.username)
                    .unwrap_or_default();
                derive_service_name(&owner, vm_id)
            }
        };
        if let Err(e) = edge.deregister(&service_name).await {
            warn!("注销虚拟机 {} 的边缘路由失败: {}，继续销毁", vm_id, e);
        }

        if let Some(vm_ref) = &vm.vm_ref {
            let vsphere = self.state.vsphere();
            // 运行中的虚拟机先断电；失败不阻塞删除
            if vm.vm_state() == VmState::Running {
                if let Err(e) = self.control("断电", vsphere.power_off(vm_ref)).await {
                    warn!("销毁前断电虚拟机 {} 失败: {}", vm_id, e);
                }
            }
            self.control("删除虚拟机", vsphere.destroy_vm(vm_ref)).await?;
        }

        self.catalog
            .set_state(&self.state.sea_db, vm_id, VmState::Destroyed)
            .await?;
        info!("虚拟机 {} 已销毁", vm_id);
        Ok(LifecycleOutcome { already: false })
    }

    /// 健康状态：CPU / 内存 / 存储快速统计加电源与工具状态
    pub async fn health(&self, customer_id: &str, vm_id: &str) -> Result<HealthResponse> {
        let vm = self.catalog.get_owned(vm_id, customer_id).await?;
        let vm_ref = require_vm_ref(&vm)?;
        let stats = self.state.vsphere().quick_stats(&vm_ref).await?;

        Ok(HealthResponse {
            cpu: CpuHealth { usage_mhz: stats.overall_cpu_usage_mhz },
            mem: MemHealth { usage_mb: stats.guest_memory_usage_mb },
            storage: StorageHealth { committed_kb: stats.storage_committed_kb },
            alive: AliveHealth {
                power_state: power_state_name(stats.power_state).to_string(),
                tools_running: stats.tools_running,
            },
        })
    }

    /// 取证书模式虚拟机的 PEM 包：叶证书加解密后的私钥，只发给属主
    pub async fn ssh_cert(&self, customer_id: &str, vm_id: &str) -> Result<String> {
        // 属主校验在先
        self.catalog.get_owned(vm_id, customer_id).await?;

        let info = self
            .catalog
            .ssh_info(vm_id)
            .await?
            .and_then(|row| row.to_ssh_info())
            .ok_or_else(|| Error::NotFound(format!("虚拟机 {} 没有 SSH 记录", vm_id)))?;

        match info {
            common::models::SshInfo::Certificate { public_cert, private_key_encrypted, .. } => {
                let key_pem = crate::services::credentials::decrypt_secret(
                    &self.state.config().ssh_key_secret,
                    &private_key_encrypted,
                )?;
                let key_pem = String::from_utf8(key_pem)
                    .map_err(|_| Error::Internal("私钥不是合法的 PEM 文本".to_string()))?;
                Ok(format!("{}\n{}", public_cert.trim_end(), key_pem))
            }
            common::models::SshInfo::RootPassword { .. } => Err(Error::NotFound(format!(
                "虚拟机 {} 使用口令模式，没有证书",
                vm_id
            ))),
        }
    }

    async fn control<F>(&self, op: &str, fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        match timeout(CONTROL_DEADLINE, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("{}调用超时", op))),
        }
    }
}

fn require_vm_ref(vm: &Vm) -> Result<String> {
    vm.vm_ref
        .clone()
        .ok_or_else(|| Error::Internal(format!("虚拟机 {} 缺少平台对象引用", vm.id)))
}

fn power_state_name(state: PowerState) -> &'static str {
    match state {
        PowerState::PoweredOn => "poweredOn",
        PowerState::PoweredOff => "poweredOff",
        PowerState::Suspended => "suspended",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_names() {
        assert_eq!(power_state_name(PowerState::PoweredOn), "poweredOn");
        assert_eq!(power_state_name(PowerState::PoweredOff), "poweredOff");
        assert_eq!(power_state_name(PowerState::Suspended), "suspended");
    }
}
