/// 部署编排器 (C10)
///
/// 事务化流水线：校验 → 选址 → 目录占位 → 定制 → 克隆 → 开机 →
/// 等 IP → 装凭据 → 引导 → 挂边缘路由 → 提交。每个前进步骤成功后
/// 把对应的撤销动作压栈；任一步失败或被取消，就逆序弹栈补偿，再在
/// 事务之外写一条审计记录。补偿错误只记录，不覆盖原始失败。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::models::{CustomSpec, HardwareSpec};
use common::{Error, Result};
use sea_orm::{DatabaseTransaction, EntityTrait};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use validator::Validate;

use crate::app_state::AppState;
use crate::db::models::customer::{Customer, Entity as CustomerEntity};
use crate::services::bootstrap::{command_source_for, GuestBootstrapExecutor};
use crate::services::catalog::{AuditRecord, VmCatalog};
use crate::services::credentials::GuestCredentialsManager;
use crate::services::customize;
use crate::services::edge::EdgeRouterController;
use crate::services::os_profile::{self, OsProfile};
use crate::services::selector::ResourceSelector;

/// 部署总限期
const OVERALL_DEADLINE: Duration = Duration::from_secs(20 * 60);
/// 克隆任务限期与轮询间隔
const CLONE_DEADLINE: Duration = Duration::from_secs(10 * 60);
const CLONE_POLL: Duration = Duration::from_secs(5);
/// 平台控制类调用限期
const CONTROL_DEADLINE: Duration = Duration::from_secs(10);
/// 等待客户机上报 IP 的限期与轮询间隔
const IP_WAIT_DEADLINE: Duration = Duration::from_secs(5 * 60);
const IP_POLL: Duration = Duration::from_secs(5);
/// 互斥取锁限期
const GUARD_DEADLINE: Duration = Duration::from_secs(30);

/// 部署状态机；终态是 Committed 或 Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    Init,
    Selected,
    TxOpen,
    Cloned,
    PoweredOn,
    IpReady,
    Credentialed,
    Bootstrapped,
    Routed,
    Committed,
}

impl DeployState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployState::Init => "INIT",
            DeployState::Selected => "SELECTED",
            DeployState::TxOpen => "TX_OPEN",
            DeployState::Cloned => "CLONED",
            DeployState::PoweredOn => "POWERED_ON",
            DeployState::IpReady => "IP_READY",
            DeployState::Credentialed => "CREDENTIALED",
            DeployState::Bootstrapped => "BOOTSTRAPPED",
            DeployState::Routed => "ROUTED",
            DeployState::Committed => "COMMITTED",
        }
    }
}

/// 具名撤销动作；前进步骤成功即压栈，失败时逆序执行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    DeregisterRoute { service_name: String },
    WipeCredentials { vm_ref: String },
    PowerOff { vm_ref: String },
    DestroyVm { vm_ref: String },
}

/// (客户, 虚拟机名) 维度的部署互斥
///
/// tokio 互斥锁按到达顺序公平排队；30 秒内拿不到锁说明同名部署
/// 仍在进行，第二个请求观察到冲突。
#[derive(Clone, Default)]
pub struct DeployGuard {
    locks: Arc<AsyncMutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>>,
}

impl DeployGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        customer_id: &str,
        vm_name: &str,
    ) -> Result<OwnedMutexGuard<()>> {
        let key = (customer_id.to_string(), vm_name.to_string());
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        timeout(GUARD_DEADLINE, lock.lock_owned())
            .await
            .map_err(|_| Error::Conflict(format!("虚拟机 {} 已有部署在进行", vm_name)))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub vm_id: String,
}

pub struct DeploymentOrchestrator {
    state: AppState,
}

impl DeploymentOrchestrator {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 端到端部署一台虚拟机
    pub async fn deploy(
        &self,
        customer_id: &str,
        hardware: HardwareSpec,
        custom: CustomSpec,
        cancel: CancellationToken,
    ) -> Result<DeployResponse> {
        self.state.metrics.deployments_started.inc();

        // 1. 早期校验，之后的失败才需要补偿
        hardware
            .validate()
            .map_err(|e| Error::InvalidSpec(format!("硬件规格无效: {}", e)))?;
        custom
            .validate()
            .map_err(|e| Error::InvalidSpec(format!("定制规格无效: {}", e)))?;
        let profile = os_profile::lookup(&hardware.os_name, hardware.os_bitness)?;

        let customer = CustomerEntity::find_by_id(customer_id.to_string())
            .one(&self.state.sea_db)
            .await
            .map_err(|e| Error::Internal(format!("数据库错误: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("客户 {} 不存在", customer_id)))?;

        // 同一 (客户, 虚拟机名) 至多一个在途部署
        let _guard = self
            .state
            .deploy_guard
            .acquire(customer_id, &custom.vm_name)
            .await?;

        let vm_id = common::utils::generate_id();
        info!(
            "客户 {} 开始部署虚拟机 {} ({})",
            customer.username, custom.vm_name, vm_id
        );

        let mut attempt = DeployAttempt {
            state: self.state.clone(),
            catalog: VmCatalog::new(self.state.clone()),
            customer,
            hardware,
            custom,
            cancel,
            vm_id: vm_id.clone(),
            deploy_state: DeployState::Init,
            comps: Vec::new(),
            txn: None,
            vm_ref: None,
            started: Instant::now(),
        };

        match attempt.run(&profile).await {
            Ok(()) => {
                self.state.metrics.deployments_committed.inc();
                info!("虚拟机 {} 部署完成", vm_id);
                Ok(DeployResponse { vm_id })
            }
            Err(err) => {
                warn!("虚拟机 {} 部署失败于 {} 阶段: {}", vm_id, attempt.deploy_state.as_str(), err);
                let compensation_error = attempt.compensate().await;
                attempt.write_audit(&err, compensation_error).await;
                self.state.metrics.deployments_failed.inc();
                Err(err)
            }
        }
    }
}

struct DeployAttempt {
    state: AppState,
    catalog: VmCatalog,
    customer: Customer,
    hardware: HardwareSpec,
    custom: CustomSpec,
    cancel: CancellationToken,
    vm_id: String,
    deploy_state: DeployState,
    comps: Vec<Compensation>,
    txn: Option<DatabaseTransaction>,
    vm_ref: Option<String>,
    started: Instant,
}

impl DeployAttempt {
    /// 每个阶段边界检查取消与总限期
    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Timeout(format!(
                "部署在 {} 阶段被取消",
                self.deploy_state.as_str()
            )));
        }
        if self.started.elapsed() >= OVERALL_DEADLINE {
            return Err(Error::Timeout("部署超过总限期".to_string()));
        }
        Ok(())
    }

    async fn run(&mut self, profile: &OsProfile) -> Result<()> {
        let vsphere = self.state.vsphere();

        // 2. 选址；容量不足时什么都还没发生，无需补偿
        self.checkpoint()?;
        let placement = ResourceSelector::new(self.state.clone())
            .select(&self.hardware)
            .await?;
        self.deploy_state = DeployState::Selected;

        // 3. 打开目录事务，以 provisioning 状态占住 IP 与清单路径
        self.checkpoint()?;
        let txn = self.catalog.begin().await?;
        let inventory_path = format!("/{}/vm/{}", placement.datacenter_ref, self.custom.vm_name);
        self.catalog
            .insert_provisioning(
                &txn,
                &self.vm_id,
                &self.customer.id,
                &self.custom.vm_name,
                &inventory_path,
                &placement,
                &self.hardware.network_ip,
            )
            .await?;
        self.txn = Some(txn);
        self.deploy_state = DeployState::TxOpen;

        // 4. 构建定制规格（纯函数，不会失败）
        let clone_spec =
            customize::build_clone_spec(&self.custom.vm_name, &self.hardware, &placement, profile);

        // 5. 克隆并轮询任务完成
        self.checkpoint()?;
        let task_id = vsphere.clone_vm(&clone_spec).await?;
        let vm_ref = self.await_clone(&task_id).await?;
        self.comps.push(Compensation::DestroyVm { vm_ref: vm_ref.clone() });
        self.vm_ref = Some(vm_ref.clone());
        self.deploy_state = DeployState::Cloned;

        // 6. 开机，等客户机工具上报规格里的 IP
        self.checkpoint()?;
        match timeout(CONTROL_DEADLINE, vsphere.power_on(&vm_ref)).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout("开机调用超时".to_string())),
        }
        self.comps.push(Compensation::PowerOff { vm_ref: vm_ref.clone() });
        self.deploy_state = DeployState::PoweredOn;

        self.checkpoint()?;
        tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(Error::Timeout("部署在等待 IP 阶段被取消".to_string()));
            }
            result = vsphere.wait_for_guest_ip(
                &vm_ref,
                &self.hardware.network_ip,
                IP_WAIT_DEADLINE,
                IP_POLL,
            ) => result?,
        }
        self.deploy_state = DeployState::IpReady;

        // 7. 生成并安装客户机凭据
        self.checkpoint()?;
        let credentials = GuestCredentialsManager::new(self.state.clone())
            .install(
                &vm_ref,
                &placement.cluster_ref,
                &self.vm_id,
                &self.custom.vm_name,
                self.custom.ssh_mode,
            )
            .await?;
        self.comps.push(Compensation::WipeCredentials { vm_ref: vm_ref.clone() });
        self.deploy_state = DeployState::Credentialed;

        // 8. 按发行版命令源执行工具安装
        self.checkpoint()?;
        let source = command_source_for(profile.family, &self.state.config().datacenter_docker_version);
        let commands = source.commands_for(&self.custom.pre_installed_tools);
        GuestBootstrapExecutor::new()
            .execute(&self.hardware.network_ip, &credentials.auth, &commands)
            .await?;
        self.deploy_state = DeployState::Bootstrapped;

        // 9. 注册边缘路由
        self.checkpoint()?;
        let headers = HashMap::from([("X-Strato-Vm".to_string(), self.vm_id.clone())]);
        let upstream = format!("{}:80", self.hardware.network_ip);
        let binding = EdgeRouterController::new(&self.state.config().edge_socket_path)
            .register(&self.customer.username, &self.vm_id, &upstream, headers)
            .await?;
        self.comps.push(Compensation::DeregisterRoute {
            service_name: binding.service_name.clone(),
        });
        self.deploy_state = DeployState::Routed;

        // 10. 目录收尾并提交事务
        let txn = self
            .txn
            .take()
            .ok_or_else(|| Error::Internal("目录事务已丢失".to_string()))?;
        if let Err(e) = self
            .catalog
            .mark_running(&txn, &self.vm_id, &vm_ref, &credentials.ssh_info, &binding)
            .await
        {
            let _ = txn.rollback().await;
            return Err(e);
        }
        txn.commit()
            .await
            .map_err(|e| Error::Internal(format!("提交目录事务失败: {}", e)))?;

        // 提交即生效，撤销栈作废
        self.comps.clear();
        self.deploy_state = DeployState::Committed;
        Ok(())
    }

    /// 等克隆任务完成；取消或超时都先撤销平台任务
    async fn await_clone(&self, task_id: &str) -> Result<String> {
        let vsphere = self.state.vsphere();

        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                match timeout(Duration::from_secs(5), vsphere.cancel_task(task_id)).await {
                    Ok(Err(e)) => warn!("撤销克隆任务 {} 失败: {}", task_id, e),
                    Err(_) => warn!("撤销克隆任务 {} 超时", task_id),
                    Ok(Ok(())) => info!("克隆任务 {} 已撤销", task_id),
                }
                return Err(Error::Timeout("部署在克隆阶段被取消".to_string()));
            }
            result = vsphere.wait_for_task(task_id, CLONE_DEADLINE, CLONE_POLL) => result,
        };

        match result {
            Ok(task) => task
                .result
                .ok_or_else(|| Error::Internal("克隆任务未返回虚拟机引用".to_string())),
            Err(Error::Timeout(msg)) => {
                if let Err(e) = vsphere.cancel_task(task_id).await {
                    warn!("撤销超时克隆任务 {} 失败: {}", task_id, e);
                }
                Err(Error::Timeout(msg))
            }
            Err(e) => Err(e),
        }
    }

    /// 逆序执行撤销栈；每步幂等，失败继续执行后续步骤
    async fn compensate(&mut self) -> Option<String> {
        let vsphere = self.state.vsphere();
        let mut failures: Vec<String> = Vec::new();

        while let Some(comp) = self.comps.pop() {
            info!("执行补偿: {:?}", comp);
            let result = match &comp {
                Compensation::DeregisterRoute { service_name } => {
                    EdgeRouterController::new(&self.state.config().edge_socket_path)
                        .deregister(service_name)
                        .await
                }
                Compensation::WipeCredentials { vm_ref } => {
                    GuestCredentialsManager::new(self.state.clone()).wipe(vm_ref).await
                }
                Compensation::PowerOff { vm_ref } => {
                    match timeout(CONTROL_DEADLINE, vsphere.power_off(vm_ref)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout("关机补偿超时".to_string())),
                    }
                }
                Compensation::DestroyVm { vm_ref } => {
                    match timeout(CONTROL_DEADLINE, vsphere.destroy_vm(vm_ref)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout("删除虚拟机补偿超时".to_string())),
                    }
                }
            };
            if let Err(e) = result {
                error!("补偿 {:?} 失败: {}", comp, e);
                failures.push(format!("{:?}: {}", comp, e));
            }
        }

        // 回滚目录事务，occupied 的 IP 与清单路径随之释放
        if let Some(txn) = self.txn.take() {
            if let Err(e) = txn.rollback().await {
                error!("回滚目录事务失败: {}", e);
                failures.push(format!("rollback: {}", e));
            }
        }

        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }

    /// 在被回滚的事务之外写审计行
    async fn write_audit(&self, err: &Error, compensation_error: Option<String>) {
        self.catalog
            .write_audit(AuditRecord {
                vm_id: Some(self.vm_id.clone()),
                customer_id: self.customer.id.clone(),
                vm_name: self.custom.vm_name.clone(),
                state_reached: self.deploy_state.as_str().to_string(),
                error: format!("{}: {}", err.kind(), err),
                compensation_error,
                cancelled: self.cancel.is_cancelled(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compensation_stack_pops_in_reverse() {
        let mut stack = vec![
            Compensation::DestroyVm { vm_ref: "vm-1".into() },
            Compensation::PowerOff { vm_ref: "vm-1".into() },
            Compensation::WipeCredentials { vm_ref: "vm-1".into() },
            Compensation::DeregisterRoute { service_name: "alice-vm-1".into() },
        ];

        // 路由最后注册，必须最先撤销；删除虚拟机垫底
        assert!(matches!(stack.pop(), Some(Compensation::DeregisterRoute { .. })));
        assert!(matches!(stack.pop(), Some(Compensation::WipeCredentials { .. })));
        assert!(matches!(stack.pop(), Some(Compensation::PowerOff { .. })));
        assert!(matches!(stack.pop(), Some(Compensation::DestroyVm { .. })));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn test_deploy_state_names() {
        assert_eq!(DeployState::Init.as_str(), "INIT");
        assert_eq!(DeployState::TxOpen.as_str(), "TX_OPEN");
        assert_eq!(DeployState::Committed.as_str(), "COMMITTED");
    }

    #[tokio::test]
    async fn test_deploy_guard_exclusive_per_key() {
        let guard = DeployGuard::new();

        let first = guard.acquire("c-1", "web").await.unwrap();

        // 同键的第二次获取在锁释放前拿不到
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            guard.acquire("c-1", "web"),
        )
        .await;
        assert!(second.is_err(), "同键部署不应并发获得锁");

        // 异键互不影响
        let other = tokio::time::timeout(
            Duration::from_millis(50),
            guard.acquire("c-1", "db"),
        )
        .await;
        assert!(other.is_ok());

        drop(first);
        let third = guard.acquire("c-1", "web").await;
        assert!(third.is_ok());
    }
}
