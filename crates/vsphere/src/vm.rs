/// 虚拟机操作
///
/// 克隆返回任务 ID 交由 task 模块轮询；电源操作是短时调用，
/// 限期由调用方用 `tokio::time::timeout` 约束。

use std::time::Duration;

use common::{Error, Result};
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::client::VsphereClient;
use crate::types::{CloneSpec, PowerState, VmQuickStats};

#[derive(Debug, Deserialize)]
struct CloneStarted {
    task: String,
}

impl VsphereClient {
    /// 按克隆规格实例化虚拟机，返回平台任务 ID
    pub async fn clone_vm(&self, spec: &CloneSpec) -> Result<String> {
        let started: CloneStarted = self
            .post_json("/vcenter/vm?action=clone", spec, "克隆虚拟机")
            .await?;
        info!("虚拟机 {} 克隆任务已提交: {}", spec.name, started.task);
        Ok(started.task)
    }

    pub async fn power_on(&self, vm_ref: &str) -> Result<()> {
        self.post_action(&format!("/vcenter/vm/{}/power/start", vm_ref), "开机")
            .await
    }

    pub async fn power_off(&self, vm_ref: &str) -> Result<()> {
        self.post_action(&format!("/vcenter/vm/{}/power/stop", vm_ref), "关机")
            .await
    }

    /// 通过客户机工具软关机
    pub async fn shutdown_guest(&self, vm_ref: &str) -> Result<()> {
        self.post_action(&format!("/vcenter/vm/{}/guest/power?action=shutdown", vm_ref), "软关机")
            .await
    }

    /// 通过客户机工具重启
    pub async fn reboot_guest(&self, vm_ref: &str) -> Result<()> {
        self.post_action(&format!("/vcenter/vm/{}/guest/power?action=reboot", vm_ref), "重启")
            .await
    }

    /// 从平台删除虚拟机（含磁盘）；虚拟机已不存在时视为成功
    pub async fn destroy_vm(&self, vm_ref: &str) -> Result<()> {
        match self.delete(&format!("/vcenter/vm/{}", vm_ref), "删除虚拟机").await {
            Ok(()) => Ok(()),
            Err(Error::NotFound(_)) => {
                debug!("虚拟机 {} 已不存在，删除视为成功", vm_ref);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 读取快速统计（电源状态、CPU/内存/存储用量、客户机 IP）
    pub async fn quick_stats(&self, vm_ref: &str) -> Result<VmQuickStats> {
        self.get_json(&format!("/vcenter/vm/{}/stats", vm_ref), "查询快速统计")
            .await
    }

    /// 等待客户机工具上报期望的 IP 地址
    ///
    /// 开机后客户机工具需要一段时间才会上报网络身份；在限期内按固定
    /// 间隔轮询，超时返回 `GuestUnreachable`。
    pub async fn wait_for_guest_ip(
        &self,
        vm_ref: &str,
        expected_ip: &str,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            let stats = self.quick_stats(vm_ref).await?;
            if stats.power_state == PowerState::PoweredOn {
                if let Some(ip) = &stats.ip_address {
                    if ip == expected_ip {
                        info!("虚拟机 {} 已上报 IP {}", vm_ref, expected_ip);
                        return Ok(());
                    }
                    debug!("虚拟机 {} 当前上报 IP {}，等待 {}", vm_ref, ip, expected_ip);
                }
            }

            if started.elapsed() >= deadline {
                return Err(Error::GuestUnreachable(format!(
                    "虚拟机 {} 未在限期内上报 IP {}",
                    vm_ref, expected_ip
                )));
            }
            sleep(poll_interval).await;
        }
    }
}
