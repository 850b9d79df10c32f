/// 共享数据模型
///
/// 定义 Server 与 vSphere 客户端共享的数据结构

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::utils;

/// 虚拟机状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Provisioning,
    Running,
    Stopped,
    Failed,
    Destroyed,
}

impl VmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmState::Provisioning => "provisioning",
            VmState::Running => "running",
            VmState::Stopped => "stopped",
            VmState::Failed => "failed",
            VmState::Destroyed => "destroyed",
        }
    }
}

impl From<String> for VmState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "provisioning" => VmState::Provisioning,
            "running" => VmState::Running,
            "stopped" => VmState::Stopped,
            "failed" => VmState::Failed,
            "destroyed" => VmState::Destroyed,
            _ => VmState::Failed,
        }
    }
}

/// 预装工具（封闭集合）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tool {
    Docker,
    DockerCompose,
    Podman,
    VirtualBox,
}

impl Tool {
    /// 全部受支持的工具，供建议接口使用
    pub fn all() -> &'static [Tool] {
        &[Tool::Docker, Tool::DockerCompose, Tool::Podman, Tool::VirtualBox]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Docker => "Docker",
            Tool::DockerCompose => "DockerCompose",
            Tool::Podman => "Podman",
            Tool::VirtualBox => "VirtualBox",
        }
    }
}

/// SSH 接入方式（每台虚拟机单独选择）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SshMode {
    RootPassword,
    Certificate,
}

/// 硬件规格
///
/// `memory_mb` 是字面意义上的 MB，任何换算都发生在客户端之前。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    #[validate(range(min = 1, message = "CPU 核心数必须大于等于 1"))]
    pub cpu_count: u32,

    #[serde(rename = "memoryMB")]
    #[validate(range(min = 512, message = "内存不能小于 512 MB"))]
    pub memory_mb: u64,

    #[serde(rename = "diskCapacityKB")]
    #[validate(range(min = 1, message = "磁盘容量必须大于 0"))]
    pub disk_capacity_kb: u64,

    #[validate(length(min = 1, message = "操作系统名称不能为空"))]
    pub os_name: String,

    /// 32 或 64；合法性由操作系统注册表查询时裁决
    pub os_bitness: u8,

    #[validate(custom = "validate_ip")]
    pub network_ip: String,

    #[validate(custom = "validate_mask")]
    pub netmask: String,

    #[validate(custom = "validate_ip")]
    pub gateway: String,

    #[validate(custom = "validate_hostname")]
    pub hostname: String,
}

/// 定制规格
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomSpec {
    #[validate(custom = "validate_hostname")]
    pub vm_name: String,

    #[serde(default)]
    pub pre_installed_tools: Vec<Tool>,

    pub ssh_mode: SshMode,
}

fn validate_ip(ip: &str) -> Result<(), ValidationError> {
    if utils::validate_ipv4_address(ip) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_ipv4"))
    }
}

fn validate_mask(mask: &str) -> Result<(), ValidationError> {
    if utils::validate_netmask(mask) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_netmask"))
    }
}

fn validate_hostname(name: &str) -> Result<(), ValidationError> {
    if utils::validate_dns_label(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_dns_label"))
    }
}

/// 部署放置位置，由资源选择器产出，一经选定不再变化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub datacenter_ref: String,
    pub folder_ref: String,
    pub cluster_ref: String,
    pub datastore_ref: String,
    pub network_ref: String,
}

/// SSH 接入信息
///
/// 私钥只以密文形式出现；明文口令仅在部署期间驻留内存。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum SshInfo {
    RootPassword {
        username: String,
        password_hash: String,
    },
    Certificate {
        fingerprint: String,
        public_cert: String,
        private_key_encrypted: String,
    },
}

impl SshInfo {
    pub fn mode(&self) -> SshMode {
        match self {
            SshInfo::RootPassword { .. } => SshMode::RootPassword,
            SshInfo::Certificate { .. } => SshMode::Certificate,
        }
    }
}

/// 边缘路由绑定，每台虚拟机至多一个
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteBinding {
    pub service_name: String,
    pub route_url: String,
    pub upstream_host: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hardware() -> HardwareSpec {
        HardwareSpec {
            cpu_count: 4,
            memory_mb: 8192,
            disk_capacity_kb: 20 * 1024 * 1024,
            os_name: "ubuntu".to_string(),
            os_bitness: 64,
            network_ip: "10.0.0.42".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "10.0.0.1".to_string(),
            hostname: "alice-vm".to_string(),
        }
    }

    #[test]
    fn test_hardware_spec_valid() {
        assert!(sample_hardware().validate().is_ok());
    }

    #[test]
    fn test_hardware_spec_rejects_low_memory() {
        let mut spec = sample_hardware();
        spec.memory_mb = 256;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_hardware_spec_rejects_zero_cpu() {
        let mut spec = sample_hardware();
        spec.cpu_count = 0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_hardware_spec_rejects_bad_ip() {
        let mut spec = sample_hardware();
        spec.network_ip = "300.1.1.1".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_hardware_spec_rejects_bad_hostname() {
        let mut spec = sample_hardware();
        spec.hostname = "-bad".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_custom_spec_tools_closed_set() {
        // 未知工具在反序列化阶段即被拒绝
        let bad = serde_json::json!({
            "vmName": "web",
            "preInstalledTools": ["Kubernetes"],
            "sshMode": "rootPassword"
        });
        assert!(serde_json::from_value::<CustomSpec>(bad).is_err());

        let ok = serde_json::json!({
            "vmName": "web",
            "preInstalledTools": ["Docker", "Podman"],
            "sshMode": "certificate"
        });
        let spec: CustomSpec = serde_json::from_value(ok).unwrap();
        assert_eq!(spec.pre_installed_tools.len(), 2);
        assert_eq!(spec.ssh_mode, SshMode::Certificate);
    }

    #[test]
    fn test_ssh_info_tagged_serialization() {
        let info = SshInfo::RootPassword {
            username: "root".to_string(),
            password_hash: "$2b$12$abc".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["mode"], "rootPassword");

        let parsed: SshInfo = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.mode(), SshMode::RootPassword);
    }

    #[test]
    fn test_vm_state_round_trip() {
        assert_eq!(VmState::from("running".to_string()), VmState::Running);
        assert_eq!(VmState::Provisioning.as_str(), "provisioning");
    }
}
