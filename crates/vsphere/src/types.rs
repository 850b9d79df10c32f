/// vSphere 对象模型
///
/// 只建模控制平面用到的字段，完整对象留在平台侧。

use serde::{Deserialize, Serialize};

/// 电源状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerState {
    #[serde(rename = "POWERED_ON")]
    PoweredOn,
    #[serde(rename = "POWERED_OFF")]
    PoweredOff,
    #[serde(rename = "SUSPENDED")]
    Suspended,
}

/// 集群概要（含主机快速统计的汇总）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub moref: String,
    pub name: String,
    /// 所有主机 CPU 总量与已用量（MHz）
    pub total_mhz: u64,
    pub used_mhz: u64,
    /// 所有主机内存总量与已用量（MB）
    pub total_memory_mb: u64,
    pub used_memory_mb: u64,
    /// 集群内主机的 moref 列表
    pub hosts: Vec<String>,
}

impl ClusterSummary {
    pub fn free_mhz(&self) -> u64 {
        self.total_mhz.saturating_sub(self.used_mhz)
    }

    pub fn free_memory_mb(&self) -> u64 {
        self.total_memory_mb.saturating_sub(self.used_memory_mb)
    }
}

/// 数据存储概要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreSummary {
    pub moref: String,
    pub name: String,
    pub capacity_kb: u64,
    pub free_space_kb: u64,
    /// 能访问该存储的主机 moref 列表
    pub accessible_hosts: Vec<String>,
}

/// 网络（端口组）概要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub moref: String,
    pub name: String,
    /// 端口组所属子网，未配置时为 None
    pub subnet_ip: Option<String>,
    pub netmask: Option<String>,
}

/// 集群清单：集群本身加上它可达的存储与网络
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInventory {
    pub cluster: ClusterSummary,
    pub datastores: Vec<DatastoreSummary>,
    pub networks: Vec<NetworkSummary>,
}

/// 数据中心清单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacenterInventory {
    pub moref: String,
    pub name: String,
    /// 虚拟机文件夹
    pub vm_folder_ref: String,
    pub clusters: Vec<ClusterInventory>,
}

/// 主机概要（用于负载均衡器建议列表，每台主机一个边缘代理）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSummary {
    pub moref: String,
    pub name: String,
}

/// 网络定制：单网卡固定 IP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkCustomization {
    pub ip_address: String,
    pub subnet_mask: String,
    pub gateways: Vec<String>,
    pub hostname: String,
    pub network_ref: String,
}

/// 存储定制：精简置备持久平面磁盘，挂第一个 SCSI 控制器
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageCustomization {
    pub capacity_in_kb: u64,
    pub datastore_ref: String,
    pub thin_provisioned: bool,
    /// 目标控制器不存在时由平台创建
    pub create_scsi_controller: bool,
}

/// 资源定制：CPU / 内存，开启热添加
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceCustomization {
    pub num_cpus: u32,
    pub cores_per_socket: u32,
    pub memory_mb: u64,
    pub cpu_hot_add_enabled: bool,
    pub memory_hot_add_enabled: bool,
}

/// 客户机身份定制
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityCustomization {
    /// Linux 身份定制
    LinuxIdentity,
    /// Windows sysprep 定制
    WindowsSysprep {
        delete_accounts: bool,
        change_sid: bool,
        reboot: bool,
    },
}

/// 客户机操作系统定制
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuestOsCustomization {
    /// 平台侧的 guest-OS 标识，例如 `ubuntu64Guest`
    pub guest_id: String,
    pub identity: IdentityCustomization,
}

/// 完整克隆规格
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneSpec {
    pub name: String,
    pub datacenter_ref: String,
    pub folder_ref: String,
    pub cluster_ref: String,
    pub network: NetworkCustomization,
    pub storage: StorageCustomization,
    pub resource: ResourceCustomization,
    pub guest_os: GuestOsCustomization,
}

/// 虚拟机快速统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmQuickStats {
    pub power_state: PowerState,
    pub overall_cpu_usage_mhz: u64,
    pub guest_memory_usage_mb: u64,
    pub storage_committed_kb: u64,
    pub tools_running: bool,
    pub ip_address: Option<String>,
}
