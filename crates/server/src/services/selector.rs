/// 资源选择器 (C1)
///
/// 在清单快照上做纯函数式筛选，同一快照两次选择结果必然一致。
/// 平台查询失败原样向上抛（可重试），筛选无果返回 `NoCapacity`。

use common::models::{HardwareSpec, Placement};
use common::{utils, Error, Result};
use tracing::{debug, info};
use vsphere::types::{ClusterInventory, DatacenterInventory, DatastoreSummary, NetworkSummary};

use crate::app_state::AppState;

/// 集群 CPU 余量要求：每颗 vCPU 预留 2000 MHz
const MHZ_PER_VCPU: u64 = 2000;

pub struct ResourceSelector {
    state: AppState,
}

impl ResourceSelector {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 为硬件规格选择放置位置
    pub async fn select(&self, spec: &HardwareSpec) -> Result<Placement> {
        let inventory = self.state.vsphere().fetch_inventory().await?;
        let placement = select_from_inventory(spec, &inventory)?;
        info!(
            "已为 {} vCPU / {} MB 选定集群 {} 存储 {}",
            spec.cpu_count, spec.memory_mb, placement.cluster_ref, placement.datastore_ref
        );
        Ok(placement)
    }
}

/// 集群是否满足 CPU 与内存余量要求（内存留 10% 头寸）
fn cluster_fits(cluster: &ClusterInventory, spec: &HardwareSpec) -> bool {
    let c = &cluster.cluster;
    if c.free_mhz() < spec.cpu_count as u64 * MHZ_PER_VCPU {
        return false;
    }
    // free_mem >= mem * 1.10，用整数运算避免浮点
    c.free_memory_mb() * 10 >= spec.memory_mb * 11
}

/// 在集群内挑数据存储：容量留 10% 头寸，且集群每台主机都能访问；
/// 平手取剩余字节最多者，相同剩余量按清单顺序取先者
fn pick_datastore<'a>(
    cluster: &'a ClusterInventory,
    spec: &HardwareSpec,
) -> Option<&'a DatastoreSummary> {
    cluster
        .datastores
        .iter()
        .filter(|ds| ds.free_space_kb * 10 >= spec.disk_capacity_kb * 11)
        .filter(|ds| {
            cluster
                .cluster
                .hosts
                .iter()
                .all(|host| ds.accessible_hosts.contains(host))
        })
        .max_by(|a, b| {
            a.free_space_kb
                .cmp(&b.free_space_kb)
                // max_by 在相等时返回后者，翻转比较保证取清单顺序的先者
                .then(std::cmp::Ordering::Greater)
        })
}

/// 在集群内挑网络：优先子网包含规格 IP 的端口组，
/// 其次未声明子网的端口组，都按清单插入顺序取第一个
fn pick_network<'a>(
    cluster: &'a ClusterInventory,
    spec: &HardwareSpec,
) -> Option<&'a NetworkSummary> {
    let subnet_match = cluster.networks.iter().find(|net| {
        match (&net.subnet_ip, &net.netmask) {
            (Some(subnet), Some(mask)) => utils::same_subnet(&spec.network_ip, subnet, mask),
            _ => false,
        }
    });
    if subnet_match.is_some() {
        return subnet_match;
    }
    cluster.networks.iter().find(|net| net.subnet_ip.is_none())
}

/// 纯筛选：相同快照上的选择是确定的
pub fn select_from_inventory(
    spec: &HardwareSpec,
    inventory: &[DatacenterInventory],
) -> Result<Placement> {
    let mut best: Option<(u64, Placement)> = None;

    for dc in inventory {
        for cluster in &dc.clusters {
            if !cluster_fits(cluster, spec) {
                debug!("集群 {} 余量不足，跳过", cluster.cluster.name);
                continue;
            }
            let Some(datastore) = pick_datastore(cluster, spec) else {
                debug!("集群 {} 没有可用数据存储，跳过", cluster.cluster.name);
                continue;
            };
            let Some(network) = pick_network(cluster, spec) else {
                debug!("集群 {} 没有匹配网络，跳过", cluster.cluster.name);
                continue;
            };

            let free_mhz = cluster.cluster.free_mhz();
            let candidate = Placement {
                datacenter_ref: dc.moref.clone(),
                folder_ref: dc.vm_folder_ref.clone(),
                cluster_ref: cluster.cluster.moref.clone(),
                datastore_ref: datastore.moref.clone(),
                network_ref: network.moref.clone(),
            };

            // 严格大于：平手保留先遇到的候选，保证确定性
            match &best {
                Some((best_mhz, _)) if free_mhz <= *best_mhz => {}
                _ => best = Some((free_mhz, candidate)),
            }
        }
    }

    best.map(|(_, p)| p)
        .ok_or_else(|| Error::NoCapacity("没有集群同时满足 CPU、内存、存储与网络要求".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsphere::types::ClusterSummary;

    fn spec() -> HardwareSpec {
        HardwareSpec {
            cpu_count: 4,
            memory_mb: 8192,
            disk_capacity_kb: 20 * 1024 * 1024,
            os_name: "ubuntu".to_string(),
            os_bitness: 64,
            network_ip: "10.0.0.42".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "10.0.0.1".to_string(),
            hostname: "web".to_string(),
        }
    }

    fn cluster(moref: &str, free_mhz: u64, free_mem_mb: u64) -> ClusterInventory {
        ClusterInventory {
            cluster: ClusterSummary {
                moref: moref.to_string(),
                name: moref.to_string(),
                total_mhz: 100_000,
                used_mhz: 100_000 - free_mhz,
                total_memory_mb: 262_144,
                used_memory_mb: 262_144 - free_mem_mb,
                hosts: vec!["host-1".to_string(), "host-2".to_string()],
            },
            datastores: vec![datastore("ds-1", 100 * 1024 * 1024)],
            networks: vec![network("net-1", Some(("10.0.0.0", "255.255.255.0")))],
        }
    }

    fn datastore(moref: &str, free_kb: u64) -> DatastoreSummary {
        DatastoreSummary {
            moref: moref.to_string(),
            name: moref.to_string(),
            capacity_kb: free_kb * 2,
            free_space_kb: free_kb,
            accessible_hosts: vec!["host-1".to_string(), "host-2".to_string()],
        }
    }

    fn network(moref: &str, subnet: Option<(&str, &str)>) -> NetworkSummary {
        NetworkSummary {
            moref: moref.to_string(),
            name: moref.to_string(),
            subnet_ip: subnet.map(|(ip, _)| ip.to_string()),
            netmask: subnet.map(|(_, mask)| mask.to_string()),
        }
    }

    fn datacenter(clusters: Vec<ClusterInventory>) -> DatacenterInventory {
        DatacenterInventory {
            moref: "datacenter-1".to_string(),
            name: "dc1".to_string(),
            vm_folder_ref: "group-v1".to_string(),
            clusters,
        }
    }

    #[test]
    fn test_selection_deterministic() {
        let inv = vec![datacenter(vec![cluster("c-1", 20_000, 65_536), cluster("c-2", 30_000, 65_536)])];
        let a = select_from_inventory(&spec(), &inv).unwrap();
        let b = select_from_inventory(&spec(), &inv).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prefers_cluster_with_most_free_cpu() {
        let inv = vec![datacenter(vec![cluster("c-1", 20_000, 65_536), cluster("c-2", 30_000, 65_536)])];
        let p = select_from_inventory(&spec(), &inv).unwrap();
        assert_eq!(p.cluster_ref, "c-2");
    }

    #[test]
    fn test_no_capacity_when_cpu_insufficient() {
        // 4 vCPU 需要 8000 MHz 余量
        let inv = vec![datacenter(vec![cluster("c-1", 7_999, 65_536)])];
        assert!(matches!(
            select_from_inventory(&spec(), &inv),
            Err(Error::NoCapacity(_))
        ));
    }

    #[test]
    fn test_memory_headroom_enforced() {
        // 需要 8192 * 1.1 = 9011.2 MB 余量
        let inv = vec![datacenter(vec![cluster("c-1", 20_000, 9_000)])];
        assert!(select_from_inventory(&spec(), &inv).is_err());

        let inv = vec![datacenter(vec![cluster("c-1", 20_000, 9_012)])];
        assert!(select_from_inventory(&spec(), &inv).is_ok());
    }

    #[test]
    fn test_prefers_datastore_with_most_free_space() {
        let mut c = cluster("c-1", 20_000, 65_536);
        c.datastores = vec![
            datastore("ds-small", 30 * 1024 * 1024),
            datastore("ds-big", 80 * 1024 * 1024),
        ];
        let inv = vec![datacenter(vec![c])];
        let p = select_from_inventory(&spec(), &inv).unwrap();
        assert_eq!(p.datastore_ref, "ds-big");
    }

    #[test]
    fn test_datastore_must_be_accessible_from_all_hosts() {
        let mut c = cluster("c-1", 20_000, 65_536);
        let mut partial = datastore("ds-partial", 100 * 1024 * 1024);
        partial.accessible_hosts = vec!["host-1".to_string()];
        c.datastores = vec![partial, datastore("ds-full", 30 * 1024 * 1024)];
        let inv = vec![datacenter(vec![c])];
        let p = select_from_inventory(&spec(), &inv).unwrap();
        assert_eq!(p.datastore_ref, "ds-full");
    }

    #[test]
    fn test_network_matched_by_subnet() {
        let mut c = cluster("c-1", 20_000, 65_536);
        c.networks = vec![
            network("net-other", Some(("192.168.1.0", "255.255.255.0"))),
            network("net-match", Some(("10.0.0.0", "255.255.255.0"))),
        ];
        let inv = vec![datacenter(vec![c])];
        let p = select_from_inventory(&spec(), &inv).unwrap();
        assert_eq!(p.network_ref, "net-match");
    }

    #[test]
    fn test_cluster_without_matching_network_skipped() {
        let mut c = cluster("c-1", 20_000, 65_536);
        c.networks = vec![network("net-other", Some(("192.168.1.0", "255.255.255.0")))];
        let inv = vec![datacenter(vec![c])];
        assert!(select_from_inventory(&spec(), &inv).is_err());
    }

    #[test]
    fn test_unpinned_network_used_as_fallback() {
        let mut c = cluster("c-1", 20_000, 65_536);
        c.networks = vec![
            network("net-other", Some(("192.168.1.0", "255.255.255.0"))),
            network("net-any", None),
        ];
        let inv = vec![datacenter(vec![c])];
        let p = select_from_inventory(&spec(), &inv).unwrap();
        assert_eq!(p.network_ref, "net-any");
    }
}
