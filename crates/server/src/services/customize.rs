/// 定制规格构建 (C3/C4/C5)
///
/// 从硬件规格到平台定制片段的纯函数。内存按字面 MB 传递，
/// 不做任何单位换算。

use common::models::{HardwareSpec, Placement};
use vsphere::types::{
    CloneSpec, GuestOsCustomization, NetworkCustomization, ResourceCustomization,
    StorageCustomization,
};

use crate::services::os_profile::OsProfile;

/// 网络定制：单网卡、固定 IP、单条网关、身份主机名
pub fn network_customization(spec: &HardwareSpec, network_ref: &str) -> NetworkCustomization {
    NetworkCustomization {
        ip_address: spec.network_ip.clone(),
        subnet_mask: spec.netmask.clone(),
        gateways: vec![spec.gateway.clone()],
        hostname: spec.hostname.clone(),
        network_ref: network_ref.to_string(),
    }
}

/// 存储定制：精简置备持久平面磁盘，落在选定的数据存储上，
/// 挂第一个 SCSI 控制器（不存在则创建）
pub fn storage_customization(spec: &HardwareSpec, datastore_ref: &str) -> StorageCustomization {
    StorageCustomization {
        capacity_in_kb: spec.disk_capacity_kb,
        datastore_ref: datastore_ref.to_string(),
        thin_provisioned: true,
        create_scsi_controller: true,
    }
}

/// 资源定制：CPU 与内存，开启热添加
pub fn resource_customization(spec: &HardwareSpec) -> ResourceCustomization {
    ResourceCustomization {
        num_cpus: spec.cpu_count,
        cores_per_socket: (spec.cpu_count / 2).max(1),
        // memory_mb 就是 MB，不乘 1024
        memory_mb: spec.memory_mb,
        cpu_hot_add_enabled: true,
        memory_hot_add_enabled: true,
    }
}

/// 组装完整克隆规格
pub fn build_clone_spec(
    vm_name: &str,
    spec: &HardwareSpec,
    placement: &Placement,
    profile: &OsProfile,
) -> CloneSpec {
    CloneSpec {
        name: vm_name.to_string(),
        datacenter_ref: placement.datacenter_ref.clone(),
        folder_ref: placement.folder_ref.clone(),
        cluster_ref: placement.cluster_ref.clone(),
        network: network_customization(spec, &placement.network_ref),
        storage: storage_customization(spec, &placement.datastore_ref),
        resource: resource_customization(spec),
        guest_os: GuestOsCustomization {
            guest_id: profile.guest_id.to_string(),
            identity: profile.identity(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::os_profile;

    fn sample_spec() -> HardwareSpec {
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

    fn sample_placement() -> Placement {
        Placement {
            datacenter_ref: "datacenter-2".to_string(),
            folder_ref: "group-v3".to_string(),
            cluster_ref: "domain-c7".to_string(),
            datastore_ref: "datastore-11".to_string(),
            network_ref: "network-13".to_string(),
        }
    }

    #[test]
    fn test_memory_is_literal_megabytes() {
        let resource = resource_customization(&sample_spec());
        // 8192 MB 就是 8192，不允许出现 GB 换算
        assert_eq!(resource.memory_mb, 8192);
    }

    #[test]
    fn test_cores_per_socket() {
        let mut spec = sample_spec();
        assert_eq!(resource_customization(&spec).cores_per_socket, 2);

        spec.cpu_count = 1;
        assert_eq!(resource_customization(&spec).cores_per_socket, 1);

        spec.cpu_count = 7;
        assert_eq!(resource_customization(&spec).cores_per_socket, 3);
    }

    #[test]
    fn test_hot_add_enabled() {
        let resource = resource_customization(&sample_spec());
        assert!(resource.cpu_hot_add_enabled);
        assert!(resource.memory_hot_add_enabled);
    }

    #[test]
    fn test_network_single_gateway() {
        let net = network_customization(&sample_spec(), "network-13");
        assert_eq!(net.gateways, vec!["10.0.0.1".to_string()]);
        assert_eq!(net.ip_address, "10.0.0.42");
        assert_eq!(net.hostname, "alice-vm");
    }

    #[test]
    fn test_storage_thin_on_selected_datastore() {
        let storage = storage_customization(&sample_spec(), "datastore-11");
        assert!(storage.thin_provisioned);
        assert!(storage.create_scsi_controller);
        assert_eq!(storage.capacity_in_kb, 20 * 1024 * 1024);
        assert_eq!(storage.datastore_ref, "datastore-11");
    }

    #[test]
    fn test_build_clone_spec_combines_fragments() {
        let profile = os_profile::lookup("ubuntu", 64).unwrap();
        let clone = build_clone_spec("web-01", &sample_spec(), &sample_placement(), &profile);

        assert_eq!(clone.name, "web-01");
        assert_eq!(clone.guest_os.guest_id, "ubuntu64Guest");
        assert_eq!(clone.cluster_ref, "domain-c7");
        assert_eq!(clone.network.network_ref, "network-13");
        assert_eq!(clone.storage.datastore_ref, "datastore-11");
    }
}
