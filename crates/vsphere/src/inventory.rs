/// 资源清单查询
///
/// 按数据中心 → 集群 → (存储, 网络) 的层级拉取一次性快照，
/// 资源选择器在快照上做纯函数式筛选。

use common::Result;
use serde::Deserialize;
use tracing::debug;

use crate::client::VsphereClient;
use crate::types::{
    ClusterInventory, ClusterSummary, DatacenterInventory, DatastoreSummary, HostSummary,
    NetworkSummary,
};

#[derive(Debug, Deserialize)]
struct DatacenterItem {
    datacenter: String,
    name: String,
    vm_folder: String,
}

#[derive(Debug, Deserialize)]
struct FolderItem {
    folder: String,
    name: String,
}

impl VsphereClient {
    /// 拉取完整清单快照
    pub async fn fetch_inventory(&self) -> Result<Vec<DatacenterInventory>> {
        let datacenters: Vec<DatacenterItem> =
            self.get_json("/vcenter/datacenter", "查询数据中心").await?;

        let mut inventory = Vec::with_capacity(datacenters.len());
        for dc in datacenters {
            let clusters: Vec<ClusterSummary> = self
                .get_json(
                    &format!("/vcenter/cluster?filter.datacenters={}", dc.datacenter),
                    "查询集群",
                )
                .await?;

            let mut cluster_inventories = Vec::with_capacity(clusters.len());
            for cluster in clusters {
                let datastores: Vec<DatastoreSummary> = self
                    .get_json(
                        &format!("/vcenter/datastore?filter.clusters={}", cluster.moref),
                        "查询数据存储",
                    )
                    .await?;
                let networks: Vec<NetworkSummary> = self
                    .get_json(
                        &format!("/vcenter/network?filter.clusters={}", cluster.moref),
                        "查询网络",
                    )
                    .await?;

                debug!(
                    "集群 {} 含 {} 个存储、{} 个网络",
                    cluster.name,
                    datastores.len(),
                    networks.len()
                );
                cluster_inventories.push(ClusterInventory { cluster, datastores, networks });
            }

            inventory.push(DatacenterInventory {
                moref: dc.datacenter,
                name: dc.name,
                vm_folder_ref: dc.vm_folder,
                clusters: cluster_inventories,
            });
        }

        Ok(inventory)
    }

    /// 列出数据中心下的虚拟机文件夹
    pub async fn list_folders(&self, datacenter_ref: &str) -> Result<Vec<(String, String)>> {
        let folders: Vec<FolderItem> = self
            .get_json(
                &format!(
                    "/vcenter/folder?filter.type=VIRTUAL_MACHINE&filter.datacenters={}",
                    datacenter_ref
                ),
                "查询文件夹",
            )
            .await?;
        Ok(folders.into_iter().map(|f| (f.folder, f.name)).collect())
    }

    /// 列出主机（每台主机运行一个边缘代理）
    pub async fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        self.get_json("/vcenter/host", "查询主机").await
    }
}
