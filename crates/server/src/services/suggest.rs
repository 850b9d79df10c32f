/// 建议接口服务
///
/// 为客户端向导提供可选资源清单。平台侧的几类查询并发发起、
/// 集中合流收集，不做无同步的并发追加。

use common::models::Tool;
use common::Result;
use futures::future::try_join_all;
use serde::Serialize;

use crate::app_state::AppState;
use crate::services::os_profile;

/// 建议条目：稳定的不透明标识加显示名
#[derive(Debug, Clone, Serialize)]
pub struct SuggestItem {
    pub id: String,
    pub name: String,
}

/// 打包的建议集合
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuggestPack {
    pub datacenters: Vec<SuggestItem>,
    pub clusters: Vec<SuggestItem>,
    pub datastores: Vec<SuggestItem>,
    pub networks: Vec<SuggestItem>,
    pub folders: Vec<SuggestItem>,
    pub os_list: Vec<SuggestItem>,
    pub tools: Vec<SuggestItem>,
    pub load_balancers: Vec<SuggestItem>,
}

pub struct SuggestionService {
    state: AppState,
}

impl SuggestionService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn pack(&self) -> Result<SuggestPack> {
        let vsphere = self.state.vsphere();

        // 清单与主机列表并发拉取，join 处合流
        let (inventory, hosts) = tokio::try_join!(vsphere.fetch_inventory(), vsphere.list_hosts())?;

        // 每个数据中心的文件夹查询同样并发
        let folder_lists = try_join_all(
            inventory
                .iter()
                .map(|dc| vsphere.list_folders(&dc.moref)),
        )
        .await?;

        let mut pack = SuggestPack::default();

        for dc in &inventory {
            pack.datacenters.push(SuggestItem { id: dc.moref.clone(), name: dc.name.clone() });
            for ci in &dc.clusters {
                pack.clusters.push(SuggestItem {
                    id: ci.cluster.moref.clone(),
                    name: ci.cluster.name.clone(),
                });
                for ds in &ci.datastores {
                    pack.datastores.push(SuggestItem { id: ds.moref.clone(), name: ds.name.clone() });
                }
                for net in &ci.networks {
                    pack.networks.push(SuggestItem { id: net.moref.clone(), name: net.name.clone() });
                }
            }
        }

        for folders in folder_lists {
            for (id, name) in folders {
                pack.folders.push(SuggestItem { id, name });
            }
        }

        pack.os_list = os_profile::supported_os_list()
            .into_iter()
            .map(|name| SuggestItem { id: name.clone(), name })
            .collect();

        pack.tools = Tool::all()
            .iter()
            .map(|t| SuggestItem { id: t.as_str().to_string(), name: t.as_str().to_string() })
            .collect();

        pack.load_balancers = hosts
            .into_iter()
            .map(|h| SuggestItem { id: h.moref, name: format!("edge@{}", h.name) })
            .collect();

        Ok(pack)
    }
}
