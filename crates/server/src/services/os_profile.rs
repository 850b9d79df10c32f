/// 客户机操作系统档案 (C2)
///
/// 两张封闭注册表把 (名称, 位数) 映射到平台 guest-OS 标识与默认定制档案。
/// 表外组合一律拒绝。

use common::{Error, Result};
use vsphere::types::IdentityCustomization;

/// 操作系统家族，决定引导命令源与身份定制方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Windows,
}

/// 解析后的操作系统档案
#[derive(Debug, Clone)]
pub struct OsProfile {
    pub guest_id: &'static str,
    pub family: OsFamily,
}

impl OsProfile {
    /// 家族对应的默认身份定制
    pub fn identity(&self) -> IdentityCustomization {
        match self.family {
            OsFamily::Linux => IdentityCustomization::LinuxIdentity,
            // sysprep 固定参数：保留账号、不改 SID、定制后重启
            OsFamily::Windows => IdentityCustomization::WindowsSysprep {
                delete_accounts: false,
                change_sid: false,
                reboot: true,
            },
        }
    }
}

/// Linux 发行版注册表：(名称, 位数, guest-OS 标识)
static LINUX_DISTROS: &[(&str, u8, &str)] = &[
    ("ubuntu", 64, "ubuntu64Guest"),
    ("ubuntu", 32, "ubuntuGuest"),
    ("debian", 64, "debian10_64Guest"),
    ("debian", 32, "debian10Guest"),
    ("centos", 64, "centos7_64Guest"),
    ("centos", 32, "centos7Guest"),
    ("rhel", 64, "rhel7_64Guest"),
];

/// Windows 注册表
static WINDOWS_DISTROS: &[(&str, u8, &str)] = &[
    ("windows-server-2019", 64, "windows2019srv_64Guest"),
    ("windows-server-2016", 64, "windows9Server64Guest"),
    ("windows-10", 64, "windows9_64Guest"),
    ("windows-10", 32, "windows9Guest"),
];

/// 查询操作系统档案；未注册的组合返回 `InvalidSpec`
pub fn lookup(name: &str, bitness: u8) -> Result<OsProfile> {
    let find = |table: &'static [(&'static str, u8, &'static str)]| {
        table
            .iter()
            .find(|(n, b, _)| *n == name && *b == bitness)
            .map(|(_, _, guest_id)| *guest_id)
    };

    if let Some(guest_id) = find(LINUX_DISTROS) {
        return Ok(OsProfile { guest_id, family: OsFamily::Linux });
    }
    if let Some(guest_id) = find(WINDOWS_DISTROS) {
        return Ok(OsProfile { guest_id, family: OsFamily::Windows });
    }
    Err(Error::InvalidSpec(format!("不支持的操作系统: {} ({} 位)", name, bitness)))
}

/// 全部受支持的 (名称, 位数) 组合，供建议接口使用
pub fn supported_os_list() -> Vec<String> {
    let mut list: Vec<String> = LINUX_DISTROS
        .iter()
        .chain(WINDOWS_DISTROS)
        .map(|(name, bits, _)| format!("{}-{}", name, bits))
        .collect();
    list.sort();
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_total_over_supported_pairs() {
        // 注册表内的每个组合都必须可解析
        for (name, bits, guest_id) in LINUX_DISTROS {
            let profile = lookup(name, *bits).unwrap();
            assert_eq!(profile.family, OsFamily::Linux);
            assert_eq!(profile.guest_id, *guest_id);
        }
        for (name, bits, guest_id) in WINDOWS_DISTROS {
            let profile = lookup(name, *bits).unwrap();
            assert_eq!(profile.family, OsFamily::Windows);
            assert_eq!(profile.guest_id, *guest_id);
        }
    }

    #[test]
    fn test_unknown_combinations_rejected() {
        assert!(lookup("ubuntu", 16).is_err());
        assert!(lookup("rhel", 32).is_err());
        assert!(lookup("slackware", 64).is_err());
        assert!(lookup("", 64).is_err());
    }

    #[test]
    fn test_windows_sysprep_defaults() {
        let profile = lookup("windows-server-2019", 64).unwrap();
        match profile.identity() {
            IdentityCustomization::WindowsSysprep { delete_accounts, change_sid, reboot } => {
                assert!(!delete_accounts);
                assert!(!change_sid);
                assert!(reboot);
            }
            other => panic!("意外的身份定制: {:?}", other),
        }
    }

    #[test]
    fn test_linux_identity() {
        let profile = lookup("ubuntu", 64).unwrap();
        assert_eq!(profile.guest_id, "ubuntu64Guest");
        assert_eq!(profile.identity(), IdentityCustomization::LinuxIdentity);
    }

    #[test]
    fn test_supported_os_list_sorted_and_complete() {
        let list = supported_os_list();
        assert_eq!(list.len(), LINUX_DISTROS.len() + WINDOWS_DISTROS.len());
        assert!(list.contains(&"ubuntu-64".to_string()));
        assert!(list.windows(2).all(|w| w[0] <= w[1]));
    }
}
