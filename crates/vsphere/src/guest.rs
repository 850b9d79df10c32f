/// 客户机操作通道
///
/// 经由客户机工具在来宾系统内执行受限操作：设置 root 口令、写入证书文件。
/// 这些调用要求虚拟机已开机且客户机工具在运行。

use common::Result;
use serde::Serialize;

use crate::client::VsphereClient;

#[derive(Debug, Serialize)]
struct SetPasswordRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct WriteFileRequest<'a> {
    path: &'a str,
    contents: &'a str,
    /// 八进制权限位，证书与密钥一律 0600
    mode: &'a str,
}

impl VsphereClient {
    /// 设置来宾系统账号口令
    pub async fn guest_set_password(&self, vm_ref: &str, username: &str, password: &str) -> Result<()> {
        let body = SetPasswordRequest { username, password };
        self.post_json::<_, serde_json::Value>(
            &format!("/vcenter/vm/{}/guest/credentials?action=set", vm_ref),
            &body,
            "设置客户机口令",
        )
        .await?;
        Ok(())
    }

    /// 向来宾系统写入文件（证书安装）
    pub async fn guest_write_file(&self, vm_ref: &str, path: &str, contents: &str) -> Result<()> {
        let body = WriteFileRequest { path, contents, mode: "0600" };
        self.post_json::<_, serde_json::Value>(
            &format!("/vcenter/vm/{}/guest/filesystem/files?action=create", vm_ref),
            &body,
            "写入客户机文件",
        )
        .await?;
        Ok(())
    }

    /// 清除已安装的客户机凭据（补偿路径使用；虚拟机随后会被销毁，
    /// 失败只影响审计完整性）
    pub async fn guest_clear_credentials(&self, vm_ref: &str) -> Result<()> {
        self.post_action(
            &format!("/vcenter/vm/{}/guest/credentials?action=clear", vm_ref),
            "清除客户机凭据",
        )
        .await
    }
}
