/// 主机证书管理器
///
/// 把 CSR 提交给所选集群主机上的证书管理器换取签名叶证书。

use common::Result;
use serde::{Deserialize, Serialize};

use crate::client::VsphereClient;

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    csr_pem: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    certificate_pem: String,
}

impl VsphereClient {
    /// 提交 CSR，返回签名后的 PEM 叶证书
    pub async fn sign_csr(&self, host_ref: &str, csr_pem: &str) -> Result<String> {
        let body = SignRequest { csr_pem };
        let resp: SignResponse = self
            .post_json(
                &format!("/vcenter/host/{}/certificate-manager?action=sign", host_ref),
                &body,
                "签发证书",
            )
            .await?;
        Ok(resp.certificate_pem)
    }
}
