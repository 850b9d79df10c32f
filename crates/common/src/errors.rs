use thiserror::Error;

/// 统一错误类型
///
/// 所有组件边界都把底层 I/O 错误包装成这里的分类错误，不向上层泄露原始错误。
#[derive(Error, Debug)]
pub enum Error {
    #[error("规格无效: {0}")]
    InvalidSpec(String),

    #[error("需要认证: {0}")]
    AuthRequired(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("容量不足: {0}")]
    NoCapacity(String),

    #[error("虚拟化平台不可用: {0}")]
    HypervisorUnavailable(String),

    #[error("客户机不可达: {0}")]
    GuestUnreachable(String),

    #[error("凭据安装失败: {0}")]
    CredentialsInstallFailed(String),

    #[error("引导命令 #{command_index} 执行失败: {detail}")]
    BootstrapFailed { command_index: usize, detail: String },

    #[error("边缘代理不可用: {0}")]
    EdgeUnavailable(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// 错误分类的稳定标识，返回给调用方的 `error` 字段
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidSpec(_) => "InvalidSpec",
            Error::AuthRequired(_) => "AuthRequired",
            Error::NotFound(_) => "NotFound",
            Error::Conflict(_) => "Conflict",
            Error::NoCapacity(_) => "NoCapacity",
            Error::HypervisorUnavailable(_) => "HypervisorUnavailable",
            Error::GuestUnreachable(_) => "GuestUnreachable",
            Error::CredentialsInstallFailed(_) => "CredentialsInstallFailed",
            Error::BootstrapFailed { .. } => "BootstrapFailed",
            Error::EdgeUnavailable(_) => "EdgeUnavailable",
            Error::Timeout(_) => "Timeout",
            Error::Serialization(_) | Error::Internal(_) | Error::Other(_) => "Internal",
        }
    }

    /// 是否允许重试（只有 C6 凭据安装和 C8 边缘注册会重试）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::HypervisorUnavailable(_)
                | Error::EdgeUnavailable(_)
                | Error::CredentialsInstallFailed(_)
        )
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_stable() {
        assert_eq!(Error::NoCapacity("x".into()).kind(), "NoCapacity");
        assert_eq!(
            Error::BootstrapFailed { command_index: 2, detail: "x".into() }.kind(),
            "BootstrapFailed"
        );
        assert_eq!(Error::Internal("x".into()).kind(), "Internal");
    }

    #[test]
    fn test_retryable() {
        assert!(Error::EdgeUnavailable("连接失败".into()).is_retryable());
        assert!(!Error::Conflict("重复".into()).is_retryable());
    }
}
