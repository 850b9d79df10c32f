/// 客户机引导执行器 (C7)
///
/// 对客户机 IP 建一条 SSH 会话（每次部署一条，互不共享），严格按序
/// 执行命令：首个非零退出码即停；退出码为零但 stderr 出现 error 字样
/// 的安装器同样按失败处理，返回失败命令下标。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::models::Tool;
use common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use russh::client;
use russh::ChannelMsg;
use tracing::{debug, info, warn};

use crate::services::credentials::GuestAuth;
use crate::services::os_profile::OsFamily;

/// 命令源能力接口：按发行版生成工具安装命令
///
/// 这是少数保留 trait 的接缝之一，因为 Linux 与 Windows 两套实现真实共存。
pub trait CommandSource {
    fn docker(&self) -> Vec<String>;
    fn docker_compose(&self) -> Vec<String>;
    fn podman(&self) -> Vec<String>;
    fn virtual_box(&self) -> Vec<String>;

    /// 按请求的工具列表展开完整命令序列，保持工具声明顺序
    fn commands_for(&self, tools: &[Tool]) -> Vec<String> {
        tools
            .iter()
            .flat_map(|tool| match tool {
                Tool::Docker => self.docker(),
                Tool::DockerCompose => self.docker_compose(),
                Tool::Podman => self.podman(),
                Tool::VirtualBox => self.virtual_box(),
            })
            .collect()
    }
}

/// Linux 发行版命令源 (apt)
pub struct LinuxCommandSource {
    docker_version: String,
}

impl LinuxCommandSource {
    pub fn new(docker_version: &str) -> Self {
        Self { docker_version: docker_version.to_string() }
    }
}

impl CommandSource for LinuxCommandSource {
    fn docker(&self) -> Vec<String> {
        vec![
            "apt-get update -y".to_string(),
            format!(
                "curl -fsSL https://get.docker.com | sh -s -- --version {}",
                self.docker_version
            ),
        ]
    }

    fn docker_compose(&self) -> Vec<String> {
        vec!["apt-get install -y docker-compose-plugin".to_string()]
    }

    fn podman(&self) -> Vec<String> {
        vec!["apt-get install -y podman".to_string()]
    }

    fn virtual_box(&self) -> Vec<String> {
        vec!["apt-get install -y virtualbox".to_string()]
    }
}

/// Windows 命令源 (chocolatey)
pub struct WindowsCommandSource;

impl CommandSource for WindowsCommandSource {
    fn docker(&self) -> Vec<String> {
        vec!["choco install docker-engine -y".to_string()]
    }

    fn docker_compose(&self) -> Vec<String> {
        vec!["choco install docker-compose -y".to_string()]
    }

    fn podman(&self) -> Vec<String> {
        vec!["choco install podman-cli -y".to_string()]
    }

    fn virtual_box(&self) -> Vec<String> {
        vec!["choco install virtualbox -y".to_string()]
    }
}

/// 按操作系统家族取命令源
pub fn command_source_for(
    family: OsFamily,
    docker_version: &str,
) -> Box<dyn CommandSource + Send + Sync> {
    match family {
        OsFamily::Linux => Box::new(LinuxCommandSource::new(docker_version)),
        OsFamily::Windows => Box::new(WindowsCommandSource),
    }
}

/// stderr 行匹配：大小写不敏感的独立单词 error
static STDERR_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\berror\b").expect("内建正则必然合法"));

/// 某些安装器退出码为零但在 stderr 里报错，这里按行识别
pub fn stderr_indicates_failure(stderr: &str) -> bool {
    stderr.lines().any(|line| STDERR_ERROR.is_match(line))
}

struct AcceptAllHandler;

#[async_trait]
impl client::Handler for AcceptAllHandler {
    type Error = russh::Error;

    // 客户机密钥在开机时才生成，无法预置指纹，只能接受
    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct GuestBootstrapExecutor {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl Default for GuestBootstrapExecutor {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(120),
        }
    }
}

impl GuestBootstrapExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 顺序执行命令，返回累计 stdout
    pub async fn execute(
        &self,
        vm_ip: &str,
        auth: &GuestAuth,
        commands: &[String],
    ) -> Result<String> {
        if commands.is_empty() {
            return Ok(String::new());
        }

        let mut session = self.open_session(vm_ip, auth).await?;
        let mut stdout_all = String::new();

        let mut outcome = Ok(());
        for (index, command) in commands.iter().enumerate() {
            debug!("虚拟机 {} 执行命令 #{}: {}", vm_ip, index, command);
            match self.run_command(&mut session, command).await {
                Ok(CommandOutput { stdout, stderr, exit_code }) => {
                    stdout_all.push_str(&stdout);
                    if exit_code != 0 {
                        outcome = Err(Error::BootstrapFailed {
                            command_index: index,
                            detail: format!("退出码 {}", exit_code),
                        });
                        break;
                    }
                    if stderr_indicates_failure(&stderr) {
                        outcome = Err(Error::BootstrapFailed {
                            command_index: index,
                            detail: "退出码为零但 stderr 含错误输出".to_string(),
                        });
                        break;
                    }
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        // 会话随部署作用域销毁
        let _ = session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await;

        match outcome {
            Ok(()) => {
                info!("虚拟机 {} 的 {} 条引导命令全部完成", vm_ip, commands.len());
                Ok(stdout_all)
            }
            Err(e) => {
                warn!("虚拟机 {} 引导失败: {}", vm_ip, e);
                Err(e)
            }
        }
    }

    async fn open_session(
        &self,
        vm_ip: &str,
        auth: &GuestAuth,
    ) -> Result<client::Handle<AcceptAllHandler>> {
        let config = Arc::new(client::Config::default());

        let mut session = tokio::time::timeout(
            self.connect_timeout,
            client::connect(config, (vm_ip, 22), AcceptAllHandler),
        )
        .await
        .map_err(|_| Error::Timeout(format!("连接客户机 {} 超时", vm_ip)))?
        .map_err(|e| Error::GuestUnreachable(format!("无法连接客户机 {}: {}", vm_ip, e)))?;

        let authed = match auth {
            GuestAuth::Password { username, password } => session
                .authenticate_password(username, password)
                .await
                .map_err(|e| Error::GuestUnreachable(format!("口令认证出错: {}", e)))?,
            GuestAuth::PrivateKey { pem } => {
                let key = russh_keys::decode_secret_key(pem, None)
                    .map_err(|e| Error::Internal(format!("解析私钥失败: {}", e)))?;
                session
                    .authenticate_publickey("root", Arc::new(key))
                    .await
                    .map_err(|e| Error::GuestUnreachable(format!("密钥认证出错: {}", e)))?
            }
        };

        if !authed {
            return Err(Error::GuestUnreachable(format!("客户机 {} 拒绝了认证", vm_ip)));
        }
        Ok(session)
    }

    async fn run_command(
        &self,
        session: &mut client::Handle<AcceptAllHandler>,
        command: &str,
    ) -> Result<CommandOutput> {
        let fut = async {
            let mut channel = session
                .channel_open_session()
                .await
                .map_err(|e| Error::GuestUnreachable(format!("打开通道失败: {}", e)))?;
            channel
                .exec(true, command)
                .await
                .map_err(|e| Error::GuestUnreachable(format!("下发命令失败: {}", e)))?;

            let mut stdout = String::new();
            let mut stderr = String::new();
            let mut exit_code: u32 = 0;

            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => {
                        stdout.push_str(&String::from_utf8_lossy(data));
                    }
                    // ext == 1 是 SSH 协议的 stderr 流
                    ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                        stderr.push_str(&String::from_utf8_lossy(data));
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        exit_code = exit_status;
                    }
                    _ => {}
                }
            }

            Ok(CommandOutput { stdout, stderr, exit_code })
        };

        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("命令执行超过 {:?}", self.command_timeout)))?
    }
}

struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_error_word_detected() {
        assert!(stderr_indicates_failure("E: Error fetching package"));
        assert!(stderr_indicates_failure("error: unmet dependencies"));
        assert!(stderr_indicates_failure("line1 ok\nERROR something\nline3"));
    }

    #[test]
    fn test_stderr_error_requires_word_boundary() {
        // errors / terror 不是独立的 error 单词
        assert!(!stderr_indicates_failure("0 errors found"));
        assert!(!stderr_indicates_failure("terrorform applied"));
        assert!(!stderr_indicates_failure("downloading packages..."));
        assert!(!stderr_indicates_failure(""));
    }

    #[test]
    fn test_linux_docker_commands_carry_version() {
        let source = LinuxCommandSource::new("24.0.7");
        let cmds = source.docker();
        assert!(cmds.iter().any(|c| c.contains("24.0.7")));
        assert_eq!(cmds[0], "apt-get update -y");
    }

    #[test]
    fn test_commands_for_preserves_tool_order() {
        let source = LinuxCommandSource::new("24.0.7");
        let cmds = source.commands_for(&[Tool::Podman, Tool::Docker]);
        // Podman 在前，Docker 的命令随后
        assert!(cmds[0].contains("podman"));
        assert!(cmds.last().map(|c| c.contains("docker.com")).unwrap_or(false));
    }

    #[test]
    fn test_windows_source_uses_chocolatey() {
        let source = WindowsCommandSource;
        for cmds in [source.docker(), source.docker_compose(), source.podman(), source.virtual_box()] {
            assert!(cmds.iter().all(|c| c.starts_with("choco install")));
        }
    }

    #[test]
    fn test_command_source_dispatch_by_family() {
        let linux = command_source_for(OsFamily::Linux, "24.0.7");
        assert!(linux.docker().iter().any(|c| c.contains("docker.com")));

        let windows = command_source_for(OsFamily::Windows, "24.0.7");
        assert!(windows.docker()[0].starts_with("choco"));
    }
}
