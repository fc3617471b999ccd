use crate::models::ConnectionParams;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 应用配置
///
/// 加载顺序: 内置默认值 -> 可选 `followup.toml` -> `FOLLOWUP__*` 环境变量
/// (例如 `FOLLOWUP__BACKEND__BASE_URL=http://10.0.0.5:8000`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub workflow: WorkflowConfig,
    pub report: ReportConfig,
    /// 非交互运行时使用的 ERP 连接参数
    pub connection: Option<ConnectionParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// 请求超时; 未设置时不限制
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 本地持久化目录; 未设置时使用系统数据目录
    pub dir: Option<PathBuf>,
}

/// 工作流时序参数 (毫秒)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub progress_stage_ms: u64,
    pub connect_settle_ms: u64,
    pub refresh_settle_ms: u64,
    pub campaign_reset_ms: u64,
    pub success_notice_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: None,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            progress_stage_ms: 400,
            connect_settle_ms: 1000,
            refresh_settle_ms: 300,
            campaign_reset_ms: 3000,
            success_notice_ms: 5000,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
        }
    }
}

impl WorkflowConfig {
    /// 所有延时为零, 测试用
    pub fn immediate() -> Self {
        Self {
            progress_stage_ms: 0,
            connect_settle_ms: 0,
            refresh_settle_ms: 0,
            campaign_reset_ms: 0,
            success_notice_ms: 0,
        }
    }

    pub fn progress_stage(&self) -> Duration {
        Duration::from_millis(self.progress_stage_ms)
    }

    pub fn connect_settle(&self) -> Duration {
        Duration::from_millis(self.connect_settle_ms)
    }

    pub fn refresh_settle(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_ms)
    }

    pub fn campaign_reset(&self) -> Duration {
        Duration::from_millis(self.campaign_reset_ms)
    }

    pub fn success_notice(&self) -> Duration {
        Duration::from_millis(self.success_notice_ms)
    }
}

impl AppConfig {
    /// 从配置文件与环境变量加载配置
    pub fn load() -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::with_name("followup").required(false))
            .add_source(
                Environment::with_prefix("FOLLOWUP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 本地持久化目录
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .or_else(|| {
                directories::ProjectDirs::from("com", "followup", "invoice-followup")
                    .map(|dirs| dirs.data_dir().to_path_buf())
            })
            .unwrap_or_else(|| PathBuf::from(".followup"))
    }
}
