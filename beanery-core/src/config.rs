use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::Result;

/// 环境变量：eager Bean 的构造运行级别
pub const EAGER_RUNLEVEL_ENV: &str = "BEANS_EAGER_RUNLEVEL";

/// 环境变量：未指定运行级别的初始化器使用的默认运行级别
pub const DEFAULT_RUNLEVEL_ENV: &str = "BEANS_DEFAULT_RUNLEVEL";

/// 启动配置
///
/// 可以写在应用配置文件的 `[beans]` 表中：
///
/// ```toml
/// [beans]
/// eager-bean-construct-runlevel = 2
/// initializer-default-runlevel = 1
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BeanManagerConfig {
    /// eager Bean 在哪个运行级别构造
    ///
    /// 未设置时为已注册初始化器的最高运行级别加一
    pub eager_bean_construct_runlevel: Option<u32>,

    /// 未指定运行级别的初始化器使用的运行级别（默认：0）
    pub initializer_default_runlevel: Option<u32>,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    beans: BeanManagerConfig,
}

impl BeanManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 eager Bean 的构造运行级别
    pub fn eager_bean_construct_runlevel(mut self, runlevel: u32) -> Self {
        self.eager_bean_construct_runlevel = Some(runlevel);
        self
    }

    /// 设置初始化器的默认运行级别
    pub fn initializer_default_runlevel(mut self, runlevel: u32) -> Self {
        self.initializer_default_runlevel = Some(runlevel);
        self
    }

    /// 从 TOML 字符串解析（读取 `[beans]` 表）
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).context("Failed to parse bean manager config")?;
        Ok(file.beans)
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&content)
    }

    /// 用环境变量覆盖配置
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| -> Option<u32> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(runlevel) => Some(runlevel),
                Err(e) => {
                    tracing::warn!("Ignoring invalid runlevel '{}' in {}: {}", raw, key, e);
                    None
                }
            }
        };

        if let Some(runlevel) = parse(EAGER_RUNLEVEL_ENV) {
            self.eager_bean_construct_runlevel = Some(runlevel);
        }
        if let Some(runlevel) = parse(DEFAULT_RUNLEVEL_ENV) {
            self.initializer_default_runlevel = Some(runlevel);
        }
        self
    }

    pub(crate) fn default_runlevel(&self) -> u32 {
        self.initializer_default_runlevel.unwrap_or(0)
    }
}
