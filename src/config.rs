use std::env;

use chrono::Locale;
use serde::Deserialize;

use crate::error::{Error, Result};

/// 应用配置
///
/// 加载顺序：默认值 → `SPACETRAVELLING_CONFIG` 指向的 TOML 文件 → 环境变量。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 监听地址
    pub listen: String,
    /// 首页每页文章数
    pub page_size: u32,
    /// 日期格式化使用的区域，如 `pt_BR`
    pub locale: String,
    pub prismic: PrismicConfig,
    pub revalidate: RevalidateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            page_size: 2,
            locale: "pt_BR".to_string(),
            prismic: PrismicConfig::default(),
            revalidate: RevalidateConfig::default(),
        }
    }
}

/// 内容服务连接配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrismicConfig {
    /// API 根地址，如 `https://<repo>.cdn.prismic.io/api/v2`
    pub endpoint: String,
    pub access_token: Option<String>,
}

/// 页面重新生成间隔（秒），体现为响应的缓存头
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevalidateConfig {
    pub listing_secs: u64,
    pub article_secs: u64,
}

impl Default for RevalidateConfig {
    fn default() -> Self {
        Self {
            listing_secs: 60,
            article_secs: 60 * 60,
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 使用给定的变量查找函数加载配置
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("SPACETRAVELLING_CONFIG") {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };

        if let Some(endpoint) = lookup("PRISMIC_API_ENDPOINT") {
            config.prismic.endpoint = endpoint;
        }
        if let Some(token) = lookup("PRISMIC_ACCESS_TOKEN") {
            config.prismic.access_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(listen) = lookup("SPACETRAVELLING_LISTEN") {
            config.listen = listen;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prismic.endpoint.trim().is_empty() {
            return Err(Error::Config("PRISMIC_API_ENDPOINT not set".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be positive".to_string()));
        }
        self.date_locale().map(|_| ())
    }

    /// 解析 [`Config::locale`]
    pub fn date_locale(&self) -> Result<Locale> {
        Locale::try_from(self.locale.as_str())
            .map_err(|_| Error::Config(format!("unknown locale: {}", self.locale)))
    }
}
