use std::sync::Arc;

use crate::{
    config::Config, error::Result, page::DateFormatter, prismic::ContentService,
    richtext::HtmlRenderer,
};

/// 应用程序上下文
///
/// [`AppState`] 封装了内容服务客户端、富文本渲染器和配置，提供统一访问入口。
pub struct AppState<S> {
    service: Arc<S>,
    renderer: HtmlRenderer,
    dates: DateFormatter,
    config: Arc<Config>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            renderer: self.renderer.clone(),
            dates: self.dates,
            config: self.config.clone(),
        }
    }
}

impl<S: ContentService> AppState<S> {
    /// 创建一个新的 [`AppState`] 实例
    ///
    /// 配置中的区域无法识别时返回错误。
    pub fn new(service: S, config: Config) -> Result<Self> {
        Ok(Self {
            service: Arc::new(service),
            renderer: HtmlRenderer::default(),
            dates: DateFormatter::new(config.date_locale()?),
            config: Arc::new(config),
        })
    }

    /// 获取内容服务
    pub fn service(&self) -> &S {
        &self.service
    }

    /// 获取富文本渲染器
    pub fn renderer(&self) -> &HtmlRenderer {
        &self.renderer
    }

    /// 获取日期格式化器
    pub fn dates(&self) -> &DateFormatter {
        &self.dates
    }

    /// 获取配置
    pub fn config(&self) -> &Config {
        &self.config
    }
}
