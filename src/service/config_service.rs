use std::path::PathBuf;

use crate::config::ports::{Settings, SettingsPort};
use crate::error::Result;

// 設定服務，負責透過選定的適配器取得設定
pub struct SettingsService {
    settings_port: Box<dyn SettingsPort>,
}

impl SettingsService {
    pub fn new(settings_port: Box<dyn SettingsPort>) -> Self {
        SettingsService { settings_port }
    }

    pub fn get_settings(&self) -> Result<Settings> {
        let settings = self.settings_port.get_settings()?;
        log::debug!("已解析設定：{:?}", settings);
        Ok(settings)
    }
}

// 預設設定適配器：只有輸入路徑，其餘使用預設值
pub struct DefaultSettingsAdapter {
    input: PathBuf,
    interactive: bool,
}

impl DefaultSettingsAdapter {
    pub fn new(input: PathBuf, interactive: bool) -> Self {
        DefaultSettingsAdapter { input, interactive }
    }
}

impl SettingsPort for DefaultSettingsAdapter {
    fn get_settings(&self) -> Result<Settings> {
        Ok(Settings {
            interactive: self.interactive,
            ..Settings::new(self.input.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::excel::{ExcelReadMode, DEFAULT_PAGE_LIMIT};

    #[test]
    fn default_adapter_fills_defaults() {
        let service = SettingsService::new(Box::new(DefaultSettingsAdapter::new("data".into(), true)));
        let settings = service.get_settings().unwrap();
        assert_eq!(settings.input_path, PathBuf::from("data"));
        assert!(settings.interactive);
        assert!(settings.output_type.is_none());
        assert_eq!(settings.excel_types, ExcelReadMode::Auto);
        assert_eq!(settings.page_limit, DEFAULT_PAGE_LIMIT);
    }
}
