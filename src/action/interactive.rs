use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};

use crate::config::ports::{ConversionPort, Settings, SettingsPort};
use crate::error::{ConvertError, Result};
use crate::models::conversion::ConversionOutput;
use crate::models::excel::ExcelReadMode;
use crate::models::format::CanonicalFormat;
use crate::service::config_service::{DefaultSettingsAdapter, SettingsService};
use crate::utils::convert::ConversionAdapter;
use crate::utils::utils::setup_logging;

pub fn process_interactive_mode() -> Result<ConversionOutput> {
    println!("=== 歡迎使用互動模式 ===");
    let _log_guard = setup_logging(&get_log_level_option()?)?;
    let input = get_input_path()?;
    let use_default_config = get_default_config_option()?;

    let settings_port: Box<dyn SettingsPort> = if use_default_config {
        println!("使用預設設定：輸出格式於轉換時詢問，輸出到輸入位置");
        Box::new(DefaultSettingsAdapter::new(input, true))
    } else {
        Box::new(InteractiveSettingsAdapter::new(input))
    };

    let settings = SettingsService::new(settings_port).get_settings()?;
    let conversion_port: Box<dyn ConversionPort> = Box::new(ConversionAdapter);
    let output = conversion_port.execute(settings.clone())?;
    println!("實際使用的設定：{:#?}", settings);
    Ok(output)
}

pub fn get_default_config_option() -> Result<bool> {
    Confirm::new()
        .with_prompt("是否使用預設設定？（僅需指定輸入路徑）")
        .default(true)
        .interact()
        .map_err(|e| ConvertError::Prompt(format!("預設設定選擇失敗: {}", e)))
}

pub fn get_input_path() -> Result<PathBuf> {
    Input::<String>::new()
        .with_prompt("請輸入檔案或目錄路徑（例如：./data.csv 或 ./data）")
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            if Path::new(input).exists() { Ok(()) } else { Err(format!("路徑 '{}' 不存在", input)) }
        })
        .interact_text()
        .map(PathBuf::from)
        .map_err(|e| ConvertError::Prompt(e.to_string()))
}

pub fn get_output_type() -> Result<Option<String>> {
    let mut items = vec!["轉換時再詢問".to_string()];
    items.extend(CanonicalFormat::ALL.iter().map(|f| f.id().to_string()));
    let selected = Select::new()
        .with_prompt("選擇輸出格式（使用方向鍵選擇，按 Enter 確認）")
        .items(&items)
        .default(0)
        .interact()
        .map_err(|e| ConvertError::Prompt(format!("輸出格式選擇失敗: {}", e)))?;
    Ok(CanonicalFormat::ALL.get(selected.wrapping_sub(1)).map(|f| f.id().to_string()))
}

pub fn get_output_path() -> Result<Option<PathBuf>> {
    let path: String = Input::new()
        .with_prompt("輸出檔案或目錄（留空則輸出到輸入位置）")
        .allow_empty(true)
        .interact_text()
        .map_err(|e| ConvertError::Prompt(e.to_string()))?;
    Ok(if path.trim().is_empty() { None } else { Some(PathBuf::from(path.trim())) })
}

pub fn get_excel_read_mode() -> Result<ExcelReadMode> {
    let modes = ["自動（依輸出格式決定）", "推斷欄位型別", "全部讀為文字"];
    let selected = Select::new()
        .with_prompt("Excel 讀取方式")
        .items(&modes)
        .default(0)
        .interact()
        .map_err(|e| ConvertError::Prompt(format!("Excel 讀取方式選擇失敗: {}", e)))?;
    Ok(match selected {
        1 => ExcelReadMode::Typed,
        2 => ExcelReadMode::Untyped,
        _ => ExcelReadMode::Auto,
    })
}

pub fn get_log_level_option() -> Result<String> {
    Ok("info".to_string())
}

// 互動設定適配器
pub struct InteractiveSettingsAdapter {
    input: PathBuf,
}

impl InteractiveSettingsAdapter {
    pub fn new(input: PathBuf) -> Self {
        InteractiveSettingsAdapter { input }
    }
}

impl SettingsPort for InteractiveSettingsAdapter {
    fn get_settings(&self) -> Result<Settings> {
        let output_type = get_output_type()?;
        let output_path = get_output_path()?;
        let excel_types = get_excel_read_mode()?;
        let log_level = get_log_level_option()?;

        Ok(Settings {
            output_type,
            output_path,
            excel_types,
            interactive: true,
            log_level,
            ..Settings::new(self.input.clone())
        })
    }
}
