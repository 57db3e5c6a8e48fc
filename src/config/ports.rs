use std::path::PathBuf;

use crate::error::Result;
use crate::models::conversion::ConversionOutput;
use crate::models::excel::{ExcelReadMode, DEFAULT_PAGE_LIMIT};

// 解析後的執行設定，封裝所有參數
#[derive(Debug, Clone)]
pub struct Settings {
    pub input_path: PathBuf,
    pub input_type: Option<String>,
    pub output_type: Option<String>,
    pub output_path: Option<PathBuf>,
    pub sheet: Option<String>,
    pub range: Option<String>,
    pub delimiter: Option<String>,
    pub excel_types: ExcelReadMode,
    pub page_limit: u64,
    /// 是否允許互動詢問（stdin 為終端機且未指定 --no-prompt）
    pub interactive: bool,
    pub no_progress: bool,
    pub log_level: String,
}

impl Settings {
    pub fn new(input_path: PathBuf) -> Self {
        Settings {
            input_path,
            input_type: None,
            output_type: None,
            output_path: None,
            sheet: None,
            range: None,
            delimiter: None,
            excel_types: ExcelReadMode::Auto,
            page_limit: DEFAULT_PAGE_LIMIT,
            interactive: false,
            no_progress: false,
            log_level: "info".to_string(),
        }
    }
}

// 設定來源的 Port
pub trait SettingsPort {
    fn get_settings(&self) -> Result<Settings>;
}

// 轉換執行的 Port
pub trait ConversionPort {
    fn execute(&self, settings: Settings) -> Result<ConversionOutput>;
}
