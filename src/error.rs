use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 轉換流程中所有可能的錯誤
#[derive(Error, Debug)]
pub enum ConvertError {
    /// 目標路徑不存在，或既不是檔案也不是目錄
    #[error("輸入路徑無效：{}", .0.display())]
    InputPath(PathBuf),

    /// 無法由副檔名判斷格式，且未指定 -i/-o
    #[error("無法辨識的檔案格式：{0}")]
    UnknownFormat(String),

    /// 格式代號格式錯誤或不受支援
    #[error("不支援的轉換格式：{0}")]
    UnsupportedConversion(String),

    /// Excel 工作表或範圍無效
    #[error("Excel 選項錯誤：{0}")]
    ExcelOption(String),

    /// TXT 分隔符號必須是單一字元
    #[error("無效的分隔符號：{0}")]
    InvalidDelimiter(String),

    /// 引擎擴充功能無法載入
    #[error("無法載入引擎擴充功能 '{extension}'：{reason}")]
    ExtensionLoad { extension: String, reason: String },

    /// 引擎執行語句失敗，保留原生錯誤
    #[error("引擎執行失敗（{statement}）：{source}")]
    EngineExecution {
        statement: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 引擎連線已被佔用或已關閉
    #[error("引擎連線無法取得：{0}")]
    EngineUnavailable(String),

    #[error("無法建立輸出目錄 {}：{source}", .path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 互動輸入失敗，或在非互動模式下需要輸入
    #[error("使用者輸入失敗：{0}")]
    Prompt(String),

    #[error("目錄 {} 中沒有可轉換的檔案", .0.display())]
    NoConvertibleFiles(PathBuf),

    #[error("無效的任務狀態轉換：{from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("I/O 錯誤：{0}")]
    Io(#[from] io::Error),
}

impl ConvertError {
    pub fn engine<E>(statement: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ConvertError::EngineExecution {
            statement: statement.into(),
            source: Box::new(source),
        }
    }

    /// 目錄模式下會中止整批轉換的錯誤
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            ConvertError::EngineUnavailable(_)
                | ConvertError::OutputDirectory { .. }
                | ConvertError::Prompt(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
