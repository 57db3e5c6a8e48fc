use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

use crate::error::{ConvertError, Result};
use crate::models::excel::ExcelReadMode;

#[derive(Parser, Clone, Debug)]
#[command(
    name = "make_it_parquet",
    about = "在 CSV、TXT、TSV、JSON、Parquet 與 Excel 之間轉換檔案",
    long_about = "以內嵌的 DuckDB 引擎轉換表格檔案，可轉換單一檔案或整個目錄。\n目錄模式會找出數量最多的輸入格式，並將結果輸出到以輸出格式命名的子目錄。\n未提供任何參數時進入互動模式。使用 --show-config 預覽實際設定。"
)]
pub struct Cli {
    /// 要轉換的檔案或目錄
    pub input_path: String,
    /// 指定輸入格式（csv, txt, tsv, json, parquet|pq, excel|ex）
    #[arg(short = 'i', long = "input-type")]
    pub input_type: Option<String>,
    /// 輸出格式（csv, txt, tsv, json, parquet|pq, excel|ex）
    #[arg(short = 'o', long = "output-type")]
    pub output_type: Option<String>,
    /// 輸出檔案或目錄（也接受 -op）
    #[arg(long = "output-path")]
    pub output_path: Option<String>,
    /// Excel 工作表（索引或名稱）
    #[arg(short = 's', long)]
    pub sheet: Option<String>,
    /// Excel 儲存格範圍，例如 A2:E7
    #[arg(short = 'c', long)]
    pub range: Option<String>,
    /// TXT 分隔符號：t = tab，c = 逗號，其他字元照用
    #[arg(short = 'd', long)]
    pub delimiter: Option<String>,
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    pub log_level: String,
    /// 每個 Excel 輸出檔的最大列數
    #[arg(long)]
    pub page_limit: Option<u64>,
    #[arg(long, value_enum, default_value = "auto")]
    pub excel_types: ExcelTypes,
    #[arg(long, default_value_t = false)]
    pub no_prompt: bool,
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
    #[arg(long, default_value_t = false)]
    pub show_config: bool,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Debug)]
pub enum ExcelTypes {
    Auto,
    Typed,
    Untyped,
}

impl From<ExcelTypes> for ExcelReadMode {
    fn from(value: ExcelTypes) -> Self {
        match value {
            ExcelTypes::Auto => ExcelReadMode::Auto,
            ExcelTypes::Typed => ExcelReadMode::Typed,
            ExcelTypes::Untyped => ExcelReadMode::Untyped,
        }
    }
}

/// 舊版的 `-op` 不是合法的 clap 短參數，解析前改寫為 `--output-path`
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-op" {
                "--output-path".to_string()
            } else if let Some(value) = arg.strip_prefix("-op=") {
                format!("--output-path={}", value)
            } else {
                arg
            }
        })
        .collect()
}

pub fn validate_input_path(input: &str) -> Result<PathBuf> {
    let path = Path::new(input);
    if !path.exists() {
        log::error!("輸入路徑不存在：{}", input);
        return Err(ConvertError::InputPath(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

/// stdin 為終端機且未停用詢問時才允許互動
pub fn prompts_allowed(no_prompt: bool) -> bool {
    !no_prompt && std::io::stdin().is_terminal()
}
