use std::path::Path;

use log::{debug, info, warn};

use crate::error::Result;
use crate::models::conversion::{ExportOutput, ImportOutput, WrittenFile};
use crate::models::format::CanonicalFormat;
use crate::models::task::TaskOptions;
use crate::service::engine::EngineGuard;
use crate::service::excel::{export_excel, import_excel};
use crate::utils::utils::{quote_identifier, quote_literal, random_suffix};

pub const TAB: &str = "\t";
pub const COMMA: &str = ",";

/// 每個格式的讀取方式，依標準格式代號靜態對應
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAdapter {
    Csv,
    Txt,
    Tsv,
    Json,
    Parquet,
    Excel,
}

/// 每個格式的寫出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAdapter {
    Csv,
    Txt,
    Tsv,
    Json,
    Parquet,
    Excel,
}

/// 產生不重複的暫存資料表名稱
pub fn staging_table_name() -> String {
    format!("tmp_conv_{}", random_suffix(8))
}

impl InputAdapter {
    pub fn for_format(format: CanonicalFormat) -> Self {
        match format {
            CanonicalFormat::Csv => InputAdapter::Csv,
            CanonicalFormat::Txt => InputAdapter::Txt,
            CanonicalFormat::Tsv => InputAdapter::Tsv,
            CanonicalFormat::Json => InputAdapter::Json,
            CanonicalFormat::Parquet => InputAdapter::Parquet,
            CanonicalFormat::Excel => InputAdapter::Excel,
        }
    }

    fn reader(&self, path: &Path) -> String {
        let literal = quote_literal(&path.to_string_lossy());
        match self {
            InputAdapter::Csv | InputAdapter::Txt => format!("read_csv({}, auto_detect = true)", literal),
            InputAdapter::Tsv => format!(
                "read_csv({}, delim = {}, header = true, auto_detect = true)",
                literal,
                quote_literal(TAB)
            ),
            InputAdapter::Json => format!("read_json_auto({})", literal),
            InputAdapter::Parquet => format!("read_parquet({})", literal),
            InputAdapter::Excel => String::new(),
        }
    }

    /// 將來源檔案匯入為引擎中的暫存資料表
    /// # 參數
    /// - guard: 已取得的引擎連線
    /// - path: 來源檔案
    /// - options: 任務選項（Excel 使用工作表、範圍與型別設定）
    /// # 回傳
    /// - 暫存資料表名稱與列數
    pub fn open(&self, guard: &mut EngineGuard<'_>, path: &Path, options: &TaskOptions) -> Result<ImportOutput> {
        let table_name = staging_table_name();
        if *self == InputAdapter::Excel {
            return import_excel(guard, path, &options.excel, &table_name);
        }

        let table = quote_identifier(&table_name);
        guard.execute(&format!("CREATE TEMP TABLE {} AS SELECT * FROM {}", table, self.reader(path)))?;
        let row_count = match guard.query_count(&format!("SELECT COUNT(*) FROM {}", table)) {
            Ok(count) => count,
            Err(e) => {
                drop_table(guard, &table_name);
                return Err(e);
            }
        };
        info!("已匯入 {}（{} 列）", path.display(), row_count);
        Ok(ImportOutput { table_name, row_count })
    }
}

impl OutputAdapter {
    pub fn for_format(format: CanonicalFormat) -> Self {
        match format {
            CanonicalFormat::Csv => OutputAdapter::Csv,
            CanonicalFormat::Txt => OutputAdapter::Txt,
            CanonicalFormat::Tsv => OutputAdapter::Tsv,
            CanonicalFormat::Json => OutputAdapter::Json,
            CanonicalFormat::Parquet => OutputAdapter::Parquet,
            CanonicalFormat::Excel => OutputAdapter::Excel,
        }
    }

    /// CSV 固定逗號、TSV 固定 tab，TXT 使用任務解析出的分隔符號（預設逗號）
    pub fn delimiter<'a>(&self, options: &'a TaskOptions) -> Option<&'a str> {
        match self {
            OutputAdapter::Csv => Some(COMMA),
            OutputAdapter::Tsv => Some(TAB),
            OutputAdapter::Txt => Some(options.delimiter.as_deref().unwrap_or(COMMA)),
            _ => None,
        }
    }

    fn copy_options(&self, options: &TaskOptions) -> String {
        match self {
            OutputAdapter::Json => "FORMAT json".to_string(),
            OutputAdapter::Parquet => "FORMAT parquet".to_string(),
            _ => format!(
                "FORMAT csv, HEADER true, DELIMITER {}",
                quote_literal(self.delimiter(options).unwrap_or(COMMA))
            ),
        }
    }

    /// 將暫存資料表寫出到目的地
    /// # 回傳
    /// - 實際寫出的檔案與列數；Excel 可能分頁成多個檔案
    pub fn write(
        &self,
        guard: &mut EngineGuard<'_>,
        import: &ImportOutput,
        destination: &Path,
        options: &TaskOptions,
    ) -> Result<ExportOutput> {
        if *self == OutputAdapter::Excel {
            return export_excel(guard, import, destination, options.excel.page_limit);
        }

        let statement = format!(
            "COPY (SELECT * FROM {} ORDER BY rowid) TO {} ({})",
            quote_identifier(&import.table_name),
            quote_literal(&destination.to_string_lossy()),
            self.copy_options(options)
        );
        guard.execute(&statement)?;
        info!("已匯出 {}（{} 列）", destination.display(), import.row_count);
        Ok(ExportOutput {
            files: vec![WrittenFile { path: destination.to_path_buf(), rows: import.row_count }],
        })
    }
}

/// 移除暫存資料表；失敗只記錄警告
pub fn drop_table(guard: &mut EngineGuard<'_>, table_name: &str) {
    let statement = format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name));
    match guard.execute(&statement) {
        Ok(()) => debug!("已移除暫存資料表 {}", table_name),
        Err(e) => warn!("移除暫存資料表 {} 失敗：{}", table_name, e),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::ConvertError;
    use crate::service::engine::testing::RecordingEngine;
    use crate::service::engine::EngineConnectionManager;

    #[test]
    fn txt_delimiter_defaults_to_comma() {
        let mut options = TaskOptions::default();
        assert_eq!(OutputAdapter::Txt.delimiter(&options), Some(","));
        options.delimiter = Some("|".into());
        assert_eq!(OutputAdapter::Txt.delimiter(&options), Some("|"));
        assert_eq!(OutputAdapter::Tsv.delimiter(&options), Some("\t"));
        assert_eq!(OutputAdapter::Csv.delimiter(&options), Some(","));
        assert_eq!(OutputAdapter::Parquet.delimiter(&options), None);
    }

    #[test]
    fn statements_use_format_specific_readers() {
        let engine = RecordingEngine::with_default_count(4);
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        let mut guard = manager.acquire().unwrap();
        let options = TaskOptions::default();

        let import = InputAdapter::Tsv.open(&mut guard, Path::new("/in/o'brien.tsv"), &options).unwrap();
        assert_eq!(import.row_count, 4);
        assert!(import.table_name.starts_with("tmp_conv_"));
        OutputAdapter::Parquet
            .write(&mut guard, &import, Path::new("/out/o'brien.parquet"), &options)
            .unwrap();
        drop_table(&mut guard, &import.table_name);

        let statements = engine.recorded();
        assert!(statements[0].contains("read_csv('/in/o''brien.tsv', delim = '\t'"));
        assert!(statements[1].starts_with("SELECT COUNT(*)"));
        assert!(statements[2].ends_with("TO '/out/o''brien.parquet' (FORMAT parquet)"));
        assert!(statements[2].contains("ORDER BY rowid"));
        assert!(statements[3].starts_with("DROP TABLE IF EXISTS"));
    }

    #[test]
    fn engine_errors_surface_as_engine_execution() {
        let engine = RecordingEngine::default();
        engine.fail_on("read_parquet");
        let manager = EngineConnectionManager::new(Box::new(engine));
        let mut guard = manager.acquire().unwrap();
        let err = InputAdapter::Parquet
            .open(&mut guard, Path::new("broken.parquet"), &TaskOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::EngineExecution { .. }));
    }

    #[test]
    fn failed_count_drops_the_created_table() {
        let engine = RecordingEngine::default();
        engine.fail_on("SELECT COUNT(*)");
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        let mut guard = manager.acquire().unwrap();
        let err = InputAdapter::Json
            .open(&mut guard, Path::new("rows.json"), &TaskOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::EngineExecution { .. }));

        let statements = engine.recorded();
        assert_eq!(statements.len(), 3);
        assert!(statements[2].starts_with("DROP TABLE IF EXISTS \"tmp_conv_"));
    }

    #[test]
    fn duckdb_csv_to_pipe_delimited_txt() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("people.csv");
        fs::write(&source, "name,age\nalice,30\nbob,41\ncarol,27\n").unwrap();
        let target = dir.path().join("people.txt");

        let manager = EngineConnectionManager::open_duckdb().unwrap();
        let options = TaskOptions { delimiter: Some("|".into()), ..Default::default() };
        let mut guard = manager.acquire().unwrap();
        let import = InputAdapter::Csv.open(&mut guard, &source, &options).unwrap();
        assert_eq!(import.row_count, 3);
        let export = OutputAdapter::Txt.write(&mut guard, &import, &target, &options).unwrap();
        assert_eq!(export.rows_written(), 3);
        drop_table(&mut guard, &import.table_name);

        let written = fs::read_to_string(&target).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "name|age");
        assert_eq!(lines[1], "alice|30");
        assert_eq!(lines.len(), 4);
    }
}
