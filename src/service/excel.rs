//! Excel 專用邏輯：工作表與範圍解析、有型別/無型別匯入、分頁匯出。

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{info, warn};
use regex::Regex;
use zip::ZipArchive;

use crate::error::{ConvertError, Result};
use crate::models::conversion::{ExportOutput, ImportOutput, WrittenFile};
use crate::models::excel::{CellRange, ExcelOptions, ExcelReadMode, SheetSelector};
use crate::models::format::CanonicalFormat;
use crate::service::adapters::drop_table;
use crate::service::engine::EngineGuard;
use crate::utils::file::unique_path;
use crate::utils::utils::{quote_identifier, quote_literal, random_suffix};

pub const EXCEL_EXTENSION: &str = "excel";
/// 推斷型別時取樣的列數
pub const TYPE_SAMPLE_ROWS: u64 = 1000;

fn range_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"^([A-Z]{1,3})([1-9][0-9]*):([A-Z]{1,3})([1-9][0-9]*)$")
        .map_err(|e| ConvertError::ExcelOption(format!("範圍格式無法編譯：{}", e)))?;
    Ok(PATTERN.get_or_init(|| pattern))
}

fn column_number(letters: &str) -> u32 {
    letters
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + u32::from(b - b'A' + 1))
}

/// 解析 A1 格式的範圍，例如 `a2:e7` 會正規化為 `A2:E7`
pub fn parse_range(text: &str) -> Result<CellRange> {
    let normalized = text.trim().to_ascii_uppercase();
    let captures = range_pattern()?
        .captures(&normalized)
        .ok_or_else(|| ConvertError::ExcelOption(format!("無效的儲存格範圍：{}", text)))?;
    let parse_row = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| ConvertError::ExcelOption(format!("無效的列號：{}", s)))
    };
    let start_column = column_number(&captures[1]);
    let start_row = parse_row(&captures[2])?;
    let end_column = column_number(&captures[3]);
    let end_row = parse_row(&captures[4])?;
    if start_column > end_column || start_row > end_row {
        return Err(ConvertError::ExcelOption(format!(
            "範圍起點必須位於終點的左上方：{}",
            text
        )));
    }
    Ok(CellRange::new(start_column, start_row, end_column, end_row, normalized))
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => entity.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// 單次掃描還原 XML 實體，包含 `&#39;` 與 `&#x4E2D;` 這類字元參照
fn unescape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// 從活頁簿的 `xl/workbook.xml` 讀出工作表名稱（依順序）
pub fn read_sheet_names(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| ConvertError::ExcelOption(format!("無法讀取活頁簿 {}：{}", path.display(), e)))?;
    let mut xml = String::new();
    archive
        .by_name("xl/workbook.xml")
        .map_err(|e| ConvertError::ExcelOption(format!("活頁簿缺少 workbook.xml：{}", e)))?
        .read_to_string(&mut xml)?;

    // <sheet name="Sheet1" sheetId="1" r:id="rId1"/>
    let mut names = Vec::new();
    let mut pos = 0;
    while let Some(start) = xml[pos..].find("<sheet ") {
        let start = pos + start;
        let Some(end) = xml[start..].find('>') else { break };
        let end = start + end + 1;
        let tag = &xml[start..end];
        if let Some(name_start) = tag.find("name=\"") {
            let name_start = name_start + 6;
            if let Some(name_end) = tag[name_start..].find('"') {
                names.push(unescape_xml(&tag[name_start..name_start + name_end]));
            }
        }
        pos = end;
    }
    Ok(names)
}

/// 將工作表選擇器解析為實際存在的工作表名稱
pub fn resolve_sheet(path: &Path, selector: &SheetSelector) -> Result<String> {
    let names = read_sheet_names(path)?;
    match selector {
        SheetSelector::Index(index) => {
            if *index == 0 || *index > names.len() {
                return Err(ConvertError::ExcelOption(format!(
                    "工作表索引 {} 超出範圍（共 {} 個工作表）",
                    index,
                    names.len()
                )));
            }
            Ok(names[index - 1].clone())
        }
        SheetSelector::Name(name) => names
            .iter()
            .find(|n| *n == name)
            .cloned()
            .ok_or_else(|| {
                ConvertError::ExcelOption(format!("找不到工作表 '{}'，可用：{:?}", name, names))
            }),
    }
}

/// 決定 Excel 匯入策略；`true` 代表有型別
pub fn use_typed_import(mode: ExcelReadMode, known_output: Option<CanonicalFormat>) -> bool {
    match mode {
        ExcelReadMode::Typed => true,
        ExcelReadMode::Untyped => false,
        ExcelReadMode::Auto => !known_output.is_some_and(|f| f.is_delimited_text()),
    }
}

fn read_xlsx_expression(path: &Path, sheet: Option<&str>, range: Option<&CellRange>, all_varchar: bool) -> String {
    let mut expression = format!(
        "read_xlsx({}, header = true",
        quote_literal(&path.to_string_lossy())
    );
    if let Some(sheet) = sheet {
        expression.push_str(&format!(", sheet = {}", quote_literal(sheet)));
    }
    if let Some(range) = range {
        expression.push_str(&format!(", range = {}", quote_literal(range.as_str())));
    }
    if all_varchar {
        expression.push_str(", all_varchar = true");
    }
    expression.push(')');
    expression
}

/// 匯入 Excel 工作表到暫存資料表
pub fn import_excel(
    guard: &mut EngineGuard<'_>,
    path: &Path,
    options: &ExcelOptions,
    table_name: &str,
) -> Result<ImportOutput> {
    guard.ensure_extension(EXCEL_EXTENSION)?;
    let sheet = options
        .sheet
        .as_ref()
        .map(|selector| resolve_sheet(path, selector))
        .transpose()?;
    let table = quote_identifier(table_name);
    let source = read_xlsx_expression(path, sheet.as_deref(), options.range.as_ref(), true);

    let loaded = (|| -> Result<u64> {
        if options.typed {
            let sample = tempfile::Builder::new()
                .prefix("mip_sample_")
                .suffix(".csv")
                .tempfile()?;
            let (_, sample_path) = sample.keep().map_err(|e| ConvertError::Io(e.error))?;
            guard.register_temp_file(sample_path.clone());
            let sample_literal = quote_literal(&sample_path.to_string_lossy());

            guard.execute(&format!(
                "COPY (SELECT * FROM {} LIMIT {}) TO {} (FORMAT csv, HEADER true)",
                source, TYPE_SAMPLE_ROWS, sample_literal
            ))?;
            guard.execute(&format!(
                "CREATE TEMP TABLE {} AS SELECT * FROM read_csv({}, header = true, auto_detect = true) LIMIT 0",
                table, sample_literal
            ))?;
            guard.execute(&format!("INSERT INTO {} SELECT * FROM {}", table, source))?;
        } else {
            guard.execute(&format!("CREATE TEMP TABLE {} AS SELECT * FROM {}", table, source))?;
        }
        guard.query_count(&format!("SELECT COUNT(*) FROM {}", table))
    })();
    // 建表後任一步失敗都要移除半成品
    let row_count = match loaded {
        Ok(count) => count,
        Err(e) => {
            drop_table(guard, table_name);
            return Err(e);
        }
    };

    info!(
        "已匯入 Excel {}（{}，{} 列）",
        path.display(),
        if options.typed { "推斷型別" } else { "全部為文字" },
        row_count
    );
    Ok(ImportOutput { table_name: table_name.to_string(), row_count })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    /// 從 1 開始；單一檔案時為 `None`
    pub number: Option<u64>,
    pub offset: u64,
    pub rows: u64,
}

/// 依每檔列數上限切分：共 ceil(N/L) 個檔案，總列數恰為 N
pub fn plan_pages(total_rows: u64, page_limit: u64) -> Result<Vec<PageSpec>> {
    if page_limit == 0 {
        return Err(ConvertError::ExcelOption("每檔列數上限必須大於 0".to_string()));
    }
    if total_rows <= page_limit {
        return Ok(vec![PageSpec { number: None, offset: 0, rows: total_rows }]);
    }
    let pages = total_rows.div_ceil(page_limit);
    Ok((0..pages)
        .map(|page| {
            let offset = page * page_limit;
            PageSpec {
                number: Some(page + 1),
                offset,
                rows: page_limit.min(total_rows - offset),
            }
        })
        .collect())
}

fn page_path(destination: &Path, number: Option<u64>) -> PathBuf {
    match number {
        None => destination.to_path_buf(),
        Some(number) => {
            let stem = destination
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "output".to_string());
            let extension = destination
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "xlsx".to_string());
            let parent = destination.parent().unwrap_or_else(|| Path::new(""));
            unique_path(parent.join(format!("{}_{}.{}", stem, number, extension)))
        }
    }
}

/// 將暫存資料表匯出為一或多個 xlsx 檔案
pub fn export_excel(
    guard: &mut EngineGuard<'_>,
    import: &ImportOutput,
    destination: &Path,
    page_limit: u64,
) -> Result<ExportOutput> {
    guard.ensure_extension(EXCEL_EXTENSION)?;
    let pages = plan_pages(import.row_count, page_limit)?;
    if pages.len() > 1 {
        info!(
            "Excel 匯出：{} 列超過上限 {}，分割為 {} 個檔案",
            import.row_count,
            page_limit,
            pages.len()
        );
    }

    let table = quote_identifier(&import.table_name);
    let mut output = ExportOutput::default();
    for page in pages {
        let window = format!(
            "SELECT * FROM {} ORDER BY rowid LIMIT {} OFFSET {}",
            table, page_limit, page.offset
        );
        let rows = guard.query_count(&format!("SELECT COUNT(*) FROM ({}) AS page", window))?;
        if rows > page_limit {
            return Err(ConvertError::ExcelOption(format!(
                "第 {:?} 頁列數 {} 超過上限 {}",
                page.number, rows, page_limit
            )));
        }
        if rows != page.rows {
            warn!("第 {:?} 頁預期 {} 列，實際 {} 列", page.number, page.rows, rows);
        }

        let final_path = page_path(destination, page.number);
        let parent = final_path.parent().unwrap_or_else(|| Path::new(""));
        let staging = parent.join(format!(".mip_{}.part.xlsx", random_suffix(8)));
        guard.register_temp_file(staging.clone());
        guard.execute(&format!(
            "COPY ({}) TO {} (FORMAT xlsx, HEADER true)",
            window,
            quote_literal(&staging.to_string_lossy())
        ))?;
        std::fs::rename(&staging, &final_path)?;
        info!("已匯出 {}（{} 列，起始 {}）", final_path.display(), rows, page.offset);
        output.files.push(WrittenFile { path: final_path, rows });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::service::engine::testing::RecordingEngine;
    use crate::service::engine::EngineConnectionManager;

    fn write_workbook(path: &Path, sheets: &[&str]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/workbook.xml", options).unwrap();
        let mut xml = String::from("<workbook><sheets>");
        for (i, name) in sheets.iter().enumerate() {
            xml.push_str(&format!("<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>", name, i + 1, i + 1));
        }
        xml.push_str("</sheets></workbook>");
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn range_parsing_normalizes_and_validates() {
        let range = parse_range("a2:e7").unwrap();
        assert_eq!(range.as_str(), "A2:E7");
        assert_eq!((range.start_column, range.start_row, range.end_column, range.end_row), (1, 2, 5, 7));
        assert_eq!(parse_range("AA1:AB3").unwrap().end_column, 28);
        for bad in ["A0:B2", "E7:A2", "A2", "A2:B", "2A:3B", "A1:ZZZZ2"] {
            assert!(matches!(parse_range(bad), Err(ConvertError::ExcelOption(_))), "{}", bad);
        }
    }

    #[test]
    fn sheets_resolve_by_index_or_name() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("book.xlsx");
        write_workbook(&book, &["Summary", "R&amp;D"]);

        assert_eq!(read_sheet_names(&book).unwrap(), vec!["Summary", "R&D"]);
        assert_eq!(resolve_sheet(&book, &SheetSelector::Index(2)).unwrap(), "R&D");
        assert_eq!(resolve_sheet(&book, &SheetSelector::Name("Summary".into())).unwrap(), "Summary");
        for bad in [SheetSelector::Index(0), SheetSelector::Index(3), SheetSelector::Name("Missing".into())] {
            assert!(matches!(resolve_sheet(&book, &bad), Err(ConvertError::ExcelOption(_))));
        }
    }

    #[test]
    fn sheet_names_decode_character_references() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("refs.xlsx");
        write_workbook(&book, &["O&#39;Brien", "&#x4E2D;&#25991;", "a &amp;#39; b"]);

        assert_eq!(read_sheet_names(&book).unwrap(), vec!["O'Brien", "中文", "a &#39; b"]);
        assert_eq!(resolve_sheet(&book, &SheetSelector::Name("O'Brien".into())).unwrap(), "O'Brien");
        assert_eq!(resolve_sheet(&book, &SheetSelector::Name("中文".into())).unwrap(), "中文");
    }

    #[test]
    fn not_a_workbook_is_an_option_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.xlsx");
        std::fs::write(&bogus, "plain text").unwrap();
        assert!(matches!(read_sheet_names(&bogus), Err(ConvertError::ExcelOption(_))));
    }

    #[test]
    fn typed_selection_follows_output_format() {
        assert!(!use_typed_import(ExcelReadMode::Auto, Some(CanonicalFormat::Csv)));
        assert!(!use_typed_import(ExcelReadMode::Auto, Some(CanonicalFormat::Txt)));
        assert!(use_typed_import(ExcelReadMode::Auto, Some(CanonicalFormat::Parquet)));
        assert!(use_typed_import(ExcelReadMode::Auto, None));
        assert!(use_typed_import(ExcelReadMode::Typed, Some(CanonicalFormat::Tsv)));
        assert!(!use_typed_import(ExcelReadMode::Untyped, Some(CanonicalFormat::Json)));
    }

    #[test]
    fn pagination_plan_for_250k_rows() {
        let pages = plan_pages(250_000, 100_000).unwrap();
        let rows: Vec<u64> = pages.iter().map(|p| p.rows).collect();
        assert_eq!(rows, vec![100_000, 100_000, 50_000]);
        assert_eq!(rows.iter().sum::<u64>(), 250_000);
        let numbers: Vec<Option<u64>> = pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(pages[2].offset, 200_000);
    }

    #[test]
    fn pagination_single_page_has_no_number() {
        assert_eq!(plan_pages(100_000, 100_000).unwrap(), vec![PageSpec { number: None, offset: 0, rows: 100_000 }]);
        assert_eq!(plan_pages(0, 10).unwrap().len(), 1);
        assert!(plan_pages(5, 0).is_err());
    }

    #[test]
    fn paginated_export_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine { touch_copy_targets: true, ..Default::default() };
        {
            let mut counts = engine.counts.lock().unwrap();
            counts.insert("OFFSET 0)".into(), 100_000);
            counts.insert("OFFSET 100000)".into(), 100_000);
            counts.insert("OFFSET 200000)".into(), 50_000);
        }
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        let import = ImportOutput { table_name: "tmp_conv_x".into(), row_count: 250_000 };

        let destination = dir.path().join("big.xlsx");
        let output = {
            let mut guard = manager.acquire().unwrap();
            export_excel(&mut guard, &import, &destination, 100_000).unwrap()
        };
        let names: Vec<String> = output
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["big_1.xlsx", "big_2.xlsx", "big_3.xlsx"]);
        assert!(output.files.iter().all(|f| f.path.exists()));
        let rows: Vec<u64> = output.files.iter().map(|f| f.rows).collect();
        assert_eq!(rows, vec![100_000, 100_000, 50_000]);
        assert_eq!(output.rows_written(), 250_000);
        assert!(!destination.exists());

        let copies = engine.recorded().iter().filter(|s| s.starts_with("COPY")).count();
        assert_eq!(copies, 3);
        // 暫存檔都已改名，關閉時不會留下 staging 檔
        manager.shutdown().unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".mip_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn small_export_keeps_plain_name() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine { touch_copy_targets: true, default_count: 42, ..Default::default() };
        let manager = EngineConnectionManager::new(Box::new(engine));
        let import = ImportOutput { table_name: "tmp_conv_y".into(), row_count: 42 };
        let destination = dir.path().join("small.xlsx");
        let mut guard = manager.acquire().unwrap();
        let output = export_excel(&mut guard, &import, &destination, 100).unwrap();
        assert_eq!(output.files, vec![WrittenFile { path: destination.clone(), rows: 42 }]);
        assert!(destination.exists());
    }

    #[test]
    fn untyped_import_reads_everything_as_text() {
        let engine = RecordingEngine::with_default_count(7);
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        let options = ExcelOptions { typed: false, ..Default::default() };
        let mut guard = manager.acquire().unwrap();
        let import = import_excel(&mut guard, Path::new("/data/book.xlsx"), &options, "tmp_conv_u").unwrap();
        assert_eq!(import.row_count, 7);

        let statements = engine.recorded();
        assert_eq!(statements[0], "INSTALL excel; LOAD excel;");
        assert!(statements[1].starts_with("CREATE TEMP TABLE \"tmp_conv_u\""));
        assert!(statements[1].contains("all_varchar = true"));
    }

    #[test]
    fn typed_import_stages_a_sample_first() {
        let engine = RecordingEngine { touch_copy_targets: true, default_count: 3, ..Default::default() };
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        let options = ExcelOptions {
            range: Some(parse_range("A1:C4").unwrap()),
            ..Default::default()
        };
        {
            let mut guard = manager.acquire().unwrap();
            import_excel(&mut guard, Path::new("/data/book.xlsx"), &options, "tmp_conv_t").unwrap();
        }

        let statements = engine.recorded();
        assert!(statements[1].starts_with("COPY (SELECT * FROM read_xlsx("));
        assert!(statements[1].contains("range = 'A1:C4'"));
        assert!(statements[1].contains("LIMIT 1000"));
        assert!(statements[2].contains("LIMIT 0"));
        assert!(statements[3].starts_with("INSERT INTO \"tmp_conv_t\""));

        let staged = manager.temp_files();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].exists());
        manager.shutdown().unwrap();
        assert!(!staged[0].exists());
    }

    #[test]
    fn failed_insert_drops_the_staged_table() {
        let engine = RecordingEngine { touch_copy_targets: true, default_count: 3, ..Default::default() };
        engine.fail_on("INSERT INTO");
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        let mut guard = manager.acquire().unwrap();
        let err = import_excel(&mut guard, Path::new("/data/book.xlsx"), &ExcelOptions::default(), "tmp_conv_f")
            .unwrap_err();
        assert!(matches!(err, ConvertError::EngineExecution { .. }));

        let statements = engine.recorded();
        assert_eq!(statements.last().map(String::as_str), Some("DROP TABLE IF EXISTS \"tmp_conv_f\""));
        assert!(!statements.iter().any(|s| s.starts_with("SELECT COUNT(*)")));
    }

    #[test]
    fn extension_failure_stops_import() {
        let engine = RecordingEngine::default();
        engine.fail_on("INSTALL excel");
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        let mut guard = manager.acquire().unwrap();
        let err = import_excel(&mut guard, Path::new("/data/book.xlsx"), &ExcelOptions::default(), "t").unwrap_err();
        assert!(matches!(err, ConvertError::ExtensionLoad { .. }));
        assert_eq!(engine.recorded().len(), 1);
    }
}
