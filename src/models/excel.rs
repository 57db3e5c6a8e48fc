use std::fmt;

/// Excel 單檔最大列數 1,048,576，保留 100 列給標題等
pub const DEFAULT_PAGE_LIMIT: u64 = 1_048_576 - 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// 從 1 開始的工作表索引
    Index(usize),
    Name(String),
}

impl SheetSelector {
    /// 純數字視為索引，其餘視為工作表名稱
    pub fn parse(token: &str) -> Option<SheetSelector> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        match token.parse::<usize>() {
            Ok(index) => Some(SheetSelector::Index(index)),
            Err(_) => Some(SheetSelector::Name(token.to_string())),
        }
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(index) => write!(f, "#{}", index),
            SheetSelector::Name(name) => f.write_str(name),
        }
    }
}

/// A1 格式的矩形範圍，例如 `A2:E7`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRange {
    pub start_column: u32,
    pub start_row: u32,
    pub end_column: u32,
    pub end_row: u32,
    text: String,
}

impl CellRange {
    pub fn new(start_column: u32, start_row: u32, end_column: u32, end_row: u32, text: String) -> Self {
        CellRange { start_column, start_row, end_column, end_row, text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExcelReadMode {
    /// 依輸出格式決定
    #[default]
    Auto,
    Typed,
    Untyped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcelOptions {
    pub sheet: Option<SheetSelector>,
    pub range: Option<CellRange>,
    pub typed: bool,
    pub page_limit: u64,
}

impl Default for ExcelOptions {
    fn default() -> Self {
        ExcelOptions {
            sheet: None,
            range: None,
            typed: true,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}
