use std::path::Path;

use crate::error::Result;
use crate::models::format::FormatDescriptor;

// 嵌入式 SQL 引擎接口，負責執行轉換語句
pub trait SqlEngineTrait: Send {
    /// 執行一或多個不回傳資料列的語句
    /// # 參數
    /// - statement: SQL 語句
    /// # 回傳
    /// - 失敗時返回包裝原生錯誤的 EngineExecution
    fn execute(&mut self, statement: &str) -> Result<()>;

    /// 執行回傳單一整數的查詢（例如 `SELECT COUNT(*)`）
    fn query_count(&mut self, statement: &str) -> Result<u64>;

    /// 關閉連線
    fn close(self: Box<Self>) -> Result<()>;
}

// 互動輸入接口，負責向使用者詢問輸出與 Excel 選項
pub trait PromptServiceTrait: Send + Sync {
    /// 詢問輸出格式
    /// # 參數
    /// - input: 已解析的輸入格式，用於提示
    /// # 回傳
    /// - 使用者選擇的輸出格式；非互動環境返回 Prompt 錯誤
    fn output_format(&self, input: &FormatDescriptor) -> Result<FormatDescriptor>;

    /// 目錄中多個格式同為最多數時，詢問要轉換哪一個
    /// # 參數
    /// - candidates: 同票的格式，依固定順序排列
    /// # 回傳
    /// - 選定的輸入格式；非互動環境取第一個
    fn input_format(&self, candidates: &[FormatDescriptor]) -> Result<FormatDescriptor>;

    /// 詢問 Excel 工作表與範圍，空白代表預設值
    fn excel_selection(&self, file: &Path) -> Result<(Option<String>, Option<String>)>;

    /// 詢問 TXT 匯出的分隔符號代號（`t`、`c` 或字面值）
    fn txt_delimiter(&self) -> Result<String>;
}
