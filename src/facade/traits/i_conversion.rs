use crate::config::ports::Settings;
use crate::error::Result;
use crate::models::conversion::ConversionOutput;

// Facade 接口，負責協調整個轉換流程與資源釋放
pub trait ConversionFacadeTrait: Send + Sync {
    /// 依設定執行單檔或目錄轉換，結束後關閉引擎並清除暫存檔
    /// # 參數
    /// - settings: 已解析的執行設定
    /// # 回傳
    /// - 成功時返回轉換摘要；單檔模式的任何錯誤與目錄模式的批次錯誤皆直接返回
    fn execute_conversion(&self, settings: Settings) -> Result<ConversionOutput>;
}
