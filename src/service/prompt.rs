use std::path::Path;

use dialoguer::{Input, Select};

use crate::error::{ConvertError, Result};
use crate::models::format::{CanonicalFormat, FormatDescriptor};
use crate::service::format_registry::FormatRegistry;
use crate::service::traits::i_service::PromptServiceTrait;

// 終端機互動輸入
pub struct DialoguerPrompt {
    registry: FormatRegistry,
}

impl DialoguerPrompt {
    pub fn new(registry: FormatRegistry) -> Self {
        DialoguerPrompt { registry }
    }
}

impl PromptServiceTrait for DialoguerPrompt {
    fn output_format(&self, input: &FormatDescriptor) -> Result<FormatDescriptor> {
        let items: Vec<String> = CanonicalFormat::ALL
            .iter()
            .map(|f| format!("{} (.{})", f.id(), f.file_extension()))
            .collect();
        let default = CanonicalFormat::ALL
            .iter()
            .position(|f| *f != input.format && *f == CanonicalFormat::Parquet)
            .unwrap_or(0);
        let selected = Select::new()
            .with_prompt(format!("選擇輸出格式（輸入為 {}，使用方向鍵選擇，按 Enter 確認）", input.id()))
            .items(&items)
            .default(default)
            .interact()
            .map_err(|e| ConvertError::Prompt(format!("輸出格式選擇失敗: {}", e)))?;
        let format = CanonicalFormat::ALL
            .get(selected)
            .copied()
            .ok_or_else(|| ConvertError::Prompt(format!("無效的選項：{}", selected)))?;
        Ok(self.registry.descriptor(format))
    }

    fn input_format(&self, candidates: &[FormatDescriptor]) -> Result<FormatDescriptor> {
        let items: Vec<String> = candidates
            .iter()
            .map(|d| format!("{} (.{})", d.id(), d.format.file_extension()))
            .collect();
        let selected = Select::new()
            .with_prompt("多個格式的檔案數相同，選擇要轉換的輸入格式")
            .items(&items)
            .default(0)
            .interact()
            .map_err(|e| ConvertError::Prompt(format!("輸入格式選擇失敗: {}", e)))?;
        candidates
            .get(selected)
            .cloned()
            .ok_or_else(|| ConvertError::Prompt(format!("無效的選項：{}", selected)))
    }

    fn excel_selection(&self, file: &Path) -> Result<(Option<String>, Option<String>)> {
        let sheet: String = Input::new()
            .with_prompt(format!("{} 的工作表（索引或名稱，留空使用第一個）", file.display()))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| ConvertError::Prompt(format!("工作表輸入失敗: {}", e)))?;
        let range: String = Input::new()
            .with_prompt("儲存格範圍（例如 A2:E7，留空讀取整個工作表）")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| ConvertError::Prompt(format!("範圍輸入失敗: {}", e)))?;
        let blank_to_none = |s: String| if s.trim().is_empty() { None } else { Some(s.trim().to_string()) };
        Ok((blank_to_none(sheet), blank_to_none(range)))
    }

    fn txt_delimiter(&self) -> Result<String> {
        Input::new()
            .with_prompt("TXT 分隔符號（t = tab，c = 逗號，或直接輸入字元）")
            .default("c".to_string())
            .interact_text()
            .map_err(|e| ConvertError::Prompt(format!("分隔符號輸入失敗: {}", e)))
    }
}

// 非互動環境：需要輸入時使用預設值，無預設值則失敗
pub struct NonInteractivePrompt;

impl PromptServiceTrait for NonInteractivePrompt {
    fn output_format(&self, input: &FormatDescriptor) -> Result<FormatDescriptor> {
        Err(ConvertError::Prompt(format!(
            "未指定輸出格式（-o），且目前無法互動詢問（輸入為 {}）",
            input.id()
        )))
    }

    fn input_format(&self, candidates: &[FormatDescriptor]) -> Result<FormatDescriptor> {
        candidates
            .first()
            .cloned()
            .ok_or_else(|| ConvertError::Prompt("沒有可選擇的輸入格式".to_string()))
    }

    fn excel_selection(&self, _file: &Path) -> Result<(Option<String>, Option<String>)> {
        Ok((None, None))
    }

    fn txt_delimiter(&self) -> Result<String> {
        Ok("c".to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_output_format_is_a_prompt_error() {
        let input = FormatRegistry::new().descriptor(CanonicalFormat::Csv);
        let err = NonInteractivePrompt.output_format(&input).unwrap_err();
        assert!(matches!(err, ConvertError::Prompt(_)));
        assert!(err.is_systemic());
    }

    #[test]
    fn non_interactive_defaults() {
        let registry = FormatRegistry::new();
        let tied = [registry.descriptor(CanonicalFormat::Json), registry.descriptor(CanonicalFormat::Parquet)];
        assert_eq!(NonInteractivePrompt.input_format(&tied).unwrap().format, CanonicalFormat::Json);
        assert_eq!(NonInteractivePrompt.txt_delimiter().unwrap(), "c");
        assert_eq!(NonInteractivePrompt.excel_selection(Path::new("a.xlsx")).unwrap(), (None, None));
    }
}
