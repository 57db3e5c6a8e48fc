use clap::Parser;

use crate::action::interactive::process_interactive_mode;
use crate::config::config::{normalize_args, prompts_allowed, validate_input_path, Cli};
use crate::config::ports::{ConversionPort, Settings, SettingsPort};
use crate::error::{ConvertError, Result};
use crate::models::excel::{ExcelReadMode, DEFAULT_PAGE_LIMIT};
use crate::models::conversion::ConversionOutput;
use crate::service::config_service::{DefaultSettingsAdapter, SettingsService};
use crate::service::excel::parse_range;
use crate::service::format_registry::FormatRegistry;
use crate::utils::convert::ConversionAdapter;
use crate::utils::utils::{parse_delimiter, setup_logging};

pub fn process_args(args: Vec<String>) -> Result<ConversionOutput> {
    if args.len() == 1 {
        process_interactive_mode()
    } else {
        process_cli_mode(args)
    }
}

pub fn process_cli_mode(args: Vec<String>) -> Result<ConversionOutput> {
    let cli = Cli::parse_from(normalize_args(args));
    let _log_guard = setup_logging(&cli.log_level)?;
    let interactive = prompts_allowed(cli.no_prompt);

    // 只提供輸入路徑時使用預設設定
    let is_default_config = cli.input_type.is_none()
        && cli.output_type.is_none()
        && cli.output_path.is_none()
        && cli.sheet.is_none()
        && cli.range.is_none()
        && cli.delimiter.is_none()
        && cli.page_limit.is_none()
        && ExcelReadMode::from(cli.excel_types) == ExcelReadMode::Auto;

    let settings_port: Box<dyn SettingsPort> = if is_default_config {
        log::info!("未提供選項參數，使用預設設定，輸出格式將於轉換時詢問");
        let input = validate_input_path(&cli.input_path)?;
        Box::new(DefaultSettingsAdapter::new(input, interactive))
    } else {
        Box::new(CliSettingsAdapter::new(cli.clone(), interactive))
    };

    let settings = SettingsService::new(settings_port).get_settings()?;
    let settings = Settings {
        no_progress: cli.no_progress,
        log_level: cli.log_level.clone(),
        ..settings
    };

    let conversion_port: Box<dyn ConversionPort> = Box::new(ConversionAdapter);
    let output = conversion_port.execute(settings.clone())?;

    // 若啟用 --show-config，在轉換後顯示設定
    if cli.show_config {
        println!("實際使用的設定：{:#?}", settings);
    }

    Ok(output)
}

// CLI 設定適配器
pub struct CliSettingsAdapter {
    cli: Cli,
    interactive: bool,
}

impl CliSettingsAdapter {
    pub fn new(cli: Cli, interactive: bool) -> Self {
        CliSettingsAdapter { cli, interactive }
    }
}

impl SettingsPort for CliSettingsAdapter {
    fn get_settings(&self) -> Result<Settings> {
        let input_path = validate_input_path(&self.cli.input_path)?;

        // 格式代號與 Excel 範圍在開始轉換前先檢查
        let registry = FormatRegistry::new();
        for token in [&self.cli.input_type, &self.cli.output_type].into_iter().flatten() {
            registry.parse_token(token)?;
        }
        if let Some(range) = &self.cli.range {
            parse_range(range)?;
        }
        if let Some(delimiter) = &self.cli.delimiter {
            parse_delimiter(delimiter)?;
        }
        let page_limit = self.cli.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page_limit == 0 {
            return Err(ConvertError::ExcelOption("--page-limit 必須大於 0".to_string()));
        }

        Ok(Settings {
            input_path,
            input_type: self.cli.input_type.clone(),
            output_type: self.cli.output_type.clone(),
            output_path: self.cli.output_path.as_ref().map(Into::into),
            sheet: self.cli.sheet.clone(),
            range: self.cli.range.clone(),
            delimiter: self.cli.delimiter.clone(),
            excel_types: self.cli.excel_types.into(),
            page_limit,
            interactive: self.interactive,
            no_progress: self.cli.no_progress,
            log_level: self.cli.log_level.clone(),
        })
    }
}
