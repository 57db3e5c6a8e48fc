use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::JoinError;

use crate::config::ports::Settings;
use crate::error::{ConvertError, Result};
use crate::facade::directory_manager::DirectoryConversionManager;
use crate::facade::file_manager::FileConversionManager;
use crate::models::conversion::{ConversionOutput, ExportOutput, ImportOutput, TaskOutcome, TaskReport};
use crate::models::excel::{ExcelOptions, SheetSelector};
use crate::models::format::{CanonicalFormat, FormatDescriptor};
use crate::models::task::{ConversionTask, TaskState};
use crate::service::adapters::{drop_table, InputAdapter, OutputAdapter};
use crate::service::engine::EngineConnectionManager;
use crate::service::excel::{parse_range, use_typed_import};
use crate::service::format_registry::FormatRegistry;
use crate::service::traits::i_service::PromptServiceTrait;
use crate::utils::file::output_file_path;
use crate::utils::utils::parse_delimiter;

/// 每個任務共用的協作者
#[derive(Clone)]
pub struct ConversionContext {
    pub registry: FormatRegistry,
    pub engine: Arc<EngineConnectionManager>,
    pub prompt: Arc<dyn PromptServiceTrait>,
    pub settings: Settings,
}

impl ConversionContext {
    pub fn new(
        settings: Settings,
        engine: Arc<EngineConnectionManager>,
        prompt: Arc<dyn PromptServiceTrait>,
    ) -> Self {
        ConversionContext {
            registry: FormatRegistry::new(),
            engine,
            prompt,
            settings,
        }
    }

    /// 已由 -o 指定的輸出格式；未指定時為 `None`
    pub fn requested_output(&self) -> Result<Option<FormatDescriptor>> {
        self.settings
            .output_type
            .as_deref()
            .map(|token| self.registry.parse_token(token))
            .transpose()
    }
}

/// 匯出前必須確定的輸出選項
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub output: FormatDescriptor,
    pub delimiter: Option<String>,
}

/// 輸出檔案的放置規則
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLocation {
    /// 與輸入檔同目錄
    Beside,
    /// 指定的輸出檔案
    File(PathBuf),
    /// 指定的輸出目錄
    Directory(PathBuf),
    /// `<root>/<輸出格式代號>/`
    FormatSubfolder(PathBuf),
}

impl OutputLocation {
    pub fn destination(&self, source: &Path, output: &FormatDescriptor) -> PathBuf {
        let extension = output.format.file_extension();
        match self {
            OutputLocation::Beside => {
                let parent = source.parent().unwrap_or_else(|| Path::new(""));
                output_file_path(source, parent, extension)
            }
            OutputLocation::File(path) => crate::utils::file::unique_path(path.clone()),
            OutputLocation::Directory(dir) => output_file_path(source, dir, extension),
            OutputLocation::FormatSubfolder(root) => {
                output_file_path(source, &root.join(output.id()), extension)
            }
        }
    }
}

/// 單一任務的執行結果
#[derive(Debug)]
pub struct TaskRun {
    pub source: PathBuf,
    pub state: TaskState,
    pub options: Option<OutputOptions>,
    pub result: Result<ExportOutput>,
}

impl TaskRun {
    pub fn report(&self) -> TaskReport {
        let outcome = match &self.result {
            Ok(export) => TaskOutcome::Completed {
                outputs: export.files.iter().map(|f| f.path.clone()).collect(),
                rows: export.rows_written(),
            },
            Err(e) => TaskOutcome::Failed { error: e.to_string() },
        };
        TaskReport { source: self.source.clone(), outcome }
    }
}

pub(crate) fn join_error(e: JoinError) -> ConvertError {
    ConvertError::Io(io::Error::other(format!("背景工作中斷：{}", e)))
}

/// 解析輸出格式與 TXT 分隔符號；未指定時向使用者詢問
pub fn resolve_output_options(
    registry: &FormatRegistry,
    prompt: &dyn PromptServiceTrait,
    settings: &Settings,
    input: &FormatDescriptor,
) -> Result<OutputOptions> {
    let output = match settings.output_type.as_deref() {
        Some(token) => registry.parse_token(token)?,
        None => prompt.output_format(input)?,
    };
    registry.validate(input, &output)?;

    let delimiter = match (&settings.delimiter, output.format) {
        (Some(token), _) => Some(parse_delimiter(token)?),
        (None, CanonicalFormat::Txt) => Some(parse_delimiter(&prompt.txt_delimiter()?)?),
        (None, _) => None,
    };
    Ok(OutputOptions { output, delimiter })
}

/// 在背景執行輸出選項的詢問，讓匯入可以同時進行
pub fn spawn_output_options(
    ctx: &ConversionContext,
    input: FormatDescriptor,
) -> impl Future<Output = Result<OutputOptions>> {
    let ctx = ctx.clone();
    let handle = tokio::task::spawn_blocking(move || {
        resolve_output_options(&ctx.registry, ctx.prompt.as_ref(), &ctx.settings, &input)
    });
    async move { handle.await.map_err(join_error)? }
}

/// 組出 Excel 選項；Excel 輸入且未給 -s/-c 時先詢問工作表與範圍
pub async fn prepare_excel_options(
    ctx: &ConversionContext,
    task: &ConversionTask,
    known_output: Option<CanonicalFormat>,
) -> Result<ExcelOptions> {
    let settings = &ctx.settings;
    let mut options = ExcelOptions {
        typed: use_typed_import(settings.excel_types, known_output),
        page_limit: settings.page_limit,
        ..Default::default()
    };
    if task.input.format != CanonicalFormat::Excel {
        return Ok(options);
    }

    let (sheet, range) = if settings.sheet.is_none() && settings.range.is_none() && settings.interactive {
        let prompt = ctx.prompt.clone();
        let source = task.source.clone();
        tokio::task::spawn_blocking(move || prompt.excel_selection(&source))
            .await
            .map_err(join_error)??
    } else {
        (settings.sheet.clone(), settings.range.clone())
    };
    options.sheet = sheet.as_deref().and_then(SheetSelector::parse);
    options.range = range
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(parse_range)
        .transpose()?;
    Ok(options)
}

fn run_import(
    engine: &EngineConnectionManager,
    task: &mut ConversionTask,
    excel: Result<ExcelOptions>,
) -> Result<ImportOutput> {
    task.transition(TaskState::Importing)?;
    let result = {
        let _activity = engine.begin_activity(task.state());
        excel.and_then(|excel| {
            task.options.excel = excel;
            let mut guard = engine.acquire()?;
            InputAdapter::for_format(task.input.format).open(&mut guard, &task.source, &task.options)
        })
    };
    match result {
        Ok(import) => {
            task.transition(TaskState::Imported)?;
            Ok(import)
        }
        Err(e) => {
            task.transition(TaskState::Failed)?;
            Err(e)
        }
    }
}

fn run_export(
    engine: &EngineConnectionManager,
    task: &mut ConversionTask,
    import: &ImportOutput,
    destination: &Path,
) -> Result<ExportOutput> {
    task.transition(TaskState::Exporting)?;
    let _activity = engine.begin_activity(task.state());
    let result = (|| {
        let output = task
            .output()
            .map(|o| o.format)
            .ok_or_else(|| ConvertError::UnsupportedConversion("尚未決定輸出格式".to_string()))?;
        let mut guard = engine.acquire()?;
        let written = OutputAdapter::for_format(output).write(&mut guard, import, destination, &task.options);
        drop_table(&mut guard, &import.table_name);
        written
    })();
    match result {
        Ok(export) => {
            task.transition(TaskState::Completed)?;
            Ok(export)
        }
        Err(e) => {
            task.transition(TaskState::Failed)?;
            Err(e)
        }
    }
}

fn discard_import(engine: &EngineConnectionManager, task: &mut ConversionTask, import: &ImportOutput) -> Result<()> {
    if let Ok(mut guard) = engine.acquire() {
        drop_table(&mut guard, &import.table_name);
    }
    task.transition(TaskState::Failed)
}

/// 驅動單一任務：匯入與輸出選項同時進行，兩者皆完成後才匯出
pub async fn drive_task<F>(
    ctx: &ConversionContext,
    mut task: ConversionTask,
    excel: Result<ExcelOptions>,
    options: F,
    location: &OutputLocation,
) -> TaskRun
where
    F: Future<Output = Result<OutputOptions>>,
{
    let source = task.source.clone();
    info!("開始轉換：{}（{}）", task.name(), task.input);

    let engine = ctx.engine.clone();
    let import_handle = tokio::task::spawn_blocking(move || {
        let imported = run_import(&engine, &mut task, excel);
        (task, imported)
    });
    let options = options.await;
    let (mut task, imported) = match import_handle.await {
        Ok(pair) => pair,
        Err(e) => {
            return TaskRun {
                source,
                state: TaskState::Failed,
                options: options.ok(),
                result: Err(join_error(e)),
            }
        }
    };

    let (import, resolved) = match (imported, options) {
        (Ok(import), Ok(resolved)) => (import, resolved),
        (Err(e), Ok(resolved)) => {
            error!("匯入失敗：{}：{}", source.display(), e);
            return TaskRun { source, state: task.state(), options: Some(resolved), result: Err(e) };
        }
        (Err(e), Err(options_error)) => {
            error!("匯入失敗：{}：{}", source.display(), e);
            // 批次層級的錯誤優先回報
            let result = if options_error.is_systemic() { options_error } else { e };
            return TaskRun { source, state: task.state(), options: None, result: Err(result) };
        }
        (Ok(import), Err(e)) => {
            let engine = ctx.engine.clone();
            let state = tokio::task::spawn_blocking(move || {
                if let Err(e) = discard_import(&engine, &mut task, &import) {
                    warn!("捨棄匯入結果失敗：{}：{}", task.name(), e);
                }
                task.state()
            })
            .await
            .unwrap_or(TaskState::Failed);
            return TaskRun { source, state, options: None, result: Err(e) };
        }
    };

    task.set_output(resolved.output.clone());
    task.options.delimiter = resolved.delimiter.clone();
    let destination = location.destination(&task.source, &resolved.output);
    task.destination = Some(destination.clone());

    let engine = ctx.engine.clone();
    let export_handle = tokio::task::spawn_blocking(move || {
        let exported = run_export(&engine, &mut task, &import, &destination);
        (task.state(), exported)
    });
    match export_handle.await {
        Ok((state, result)) => {
            if let Err(e) = &result {
                error!("轉換失敗：{}：{}", source.display(), e);
            }
            TaskRun { source, state, options: Some(resolved), result }
        }
        Err(e) => TaskRun {
            source,
            state: TaskState::Failed,
            options: Some(resolved),
            result: Err(join_error(e)),
        },
    }
}

/// 依目標路徑選擇單檔或目錄模式
pub enum ConversionManager {
    File(FileConversionManager),
    Directory(DirectoryConversionManager),
}

impl ConversionManager {
    pub fn create(target: &Path) -> Result<ConversionManager> {
        let metadata = std::fs::metadata(target).map_err(|_| ConvertError::InputPath(target.to_path_buf()))?;
        if metadata.is_file() {
            Ok(ConversionManager::File(FileConversionManager::new(target.to_path_buf(), metadata.len())))
        } else if metadata.is_dir() {
            Ok(ConversionManager::Directory(DirectoryConversionManager::new(target.to_path_buf())))
        } else {
            Err(ConvertError::InputPath(target.to_path_buf()))
        }
    }

    pub async fn run(&self, ctx: &ConversionContext) -> Result<ConversionOutput> {
        match self {
            ConversionManager::File(manager) => manager.run(ctx).await,
            ConversionManager::Directory(manager) => manager.run(ctx).await,
        }
    }
}
