use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{error, info, warn};

use crate::error::{ConvertError, Result};
use crate::facade::conversion_manager::{
    drive_task, join_error, prepare_excel_options, spawn_output_options, ConversionContext, OutputLocation,
    OutputOptions,
};
use crate::models::conversion::{ConversionOutput, TaskOutcome, TaskReport};
use crate::models::format::{CanonicalFormat, FormatDescriptor};
use crate::models::task::{ConversionQueue, ConversionTask, TaskOptions};
use crate::service::format_registry::FormatRegistry;
use crate::service::traits::i_service::PromptServiceTrait;
use crate::utils::file::{display_path, scan_directory, FileEntry};
use crate::utils::utils::{format_file_size, ProgressManager};

/// 數量最多的格式；同票時交給輸入服務決定（非互動時取固定順序中較前者）
pub fn majority_format(
    registry: &FormatRegistry,
    counts: &BTreeMap<CanonicalFormat, usize>,
    prompt: &dyn PromptServiceTrait,
) -> Result<Option<CanonicalFormat>> {
    let Some(best) = counts.values().copied().max().filter(|count| *count > 0) else {
        return Ok(None);
    };
    let tied: Vec<FormatDescriptor> = CanonicalFormat::ALL
        .iter()
        .filter(|f| counts.get(*f) == Some(&best))
        .map(|f| registry.descriptor(*f))
        .collect();
    if tied.len() == 1 {
        return Ok(Some(tied[0].format));
    }
    let chosen = prompt.input_format(&tied)?;
    warn!(
        "多個格式同為最多數（各 {} 個）：{:?}，採用 {}",
        best,
        tied.iter().map(|d| d.id()).collect::<Vec<_>>(),
        chosen
    );
    Ok(Some(chosen.format))
}

/// 目錄掃描後的批次計畫
#[derive(Debug, Default)]
pub struct BatchPlan {
    pub input: Option<FormatDescriptor>,
    pub queue: ConversionQueue,
    pub skipped: Vec<TaskReport>,
}

fn skip(entry: &FileEntry, reason: String) -> TaskReport {
    info!("略過 {}：{}", entry.name, reason);
    TaskReport { source: entry.path.clone(), outcome: TaskOutcome::Skipped { reason } }
}

/// 依副檔名分類檔案，只保留指定或多數格式的檔案，並依大小排序
pub fn plan_batch(
    registry: &FormatRegistry,
    entries: Vec<FileEntry>,
    forced: Option<&FormatDescriptor>,
    prompt: &dyn PromptServiceTrait,
) -> Result<BatchPlan> {
    let mut classified = Vec::new();
    let mut skipped = Vec::new();
    let mut counts: BTreeMap<CanonicalFormat, usize> = BTreeMap::new();
    for entry in entries {
        match registry.from_extension(&entry.path) {
            Some(descriptor) => {
                *counts.entry(descriptor.format).or_insert(0) += 1;
                classified.push((entry, descriptor));
            }
            None => skipped.push(skip(&entry, format!("無法辨識的副檔名 '{}'", entry.extension))),
        }
    }

    let selected = match forced {
        Some(descriptor) => Some(descriptor.format),
        None => majority_format(registry, &counts, prompt)?,
    };
    let Some(selected) = selected else {
        return Ok(BatchPlan { input: None, queue: ConversionQueue::new(), skipped });
    };
    info!("目錄格式統計：{:?}，使用 {}", counts, selected);

    let mut queue = ConversionQueue::new();
    for (entry, descriptor) in classified {
        if descriptor.format == selected {
            queue.push(ConversionTask::new(entry.path, entry.size, descriptor, TaskOptions::default()));
        } else {
            skipped.push(skip(&entry, format!("格式 {} 不是本批次的輸入格式 {}", descriptor, selected)));
        }
    }
    queue.order_by_size_descending();
    Ok(BatchPlan { input: Some(registry.descriptor(selected)), queue, skipped })
}

/// 目錄模式：依序轉換目錄中所有多數格式的檔案
pub struct DirectoryConversionManager {
    dir: PathBuf,
}

impl DirectoryConversionManager {
    pub fn new(dir: PathBuf) -> Self {
        DirectoryConversionManager { dir }
    }

    fn output_root(&self, ctx: &ConversionContext) -> PathBuf {
        ctx.settings.output_path.clone().unwrap_or_else(|| self.dir.clone())
    }

    pub async fn run(&self, ctx: &ConversionContext) -> Result<ConversionOutput> {
        let forced = ctx
            .settings
            .input_type
            .as_deref()
            .map(|token| ctx.registry.parse_token(token))
            .transpose()?;
        let requested = ctx.requested_output()?;

        let entries = scan_directory(&self.dir)?;
        let total_size: u64 = entries.iter().map(|e| e.size).sum();
        info!(
            "掃描目錄 {}：{} 個檔案，共 {}",
            display_path(&self.dir),
            entries.len(),
            format_file_size(total_size)
        );
        // 同票時可能需要詢問使用者
        let (registry, prompt) = (ctx.registry, ctx.prompt.clone());
        let mut plan = tokio::task::spawn_blocking(move || {
            plan_batch(&registry, entries, forced.as_ref(), prompt.as_ref())
        })
        .await
        .map_err(join_error)??;
        let input = match (&plan.input, plan.queue.is_empty()) {
            (Some(input), false) => input.clone(),
            _ => return Err(ConvertError::NoConvertibleFiles(self.dir.clone())),
        };

        let root = self.output_root(ctx);
        let location = OutputLocation::FormatSubfolder(root.clone());
        let progress = ProgressManager::new(
            plan.queue.len() as u64,
            ctx.settings.no_progress || !ctx.settings.interactive,
        );
        let mut reports = std::mem::take(&mut plan.skipped);
        let mut resolved: Option<OutputOptions> = None;
        let mut done = 0u64;

        while let Some(task) = plan.queue.pop() {
            progress.update(done, &task.name());
            let run = match &resolved {
                Some(options) => {
                    let excel = prepare_excel_options(ctx, &task, Some(options.output.format)).await;
                    let ready = std::future::ready(Ok::<OutputOptions, ConvertError>(options.clone()));
                    drive_task(ctx, task, excel, ready, &location).await
                }
                None => {
                    let excel = prepare_excel_options(ctx, &task, requested.as_ref().map(|o| o.format)).await;
                    let pending = spawn_output_options(ctx, task.input.clone());
                    let root = root.clone();
                    let options = async move {
                        let options = pending.await?;
                        let subfolder = root.join(options.output.id());
                        tokio::fs::create_dir_all(&subfolder)
                            .await
                            .map_err(|source| ConvertError::OutputDirectory { path: subfolder.clone(), source })?;
                        info!("輸出目錄：{}", display_path(&subfolder));
                        Ok::<OutputOptions, ConvertError>(options)
                    };
                    drive_task(ctx, task, excel, options, &location).await
                }
            };
            done += 1;
            reports.push(run.report());
            if resolved.is_none() {
                resolved = run.options.clone();
            }
            if let Err(e) = run.result {
                if e.is_systemic() {
                    error!("批次中止：{}", e);
                    return Err(e);
                }
                warn!("{} 轉換失敗，繼續處理下一個檔案：{}", display_path(&run.source), e);
            }
        }

        let output = ConversionOutput {
            output_path: match &resolved {
                Some(options) => root.join(options.output.id()),
                None => root,
            },
            input_format: Some(input.format),
            output_format: resolved.map(|o| o.output.format),
            reports,
        };
        progress.finish(output.succeeded(), output.skipped(), output.failed());
        info!(
            "目錄轉換完成：成功 {} 個，略過 {} 個，失敗 {} 個",
            output.succeeded(),
            output.skipped(),
            output.failed()
        );
        Ok(output)
    }
}
