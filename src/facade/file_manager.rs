use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::facade::conversion_manager::{
    drive_task, prepare_excel_options, spawn_output_options, ConversionContext, OutputLocation,
};
use crate::models::conversion::ConversionOutput;
use crate::models::task::{ConversionTask, TaskOptions};
use crate::utils::file::display_path;

/// 單檔模式：只有一個任務，任何錯誤都直接回傳
pub struct FileConversionManager {
    source: PathBuf,
    size: u64,
}

impl FileConversionManager {
    pub fn new(source: PathBuf, size: u64) -> Self {
        FileConversionManager { source, size }
    }

    fn location(&self, ctx: &ConversionContext) -> OutputLocation {
        match &ctx.settings.output_path {
            Some(path) if path.is_dir() => OutputLocation::Directory(path.clone()),
            Some(path) => OutputLocation::File(path.clone()),
            None => OutputLocation::Beside,
        }
    }

    pub async fn run(&self, ctx: &ConversionContext) -> Result<ConversionOutput> {
        let input = ctx
            .registry
            .resolve(&self.source, ctx.settings.input_type.as_deref())?;
        let known_output = ctx.requested_output()?;
        let task = ConversionTask::new(self.source.clone(), self.size, input.clone(), TaskOptions::default());
        info!("單檔轉換：{}（{}）", display_path(&self.source), input);

        let excel = prepare_excel_options(ctx, &task, known_output.as_ref().map(|o| o.format)).await;
        let options = spawn_output_options(ctx, input.clone());
        let run = drive_task(ctx, task, excel, options, &self.location(ctx)).await;

        let report = run.report();
        let output_format = run.options.as_ref().map(|o| o.output.format);
        let export = run.result?;
        for file in &export.files {
            info!("輸出檔案：{}（{} 列）", display_path(&file.path), file.rows);
        }

        let output_path = match export.files.as_slice() {
            [single] => single.path.clone(),
            files => files
                .first()
                .and_then(|f| f.path.parent())
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        Ok(ConversionOutput {
            output_path,
            input_format: Some(input.format),
            output_format,
            reports: vec![report],
        })
    }
}
