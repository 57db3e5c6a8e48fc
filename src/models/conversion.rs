use std::path::PathBuf;

use crate::models::format::CanonicalFormat;

/// 匯入後暫存在引擎中的資料表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutput {
    pub table_name: String,
    pub row_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub rows: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOutput {
    pub files: Vec<WrittenFile>,
}

impl ExportOutput {
    pub fn rows_written(&self) -> u64 {
        self.files.iter().map(|f| f.rows).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { outputs: Vec<PathBuf>, rows: u64 },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub source: PathBuf,
    pub outcome: TaskOutcome,
}

/// 一次執行（單檔或整個目錄）的結果
#[derive(Debug, Clone, Default)]
pub struct ConversionOutput {
    pub output_path: PathBuf,
    pub input_format: Option<CanonicalFormat>,
    pub output_format: Option<CanonicalFormat>,
    pub reports: Vec<TaskReport>,
}

impl ConversionOutput {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn written_files(&self) -> Vec<PathBuf> {
        self.reports
            .iter()
            .filter_map(|r| match &r.outcome {
                TaskOutcome::Completed { outputs, .. } => Some(outputs.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}
