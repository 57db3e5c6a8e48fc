use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use crate::error::{ConvertError, Result};
use crate::models::excel::ExcelOptions;
use crate::models::format::FormatDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Importing,
    Imported,
    Exporting,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// 佔用引擎的狀態
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Importing | TaskState::Exporting)
    }

    fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Importing)
                | (TaskState::Importing, TaskState::Imported)
                | (TaskState::Importing, TaskState::Failed)
                | (TaskState::Imported, TaskState::Exporting)
                | (TaskState::Imported, TaskState::Failed)
                | (TaskState::Exporting, TaskState::Completed)
                | (TaskState::Exporting, TaskState::Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 每個任務的格式相關選項
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// TXT 匯出的分隔符號（已解析）
    pub delimiter: Option<String>,
    pub excel: ExcelOptions,
}

#[derive(Debug, Clone)]
pub struct ConversionTask {
    pub source: PathBuf,
    pub size: u64,
    pub input: FormatDescriptor,
    output: Option<FormatDescriptor>,
    pub destination: Option<PathBuf>,
    pub options: TaskOptions,
    state: TaskState,
}

impl ConversionTask {
    pub fn new(source: PathBuf, size: u64, input: FormatDescriptor, options: TaskOptions) -> Self {
        ConversionTask {
            source,
            size,
            input,
            output: None,
            destination: None,
            options,
            state: TaskState::Pending,
        }
    }

    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn output(&self) -> Option<&FormatDescriptor> {
        self.output.as_ref()
    }

    /// 輸入格式在建構時已解析，輸出格式只能之後設定
    pub fn set_output(&mut self, output: FormatDescriptor) {
        self.output = Some(output);
    }

    pub fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ConvertError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        log::debug!("任務 {}：{} -> {}", self.name(), self.state, next);
        self.state = next;
        Ok(())
    }
}

/// FIFO 任務佇列，插入順序即探索順序
#[derive(Debug, Default)]
pub struct ConversionQueue {
    tasks: VecDeque<ConversionTask>,
}

impl ConversionQueue {
    pub fn new() -> Self {
        ConversionQueue { tasks: VecDeque::new() }
    }

    pub fn push(&mut self, task: ConversionTask) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<ConversionTask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 依檔案大小由大到小排序，同大小依檔名
    pub fn order_by_size_descending(&mut self) {
        self.tasks
            .make_contiguous()
            .sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.source.cmp(&b.source)));
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionTask> {
        self.tasks.iter()
    }
}
