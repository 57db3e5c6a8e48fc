use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use duckdb::Connection;
use log::{debug, info, warn};

use crate::error::{ConvertError, Result};
use crate::models::task::TaskState;
use crate::service::traits::i_service::SqlEngineTrait;

/// DuckDB 記憶體內連線
pub struct DuckDbEngine {
    conn: Connection,
}

impl DuckDbEngine {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ConvertError::engine("OPEN :memory:", e))?;
        Ok(DuckDbEngine { conn })
    }
}

impl SqlEngineTrait for DuckDbEngine {
    fn execute(&mut self, statement: &str) -> Result<()> {
        debug!("執行語句：{}", statement);
        self.conn
            .execute_batch(statement)
            .map_err(|e| ConvertError::engine(statement, e))
    }

    fn query_count(&mut self, statement: &str) -> Result<u64> {
        debug!("執行查詢：{}", statement);
        let count: i64 = self
            .conn
            .query_row(statement, [], |row| row.get(0))
            .map_err(|e| ConvertError::engine(statement, e))?;
        Ok(count.max(0) as u64)
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| ConvertError::engine("CLOSE", e))
    }
}

/// 唯一的引擎連線擁有者，同一時間只允許一個持有者
pub struct EngineConnectionManager {
    connection: Mutex<Option<Box<dyn SqlEngineTrait>>>,
    temp_files: Mutex<Vec<PathBuf>>,
    loaded_extensions: Mutex<HashSet<String>>,
    active_tasks: AtomicUsize,
    peak_active_tasks: AtomicUsize,
    contended: AtomicUsize,
    acquisitions: AtomicUsize,
}

impl EngineConnectionManager {
    pub fn new(engine: Box<dyn SqlEngineTrait>) -> Self {
        EngineConnectionManager {
            connection: Mutex::new(Some(engine)),
            temp_files: Mutex::new(Vec::new()),
            loaded_extensions: Mutex::new(HashSet::new()),
            active_tasks: AtomicUsize::new(0),
            peak_active_tasks: AtomicUsize::new(0),
            contended: AtomicUsize::new(0),
            acquisitions: AtomicUsize::new(0),
        }
    }

    pub fn open_duckdb() -> Result<Self> {
        Ok(Self::new(Box::new(DuckDbEngine::open_in_memory()?)))
    }

    /// 取得連線；已被持有代表程式錯誤，已關閉代表生命週期錯誤
    pub fn acquire(&self) -> Result<EngineGuard<'_>> {
        let lock = match self.connection.try_lock() {
            Ok(lock) => lock,
            Err(TryLockError::WouldBlock) => {
                self.contended.fetch_add(1, Ordering::SeqCst);
                return Err(ConvertError::EngineUnavailable("連線已被其他任務持有".to_string()))
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(ConvertError::EngineUnavailable("連線狀態已損毀".to_string()))
            }
        };
        if lock.is_none() {
            return Err(ConvertError::EngineUnavailable("連線已關閉".to_string()));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(EngineGuard { lock, manager: self })
    }

    /// 任務進入 Importing 或 Exporting 時登記，在取得連線之前計數
    pub fn begin_activity(&self, state: TaskState) -> Option<ActivityGuard<'_>> {
        if !state.is_active() {
            return None;
        }
        let current = self.active_tasks.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active_tasks.fetch_max(current, Ordering::SeqCst);
        Some(ActivityGuard { manager: self })
    }

    /// 同時處於 Importing/Exporting 的任務數最大值
    pub fn peak_active_tasks(&self) -> usize {
        self.peak_active_tasks.load(Ordering::SeqCst)
    }

    /// 因連線已被持有而失敗的取得次數
    pub fn contended(&self) -> usize {
        self.contended.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.connection.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// 登記暫存檔，關閉時刪除
    pub fn register_temp_file(&self, path: PathBuf) {
        if let Ok(mut files) = self.temp_files.lock() {
            files.push(path);
        }
    }

    pub fn temp_files(&self) -> Vec<PathBuf> {
        self.temp_files.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// 先關閉連線，再刪除暫存檔；可重複呼叫
    pub fn shutdown(&self) -> Result<()> {
        let engine = match self.connection.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let mut first_error = None;
        if let Some(engine) = engine {
            match engine.close() {
                Ok(()) => info!("引擎連線已關閉"),
                Err(e) => {
                    warn!("關閉引擎連線失敗：{}", e);
                    first_error = Some(e);
                }
            }
        }

        let files: Vec<PathBuf> = match self.temp_files.lock() {
            Ok(mut files) => files.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for file in files {
            match std::fs::remove_file(&file) {
                Ok(()) => debug!("已刪除暫存檔：{}", file.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("刪除暫存檔 {} 失敗：{}", file.display(), e);
                    if first_error.is_none() {
                        first_error = Some(ConvertError::Io(e));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for EngineConnectionManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("釋放引擎資源時發生錯誤：{}", e);
        }
    }
}

/// 連線的範圍性持有，離開範圍即自動釋放
pub struct EngineGuard<'a> {
    lock: MutexGuard<'a, Option<Box<dyn SqlEngineTrait>>>,
    manager: &'a EngineConnectionManager,
}

impl EngineGuard<'_> {
    fn engine(&mut self) -> Result<&mut (dyn SqlEngineTrait + 'static)> {
        self.lock
            .as_deref_mut()
            .ok_or_else(|| ConvertError::EngineUnavailable("連線已關閉".to_string()))
    }

    pub fn execute(&mut self, statement: &str) -> Result<()> {
        self.engine()?.execute(statement)
    }

    pub fn query_count(&mut self, statement: &str) -> Result<u64> {
        self.engine()?.query_count(statement)
    }

    /// 每個連線只安裝並載入一次擴充功能
    pub fn ensure_extension(&mut self, extension: &str) -> Result<()> {
        let already_loaded = self
            .manager
            .loaded_extensions
            .lock()
            .map(|set| set.contains(extension))
            .unwrap_or(false);
        if already_loaded {
            return Ok(());
        }
        let statement = format!("INSTALL {0}; LOAD {0};", extension);
        self.engine()?
            .execute(&statement)
            .map_err(|e| ConvertError::ExtensionLoad {
                extension: extension.to_string(),
                reason: e.to_string(),
            })?;
        if let Ok(mut set) = self.manager.loaded_extensions.lock() {
            set.insert(extension.to_string());
        }
        info!("已載入引擎擴充功能：{}", extension);
        Ok(())
    }

    pub fn register_temp_file(&self, path: PathBuf) {
        self.manager.register_temp_file(path);
    }
}

pub struct ActivityGuard<'a> {
    manager: &'a EngineConnectionManager,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.manager.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// 記錄所有語句的假引擎；可預設查詢結果與失敗條件
    #[derive(Clone, Default)]
    pub struct RecordingEngine {
        pub statements: Arc<Mutex<Vec<String>>>,
        pub counts: Arc<Mutex<HashMap<String, u64>>>,
        pub default_count: u64,
        pub fail_when_contains: Arc<Mutex<Vec<String>>>,
        pub closed: Arc<Mutex<bool>>,
        /// 執行 `COPY ... TO '<path>'` 時建立空的目標檔，模擬真實引擎寫檔
        pub touch_copy_targets: bool,
    }

    impl RecordingEngine {
        pub fn with_default_count(count: u64) -> Self {
            RecordingEngine { default_count: count, ..Default::default() }
        }

        pub fn fail_on(&self, fragment: &str) {
            self.fail_when_contains.lock().unwrap().push(fragment.to_string());
        }

        pub fn recorded(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }

        fn check(&self, statement: &str) -> Result<()> {
            self.statements.lock().unwrap().push(statement.to_string());
            let fragments = self.fail_when_contains.lock().unwrap();
            if fragments.iter().any(|f| statement.contains(f.as_str())) {
                return Err(ConvertError::engine(
                    statement,
                    io::Error::new(io::ErrorKind::InvalidData, "injected failure"),
                ));
            }
            Ok(())
        }
    }

    impl SqlEngineTrait for RecordingEngine {
        fn execute(&mut self, statement: &str) -> Result<()> {
            self.check(statement)?;
            if self.touch_copy_targets && statement.starts_with("COPY") {
                if let Some(start) = statement.rfind(" TO '") {
                    let rest = &statement[start + 5..];
                    if let Some(end) = rest.find("' (") {
                        std::fs::write(rest[..end].replace("''", "'"), b"")?;
                    }
                }
            }
            Ok(())
        }

        fn query_count(&mut self, statement: &str) -> Result<u64> {
            self.check(statement)?;
            let counts = self.counts.lock().unwrap();
            Ok(counts
                .iter()
                .find(|(fragment, _)| statement.contains(fragment.as_str()))
                .map(|(_, count)| *count)
                .unwrap_or(self.default_count))
        }

        fn close(self: Box<Self>) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingEngine;
    use super::*;

    #[test]
    fn second_acquire_while_held_fails() {
        let manager = EngineConnectionManager::new(Box::new(RecordingEngine::default()));
        let guard = manager.acquire().unwrap();
        let err = manager.acquire().err().unwrap();
        assert!(matches!(err, ConvertError::EngineUnavailable(_)));
        drop(guard);
        assert!(manager.acquire().is_ok());
        assert_eq!(manager.contended(), 1);
        assert_eq!(manager.acquisitions(), 2);
    }

    #[test]
    fn overlapping_activity_is_counted() {
        let manager = EngineConnectionManager::new(Box::new(RecordingEngine::default()));
        assert!(manager.begin_activity(TaskState::Imported).is_none());
        let importing = manager.begin_activity(TaskState::Importing);
        {
            let _exporting = manager.begin_activity(TaskState::Exporting);
            assert_eq!(manager.peak_active_tasks(), 2);
        }
        drop(importing);
        let _again = manager.begin_activity(TaskState::Importing);
        assert_eq!(manager.peak_active_tasks(), 2);
    }

    #[test]
    fn guard_released_on_error_path() {
        let engine = RecordingEngine::default();
        engine.fail_on("BROKEN");
        let manager = EngineConnectionManager::new(Box::new(engine));
        let run = || -> Result<()> {
            let mut guard = manager.acquire()?;
            guard.execute("SELECT BROKEN")?;
            Ok(())
        };
        assert!(run().is_err());
        assert!(manager.acquire().is_ok());
    }

    #[test]
    fn shutdown_closes_then_removes_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("stage.csv");
        std::fs::write(&staged, "a\n1\n").unwrap();
        let engine = RecordingEngine::default();
        let closed = engine.closed.clone();
        let manager = EngineConnectionManager::new(Box::new(engine));
        manager.register_temp_file(staged.clone());
        manager.register_temp_file(dir.path().join("already_gone.csv"));

        manager.shutdown().unwrap();
        assert!(*closed.lock().unwrap());
        assert!(!staged.exists());
        assert!(!manager.is_open());
        assert!(matches!(manager.acquire().err().unwrap(), ConvertError::EngineUnavailable(_)));
        manager.shutdown().unwrap();
    }

    #[test]
    fn extension_failure_maps_to_extension_load() {
        let engine = RecordingEngine::default();
        engine.fail_on("INSTALL excel");
        let manager = EngineConnectionManager::new(Box::new(engine));
        let mut guard = manager.acquire().unwrap();
        let err = guard.ensure_extension("excel").unwrap_err();
        assert!(matches!(err, ConvertError::ExtensionLoad { .. }));
    }

    #[test]
    fn extension_loaded_once() {
        let engine = RecordingEngine::default();
        let manager = EngineConnectionManager::new(Box::new(engine.clone()));
        for _ in 0..3 {
            manager.acquire().unwrap().ensure_extension("excel").unwrap();
        }
        let installs = engine.recorded().iter().filter(|s| s.starts_with("INSTALL")).count();
        assert_eq!(installs, 1);
    }

    #[test]
    fn duckdb_engine_runs_statements() {
        let mut engine = DuckDbEngine::open_in_memory().unwrap();
        engine.execute("CREATE TABLE t AS SELECT * FROM range(5)").unwrap();
        assert_eq!(engine.query_count("SELECT COUNT(*) FROM t").unwrap(), 5);
        let err = engine.execute("SELECT * FROM missing_table").unwrap_err();
        assert!(matches!(err, ConvertError::EngineExecution { .. }));
        Box::new(engine).close().unwrap();
    }
}
