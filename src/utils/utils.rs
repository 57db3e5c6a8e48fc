use std::io::{self, Write};
use std::sync::mpsc::{self, Sender};
use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::ConvertError;

enum LogMessage {
    Line(Vec<u8>),
    Flush(Sender<()>),
}

static LOG_SINK: OnceLock<Sender<LogMessage>> = OnceLock::new();

// env_logger 的輸出目標：只把格式化後的位元組丟進佇列
struct QueueWriter {
    tx: Sender<LogMessage>,
}

impl Write for QueueWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(LogMessage::Line(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "日誌佇列已關閉"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 日誌佇列的控制代碼，drop 時會等待佇列清空
pub struct LogGuard {
    tx: Sender<LogMessage>,
}

impl LogGuard {
    /// 等待在此之前送出的所有日誌寫入完成
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(LogMessage::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

fn spawn_log_writer() -> io::Result<Sender<LogMessage>> {
    let (tx, rx) = mpsc::channel::<LogMessage>();
    thread::Builder::new()
        .name("log-writer".to_string())
        .spawn(move || {
            let stderr = io::stderr();
            for message in rx {
                match message {
                    LogMessage::Line(bytes) => {
                        let _ = stderr.lock().write_all(&bytes);
                    }
                    LogMessage::Flush(ack) => {
                        let _ = stderr.lock().flush();
                        let _ = ack.send(());
                    }
                }
            }
        })?;
    Ok(tx)
}

pub fn parse_log_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_ascii_lowercase().as_str() {
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

/// 初始化非同步日誌：env_logger 格式化，背景執行緒寫入 stderr
pub fn setup_logging(log_level: &str) -> io::Result<LogGuard> {
    if let Some(tx) = LOG_SINK.get() {
        log::warn!("日誌系統已初始化，沿用現有設定");
        return Ok(LogGuard { tx: tx.clone() });
    }

    let tx = spawn_log_writer()?;
    let tx = LOG_SINK.get_or_init(|| tx).clone();
    let result = env_logger::Builder::new()
        .filter_level(parse_log_level(log_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(QueueWriter { tx: tx.clone() })))
        .try_init();
    if let Err(e) = result {
        log::warn!("無法安裝日誌記錄器：{}", e);
    }
    Ok(LogGuard { tx })
}

/// 若日誌已初始化，等待佇列中的日誌全部寫出
pub fn flush_logs() {
    if let Some(tx) = LOG_SINK.get() {
        LogGuard { tx: tx.clone() }.flush();
    }
}

pub struct ProgressManager {
    pb: ProgressBar,
    no_progress: bool,
    start: Instant,
}

impl ProgressManager {
    pub fn new(total: u64, no_progress: bool) -> Self {
        let pb = if no_progress {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40}] {pos}/{len} ETA: {eta_precise}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
            );
            pb
        };
        ProgressManager {
            pb,
            no_progress,
            start: Instant::now(),
        }
    }

    pub fn update(&self, count: u64, current: &str) {
        if self.no_progress {
            return;
        }
        let elapsed = self.start.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 { count as f64 / elapsed } else { 0.0 };
        self.pb.set_message(format!("轉換：{}，速度：{:.1} 檔案/秒", current, speed));
        self.pb.set_position(count);
    }

    pub fn finish(&self, succeeded: usize, skipped: usize, failed: usize) {
        if self.no_progress {
            return;
        }
        self.pb.finish_with_message(format!(
            "完成，成功 {} 個，跳過 {} 個，失敗 {} 個",
            succeeded, skipped, failed
        ));
    }
}

pub fn format_file_size(size: u64) -> String {
    if size < 1024 * 1024 {
        format!("{:.2} KB", size as f64 / 1024.0)
    } else {
        format!("{:.2} MB", size as f64 / (1024.0 * 1024.0))
    }
}

/// TXT 分隔符號：`t` 為 tab，`c` 為逗號，其他值原樣使用
///
/// 引擎只接受單一字元的分隔符號，空字串或多字元會直接回傳錯誤。
pub fn parse_delimiter(token: &str) -> Result<String, ConvertError> {
    let delimiter = match token {
        "t" | "T" => "\t",
        "c" | "C" => ",",
        other => other,
    };
    match delimiter.chars().count() {
        1 => Ok(delimiter.to_string()),
        0 => Err(ConvertError::InvalidDelimiter("分隔符號不可為空".to_string())),
        _ => Err(ConvertError::InvalidDelimiter(format!("'{}' 不是單一字元", token))),
    }
}

/// SQL 字串常值，單引號加倍跳脫
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub fn random_suffix(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}
