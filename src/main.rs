use std::process::ExitCode;

use make_it_parquet::action::cli::process_args;
use make_it_parquet::utils::file::display_path;
use make_it_parquet::utils::utils::flush_logs;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let code = match process_args(args) {
        Ok(output) => {
            log::info!("程式執行完成，輸出位置：{}", output.output_path.display());
            println!(
                "轉換完成！成功 {} 個，略過 {} 個，失敗 {} 個，輸出位於：{}",
                output.succeeded(),
                output.skipped(),
                output.failed(),
                display_path(&output.output_path)
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("轉換失敗：{}", e);
            eprintln!("錯誤：{}", e);
            ExitCode::FAILURE
        }
    };
    // 引擎與暫存檔已在轉換結束時釋放，最後才清空日誌佇列
    flush_logs();
    code
}
