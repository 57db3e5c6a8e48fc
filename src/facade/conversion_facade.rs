use std::sync::Arc;

use log::{info, warn};

use crate::config::ports::Settings;
use crate::error::Result;
use crate::facade::conversion_manager::{ConversionContext, ConversionManager};
use crate::facade::traits::i_conversion::ConversionFacadeTrait;
use crate::models::conversion::ConversionOutput;
use crate::service::engine::EngineConnectionManager;
use crate::service::format_registry::FormatRegistry;
use crate::service::prompt::{DialoguerPrompt, NonInteractivePrompt};
use crate::service::traits::i_service::PromptServiceTrait;

pub struct ConversionFacade {
    engine: Arc<EngineConnectionManager>,
    prompt: Arc<dyn PromptServiceTrait>,
}

impl ConversionFacade {
    pub fn new(engine: Arc<EngineConnectionManager>, prompt: Arc<dyn PromptServiceTrait>) -> Self {
        ConversionFacade { engine, prompt }
    }

    /// 開啟 DuckDB 連線，並依是否可互動選擇輸入服務
    pub fn for_settings(settings: &Settings) -> Result<Self> {
        let engine = Arc::new(EngineConnectionManager::open_duckdb()?);
        let prompt: Arc<dyn PromptServiceTrait> = if settings.interactive {
            Arc::new(DialoguerPrompt::new(FormatRegistry::new()))
        } else {
            Arc::new(NonInteractivePrompt)
        };
        Ok(ConversionFacade::new(engine, prompt))
    }

    fn run(&self, settings: Settings) -> Result<ConversionOutput> {
        let manager = ConversionManager::create(&settings.input_path)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("convert-worker")
            .build()?;
        let ctx = ConversionContext::new(settings, self.engine.clone(), self.prompt.clone());
        let result = runtime.block_on(manager.run(&ctx));
        runtime.shutdown_background();
        result
    }
}

impl ConversionFacadeTrait for ConversionFacade {
    fn execute_conversion(&self, settings: Settings) -> Result<ConversionOutput> {
        info!("開始轉換，輸入路徑：{}", settings.input_path.display());
        let result = self.run(settings);

        // 不論成功與否都先關閉連線，再刪除暫存檔
        let cleanup = self.engine.shutdown();
        match (result, cleanup) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(output), Err(e)) => {
                warn!("轉換完成，但清理資源時發生錯誤：{}", e);
                Ok(output)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_error)) => {
                warn!("清理資源時發生錯誤：{}", cleanup_error);
                Err(e)
            }
        }
    }
}
