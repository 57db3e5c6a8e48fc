use crate::config::ports::{ConversionPort, Settings};
use crate::error::Result;
use crate::facade::conversion_facade::ConversionFacade;
use crate::facade::traits::i_conversion::ConversionFacadeTrait;
use crate::models::conversion::ConversionOutput;

// 以 DuckDB 執行轉換的適配器
pub struct ConversionAdapter;

impl ConversionPort for ConversionAdapter {
    fn execute(&self, settings: Settings) -> Result<ConversionOutput> {
        let facade: Box<dyn ConversionFacadeTrait> = Box::new(ConversionFacade::for_settings(&settings)?);
        facade.execute_conversion(settings)
    }
}
