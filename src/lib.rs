pub mod error;

pub mod service {
    pub mod adapters;
    pub mod config_service;
    pub mod engine;
    pub mod excel;
    pub mod format_registry;
    pub mod prompt;
    pub mod traits {
        pub mod i_service;
    }
}

pub mod config {
    pub mod config;
    pub mod ports;
}

pub mod action {
    pub mod cli;
    pub mod interactive;
}

pub mod facade {
    pub mod conversion_facade;
    pub mod conversion_manager;
    pub mod directory_manager;
    pub mod file_manager;
    pub mod traits {
        pub mod i_conversion;
    }
}

pub mod models {
    pub mod conversion;
    pub mod excel;
    pub mod format;
    pub mod task;
}

pub mod utils {
    pub mod convert;
    pub mod file;
    pub mod utils;
}
