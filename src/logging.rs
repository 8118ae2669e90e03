//! Logger setup
//!
//! A log4rs YAML file takes precedence; without one, env_logger reads
//! `RUST_LOG` and defaults to `info`.

use log::{info, warn};
use std::path::Path;

pub fn init(config_file: &Path) {
    if config_file.exists() {
        match log4rs::init_file(config_file, Default::default()) {
            Ok(()) => {
                info!("Logging configured from {}", config_file.display());
                return;
            }
            Err(e) => {
                init_env_logger();
                warn!("Ignoring log config {}: {}", config_file.display(), e);
                return;
            }
        }
    }
    init_env_logger();
}

fn init_env_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
