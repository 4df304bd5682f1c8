use std::sync::LazyLock;

pub use crate::logger::{LogCallback, LogLevel, Logger};

pub static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase/app"));
