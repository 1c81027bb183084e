//! 基础设施：配置、日志、本地偏好。

pub mod config;
pub mod logging;
pub mod prefs;
