//! 离线缓存层。
//!
//! - `store`   — 版本化磁盘仓库（整仓替换式失效）
//! - `gateway` — network-first / cache-first 策略网关

pub mod gateway;
pub mod store;
