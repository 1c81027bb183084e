//! 路由/分页核心。
//!
//! 子模块：
//! - `toc`        — 目录模型与线性页号
//! - `route`      — 路由片段解析/格式化与内容路径
//! - `references` — 引用表（可选）
//! - `fragment`   — HTML 片段 → 终端文档与注释提取
//! - `router`     — 导航状态容器与渲染状态机

pub mod fragment;
pub mod references;
pub mod route;
pub mod router;
pub mod toc;
