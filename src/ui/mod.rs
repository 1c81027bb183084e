//! 交互层入口。

pub mod tui;
