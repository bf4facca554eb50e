//! CLI 命令处理模块

pub mod common; // 公共工具函数
pub mod output;
pub mod pool; // 资源池管理
pub mod report;
pub mod scenario; // 场景编译和分发
pub mod shard;
