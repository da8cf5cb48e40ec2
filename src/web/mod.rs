//! 状态查询接口模块
//!
//! 通过HTTP提供端点列表、状态快照和最近输出

pub mod api;
pub mod server;

pub use server::WebServer;
