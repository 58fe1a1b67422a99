//! 网络请求层。

pub mod network;
