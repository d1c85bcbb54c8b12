//! GeoIP 服务模块
//!
//! - `provider`: 查询 trait 与可热替换的 reader 槽位
//! - `maxmind`: MaxMind GeoLite2 City 数据库实现

mod maxmind;
mod provider;

pub use maxmind::MaxMindReader;
pub use provider::{GeoReader, LoadedReader, ReaderSlot, UNINITIALIZED_READER};
