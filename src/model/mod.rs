//! 数据模型
//!
//! - `request`: 请求解码与类别
//! - `response`: 响应信封
//! - `result`: 分析结果与统计快照

mod request;
mod response;
mod result;

pub use request::{
    DecodeError, IP_LIST_LIMIT, Request, RequestCategory, is_empty_payload, parse_payload,
};
pub use response::{ResponseEnvelope, ResponseStatus, messages};
pub use result::{AnalysisResult, StatsSnapshot};
