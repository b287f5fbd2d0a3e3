//! # Dispatcher
//!
//! 触发分发模块。
//!
//! 负责：
//! - 持有有序的 sink 注册表 (注册顺序 = 分发顺序)
//! - 将同一个 `TriggerEvent` 依次 fan-out 到所有 sinks
//! - 隔离失败的 sink，汇总所有失败
//! - 通过 `SharedDispatcher` 串行化来自多个入口的分发

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod sinks;

pub use contracts::{TriggerEvent, TriggerSink};
pub use dispatcher::{
    DispatcherBuilder, DynTriggerSink, SharedDispatcher, TriggerDispatcher,
};
pub use error::{DispatcherError, SinkFailure};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use mock::{CallLog, MockSink};
pub use sinks::{AmplifierSink, BusMessage, DiagnosticSink, StreamBusSink, StreamInfo};
