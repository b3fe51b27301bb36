//! Resource governance: dispatch, maintenance passes, and the governor
//! actor that ties them to memory pressure.

pub mod dispatch;
pub mod flatten;
pub mod governor;
pub mod model_gc;
pub mod purge;
pub mod stats;

pub use dispatch::ChangeDispatcher;
pub use governor::{
    Governor, GovernorConfig, GovernorCore, GovernorEvent, GovernorHandle, GovernorHandler,
    LoggingHandler, NoopHandler,
};
pub use stats::Stats;
