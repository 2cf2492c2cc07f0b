pub mod logger;

pub use logger::trace_id::TraceId;
