//! Task runtime, event data model and the multi-schedule event loop.

pub mod event;
pub mod processor;
pub mod source;
pub mod task;

pub use event::{Event, EventId, ModuleDescription};
pub use processor::{EventProcessor, Module, ModuleContext, RunSummary};
pub use source::{EventSource, QueueSource};
pub use task::{current_task_id, TaskHandle, TaskPool};
