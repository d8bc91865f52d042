pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod registry;
pub mod worker;

pub use config::LeakyConfig;
pub use error::{EventBusError, LabelError, LeakyError, Result};
pub use events::{log_events, EventBus, EventFilter, EventReceiver, LifecycleEvent};
pub use host::{DestroyReason, HostController, HostEnvironment, Pattern, SavedState};
pub use registry::{ActiveWorkers, WorkerDescriptor, WorkerRegistry};
pub use worker::{
    BindingKind, HostContext, InterruptPolicy, LabelStatus, LifecycleBinding, LoopKind, Worker,
    WorkerBuilder, WorkerHandle, WorkerId, WorkerLabel, WorkerState,
};
