mod builder;
mod handle;
mod label;
mod shared;
mod types;


pub use builder::{Worker, WorkerBuilder};
pub use handle::WorkerHandle;
pub use label::{LabelStatus, WorkerLabel};
pub(crate) use shared::WorkerShared;
pub use types::{
    BindingKind, HostContext, InterruptPolicy, LifecycleBinding, LoopKind, WorkerId, WorkerState,
};
