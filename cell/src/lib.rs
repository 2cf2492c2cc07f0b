pub mod error;
pub mod instance;
#[cfg(feature = "test-support")]
pub mod mock;
pub mod resources;
pub mod view;
pub mod work;

pub use error::{CellError, RpcError};
pub use instance::{ActualLrpStop, Instance, StartSpec, TaskInstance, TaskSpec};
pub use resources::Resources;
pub use view::{CellView, StopBid};
pub use work::{CellClient, FailedWork, Work};
