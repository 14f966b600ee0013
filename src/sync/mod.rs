pub mod connectivity;
pub mod device;
pub mod http_client;
pub mod progress;
pub mod remote;
pub mod scheduler;
pub mod status;

pub use connectivity::Connectivity;
pub use device::{DeviceSync, HttpDeviceSync, NoopDeviceSync, SyncError, SyncResult};
pub use progress::ProgressSyncController;
pub use remote::{HttpStatusRemote, StatusRemote};
pub use status::StatusSyncController;
