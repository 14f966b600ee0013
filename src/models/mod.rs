pub mod comic;
pub mod library;
pub mod progress;
pub mod snapshot;
pub mod status;

pub use comic::*;
pub use library::*;
pub use progress::*;
pub use snapshot::*;
pub use status::*;
