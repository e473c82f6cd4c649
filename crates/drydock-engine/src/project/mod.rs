//! Project synchronization, change detection, and change application.

pub mod apply;
pub mod detect;
pub mod diff;
pub mod ignore;
pub mod sync;

pub use apply::{apply, ApplyFailure, ApplyReport};
pub use detect::detect;
pub use ignore::IgnoreSet;
pub use sync::{attach, snapshot, SyncReport};
