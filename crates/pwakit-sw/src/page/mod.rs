//! Page-side collaborators of the worker: registration and update flow,
//! connectivity pill, install prompt.

mod install;
mod network;
mod update;

pub use install::{
    is_ios_installable, InstallCopy, InstallPrompt, InstallVisibility, DISMISSED_AT_KEY,
};
pub use network::{NetworkIndicator, PillState, OFFLINE_LABEL, ONLINE_LABEL};
pub use update::{PageAction, ReloadGuard, ServiceWorkerContext, UpdateToast};
