//! Folder list screen for FerryMail
//!
//! Shows the folders of one account or of all accounts, lets the user pull to
//! refresh them and toggle hidden folders.

pub mod adapter;
mod error;
pub mod hidden;
pub mod hints;
pub mod refresh;
pub mod screen;
pub mod task;

pub use adapter::{FolderListModel, FolderRow};
pub use error::{RefreshError, TaskError};
pub use hidden::{HiddenFolders, MenuItem};
pub use hints::Hint;
pub use refresh::{refresh_folders, RefreshPlan};
pub use screen::{
    FolderListScreen, FolderServices, Notice, Phase, SavedState, ScreenEvent, ScreenHandle,
    ScreenInput, Subtitle,
};
pub use task::TaskRunner;
