//! One-time hint banners

use ferrymail_core::{CoreResult, Preferences};

/// A banner shown until the user dismisses it once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hint {
    /// Long-press a folder for more actions
    Actions,
    /// Folders must be enabled to be synchronized
    Sync,
}

impl Hint {
    pub const ALL: [Hint; 2] = [Hint::Actions, Hint::Sync];

    /// Preference flag recording that the hint was dismissed
    pub fn preference_key(self) -> &'static str {
        match self {
            Hint::Actions => "folder_actions",
            Hint::Sync => "folder_sync",
        }
    }

    pub fn is_visible(self, prefs: &Preferences) -> bool {
        !prefs.get_bool(self.preference_key(), false)
    }

    pub fn dismiss(self, prefs: &Preferences) -> CoreResult<()> {
        prefs.put_bool(self.preference_key(), true)
    }
}
