//! Visibility of hidden folders

use serde::{Deserialize, Serialize};

/// Whether folders flagged as hidden are listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HiddenFolders {
    /// The current folder set has no hidden folders
    #[default]
    NotApplicable,
    /// Hidden folders are filtered out
    Hidden,
    /// Hidden folders are listed too
    Visible,
}

/// The show/hide menu entry as it should be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub title: &'static str,
    pub icon: &'static str,
}

impl HiddenFolders {
    /// Follow a new folder set; returns whether the state changed
    pub fn update(&mut self, has_hidden: bool) -> bool {
        let next = match (*self, has_hidden) {
            (HiddenFolders::NotApplicable, true) => HiddenFolders::Hidden,
            (_, false) => HiddenFolders::NotApplicable,
            (current, true) => current,
        };
        let changed = next != *self;
        *self = next;
        changed
    }

    pub fn toggle(&mut self) {
        *self = match *self {
            HiddenFolders::NotApplicable | HiddenFolders::Visible => HiddenFolders::Hidden,
            HiddenFolders::Hidden => HiddenFolders::Visible,
        };
    }

    /// Whether the list shows every folder
    pub fn show_all(self) -> bool {
        self != HiddenFolders::Hidden
    }

    /// The toggle entry, `None` when it is not shown at all
    pub fn menu_item(self) -> Option<MenuItem> {
        match self {
            HiddenFolders::NotApplicable => None,
            HiddenFolders::Hidden => Some(MenuItem {
                title: "Show hidden folders",
                icon: "visibility",
            }),
            HiddenFolders::Visible => Some(MenuItem {
                title: "Hide hidden folders",
                icon: "visibility_off",
            }),
        }
    }
}
