//! Rows of the folder list

use ferrymail_core::{FolderScope, FolderSummary};

/// One displayed folder
#[derive(Debug, Clone, PartialEq)]
pub struct FolderRow {
    pub folder_id: i64,
    pub account_id: i64,
    pub name: String,
    /// Only set in the unified view, where folders of several accounts mix
    pub account_name: Option<String>,
    pub folder_type: String,
    pub unread_count: i64,
    pub message_count: i64,
    pub hidden: bool,
    pub syncing: bool,
    pub pending_operations: i64,
}

/// Backing model of the folder list
///
/// Keeps the last folder set and derives the visible rows from it.
#[derive(Debug, Clone)]
pub struct FolderListModel {
    scope: FolderScope,
    show_all: bool,
    folders: Vec<FolderSummary>,
    rows: Vec<FolderRow>,
}

impl FolderListModel {
    pub fn new(scope: FolderScope) -> Self {
        Self {
            scope,
            show_all: true,
            folders: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn set(&mut self, show_all: bool, folders: Vec<FolderSummary>) {
        self.show_all = show_all;
        self.folders = folders;
        self.rebuild();
    }

    pub fn show_hidden(&mut self, show_all: bool) {
        if self.show_all != show_all {
            self.show_all = show_all;
            self.rebuild();
        }
    }

    pub fn rows(&self) -> &[FolderRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn rebuild(&mut self) {
        let unified = self.scope == FolderScope::Unified;
        self.rows = self
            .folders
            .iter()
            .filter(|summary| self.show_all || !summary.folder.hide)
            .map(|summary| FolderRow {
                folder_id: summary.folder.id,
                account_id: summary.folder.account_id,
                name: summary.folder.name.clone(),
                account_name: unified.then(|| summary.account_name.clone()),
                folder_type: summary.folder.folder_type.clone(),
                unread_count: summary.folder.unread_count,
                message_count: summary.folder.message_count,
                hidden: summary.folder.hide,
                syncing: summary.folder.sync_state.is_some(),
                pending_operations: summary.pending_operations,
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrymail_core::Folder;

    fn summary(id: i64, name: &str, hide: bool) -> FolderSummary {
        let mut folder = Folder::new(1, name);
        folder.id = id;
        folder.hide = hide;
        FolderSummary {
            folder,
            account_name: "Work".to_string(),
            pending_operations: 0,
        }
    }

    #[test]
    fn test_hidden_folders_filtered() {
        let mut model = FolderListModel::new(FolderScope::Account(1));
        model.set(false, vec![summary(1, "INBOX", false), summary(2, "Junk", true)]);
        assert_eq!(model.len(), 1);
        assert_eq!(model.rows()[0].name, "INBOX");
        assert_eq!(model.rows()[0].account_name, None);

        model.show_hidden(true);
        assert_eq!(model.len(), 2);
        assert!(model.rows()[1].hidden);
    }

    #[test]
    fn test_unified_rows_carry_account() {
        let mut model = FolderListModel::new(FolderScope::Unified);
        model.set(true, vec![summary(1, "INBOX", false)]);
        assert_eq!(model.rows()[0].account_name.as_deref(), Some("Work"));
    }

    #[test]
    fn test_keeps_query_order() {
        let mut model = FolderListModel::new(FolderScope::Account(1));
        model.set(true, vec![summary(3, "Zeta", false), summary(1, "Alpha", false)]);
        let ids: Vec<_> = model.rows().iter().map(|r| r.folder_id).collect();
        assert_eq!(ids, vec![3, 1]);
    }
}
