//! Folder list screen
//!
//! All screen state lives in [`FolderListScreen`] and is only touched from its
//! own loop. Gestures, live query updates and background task completions all
//! arrive as [`ScreenInput`]s; what the view has to redraw leaves as
//! [`ScreenEvent`]s.

use crate::adapter::{FolderListModel, FolderRow};
use crate::hidden::{HiddenFolders, MenuItem};
use crate::hints::Hint;
use crate::refresh::refresh_folders;
use crate::task::TaskRunner;
use crate::{RefreshError, TaskError};
use ferrymail_core::{
    Account, Connectivity, Database, FolderScope, FolderSummary, LiveEvent, Preferences,
    Subscription, SyncService,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Key of the refresh task
pub const REFRESH_TASK: &str = "folders:refresh";

/// Collaborators of the screen
#[derive(Clone)]
pub struct FolderServices {
    pub db: Arc<Database>,
    pub sync: Arc<dyn SyncService>,
    pub connectivity: Arc<dyn Connectivity>,
    pub prefs: Arc<Preferences>,
}

/// State carried over when the screen is recreated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SavedState {
    pub hidden_folders: HiddenFolders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the first folder list
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subtitle {
    Unified,
    Account(String),
}

impl fmt::Display for Subtitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subtitle::Unified => write!(f, "Unified folders"),
            Subtitle::Account(name) => write!(f, "{}", name),
        }
    }
}

/// Transient message for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Synchronization was queued and happens once the account connects
    SyncDelayed,
    NoInternet,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SyncDelayed => write!(f, "Synchronization will happen on next connection"),
            Notice::NoInternet => write!(f, "No internet connection"),
        }
    }
}

/// Everything the screen reacts to
#[derive(Debug)]
pub enum ScreenInput {
    AccountChanged(Option<Account>),
    FoldersChanged(Vec<FolderSummary>),
    /// The folder list went away, e.g. its account was deleted
    FoldersClosed,
    Refresh,
    RefreshFinished(Result<bool, TaskError<RefreshError>>),
    ToggleHidden,
    DismissHint(Hint),
    CreateFolder,
    Close,
}

/// Changes the view has to apply
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    SubtitleChanged(Option<Subtitle>),
    CreateFolderVisible(bool),
    HintVisible { hint: Hint, visible: bool },
    ListChanged(Vec<FolderRow>),
    /// First folder list arrived, swap the progress indicator for the list
    Ready,
    /// Redraw the menu; `None` hides the show/hide hidden folders entry
    MenuChanged(Option<MenuItem>),
    Refreshing(bool),
    Notice(Notice),
    UnexpectedError(String),
    OpenFolderEditor { account_id: i64 },
    /// The screen closed itself
    Finished,
}

/// Sends user gestures to a running screen
#[derive(Debug, Clone)]
pub struct ScreenHandle {
    input_tx: mpsc::UnboundedSender<ScreenInput>,
}

impl ScreenHandle {
    /// Returns `false` once the screen is gone
    pub fn send(&self, input: ScreenInput) -> bool {
        self.input_tx.send(input).is_ok()
    }

    pub fn refresh(&self) -> bool {
        self.send(ScreenInput::Refresh)
    }

    pub fn toggle_hidden(&self) -> bool {
        self.send(ScreenInput::ToggleHidden)
    }

    pub fn dismiss_hint(&self, hint: Hint) -> bool {
        self.send(ScreenInput::DismissHint(hint))
    }

    pub fn create_folder(&self) -> bool {
        self.send(ScreenInput::CreateFolder)
    }

    pub fn close(&self) -> bool {
        self.send(ScreenInput::Close)
    }
}

pub struct FolderListScreen {
    scope: FolderScope,
    services: FolderServices,
    hidden: HiddenFolders,
    has_hidden: bool,
    /// Whether `hidden` came from a saved state and the menu needs a redraw
    restored: bool,
    phase: Phase,
    model: FolderListModel,
    create_folder_visible: bool,
    refreshing: bool,
    finished: bool,
    input_tx: mpsc::UnboundedSender<ScreenInput>,
    input_rx: mpsc::UnboundedReceiver<ScreenInput>,
    events: mpsc::UnboundedSender<ScreenEvent>,
    runner: TaskRunner<ScreenInput>,
    subscriptions: Vec<Subscription>,
}

impl FolderListScreen {
    /// Create a screen in its loading state
    ///
    /// Returns the screen, a handle for user gestures and the stream of view changes.
    pub fn new(
        scope: FolderScope,
        services: FolderServices,
        saved: Option<SavedState>,
    ) -> (Self, ScreenHandle, mpsc::UnboundedReceiver<ScreenEvent>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let screen = Self {
            scope,
            services,
            hidden: saved.map(|s| s.hidden_folders).unwrap_or_default(),
            has_hidden: false,
            restored: saved.is_some(),
            phase: Phase::Loading,
            model: FolderListModel::new(scope),
            create_folder_visible: false,
            refreshing: false,
            finished: false,
            runner: TaskRunner::new(input_tx.clone()),
            input_tx: input_tx.clone(),
            input_rx,
            events,
            subscriptions: Vec::new(),
        };

        (screen, ScreenHandle { input_tx }, events_rx)
    }

    /// Run until closed or until the folder list goes away
    pub async fn run(mut self) {
        info!("Folder list for {:?} started", self.scope);
        self.activate();

        while !self.finished {
            match self.input_rx.recv().await {
                Some(input) => self.handle(input),
                None => break,
            }
        }

        self.teardown();
        info!("Folder list for {:?} stopped", self.scope);
    }

    /// Show the initial state and start observing the database
    pub fn activate(&mut self) {
        if self.restored {
            self.invalidate_menu();
        }

        for hint in Hint::ALL {
            let visible = hint.is_visible(&self.services.prefs);
            self.emit(ScreenEvent::HintVisible { hint, visible });
        }
        self.emit(ScreenEvent::CreateFolderVisible(false));

        match self.scope {
            FolderScope::Unified => {
                self.emit(ScreenEvent::SubtitleChanged(Some(Subtitle::Unified)));
            }
            FolderScope::Account(account_id) => {
                let tx = self.input_tx.clone();
                let observer = move |event: LiveEvent<Option<Account>>| {
                    let account = match event {
                        LiveEvent::Changed(account) => account,
                        LiveEvent::Closed => None,
                    };
                    let _ = tx.send(ScreenInput::AccountChanged(account));
                };
                let subscription = self.services.db.live_account(account_id, observer);
                self.subscriptions.push(subscription);
            }
        }

        let tx = self.input_tx.clone();
        let observer = move |event: LiveEvent<Vec<FolderSummary>>| {
            let input = match event {
                LiveEvent::Changed(folders) => ScreenInput::FoldersChanged(folders),
                LiveEvent::Closed => ScreenInput::FoldersClosed,
            };
            let _ = tx.send(input);
        };
        let subscription = self.services.db.live_folders(self.scope, observer);
        self.subscriptions.push(subscription);
    }

    pub fn handle(&mut self, input: ScreenInput) {
        match input {
            ScreenInput::AccountChanged(account) => self.on_account_changed(account),
            ScreenInput::FoldersChanged(folders) => self.on_folders_changed(folders),
            ScreenInput::FoldersClosed => {
                info!("Folder list for {:?} went away, closing", self.scope);
                self.emit(ScreenEvent::Finished);
                self.finished = true;
            }
            ScreenInput::Refresh => self.on_refresh(),
            ScreenInput::RefreshFinished(result) => self.on_refresh_finished(result),
            ScreenInput::ToggleHidden => self.on_toggle_hidden(),
            ScreenInput::DismissHint(hint) => self.on_dismiss_hint(hint),
            ScreenInput::CreateFolder => self.on_create_folder(),
            ScreenInput::Close => self.finished = true,
        }
    }

    fn on_account_changed(&mut self, account: Option<Account>) {
        self.create_folder_visible = account.is_some();
        self.emit(ScreenEvent::SubtitleChanged(
            account.map(|a| Subtitle::Account(a.name)),
        ));
        self.emit(ScreenEvent::CreateFolderVisible(self.create_folder_visible));
    }

    fn on_folders_changed(&mut self, folders: Vec<FolderSummary>) {
        self.has_hidden = folders.iter().any(|summary| summary.folder.hide);
        if self.hidden.update(self.has_hidden) {
            self.invalidate_menu();
        }

        self.model.set(self.hidden.show_all(), folders);
        self.emit(ScreenEvent::ListChanged(self.model.rows().to_vec()));

        if self.phase == Phase::Loading {
            self.phase = Phase::Ready;
            self.emit(ScreenEvent::Ready);
        }
    }

    fn on_refresh(&mut self) {
        let FolderServices {
            db,
            sync,
            connectivity,
            ..
        } = self.services.clone();
        let scope = self.scope;

        let work = async move {
            refresh_folders(&db, sync.as_ref(), connectivity.as_ref(), scope).await
        };
        if self
            .runner
            .execute(REFRESH_TASK, work, ScreenInput::RefreshFinished)
        {
            debug!("Refreshing {:?}", scope);
            self.refreshing = true;
            self.emit(ScreenEvent::Refreshing(true));
        }
    }

    fn on_refresh_finished(&mut self, result: Result<bool, TaskError<RefreshError>>) {
        self.runner.finished(REFRESH_TASK);
        self.refreshing = false;
        self.emit(ScreenEvent::Refreshing(false));

        match result {
            Ok(true) => {}
            Ok(false) => self.emit(ScreenEvent::Notice(Notice::SyncDelayed)),
            Err(TaskError::Failed(RefreshError::NoInternet)) => {
                self.emit(ScreenEvent::Notice(Notice::NoInternet))
            }
            Err(e) => {
                error!("Refresh of {:?} failed: {}", self.scope, e);
                self.emit(ScreenEvent::UnexpectedError(e.to_string()));
            }
        }
    }

    fn on_toggle_hidden(&mut self) {
        if !self.has_hidden {
            debug!("No hidden folders, nothing to toggle");
            return;
        }

        self.hidden.toggle();
        self.invalidate_menu();
        self.model.show_hidden(self.hidden.show_all());
        self.emit(ScreenEvent::ListChanged(self.model.rows().to_vec()));
    }

    fn on_dismiss_hint(&mut self, hint: Hint) {
        if let Err(e) = hint.dismiss(&self.services.prefs) {
            warn!("Failed to remember dismissed hint {:?}: {}", hint, e);
        }
        self.emit(ScreenEvent::HintVisible {
            hint,
            visible: false,
        });
    }

    fn on_create_folder(&mut self) {
        match self.scope {
            FolderScope::Account(account_id) if self.create_folder_visible => {
                self.emit(ScreenEvent::OpenFolderEditor { account_id });
            }
            _ => debug!("Create folder is not available for {:?}", self.scope),
        }
    }

    fn invalidate_menu(&self) {
        self.emit(ScreenEvent::MenuChanged(self.menu()));
    }

    fn emit(&self, event: ScreenEvent) {
        if self.events.send(event).is_err() {
            debug!("Screen event dropped, view is gone");
        }
    }

    fn teardown(&mut self) {
        self.subscriptions.clear();
        self.runner.cancel_all();
    }

    /// The show/hide hidden folders entry, `None` when not shown
    pub fn menu(&self) -> Option<MenuItem> {
        self.hidden.menu_item()
    }

    pub fn save_state(&self) -> SavedState {
        SavedState {
            hidden_folders: self.hidden,
        }
    }

    pub fn scope(&self) -> FolderScope {
        self.scope
    }

    pub fn hidden_folders(&self) -> HiddenFolders {
        self.hidden
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn model(&self) -> &FolderListModel {
        &self.model
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn is_create_folder_visible(&self) -> bool {
        self.create_folder_visible
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
