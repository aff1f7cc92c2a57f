//! FerryMail folder list - console front-end
//!
//! Reads gestures from stdin and prints what the screen asks the view to draw.

use anyhow::{bail, Context};
use ferrymail_core::{
    Account, Config, Database, Folder, FolderScope, Preferences, ProbeConnectivity, SyncEngine,
};
use ferrymail_folders::{FolderListScreen, FolderServices, Hint, ScreenEvent, ScreenHandle};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "usage: ferrymail-folders [--account <id> | --unified] [--demo]";

struct Args {
    scope: FolderScope,
    demo: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args {
        scope: FolderScope::Unified,
        demo: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--account" => {
                let id = args.next().context(USAGE)?;
                let id: i64 = id.parse().with_context(|| format!("bad account id {}", id))?;
                parsed.scope = FolderScope::from_account_id(id);
            }
            "--unified" => parsed.scope = FolderScope::Unified,
            "--demo" => parsed.demo = true,
            other => bail!("unknown argument {}\n{}", other, USAGE),
        }
    }

    Ok(parsed)
}

/// Two accounts, one of them on-demand, and a hidden folder
async fn seed_demo(db: &Database) -> anyhow::Result<()> {
    let work = db.upsert_account(&Account::new(0, "Work")).await?;
    let mut home = Account::new(0, "Home");
    home.on_demand = true;
    let home = db.upsert_account(&home).await?;

    for account in [work, home] {
        db.upsert_folder(&Folder::new(account, "INBOX")).await?;
        db.upsert_folder(&Folder::new(account, "Sent")).await?;
        let mut junk = Folder::new(account, "Junk");
        junk.hide = true;
        db.upsert_folder(&junk).await?;
    }

    Ok(())
}

fn print_event(event: &ScreenEvent) {
    match event {
        ScreenEvent::SubtitleChanged(Some(subtitle)) => println!("== {} ==", subtitle),
        ScreenEvent::SubtitleChanged(None) => println!("== ? =="),
        ScreenEvent::CreateFolderVisible(visible) => {
            if *visible {
                println!("[new] create a folder");
            }
        }
        ScreenEvent::HintVisible { hint, visible } => {
            if *visible {
                match hint {
                    Hint::Actions => {
                        println!("hint: long press a folder for more actions ('dismiss actions')")
                    }
                    Hint::Sync => {
                        println!("hint: only enabled folders are synchronized ('dismiss sync')")
                    }
                }
            }
        }
        ScreenEvent::ListChanged(rows) => {
            for row in rows {
                let account = row
                    .account_name
                    .as_deref()
                    .map(|name| format!("{}: ", name))
                    .unwrap_or_default();
                let flags = format!(
                    "{}{}",
                    if row.hidden { " (hidden)" } else { "" },
                    if row.pending_operations > 0 { " (queued)" } else { "" },
                );
                println!(
                    "  {}{} {}/{}{}",
                    account, row.name, row.unread_count, row.message_count, flags
                );
            }
        }
        ScreenEvent::Ready => println!("ready"),
        ScreenEvent::MenuChanged(Some(item)) => println!("menu: '{}' ('toggle')", item.title),
        ScreenEvent::MenuChanged(None) => {}
        ScreenEvent::Refreshing(refreshing) => {
            if *refreshing {
                println!("refreshing...");
            }
        }
        ScreenEvent::Notice(notice) => println!("! {}", notice),
        ScreenEvent::UnexpectedError(message) => eprintln!("error: {}", message),
        ScreenEvent::OpenFolderEditor { account_id } => {
            println!("(would open the folder editor for account {})", account_id)
        }
        ScreenEvent::Finished => println!("folder list closed"),
    }
}

/// Returns `false` when the user asked to quit
fn dispatch(handle: &ScreenHandle, line: &str) -> bool {
    match line {
        "refresh" | "r" => {
            handle.refresh();
        }
        "toggle" | "t" => {
            handle.toggle_hidden();
        }
        "new" => {
            handle.create_folder();
        }
        "dismiss actions" => {
            handle.dismiss_hint(Hint::Actions);
        }
        "dismiss sync" => {
            handle.dismiss_hint(Hint::Sync);
        }
        "quit" | "q" => return false,
        "" => {}
        other => eprintln!(
            "unknown command {:?} (refresh, toggle, new, dismiss actions|sync, quit)",
            other
        ),
    }
    true
}

/// Feed input lines to the screen until the user quits or the screen closes itself
async fn drive<R>(
    handle: &ScreenHandle,
    mut screen_task: JoinHandle<()>,
    input: R,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let screen_closed = loop {
        tokio::select! {
            result = &mut screen_task => {
                result?;
                break true;
            }
            line = lines.next_line() => match line? {
                Some(line) if dispatch(handle, line.trim()) => {}
                _ => break false,
            },
        }
    };

    if !screen_closed {
        handle.close();
        screen_task.await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("Starting FerryMail folder list");

    let args = parse_args(std::env::args().skip(1))?;

    let db = if args.demo {
        let db = Database::open_memory().await?;
        seed_demo(&db).await?;
        db
    } else {
        Database::open(&config.database_path).await?
    };
    let db = Arc::new(db);

    let (sync, mut sync_events, sync_task) = SyncEngine::spawn(Arc::clone(&db));
    tokio::spawn(async move {
        while let Some(event) = sync_events.recv().await {
            tracing::debug!("Sync event: {:?}", event);
        }
    });

    let prefs = if args.demo {
        Preferences::in_memory()
    } else {
        Preferences::load(&config.preferences_path)?
    };

    let services = FolderServices {
        db,
        sync: Arc::new(sync.clone()),
        connectivity: Arc::new(ProbeConnectivity::new(
            config.probe_address.clone(),
            config.probe_timeout(),
        )),
        prefs: Arc::new(prefs),
    };

    let (screen, handle, mut events) = FolderListScreen::new(args.scope, services, None);
    let screen_task = tokio::spawn(screen.run());
    let view_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    drive(&handle, screen_task, BufReader::new(tokio::io::stdin())).await?;
    view_task.await?;

    sync.shutdown().await.ok();
    sync_task.await?;

    tracing::info!("FerryMail folder list stopped");
    Ok(())
}
