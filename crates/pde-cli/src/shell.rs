//! Line-oriented interactive session.
//!
//! Mirrors the actions of a desktop front end: pick a folder or file, then
//! protect it to a level; protect or unprotect text. Errors are reported
//! and the session continues.

use anyhow::Result;
use pde_core::{MemorySink, PdeError, PdeSettings, ProtectionLevel, Session};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  select-folder <path>      choose the folder to act on
  select-file <path>        choose the file to act on
  folder [level]            protect the selected folder and its contents
  file [level]              protect the selected file
  unprotect-folder          remove protection from the selected folder tree
  unprotect-file            remove protection from the selected file
  protect [level] <text>    protect text, printing a token
  unprotect <token>         recover text from a token
  status                    show data availability
  lock | unlock | reboot    drive the emulated device
  output                    show the last token or text
  history [n]               show the last n log lines, newest first
  help | quit";

pub async fn run(session: &mut Session, settings: &PdeSettings, history: &MemorySink) -> Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };
        if matches!(command, "quit" | "exit") {
            break;
        }
        if let Err(err) = dispatch(session, settings, history, command, rest).await {
            // not-enabled and usage problems are already in the activity log
            if !matches!(err, PdeError::NotEnabled) && !err.is_usage() {
                eprintln!("error: {err}");
            }
        }
        session.log().flush().await;
    }
    Ok(())
}

async fn dispatch(
    session: &mut Session,
    settings: &PdeSettings,
    history: &MemorySink,
    command: &str,
    rest: &str,
) -> pde_core::Result<()> {
    match command {
        "help" => println!("{HELP}"),
        "select-folder" => session.select_folder(rest)?,
        "select-file" => session.select_file(rest)?,
        "folder" => {
            let level = level_arg(rest, settings)?;
            if let Some(report) = session.protect_selected_folder(level).await? {
                session.log().line(format!(
                    "Folder protection finished: {} of {} items protected",
                    report.succeeded, report.attempted
                ));
            }
        }
        "file" => {
            let level = level_arg(rest, settings)?;
            session.protect_selected_file(level).await?;
        }
        "unprotect-folder" => {
            session
                .protect_selected_folder(ProtectionLevel::Always)
                .await?;
        }
        "unprotect-file" => {
            session.protect_selected_file(ProtectionLevel::Always).await?;
        }
        "protect" => {
            let (level, text) = split_level(rest, settings);
            session.protect_buffer(text, level).await?;
        }
        "unprotect" => {
            session.unprotect_buffer(rest).await?;
        }
        "status" => session.log_availability()?,
        "lock" | "unlock" | "reboot" => match &session.backend().emulated {
            Some(device) => match command {
                "lock" => device.lock(),
                "unlock" => device.unlock(),
                _ => device.reboot(),
            },
            None => println!("{command} is only available with --backend emulated"),
        },
        "output" => println!("{}", session.output().unwrap_or("")),
        "history" => {
            let n = rest.parse().unwrap_or(20);
            for line in history.lines().iter().take(n) {
                println!("{}", line.render());
            }
        }
        other => println!("unknown command '{other}', try 'help'"),
    }
    Ok(())
}

fn level_arg(rest: &str, settings: &PdeSettings) -> pde_core::Result<ProtectionLevel> {
    if rest.is_empty() {
        Ok(settings.default_level)
    } else {
        rest.parse()
    }
}

/// A leading word that names a level selects it; everything else is text.
fn split_level<'a>(rest: &'a str, settings: &PdeSettings) -> (ProtectionLevel, &'a str) {
    if let Some((first, text)) = rest.split_once(char::is_whitespace) {
        if let Ok(level) = first.parse::<ProtectionLevel>() {
            return (level, text.trim_start());
        }
    }
    (settings.default_level, rest)
}
