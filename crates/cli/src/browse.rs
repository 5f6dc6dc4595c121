//! Line-oriented folder browser.

use anyhow::{bail, Context};
use hopper_core::browser::Browser;
use hopper_core::preview::load_preview;
use providers::RemoteNode;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseCommand {
    List,
    Enter(String),
    Up,
    Crumb(usize),
    Refresh,
    Mkdir(String),
    Upload(String),
    Exclude(String),
    Delete(String),
    Preview(String),
    Help,
    Quit,
}

impl BrowseCommand {
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let arg = |what: &str| -> anyhow::Result<String> {
            if rest.is_empty() {
                bail!("{word} needs a {what}");
            }
            Ok(rest.to_string())
        };
        Ok(match word {
            "" | "ls" => BrowseCommand::List,
            "cd" if rest == ".." => BrowseCommand::Up,
            "cd" => BrowseCommand::Enter(arg("folder name")?),
            "up" => BrowseCommand::Up,
            "crumb" => BrowseCommand::Crumb(
                arg("breadcrumb index")?
                    .parse()
                    .context("breadcrumb index must be a number")?,
            ),
            "refresh" => BrowseCommand::Refresh,
            "mkdir" => BrowseCommand::Mkdir(arg("folder name")?),
            "put" | "upload" => BrowseCommand::Upload(arg("local path")?),
            "exclude" => BrowseCommand::Exclude(arg("file name")?),
            "rm" | "delete" => BrowseCommand::Delete(arg("file name")?),
            "cat" | "preview" => BrowseCommand::Preview(arg("file name")?),
            "help" | "?" => BrowseCommand::Help,
            "quit" | "exit" | "q" => BrowseCommand::Quit,
            other => bail!("unknown command: {other} (try `help`)"),
        })
    }
}

pub const HELP: &str = "\
ls                 list the current folder
cd <name> | cd ..  enter a folder / go up
up                 go up one level
crumb <i>          jump to breadcrumb i (0 is the root)
refresh            reload the listing
mkdir <name>       create a folder here
put <path>         upload a local file here
exclude <name>     move a file into _excluded
rm <name>          move a file into _deleted
cat <name>         preview a file
quit";

pub fn render_listing(browser: &Browser) -> String {
    let state = browser.state();
    let mut out = String::new();
    for (i, crumb) in state.breadcrumbs().crumbs().iter().enumerate() {
        if i > 0 {
            out.push_str(" / ");
        }
        out.push_str(&format!("[{i}] {}", crumb.name));
    }
    out.push('\n');
    if state.items().is_empty() {
        out.push_str("  (empty)\n");
    }
    for node in state.items() {
        let marker = if node.is_folder() { "d" } else { "-" };
        out.push_str(&format!("  {marker} {}\n", node.name));
    }
    out
}

fn file_named(browser: &Browser, name: &str) -> anyhow::Result<RemoteNode> {
    browser
        .state()
        .find_item(name)
        .filter(|n| !n.is_folder())
        .cloned()
        .with_context(|| format!("no file named {name} here"))
}

/// Runs one command. Returns false when the session should end.
pub async fn execute<W: Write>(
    browser: &mut Browser,
    command: BrowseCommand,
    out: &mut W,
) -> anyhow::Result<bool> {
    match command {
        BrowseCommand::Quit => return Ok(false),
        BrowseCommand::Help => writeln!(out, "{HELP}")?,
        BrowseCommand::List => write!(out, "{}", render_listing(browser))?,
        BrowseCommand::Enter(name) => {
            browser.enter_named(&name).await?;
            write!(out, "{}", render_listing(browser))?;
        }
        BrowseCommand::Up => {
            if !browser.up().await {
                writeln!(out, "already at the top")?;
            }
            write!(out, "{}", render_listing(browser))?;
        }
        BrowseCommand::Crumb(index) => {
            browser.jump(index).await;
            write!(out, "{}", render_listing(browser))?;
        }
        BrowseCommand::Refresh => {
            browser.refresh().await;
            write!(out, "{}", render_listing(browser))?;
        }
        BrowseCommand::Mkdir(name) => {
            browser.create_folder(&name).await?;
            writeln!(out, "created {name}")?;
        }
        BrowseCommand::Upload(path) => {
            let parent = browser.state().current_folder_id().to_string();
            let request = crate::upload::read_upload(Path::new(&path), &parent).await?;
            let node = browser.upload(request).await?;
            writeln!(out, "uploaded {} ({})", node.name, node.mime_type)?;
        }
        BrowseCommand::Exclude(name) => {
            let node = file_named(browser, &name)?;
            browser.exclude(&node.id).await?;
            writeln!(out, "excluded {name}")?;
        }
        BrowseCommand::Delete(name) => {
            let node = file_named(browser, &name)?;
            browser.delete(&node.id).await?;
            writeln!(out, "deleted {name}")?;
        }
        BrowseCommand::Preview(name) => {
            let node = file_named(browser, &name)?;
            let preview = load_preview(browser.directory(), &node).await;
            writeln!(out, "{}", preview.render())?;
        }
    }
    Ok(true)
}
