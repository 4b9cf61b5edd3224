mod check;
mod dump;
mod resolve;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Subcommand;
use trellis_conf::Settings;

use crate::args::Args;
use crate::exit::Exit;

pub trait Command {
    fn execute(&self, args: &Args) -> Result<Exit>;
}

#[derive(Debug, Subcommand)]
pub enum TrellisCommand {
    /// Parse markup files and report every file that fails
    Check(self::check::Check),
    /// Print the element sequence of one markup file
    Dump(self::dump::Dump),
    /// Resolve a view's markup through the cache, merging inherited markup
    Resolve(self::resolve::Resolve),
}

impl Command for TrellisCommand {
    fn execute(&self, args: &Args) -> Result<Exit> {
        match self {
            Self::Check(cmd) => cmd.execute(args),
            Self::Dump(cmd) => cmd.execute(args),
            Self::Resolve(cmd) => cmd.execute(args),
        }
    }
}

fn resolve_project_root() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| anyhow::anyhow!("Current directory is not valid UTF-8"))
}

fn load_settings(project_root: &Utf8Path) -> Result<Settings> {
    Settings::new(project_root.as_std_path()).context("Failed to load settings")
}

/// Whether the project settings ask for debug logging. Settings that fail to
/// load are reported by the command itself.
pub fn debug_requested() -> bool {
    resolve_project_root()
        .and_then(|root| load_settings(&root))
        .is_ok_and(|settings| settings.debug)
}

fn absolutize(project_root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_relative() {
        project_root.join(path)
    } else {
        path.to_owned()
    }
}
