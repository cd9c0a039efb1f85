use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::lanes::GroupBy;
use crate::sort::{SortField, SortOrder, SortState};
use crate::task::{Assignee, Priority, Status};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskboard",
    version,
    about = "Task board with undo, autosave and bulk edits",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "boardrc")]
    pub boardrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add(AddArgs),
    /// Show the board, filtered, sorted and grouped.
    List(ListArgs),
    /// Move tasks to another status.
    Move {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Status>()))]
        status: Status,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete tasks.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Add or remove a label on several tasks.
    Label {
        #[command(subcommand)]
        action: LabelCommand,
    },
    /// Edit one task's fields.
    Edit(EditArgs),
    /// Turn calendar mirroring on or off for one task.
    Calendar {
        #[command(subcommand)]
        action: CalendarCommand,
    },
    /// Show one task in detail.
    Show { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CalendarCommand {
    On { id: String },
    Off { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LabelCommand {
    Add {
        name: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Remove {
        name: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub due: Option<String>,

    #[arg(long = "label", action = ArgAction::Append)]
    pub labels: Vec<String>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(parse_assignee))]
    pub assignee: Option<Assignee>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long = "label", action = ArgAction::Append)]
    pub labels: Vec<String>,

    #[arg(long = "no-label")]
    pub no_label: bool,

    #[arg(long, conflicts_with = "unassigned")]
    pub assignee: Option<String>,

    #[arg(long)]
    pub unassigned: bool,

    #[arg(long, value_enum, conflicts_with_all = ["from", "to"])]
    pub due: Option<DueArg>,

    #[arg(long)]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,

    #[arg(
        long = "priority",
        action = ArgAction::Append,
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>())
    )]
    pub priorities: Vec<Priority>,

    #[arg(long, value_enum, default_value_t = SortArg::Created)]
    pub sort: SortArg,

    #[arg(long, conflicts_with = "desc")]
    pub asc: bool,

    #[arg(long)]
    pub desc: bool,

    #[arg(long, value_enum, default_value_t = GroupArg::None)]
    pub group: GroupArg,
}

impl ListArgs {
    pub fn sort_state(&self) -> SortState {
        let field = match self.sort {
            SortArg::Created => SortField::Created,
            SortArg::Due => SortField::Due,
            SortArg::Priority => SortField::Priority,
        };
        let order = if self.asc {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        };
        SortState::new(field, order)
    }

    pub fn group_by(&self) -> GroupBy {
        match self.group {
            GroupArg::None => GroupBy::None,
            GroupArg::Assignee => GroupBy::Assignee,
            GroupArg::Priority => GroupBy::Priority,
            GroupArg::Label => GroupBy::Label,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long = "clear-due")]
    pub clear_due: bool,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueArg {
    Overdue,
    Today,
    Next7,
    None,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortArg {
    #[default]
    Created,
    Due,
    Priority,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupArg {
    #[default]
    None,
    Assignee,
    Priority,
    Label,
}

/// `ID:NAME`; a bare value is used for both.
pub fn parse_assignee(raw: &str) -> anyhow::Result<Assignee> {
    let (id, name) = match raw.split_once(':') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (raw.trim(), raw.trim()),
    };
    if id.is_empty() || name.is_empty() {
        return Err(anyhow!("expected ID:NAME for assignee, got: {raw}"));
    }
    Ok(Assignee {
        id: id.to_string(),
        name: name.to_string(),
    })
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of
/// the argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GlobalCli {
        let raw: Vec<OsString> = std::iter::once("taskboard")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).unwrap();
        GlobalCli::try_parse_from(pre.cleaned_args).unwrap()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let raw: Vec<OsString> = ["taskboard", "rc.color=off", "list", "rc.owner:bob"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).unwrap();
        assert_eq!(pre.cleaned_args.len(), 2);
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.owner".to_string(), "bob".to_string()),
            ]
        );
    }

    #[test]
    fn add_collects_repeated_labels_and_assignee() {
        let cli = parse(&[
            "-vv",
            "add",
            "Buy milk",
            "--label",
            "errand",
            "--label",
            "home",
            "--priority",
            "high",
            "--assignee",
            "u1:Ana",
        ]);
        assert_eq!(cli.verbose, 2);
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(add.title, "Buy milk");
        assert_eq!(add.labels, vec!["errand", "home"]);
        assert_eq!(add.priority, Some(Priority::High));
        assert_eq!(add.assignee.map(|a| a.name), Some("Ana".to_string()));
    }

    #[test]
    fn move_parses_status_and_ids() {
        let cli = parse(&["move", "in-progress", "ab12", "cd34"]);
        let Some(Command::Move { status, ids }) = cli.command else {
            panic!("expected move");
        };
        assert_eq!(status, Status::InProgress);
        assert_eq!(ids, vec!["ab12", "cd34"]);
    }

    #[test]
    fn calendar_takes_a_toggle_and_one_id() {
        let cli = parse(&["calendar", "off", "ab12"]);
        let Some(Command::Calendar {
            action: CalendarCommand::Off { id },
        }) = cli.command
        else {
            panic!("expected calendar off");
        };
        assert_eq!(id, "ab12");
    }

    #[test]
    fn list_options_map_to_view_settings() {
        let cli = parse(&["list", "--sort", "due", "--asc", "--group", "label", "--due", "next7"]);
        let Some(Command::List(list)) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(list.sort_state(), SortState::new(SortField::Due, SortOrder::Asc));
        assert_eq!(list.group_by(), GroupBy::Label);
        assert_eq!(list.due, Some(DueArg::Next7));
    }

    #[test]
    fn rc_flag_and_conflicts() {
        let cli = parse(&["--rc", "history.limit=5", "list"]);
        assert_eq!(cli.rc_overrides[0].key, "history.limit");
        assert_eq!(cli.rc_overrides[0].value, "5");

        let raw: Vec<OsString> = ["taskboard", "list", "--assignee", "u1", "--unassigned"]
            .into_iter()
            .map(OsString::from)
            .collect();
        assert!(GlobalCli::try_parse_from(raw).is_err());
    }

    #[test]
    fn assignee_without_name_reuses_id() {
        let assignee = parse_assignee("ana").unwrap();
        assert_eq!(assignee.id, "ana");
        assert_eq!(assignee.name, "ana");
        assert!(parse_assignee(":x").is_err());
    }
}
