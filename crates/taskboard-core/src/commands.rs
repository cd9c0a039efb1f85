use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::autosave::{AutosaveController, AutosaveOptions, SaveStatus, StoreTarget};
use crate::board::Board;
use crate::calendar::CalendarClient;
use crate::calendar_sync::{CalendarSyncOptions, CalendarSyncScheduler, SyncOutcome};
use crate::cli::{AddArgs, CalendarCommand, Command, DueArg, EditArgs, LabelCommand, ListArgs};
use crate::config::Config;
use crate::datetime::BoardClock;
use crate::error::BoardError;
use crate::filter::{AssigneeFilter, DuePreset, FilterState, LabelSelector};
use crate::render::{Renderer, short_id};
use crate::task::{CalendarLink, Status, Task, TaskDraft, TaskId};

/// Settings and collaborators shared by every command in one invocation.
#[derive(Clone)]
pub struct Session {
    pub clock: BoardClock,
    pub renderer: Renderer,
    pub autosave: AutosaveOptions,
    pub calendar: CalendarSyncOptions,
    pub calendar_client: Arc<dyn CalendarClient>,
}

impl Session {
    pub fn from_config(
        cfg: &Config,
        calendar_client: Arc<dyn CalendarClient>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            clock: BoardClock::from_config(cfg)?,
            renderer: Renderer::new(cfg)?,
            autosave: cfg.autosave_options()?,
            calendar: cfg.calendar_options()?,
            calendar_client,
        })
    }

    /// A scheduler for one command, plus the last link it reported.
    fn calendar_sync(&self) -> (CalendarSyncScheduler, Arc<Mutex<Option<CalendarLink>>>) {
        let sync = CalendarSyncScheduler::new(
            Arc::clone(&self.calendar_client),
            self.calendar.clone(),
        );
        let linked = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&linked);
        sync.on_linked(move |_, link| {
            if let Some(link) = link {
                *sink.lock() = Some(link.clone());
            }
        });
        (sync, linked)
    }
}

#[instrument(skip(board, session, command))]
pub async fn dispatch(
    board: &mut Board,
    session: &Session,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(board, session, args, now).await,
        Command::List(args) => cmd_list(board, session, &args, now),
        Command::Move { status, ids } => cmd_move(board, status, &ids).await,
        Command::Delete { ids } => cmd_delete(board, &ids).await,
        Command::Label { action } => cmd_label(board, action).await,
        Command::Edit(args) => cmd_edit(board, session, args, now).await,
        Command::Calendar { action } => cmd_calendar(board, session, action).await,
        Command::Show { id } => {
            let id = resolve_id(board.tasks(), &id)?;
            let task = board
                .task(&id)
                .ok_or_else(|| anyhow!("task {id} disappeared"))?;
            session.renderer.print_task_info(task)
        }
    }
}

#[instrument(skip(board, session, args, now))]
async fn cmd_add(
    board: &mut Board,
    session: &Session,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let due = args
        .due
        .as_deref()
        .map(|raw| session.clock.parse_due(raw, now))
        .transpose()?;
    let draft = TaskDraft {
        title: args.title,
        description: args.description,
        priority: args.priority.unwrap_or_default(),
        due,
        labels: args.labels,
        assignee: args.assignee,
    };

    let id = board.create_task(draft).await?;
    println!("Created task {}.", short_id(&id));
    Ok(())
}

#[instrument(skip(board, session, args, now))]
fn cmd_list(
    board: &Board,
    session: &Session,
    args: &ListArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let today = session.clock.date_of(now);
    let filters = build_filters(args, &session.clock, now)?;
    let view = board.view(&filters, args.sort_state(), args.group_by(), today);
    debug!(
        visible = view.visible,
        total = view.total,
        "rendering board"
    );
    session.renderer.print_board(&view, today)
}

#[instrument(skip(board))]
async fn cmd_move(board: &mut Board, status: Status, ids: &[String]) -> anyhow::Result<()> {
    let ids = resolve_ids(board.tasks(), ids)?;
    if let [id] = ids.as_slice() {
        board.move_task(id, status).await?;
    } else {
        select_only(board, &ids);
        board.bulk_move(status).await?;
    }
    report_notice(board);
    Ok(())
}

#[instrument(skip(board))]
async fn cmd_delete(board: &mut Board, ids: &[String]) -> anyhow::Result<()> {
    let ids = resolve_ids(board.tasks(), ids)?;
    if let [id] = ids.as_slice() {
        board.delete_task(id).await?;
    } else {
        select_only(board, &ids);
        board.bulk_delete().await?;
    }
    report_notice(board);
    Ok(())
}

#[instrument(skip(board))]
async fn cmd_label(board: &mut Board, action: LabelCommand) -> anyhow::Result<()> {
    let (name, ids, adding) = match action {
        LabelCommand::Add { name, ids } => (name, ids, true),
        LabelCommand::Remove { name, ids } => (name, ids, false),
    };
    let ids = resolve_ids(board.tasks(), &ids)?;
    select_only(board, &ids);

    let result = if adding {
        board.bulk_add_label(&name).await
    } else {
        board.bulk_remove_label(&name).await
    };

    match result {
        Ok(changed) => {
            println!("Updated {changed} task(s).");
            Ok(())
        }
        Err(BoardError::PartialBulkFailure {
            attempted,
            succeeded,
            failures,
        }) => {
            for failure in &failures {
                warn!(task = %failure.id, error = %failure.message, "label update failed");
                eprintln!("  {}: {}", failure.id, failure.message);
            }
            Err(anyhow!(
                "{} of {attempted} task(s) could not be updated ({} updated)",
                failures.len(),
                succeeded.len()
            ))
        }
        Err(err) => Err(err.into()),
    }
}

/// Routes the edit through an autosave controller so the store only
/// receives the changed fields.
#[instrument(skip(board, session, args, now), fields(id = %args.id))]
async fn cmd_edit(
    board: &mut Board,
    session: &Session,
    args: EditArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let id = resolve_id(board.tasks(), &args.id)?;
    let current = board
        .task(&id)
        .cloned()
        .ok_or_else(|| anyhow!("task {id} disappeared"))?;

    let mut edited = current.clone();
    if let Some(title) = args.title {
        edited.title = title;
    }
    if let Some(description) = args.description {
        edited.description = description;
    }
    if let Some(priority) = args.priority {
        edited.priority = priority;
    }
    if args.clear_due {
        edited.due = None;
    } else if let Some(raw) = args.due.as_deref() {
        edited.due = Some(session.clock.parse_due(raw, now)?);
    }

    if !save_edit(board, session, &current, edited).await? {
        println!("No changes.");
        return Ok(());
    }
    println!("Updated task {}.", short_id(&id));
    mirror_to_calendar(board, session, &current).await
}

#[instrument(skip(board, session))]
async fn cmd_calendar(
    board: &mut Board,
    session: &Session,
    action: CalendarCommand,
) -> anyhow::Result<()> {
    let (raw, enable) = match action {
        CalendarCommand::On { id } => (id, true),
        CalendarCommand::Off { id } => (id, false),
    };
    let id = resolve_id(board.tasks(), &raw)?;
    let current = board
        .task(&id)
        .cloned()
        .ok_or_else(|| anyhow!("task {id} disappeared"))?;

    if enable {
        let mut edited = current.clone();
        let link = edited.calendar.get_or_insert_with(CalendarLink::default);
        link.enabled = true;
        if link.calendar_id.is_none() {
            link.calendar_id = Some(session.calendar.calendar_id.clone());
        }
        save_edit(board, session, &current, edited).await?;
        println!("Calendar sync on for task {}.", short_id(&id));
        return mirror_to_calendar(board, session, &current).await;
    }

    let Some(link) = current.calendar.clone() else {
        println!("Calendar sync is already off.");
        return Ok(());
    };
    let (sync, _) = session.calendar_sync();
    sync.observe(&current);
    sync.disable().await;
    sync.close();

    let mut edited = current.clone();
    edited.calendar = Some(CalendarLink {
        calendar_id: link.calendar_id,
        ..CalendarLink::default()
    });
    save_edit(board, session, &current, edited).await?;
    println!("Calendar sync off for task {}.", short_id(&id));
    Ok(())
}

/// Commits `edited` locally and routes it through an autosave controller
/// so the store only receives the changed fields. A failed save is undone.
async fn save_edit(
    board: &mut Board,
    session: &Session,
    current: &Task,
    edited: Task,
) -> anyhow::Result<bool> {
    let id = edited.id.clone();
    if !board.stage_edit(edited)? {
        return Ok(false);
    }
    let staged = board
        .task(&id)
        .cloned()
        .ok_or_else(|| anyhow!("task {id} disappeared"))?;

    let target = Arc::new(StoreTarget::new(Arc::clone(board.store()), id.clone()));
    let autosave = AutosaveController::new(current.clone(), target, session.autosave);
    autosave.update(staged);
    autosave.close().await;

    if autosave.status() == SaveStatus::Error {
        board.undo();
        let message = autosave.error().unwrap_or_default();
        return Err(anyhow!("failed to save changes: {message}"));
    }
    Ok(true)
}

/// Feeds the saved task to a calendar scheduler and writes any new link
/// back. `before` seeds what the calendar already holds.
async fn mirror_to_calendar(
    board: &mut Board,
    session: &Session,
    before: &Task,
) -> anyhow::Result<()> {
    let Some(task) = board.task(&before.id).cloned() else {
        return Ok(());
    };
    if !task.calendar_enabled() {
        return Ok(());
    }

    let (sync, linked) = session.calendar_sync();
    sync.observe(before);
    sync.observe(&task);
    let outcome = sync.sync_now().await;
    sync.close();
    match outcome {
        Ok(SyncOutcome::Failed(message)) => {
            warn!(task = %task.id, error = %message, "calendar mirror failed");
            eprintln!("Calendar sync failed: {message}");
            return Ok(());
        }
        Ok(outcome) => debug!(?outcome, "calendar mirror finished"),
        Err(BoardError::SyncPrecondition(_)) => {
            println!("Calendar sync waits for a due date.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    let link = linked.lock().take();
    if let Some(link) = link {
        let mut linked_task = task.clone();
        linked_task.calendar = Some(link);
        save_edit(board, session, &task, linked_task).await?;
    }
    Ok(())
}

pub fn build_filters(
    args: &ListArgs,
    clock: &BoardClock,
    now: DateTime<Utc>,
) -> anyhow::Result<FilterState> {
    let mut labels: Vec<LabelSelector> = args
        .labels
        .iter()
        .map(|name| LabelSelector::Named(name.clone()))
        .collect();
    if args.no_label {
        labels.push(LabelSelector::Unlabeled);
    }

    let assignee = match (&args.assignee, args.unassigned) {
        (_, true) => AssigneeFilter::Unassigned,
        (Some(id), false) => AssigneeFilter::Id(id.clone()),
        (None, false) => AssigneeFilter::All,
    };

    let due = match args.due {
        Some(DueArg::Overdue) => DuePreset::Overdue,
        Some(DueArg::Today) => DuePreset::Today,
        Some(DueArg::Next7) => DuePreset::Next7,
        Some(DueArg::None) => DuePreset::None,
        None if args.from.is_some() || args.to.is_some() => {
            let parse = |raw: &Option<String>, flag: &str| {
                raw.as_deref()
                    .map(|value| clock.parse_due(value, now))
                    .transpose()
                    .with_context(|| format!("invalid --{flag}"))
            };
            DuePreset::Range {
                from: parse(&args.from, "from")?,
                to: parse(&args.to, "to")?,
            }
        }
        None => DuePreset::All,
    };

    Ok(FilterState {
        query: args.query.clone().unwrap_or_default(),
        labels,
        assignee,
        due,
        priorities: args.priorities.clone(),
    })
}

/// Resolves each id or unique id prefix, keeping input order and
/// dropping repeats.
pub fn resolve_ids(tasks: &[Task], prefixes: &[String]) -> anyhow::Result<Vec<TaskId>> {
    let mut ids: Vec<TaskId> = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        let id = resolve_id(tasks, prefix)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

pub fn resolve_id(tasks: &[Task], prefix: &str) -> anyhow::Result<TaskId> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(anyhow!("task id cannot be empty"));
    }
    if let Some(task) = tasks.iter().find(|task| task.id.as_str() == prefix) {
        return Ok(task.id.clone());
    }

    let mut matches = tasks
        .iter()
        .filter(|task| task.id.as_str().starts_with(prefix));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no task matches id '{prefix}'"))?;
    if matches.next().is_some() {
        return Err(anyhow!("id prefix '{prefix}' matches more than one task"));
    }
    Ok(first.id.clone())
}

fn select_only(board: &mut Board, ids: &[TaskId]) {
    board.clear_selection();
    for id in ids {
        board.select(id.clone());
    }
}

fn report_notice(board: &Board) {
    if let Some(action) = board.undo_notice()
        && let Some(description) = &action.description
    {
        println!("{description}.");
    }
}
