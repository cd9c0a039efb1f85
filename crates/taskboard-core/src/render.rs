use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::board::BoardView;
use crate::config::Config;
use crate::task::{Priority, Status, Task, TaskId};

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(lanes = view.lanes.len()))]
    pub fn print_board(&self, view: &BoardView<'_>, today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_board(&mut out, view, today)
    }

    pub fn write_board<W: Write>(
        &self,
        mut out: W,
        view: &BoardView<'_>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Status".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Title".to_string(),
            "Labels".to_string(),
            "Assignee".to_string(),
        ];

        for lane in &view.lanes {
            writeln!(out, "{} ({})", self.paint(&lane.title, "1"), lane.tasks.len())?;
            let rows = lane
                .tasks
                .iter()
                .map(|task| self.task_row(task, today))
                .collect();
            write_table(&mut out, &headers, rows)?;
            writeln!(out)?;
        }

        let mut summary = format!("{} of {} task(s) shown", view.visible, view.total);
        if view.hidden_selected > 0 {
            summary.push_str(&format!(
                ", {} selected task(s) hidden by filters",
                view.hidden_selected
            ));
        }
        writeln!(out, "{summary}")?;
        Ok(())
    }

    fn task_row(&self, task: &Task, today: NaiveDate) -> Vec<String> {
        let id = self.paint(short_id(&task.id), "33");
        let due = match task.due {
            Some(due) if due < today && !task.status.is_terminal() => {
                self.paint(&due.to_string(), "31")
            }
            Some(due) => due.to_string(),
            None => String::new(),
        };
        let priority = match task.priority {
            Priority::Urgent => self.paint(task.priority.label(), "31"),
            Priority::High => self.paint(task.priority.label(), "33"),
            _ => task.priority.label().to_string(),
        };
        let status = match task.status {
            Status::Done => self.paint(task.status.label(), "32"),
            _ => task.status.label().to_string(),
        };
        let labels = task
            .labels
            .iter()
            .map(|label| format!("#{}", label.name))
            .collect::<Vec<_>>()
            .join(" ");
        let assignee = task
            .assignee
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_default();

        vec![id, status, priority, due, task.title.clone(), labels, assignee]
    }

    #[tracing::instrument(skip(self, task), fields(task = %task.id))]
    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_info(&mut out, task)
    }

    pub fn write_task_info<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "status      {}", task.status.label())?;
        writeln!(out, "priority    {}", task.priority.label())?;
        if let Some(due) = task.due {
            writeln!(out, "due         {due}")?;
        }
        if !task.labels.is_empty() {
            let labels = task
                .labels
                .iter()
                .map(|label| label.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "labels      {labels}")?;
        }
        if let Some(assignee) = &task.assignee {
            writeln!(out, "assignee    {} ({})", assignee.name, assignee.id)?;
        }
        if let Some(link) = &task.calendar {
            let state = if link.enabled { "on" } else { "off" };
            match &link.event_id {
                Some(event) => writeln!(out, "calendar    {state} (event {event})")?,
                None => writeln!(out, "calendar    {state}")?,
            }
        }
        if let Some(source) = &task.source {
            let from = source.from.as_deref().unwrap_or("-");
            writeln!(out, "source      {:?} from {from}", source.channel)?;
        }
        writeln!(out, "created     {}", task.created.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "modified    {}", task.modified.format("%Y-%m-%d %H:%M:%S"))?;

        if !task.description.is_empty() {
            writeln!(out)?;
            for line in task.description.lines() {
                writeln!(out, "  {line}")?;
            }
        }

        if !task.checklist.is_empty() {
            let (done, total) = task.checklist_progress();
            writeln!(out)?;
            writeln!(out, "checklist   {done}/{total}")?;
            for item in &task.checklist {
                let mark = if item.done { "x" } else { " " };
                writeln!(out, "  [{mark}] {}", item.text)?;
            }
        }

        if !task.attachments.is_empty() {
            writeln!(out)?;
            writeln!(out, "attachments")?;
            for attachment in &task.attachments {
                writeln!(out, "  {}  {}", attachment.title, attachment.url)?;
            }
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(id: &TaskId) -> &str {
    let id = id.as_str();
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[String],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
