//! daybook - terminal front end for the task list.
//!
//! Reads one command per line from stdin and prints the current list
//! whenever it changes. Type `help` for the command list.

use anyhow::{anyhow, bail, Context};
use daybook::{
    config::Config,
    date,
    form::{self, Field},
    selection::TaskSelection,
    store::{self, LiveQuery},
    Task, TaskService,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
Commands:
  name <text>             set the name of the next task
  desc <text>             set the description of the next task
  date <YYYY-MM-DD>       set the due date of the next task (default today)
  add                     save the next task
  list                    show all tasks
  filter <YYYY-MM-DD>     show tasks due on a day
  done <id> | undone <id> mark a task done or open
  rename <id> <text>      change a task's name
  describe <id> <text>    change a task's description
  due <id> <YYYY-MM-DD>   change a task's due date
  delete <id>             delete a task
  select <id> | deselect <id>
  select-all              select all, or deselect all if all are selected
  delete-selected         delete the selected tasks
  export                  print the shown tasks as JSON
  quit";

#[derive(Debug)]
enum Flow {
    Continue,
    Render,
    Quit,
}

/// The list currently on screen: a live query plus its selection.
struct Screen {
    live: LiveQuery,
    filter: Option<i64>,
    selection: TaskSelection,
}

impl Screen {
    async fn open(service: &TaskService, filter: Option<i64>) -> anyhow::Result<Self> {
        let live = match filter {
            Some(day) => service.filter_by_date(day).await?,
            None => service.all_tasks().await?,
        };
        Ok(Self {
            live,
            filter,
            selection: TaskSelection::new(),
        })
    }

    /// Take the newest pushed snapshot, if any. Returns whether the list
    /// changed.
    fn refresh(&mut self) -> anyhow::Result<bool> {
        match self.live.latest() {
            Some(Ok(tasks)) => {
                self.selection.set_tasks(tasks);
                Ok(true)
            }
            Some(Err(e)) => Err(anyhow!(e).context("Task list stopped updating, run `list`")),
            None => Ok(false),
        }
    }

    fn task(&self, id: i64) -> anyhow::Result<Task> {
        self.selection
            .task(id)
            .cloned()
            .ok_or_else(|| anyhow!("Task {} is not in the current list", id))
    }

    fn render(&self) {
        let title = match self.filter {
            Some(day) => format!("Tasks due {}", date::format_day(day)),
            None => "All tasks".to_string(),
        };
        println!(
            "{} ({} selected)",
            title,
            self.selection.selected_count()
        );
        if self.selection.is_empty() {
            println!("  (no tasks)");
        }
        for task in self.selection.tasks() {
            let selected = if self.selection.is_selected(task.id) { '*' } else { ' ' };
            let done = if task.done { 'x' } else { ' ' };
            println!(
                "{}[{}] #{} {} - {} ({})",
                selected,
                done,
                task.id,
                task.name,
                task.description,
                task.due_date_label()
            );
        }
    }
}

fn parse_id(value: &str) -> anyhow::Result<i64> {
    let value = value.trim();
    value
        .trim_start_matches('#')
        .parse()
        .with_context(|| format!("Invalid task id '{}'", value))
}

/// Parse a due date, refusing days before today.
fn parse_due_day(value: &str) -> anyhow::Result<i64> {
    let day = date::parse_day(value)
        .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", value.trim()))?;
    if day < date::start_of_day(date::now_millis()) {
        bail!("Due date cannot be in the past");
    }
    Ok(day)
}

fn split_id_and_text(rest: &str) -> anyhow::Result<(i64, &str)> {
    let (id, text) = rest.split_once(' ').unwrap_or((rest, ""));
    Ok((parse_id(id)?, text))
}

async fn run_command(
    line: &str,
    service: &TaskService,
    screen: &mut Screen,
) -> anyhow::Result<Flow> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(Flow::Quit),

        "name" => service.set_draft_name(rest),
        "desc" => service.set_draft_description(rest),
        "date" => service.set_draft_due_date(Some(parse_due_day(rest)?)),
        "add" => {
            let draft = service.draft();
            let fields = form::validate_new_task(
                draft.name.as_deref().unwrap_or_default(),
                draft.description.as_deref().unwrap_or_default(),
            )?;
            service.set_draft_name(fields.name);
            service.set_draft_description(fields.description);
            service.add_task()?;
        }

        "list" => *screen = Screen::open(service, None).await?,
        "filter" => {
            let day = date::parse_day(rest)
                .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", rest))?;
            *screen = Screen::open(service, Some(day)).await?;
        }

        "done" | "undone" => {
            let task = screen.task(parse_id(rest)?)?;
            service.set_task_done(&task, command == "done")?;
        }
        "rename" | "describe" => {
            let (id, text) = split_id_and_text(rest)?;
            let task = screen.task(id)?;
            let field = if command == "rename" {
                Field::Name
            } else {
                Field::Description
            };
            match form::validate_edit(field, text)? {
                Some(text) if field == Field::Name => service.rename_task(&task, text)?,
                Some(text) => service.describe_task(&task, text)?,
                None => println!("Nothing to change"),
            }
        }
        "due" => {
            let (id, day) = split_id_and_text(rest)?;
            let task = screen.task(id)?;
            service.set_task_date(&task, parse_due_day(day)?)?;
            println!("Updated Task Successfully");
        }
        "delete" => {
            let task = screen.task(parse_id(rest)?)?;
            service.delete_task(&task)?;
        }

        "select" => {
            let id = parse_id(rest)?;
            if !screen.selection.select(id) {
                bail!("Task {} is not in the current list", id);
            }
            return Ok(Flow::Render);
        }
        "deselect" => {
            screen.selection.deselect(parse_id(rest)?);
            return Ok(Flow::Render);
        }
        "select-all" => {
            screen.selection.toggle_all();
            return Ok(Flow::Render);
        }
        "delete-selected" => {
            let selected = screen.selection.selected_tasks();
            if selected.is_empty() {
                println!("No tasks selected");
            } else {
                service.delete_tasks(&selected)?;
                println!("Deleted {} tasks", selected.len());
                screen.selection.select_all(false);
            }
        }

        "export" => println!("{}", serde_json::to_string_pretty(screen.selection.tasks())?),

        other => bail!("Unknown command '{}', type `help` for the list", other),
    }
    Ok(Flow::Continue)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daybook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    let store = store::create_task_store(config.store_type, config.data_dir.clone())
        .await
        .context("Failed to open task store")?;
    info!(
        store = ?config.store_type,
        persistent = store.is_persistent(),
        "Task store ready"
    );

    let service = TaskService::new(store);
    let mut screen = Screen::open(&service, None).await?;
    screen.refresh()?;
    screen.render();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut render = false;
        match run_command(line, &service, &mut screen).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Render) => render = true,
            Ok(Flow::Continue) => {}
            Err(e) => println!("error: {:#}", e),
        }

        // Writes push their snapshots before completing, so after a flush
        // the screen's queue holds the final state.
        service.flush().await?;
        if service.task_added() {
            println!("Successfully added task");
            service.reset_added_flag();
        }
        match screen.refresh() {
            Ok(changed) => render |= changed,
            Err(e) => println!("error: {:#}", e),
        }
        if render {
            screen.render();
        }
    }

    service.flush().await?;
    service.shutdown().await;
    Ok(())
}
