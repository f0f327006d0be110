//! Terminal rendering of running and finished tasks

use std::time::Duration;

use console::style;
use fleetops_core::{Commissioner, ProgressStatus, TaskEvent, TaskId, TaskState};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

/// Show a progress bar until the task finishes. Ctrl-C requests an abort.
pub async fn follow(
    commissioner: &Commissioner,
    task_id: TaskId,
    mut events: mpsc::UnboundedReceiver<TaskEvent>,
) -> anyhow::Result<TaskState> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.blue} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    bar.set_message("Starting...");
    bar.enable_steady_tick(Duration::from_millis(100));

    let mut poll = tokio::time::interval(Duration::from_millis(200));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut abort_requested = false;
    let mut events_open = true;

    loop {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(TaskEvent::GroupStarted { index, label, subtasks }) => {
                    bar.set_message(format!("[{}] {} ({} subtasks)", index + 1, label, subtasks));
                }
                Some(TaskEvent::SubtaskCompleted { success: false, error, position, .. }) => {
                    bar.println(format!(
                        "  {} subtask #{} {}",
                        style("✗").red(),
                        position,
                        style(error.unwrap_or_default()).dim()
                    ));
                }
                Some(TaskEvent::GroupCompleted { label, success: true, .. }) => {
                    bar.println(format!("  {} {}", style("✓").green(), label));
                }
                Some(TaskEvent::GroupCompleted { label, success: false, .. }) => {
                    bar.println(format!("  {} {}", style("✗").red(), style(label).bold()));
                }
                Some(TaskEvent::TaskCompleted { .. }) => break,
                Some(_) => {}
                None => events_open = false,
            },
            _ = poll.tick() => {
                let status = commissioner.get_status(task_id).await?;
                bar.set_position(status.percent_complete as u64);
                if status.is_terminal() {
                    break;
                }
            }
            _ = &mut ctrl_c, if !abort_requested => {
                abort_requested = true;
                bar.println(format!("{}", style("Abort requested, waiting for running subtasks").yellow()));
                commissioner.abort(task_id).await?;
            }
        }
    }

    let state = commissioner.wait_for_completion(task_id).await?;
    let status = commissioner.get_status(task_id).await?;
    bar.set_position(status.percent_complete as u64);
    bar.finish_and_clear();
    Ok(state)
}

/// Print the outcome of a finished task and any failed subtasks
pub async fn print_outcome(commissioner: &Commissioner, task_id: TaskId) -> anyhow::Result<()> {
    let task = commissioner.get_task(task_id).await?;
    let status = commissioner.get_status(task_id).await?;

    println!(
        "{} {} {}% ({} subtasks)",
        style(task.task_type.friendly_name()).bold(),
        status_style(status.status),
        status.percent_complete,
        task.subtask_count
    );

    let failed = commissioner.list_failed_subtasks(task_id).await?;
    if !failed.is_empty() {
        println!("{}", style("Failed subtasks:").bold());
        for subtask in failed {
            println!(
                "  {:<20} {:<22} {}",
                style(&subtask.subtask_type).cyan(),
                subtask.group_label.to_string(),
                style(&subtask.error_detail).red()
            );
        }
    }
    Ok(())
}

/// Print a customer's task history, grouped by target
pub async fn print_history(
    commissioner: &Commissioner,
    customer_id: uuid::Uuid,
) -> anyhow::Result<()> {
    let listing = commissioner.list_tasks(customer_id, None).await?;

    println!("{}", style("Task history:").bold());
    for (target_id, tasks) in listing {
        println!("  {}", style(target_id).dim());
        for task in tasks {
            println!(
                "    {:<40} {:<10} {:>3}%  {}",
                task.title,
                status_style(task.status),
                task.percent_complete,
                style(task.id).dim()
            );
        }
    }
    Ok(())
}

fn status_style(status: ProgressStatus) -> console::StyledObject<String> {
    let text = format!("{:?}", status);
    match status {
        ProgressStatus::Success => style(text).green(),
        ProgressStatus::Running => style(text).cyan(),
        ProgressStatus::Failure => style(text).red().bold(),
        ProgressStatus::Aborted => style(text).yellow(),
        ProgressStatus::Unknown => style(text).dim(),
    }
}
