//! Subcommand bodies.

use job_poller::{select_reconnect_target, JobPollingClient, LocalFailure};
use job_types::{JobRecord, JobService, JobStatus, OptimizationRequest};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub fn build_request(
    prompt_uri: String,
    model: Option<String>,
    iterations: Option<u32>,
    candidates: Option<u32>,
    judge: Option<String>,
    target: Option<String>,
) -> CliResult<OptimizationRequest> {
    let mut req = OptimizationRequest::new(prompt_uri);
    if let Some(model) = model {
        req.optimizer_model_name = model;
    }
    if let Some(n) = iterations {
        req.num_iterations = n;
    }
    if let Some(n) = candidates {
        req.num_candidates = n;
    }
    req.judge_name = judge;
    req.target = match target {
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| format!("--target is not valid JSON: {}", e))?;
            if !value.is_object() {
                return Err("--target must be a JSON object".into());
            }
            Some(value)
        }
        None => None,
    };
    Ok(req)
}

type CancelTask = tokio::task::JoinHandle<Option<LocalFailure>>;

/// Poll the attached job to the end, printing log lines as they arrive. Ctrl-C cancels.
pub async fn follow(client: &Arc<JobPollingClient>) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    let cancelling = watch_logs(client, &mut stdout, tokio::signal::ctrl_c).await?;
    if let Some(task) = cancelling {
        task.await?;
    }

    let state = client.snapshot();
    match state.status {
        Some(JobStatus::Completed) => {
            println!("Job completed");
            if let Some(result) = state.result {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            Ok(())
        }
        Some(JobStatus::Failed) => Err(state
            .error
            .unwrap_or_else(|| "optimization job failed".to_string())
            .into()),
        _ => Ok(()),
    }
}

/// Run the poll loop and write new log lines to `out` until the job stops being pollable.
///
/// `interrupt` resolving starts a cancel on its own task so printing never waits on the
/// service; the pending cancel is handed back to the caller.
async fn watch_logs<W, F, Fut>(
    client: &Arc<JobPollingClient>,
    out: &mut W,
    mut interrupt: F,
) -> CliResult<Option<CancelTask>>
where
    W: Write,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut updates = client.subscribe();
    let mut printed = print_new_lines(out, &client.snapshot().logs, 0)?;
    let mut handle = client.spawn();
    let mut finished = false;
    let mut cancelling: Option<CancelTask> = None;
    loop {
        tokio::select! {
            joined = &mut handle, if !finished => {
                joined?;
                finished = true;
                if updates.has_changed().unwrap_or(false) {
                    continue;
                }
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                printed = print_new_lines(out, &state.logs, printed)?;
                if !state.is_pollable() {
                    break;
                }
            }
            Ok(()) = interrupt(), if cancelling.is_none() => {
                let client = Arc::clone(client);
                cancelling = Some(tokio::spawn(async move { client.cancel().await }));
            }
        }
    }
    if !finished {
        handle.await?;
    }
    print_new_lines(out, &client.snapshot().logs, printed)?;
    Ok(cancelling)
}

fn print_new_lines<W: Write>(out: &mut W, logs: &[String], printed: usize) -> std::io::Result<usize> {
    for line in logs.iter().skip(printed) {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(logs.len().max(printed))
}

pub async fn cancel(
    client: &JobPollingClient,
    service: &dyn JobService,
    job_id: Option<&str>,
) -> CliResult<()> {
    let history = service.history().await?;
    let record = match job_id {
        Some(id) => history
            .iter()
            .find(|r| r.job_id == id)
            .ok_or_else(|| format!("job {} not found in history", id))?,
        None => select_reconnect_target(&history).ok_or("no optimization jobs found")?,
    };
    client.reconnect(std::slice::from_ref(record));
    match client.cancel().await {
        Some(LocalFailure::CancelledUnreachable) => {
            println!(
                "Job {}: {}",
                record.job_id,
                LocalFailure::CancelledUnreachable.message()
            );
        }
        Some(_) => println!("Cancelled job {}", record.job_id),
        None => println!("Job {} is already {}", record.job_id, record.status),
    }
    Ok(())
}

pub async fn history(service: &dyn JobService) -> CliResult<()> {
    let records = service.history().await?;
    if records.is_empty() {
        println!("No optimization jobs found");
    }
    for record in &records {
        println!("{}", history_line(record));
    }
    Ok(())
}

fn history_line(record: &JobRecord) -> String {
    let created = record
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{:<38} {:<10} {:<17} {} ({}, {} iterations)",
        record.job_id,
        record.status,
        created,
        record.request.prompt_uri,
        record.request.optimizer_model_name,
        record.request.num_iterations
    );
    if let Some(ref error) = record.error {
        line.push_str(&format!(" error: {}", error));
    }
    line
}
