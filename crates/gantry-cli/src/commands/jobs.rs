//! Job commands.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::client::{ApiClient, JobView};

pub async fn list(client: &ApiClient, offset: i64, limit: i64) -> Result<()> {
    let page = client.list_jobs(offset, limit).await?;
    if page.jobs.is_empty() {
        println!("No jobs");
        return Ok(());
    }
    for job in &page.jobs {
        println!("{}", job_line(job));
    }
    println!(
        "showing {}-{} of {}",
        page.offset + 1,
        page.offset + page.jobs.len() as i64,
        page.total
    );
    Ok(())
}

pub async fn show(client: &ApiClient, id: i64) -> Result<()> {
    let job = client.get_job(id).await?;
    print!("{}", job_details(&job));
    Ok(())
}

pub async fn search(client: &ApiClient, query: &str) -> Result<()> {
    let jobs = client.search_jobs(query).await?;
    if jobs.is_empty() {
        println!("No jobs match {:?}", query);
    }
    for job in &jobs {
        println!("{}", job_line(job));
    }
    Ok(())
}

pub async fn cancel(client: &ApiClient, id: i64) -> Result<()> {
    let job = client.cancel_job(id).await?;
    if job.running {
        println!("Job {} cancelled; the running command will finish first", job.id);
    } else {
        println!("Job {} cancelled", job.id);
    }
    Ok(())
}

fn state(job: &JobView) -> String {
    if job.cancelled {
        format!("{} (cancelled)", job.status)
    } else if job.running {
        "running".to_string()
    } else {
        job.status.to_string()
    }
}

fn short(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}

fn job_line(job: &JobView) -> String {
    format!(
        "#{:<6} {:<20} {:<24} {:<7} {:<8} {}",
        job.id,
        job.repository.name,
        job.branch,
        short(&job.commit),
        state(job),
        job.name
    )
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

fn job_details(job: &JobView) -> String {
    let mut out = format!(
        "Job #{} {}\n\
         repository: {} ({})\n\
         branch:     {}\n\
         commit:     {} {}\n\
         author:     {}\n\
         status:     {}\n\
         created:    {}\n\
         started:    {}\n\
         built:      {}\n\
         deployed:   {}\n",
        job.id,
        job.url,
        job.repository.name,
        job.repository.url,
        job.branch,
        job.commit,
        job.commit_url,
        job.name,
        state(job),
        job.created_at.to_rfc3339(),
        timestamp(job.tasks_started),
        timestamp(job.tasks_finished),
        timestamp(job.deploy_finished),
    );
    for log in &job.command_logs {
        let exit = log
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "\n[{}] {} ({}, exit {})\n",
            log.kind,
            log.command,
            log.outcome.as_str(),
            exit
        ));
        out.push_str(&log.output);
        if !log.output.ends_with('\n') && !log.output.is_empty() {
            out.push('\n');
        }
    }
    out
}
