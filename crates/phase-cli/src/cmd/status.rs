use crate::cmd::load_config;
use crate::output::{print_json, print_table};
use anyhow::Context;
use phase_core::{
    context::ProjectContext,
    materialize::Materializer,
    session::{LoggedSession, SessionLog, SessionRecord},
    types::label_for,
};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct StatusOutput<'a> {
    context: &'a ProjectContext,
    open_session: Option<&'a SessionRecord>,
    latest_session: Option<&'a LoggedSession>,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let ctx = Materializer::new(root, &config)
        .read()
        .context("failed to read .phase/context.md")?;
    let log = SessionLog::new(root);
    let open = log.open_session().context("failed to read the open session")?;
    let latest = log.latest().context("failed to read the session log")?;

    if json {
        return print_json(&StatusOutput {
            context: &ctx,
            open_session: open.as_ref(),
            latest_session: latest.as_ref(),
        });
    }

    println!("Stack:      {} ({})", ctx.active_stack, ctx.stack.language);
    if let Some(fw) = &ctx.stack.framework {
        println!("Framework:  {fw}");
    }
    println!("Strictness: {}", ctx.strictness);
    println!("Phase:      {}", ctx.active_phase);

    match &open {
        Some(s) => println!(
            "Session:    open since {} ({} file(s), tests {})",
            s.started_at.format("%Y-%m-%d %H:%M"),
            s.files_touched.len(),
            s.tests
        ),
        None => println!("Session:    none open"),
    }
    if let Some(s) = &latest {
        println!(
            "Last:       #{} {} tests {}: {}",
            s.number,
            s.record.phase.label(),
            s.record.tests,
            s.record.summary
        );
    }

    if !ctx.plan.is_empty() {
        println!();
        let rows = ctx
            .plan
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let i = i as u32;
                vec![
                    label_for(i),
                    p.title.clone(),
                    ctx.status_of(i).to_string(),
                    p.deliverables.join(", "),
                ]
            })
            .collect();
        print_table(&["PHASE", "TITLE", "STATUS", "DELIVERABLES"], rows);
    }
    Ok(())
}
