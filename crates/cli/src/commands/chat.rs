//! `careclaw chat`: Interactive or single-message session.

use std::io::Write;
use std::sync::Arc;

use careclaw_agent::{
    AgentLoop, RecordSource, SessionContext, SessionParams, StaticRecordSource,
    new_session_from_record,
};
use careclaw_config::AppConfig;
use careclaw_core::event::TracingEventSink;
use careclaw_core::session::VisitStatus;
use careclaw_tools::{PriorVisitCatalog, default_registry, registry_with_catalog};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::ChatArgs;

pub async fn run(config: &AppConfig, args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (mut session, tools) = match &args.record {
        Some(visit_id) => {
            let record = StaticRecordSource::demo()
                .fetch(visit_id)
                .map_err(|e| format!("Failed to load clinical record: {e}"))?;
            let (patient_id, visits) = record.catalog_entry();
            let catalog = PriorVisitCatalog::demo().with_patient(patient_id, visits);
            (
                new_session_from_record(&record, args.role),
                registry_with_catalog(Arc::new(catalog)),
            )
        }
        None => {
            let visit_id = args
                .visit_id
                .clone()
                .unwrap_or_else(|| format!("VISITA-{}", Uuid::new_v4().simple()));
            let params = SessionParams::new(
                &args.patient_id,
                &args.patient_name,
                visit_id,
                &args.professional_id,
                &args.reason,
                args.role,
            );
            (SessionContext::new(params), default_registry())
        }
    };
    session.add_sink(Arc::new(TracingEventSink));

    let agent = AgentLoop::from_config(config, Arc::new(tools), args.role);
    agent.attach(&mut session);

    if let Some(msg) = &args.message {
        // Single message mode
        let response = agent.process(&mut session, msg);
        println!("{response}");
    } else {
        interactive(&agent, &mut session).await?;
    }

    session.close(VisitStatus::Completed);

    if args.save {
        if config.storage.backend == "memory" {
            tracing::warn!("storage.backend is 'memory'; the session will not outlive this process");
        }
        let repository = super::open_repository(config);
        repository.put(session.export()).await?;
        eprintln!("  Saved session {} ({})", session.key(), repository.name());
    }

    Ok(())
}

async fn interactive(
    agent: &AgentLoop,
    session: &mut SessionContext,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        CareClaw: Interactive Session         ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Patient:   {} ({})", session.patient().name, session.patient().id);
    println!("  Visit:     {}", session.visit().id);
    println!("  Reason:    {}", session.visit().reason);
    println!("  Role:      {}", session.role());
    println!("  Memory:    {} short-term blocks", session.short_term().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Commands: /memoria, /historial, exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "salir" => break,
            "/memoria" => println!("{}", session.render_memory()),
            "/historial" => println!("{}", session.render_history(true)),
            message => {
                let response = agent.process(session, message);
                println!();
                for line in response.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Session closed.");
    println!();
    Ok(())
}
