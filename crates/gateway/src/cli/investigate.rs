//! `quarry investigate` — run a full investigation from the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use quarry_agent::agent::standard_policy;
use quarry_agent::{
    CancelToken, Decision, DecisionPolicy, InvestigationAgent, ProgressBus, ProgressSink,
};
use quarry_safety::SafetyHarness;
use quarry_sessions::{load_session, Session};

use crate::state::AppState;

pub struct InvestigateArgs {
    pub goal: String,
    pub max_turns: Option<u32>,
    pub no_sanctions: bool,
    pub no_news: bool,
    pub dry_run: bool,
    pub interactive: bool,
    pub save: Option<PathBuf>,
    pub resume: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Returns the process exit code (0 ok, 130 on SIGINT).
pub async fn run(state: &AppState, args: InvestigateArgs) -> anyhow::Result<i32> {
    let mut config = state.config.agent.clone();
    if let Some(max_turns) = args.max_turns {
        config.max_turns = max_turns;
    }
    if args.no_sanctions {
        config.auto_sanctions_screen = false;
    }
    if args.no_news {
        config.auto_news_check = false;
    }
    config.persist_path = args.save.clone();

    if args.dry_run {
        print_plan(state, &config, &args.goal);
        return Ok(0);
    }

    // Build the agent; interactive mode wraps the policy with an
    // approval prompt before each tool call.
    let harness = if config.enable_safety {
        Arc::new(SafetyHarness::from_config(&state.config.safety))
    } else {
        Arc::new(SafetyHarness::disabled())
    };
    let mut policy = standard_policy(&config, &state.executor, &state.providers)?;
    if args.interactive {
        policy = Arc::new(ApprovalPolicy { inner: policy });
    }
    let agent = InvestigationAgent::new(config, state.executor.clone(), harness, policy)?;

    // SIGINT cancels the run cooperatively.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, stopping investigation...");
                cancel.cancel();
            }
        });
    }

    // Print progress lines as the loop emits them.
    let bus = Arc::new(ProgressBus::new());
    let mut events = bus.subscribe("cli");
    let sink = ProgressSink::new(bus.clone(), "cli");
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !event.is_terminal() {
                println!("  {}", event.render_text());
            }
        }
    });

    let session = match &args.resume {
        Some(path) => {
            let session = load_session(path)?;
            println!(
                "Resuming session {} ({} findings, turn {})",
                session.id,
                session.finding_count(),
                session.turn_count
            );
            agent.resume(session, &cancel, &sink).await
        }
        None => agent.investigate(&args.goal, &cancel, &sink).await,
    };
    let _ = printer.await;

    print_session_results(&session);

    if let Some(output) = &args.output {
        // Anything written out is publication-facing: scrub it.
        let report = quarry_agent::report::build_report(&session);
        let harness = SafetyHarness::from_defaults();
        let publication = harness.scrub_for_publication(&report, "cli_report");
        std::fs::write(output, &publication.scrubbed_text)?;
        println!("Report saved to {}", output.display());
        if publication.pii_found > 0 {
            println!("  ({} PII items redacted)", publication.pii_found);
        }
    }

    if cancel.is_cancelled() {
        return Ok(130);
    }
    Ok(0)
}

fn print_plan(state: &AppState, config: &quarry_domain::config::AgentConfig, goal: &str) {
    println!("Investigation plan for: {goal}");
    println!("  1. search_entities(\"{goal}\")  — seed phase");
    let mut step = 2;
    if config.auto_sanctions_screen {
        println!("  {step}. screen_sanctions(<discovered entities>)");
        step += 1;
    }
    if config.auto_news_check {
        println!("  {step}. check_news(\"{goal}\")");
        step += 1;
    }
    println!("  {step}. follow derived leads for up to {} turns", config.max_turns);
    println!("\nAvailable tools:");
    for (name, description) in state.executor.registry().descriptions() {
        println!("  {name:<20} {description}");
    }
}

fn print_session_results(session: &Session) {
    let summary = session.summary();
    println!("\nInvestigation complete: {}", session.goal);
    println!(
        "  Turns: {} | Entities: {} | Findings: {} | Leads: {}/{} open",
        summary.turns,
        summary.entity_count,
        summary.finding_count,
        summary.leads_open,
        summary.leads_total
    );

    if !session.findings().is_empty() {
        println!("\nFindings:");
        for finding in session.findings() {
            println!(
                "  • [{}] {} ({:.2})",
                finding.source, finding.summary, finding.confidence
            );
        }
    }

    let open = session.get_open_leads();
    if !open.is_empty() {
        println!("\nOpen leads:");
        for lead in open.iter().take(5) {
            println!("  • [{:.1}] {}", lead.priority, lead.description);
        }
    }

    if let Some(audit) = &session.safety_audit {
        println!(
            "\nSafety: {} checks, {} blocks, {} PII detections",
            audit["total_checks"].as_u64().unwrap_or(0),
            audit["blocks"].as_u64().unwrap_or(0),
            audit["pii_redactions"].as_u64().unwrap_or(0),
        );
    }
}

/// Pauses before each tool call; declining stops the investigation.
struct ApprovalPolicy {
    inner: Arc<dyn DecisionPolicy>,
}

#[async_trait]
impl DecisionPolicy for ApprovalPolicy {
    async fn decide(&self, session: &Session) -> Decision {
        let decision = self.inner.decide(session).await;
        let Decision::Act(action) = &decision else {
            return decision;
        };

        let prompt = format!(
            "Run {}({})? [y/N] ",
            action.tool,
            serde_json::to_string(&action.args).unwrap_or_default()
        );
        let answer = tokio::task::spawn_blocking(move || {
            let mut editor = rustyline::DefaultEditor::new().ok()?;
            editor.readline(&prompt).ok()
        })
        .await
        .ok()
        .flatten();

        let approved = answer
            .map(|line| matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false);
        if approved {
            decision
        } else {
            Decision::Conclude {
                reasoning: "Operator declined the next action".to_string(),
            }
        }
    }
}
