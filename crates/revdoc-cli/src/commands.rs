use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use revdoc_sdk::{
    Document, DocumentConfig, DocumentSnapshot, Event, Id, ReplicaState, Scenario, Simulation,
    StepOutcome,
};
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Simulate(args) => cmd_simulate(args, cli.format),
        Command::Verify(args) => cmd_verify(args, cli.format),
        Command::Log(args) => cmd_log(args, cli.format),
        Command::Inspect(args) => cmd_inspect(args, cli.format),
    }
}

fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
}

fn run_scenario(path: &Path) -> anyhow::Result<(Simulation, Vec<StepOutcome>)> {
    let scenario = load_scenario(path)?;
    let sim = Simulation::for_scenario(&scenario)?;
    let outcomes = sim.run(&scenario)?;
    Ok((sim, outcomes))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct SimulationOutput {
    steps: Vec<StepOutcome>,
    replicas: Vec<ReplicaState>,
    converged: bool,
}

fn cmd_simulate(args: SimulateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (sim, steps) = run_scenario(&args.scenario)?;
    if let Some(dir) = &args.save {
        std::fs::create_dir_all(dir)?;
        for state in sim.states() {
            let path = dir.join(format!("{}.revdoc", state.name));
            sim.replica(&state.name)?.persist(&path)?;
        }
    }

    let output = SimulationOutput {
        steps,
        replicas: sim.states(),
        converged: sim.converged(),
    };
    if format == OutputFormat::Json {
        return print_json(&output);
    }

    for (index, step) in output.steps.iter().enumerate() {
        println!("{} {}", format!("step {}", index + 1).dimmed(), describe_step(step));
    }
    println!();
    for replica in &output.replicas {
        print_replica(replica);
    }
    if output.converged {
        println!("{} All settled replicas converged.", "✓".green().bold());
    } else {
        println!("{} Replicas differ.", "✗".red().bold());
    }
    if let Some(dir) = &args.save {
        println!("Saved replicas to {}", dir.display().to_string().bold());
    }
    Ok(())
}

fn describe_step(step: &StepOutcome) -> String {
    match step {
        StepOutcome::Executed { outcome } => match *outcome {
            -1 => "failed".red().to_string(),
            -2 => "no change".yellow().to_string(),
            revision => format!("applied at r{revision}").green().to_string(),
        },
        StepOutcome::Pushed(push) => {
            format!("pushed {} accepted, {} rejected", push.accepted, push.rejected)
        }
        StepOutcome::Pulled(report) => describe_round(report),
        StepOutcome::Synced { push, pull } => format!(
            "pushed {} accepted, {} rejected; {}",
            push.accepted,
            push.rejected,
            describe_round(pull)
        ),
    }
}

fn describe_round(report: &revdoc_sdk::SyncReport) -> String {
    let status = if report.success { "✓".green() } else { "✗".red() };
    let mut line = format!(
        "{status} synced r{} → r{}: {} replayed, {} confirmed, {} reapplied, {} conflicts",
        report.old_sync_revision,
        report.new_sync_revision,
        report.replayed_events,
        report.confirmed,
        report.reapplied,
        report.conflicts
    );
    if let Some(failure) = &report.failure {
        line.push_str(&format!(" ({failure})"));
    }
    line
}

fn print_replica(replica: &ReplicaState) {
    println!(
        "{}  r{} (sync r{}, {} pending)",
        replica.name.yellow().bold(),
        replica.revision,
        replica.sync_revision,
        replica.pending_changes
    );
    print_snapshot(&replica.snapshot);
    println!();
}

fn print_snapshot(snapshot: &DocumentSnapshot) {
    for address in snapshot.addresses() {
        let revision = snapshot.revision_of(&address);
        match snapshot.value_of(&address) {
            Some(value) => println!("  {address} r{revision} = {}", format!("{value}").cyan()),
            None => println!("  {address} r{revision}"),
        }
    }
}

#[derive(Serialize)]
struct VerifyOutput {
    replica: String,
    log_valid: bool,
    violations: Vec<String>,
    converged: bool,
    differences: Vec<String>,
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (sim, _) = run_scenario(&args.scenario)?;
    let mut results = Vec::new();
    for state in sim.states() {
        let replica = sim.replica(&state.name)?;
        let validation = replica.validate_log()?;
        let replay = replica.verify_replay()?;
        results.push(VerifyOutput {
            replica: state.name,
            log_valid: validation.is_valid(),
            violations: validation
                .violations
                .iter()
                .map(|v| format!("r{}: {}", v.revision, v.description))
                .collect(),
            converged: replay.converged,
            differences: replay.differences,
        });
    }
    let ok = results.iter().all(|r| r.log_valid && r.converged);

    if format == OutputFormat::Json {
        print_json(&results)?;
    } else {
        for result in &results {
            if result.log_valid && result.converged {
                println!("{} {}", "✓".green().bold(), result.replica.yellow());
                continue;
            }
            println!("{} {}", "✗".red().bold(), result.replica.yellow());
            for line in result.violations.iter().chain(&result.differences) {
                println!("    {line}");
            }
        }
    }
    if !ok {
        anyhow::bail!("verification failed");
    }
    Ok(())
}

#[derive(Serialize)]
struct LogEntry {
    revision: i64,
    event: Option<Event>,
}

fn cmd_log(args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (sim, _) = run_scenario(&args.scenario)?;
    let replica = sim.replica(&args.replica)?;
    let entries: Vec<LogEntry> = replica
        .change_log()
        .into_iter()
        .map(|(revision, event)| LogEntry { revision, event })
        .collect();

    if format == OutputFormat::Json {
        return print_json(&entries);
    }
    println!(
        "{} r{} (sync r{})",
        args.replica.yellow().bold(),
        replica.current_revision(),
        replica.sync_revision()
    );
    for entry in entries.iter().rev() {
        let marker = if entry.revision <= replica.sync_revision() {
            "●".green()
        } else {
            "○".yellow()
        };
        match &entry.event {
            Some(event) => println!("{marker} {} {event}", format!("r{}", entry.revision).bold()),
            None => println!(
                "{marker} {} {}",
                format!("r{}", entry.revision).bold(),
                "(placeholder)".dimmed()
            ),
        }
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = DocumentConfig::for_actor(Id::new("inspector")?);
    let doc = Document::restore(&args.path, config)
        .with_context(|| format!("restoring {}", args.path.display()))?;
    let snapshot = doc.snapshot();
    if format == OutputFormat::Json {
        return print_json(&snapshot);
    }
    println!(
        "{} r{} (sync r{}, {} log entries)",
        doc.model_address().to_string().yellow().bold(),
        doc.current_revision(),
        doc.sync_revision(),
        doc.change_log().len()
    );
    print_snapshot(&snapshot);
    Ok(())
}
