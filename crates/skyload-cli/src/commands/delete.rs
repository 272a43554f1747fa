use super::{json_pretty, with_spinner, CommandResult, Context, Failure, EXIT_FAILURE, EXIT_SUCCESS};
use dialoguer::Confirm;
use std::io::{stderr, stdin, IsTerminal};

fn confirm(identifier: &str) -> Result<(), Failure> {
    if !(stdin().is_terminal() && stderr().is_terminal()) {
        return Err(Failure::new(
            EXIT_FAILURE,
            format!("refusing to delete '{identifier}' without confirmation (pass --yes)"),
        ));
    }
    let proceed = Confirm::new()
        .with_prompt(format!("delete cluster '{identifier}'?"))
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if proceed {
        Ok(())
    } else {
        Err(Failure::new(EXIT_FAILURE, "delete aborted"))
    }
}

pub fn run(ctx: &Context, yes: bool, final_snapshot: Option<&str>, json: bool) -> CommandResult {
    let identifier = &ctx.settings.cluster.identifier;
    if !yes && !json {
        confirm(identifier)?;
    }

    let orch = ctx.orchestrator();
    let report = with_spinner(json, "deleting cluster", "cluster deleted", |_| {
        orch.delete(final_snapshot)
    })?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!(
            "deleted cluster {} after {}s ({} checks)",
            report.identifier, report.elapsed_secs, report.checks
        );
        if let Some(snapshot) = final_snapshot {
            println!("final snapshot: {snapshot}");
        }
    }
    Ok(EXIT_SUCCESS)
}
