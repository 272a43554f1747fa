use super::{
    colorize_status, json_pretty, print_rows, probe_exit_code, report_probe, with_spinner,
    CommandResult, Context,
};

pub fn run(ctx: &Context, json: bool) -> CommandResult {
    let orch = ctx.orchestrator();
    let report = with_spinner(json, "describing cluster", "cluster described", |_| orch.status())?;

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(probe_exit_code(&report.probe));
    }
    let rows: Vec<_> = report
        .cluster
        .display_rows()
        .into_iter()
        .map(|(k, v)| {
            if k == "cluster_status" {
                (k, colorize_status(&v))
            } else {
                (k, v)
            }
        })
        .collect();
    print_rows(&rows);
    Ok(report_probe(&report.probe))
}
