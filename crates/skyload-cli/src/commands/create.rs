use super::{
    colorize_status, json_pretty, print_rows, probe_exit_code, report_probe, with_spinner,
    CommandResult, Context,
};
use skyload_core::IngressOutcome;

pub fn run(ctx: &Context, json: bool) -> CommandResult {
    let orch = ctx.orchestrator();
    let report = with_spinner(json, "creating cluster", "cluster ready", |pb| {
        orch.create_observed(&mut |step| {
            if let Some(pb) = pb {
                pb.set_message(step.describe());
            }
        })
    })?;

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(probe_exit_code(&report.probe));
    }

    println!("role:        {} ({})", report.role.role_name, report.role.arn);
    let mut rows = report.cluster.display_rows();
    if let Some(row) = rows.iter_mut().find(|(k, _)| *k == "cluster_status") {
        row.1 = colorize_status(&row.1);
    }
    print_rows(&rows);
    match report.ingress {
        IngressOutcome::Opened { ref group_id, port } => {
            println!("ingress:     opened tcp/{port} on {group_id}");
        }
        IngressOutcome::AlreadyOpen { ref group_id, port } => {
            println!("ingress:     tcp/{port} already open on {group_id}");
        }
    }
    Ok(report_probe(&report.probe))
}
