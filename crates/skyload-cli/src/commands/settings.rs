use super::{json_pretty, print_rows, CommandResult, EXIT_SUCCESS};
use skyload_config::Settings;
use std::path::Path;

pub fn run(config: &Path, json: bool) -> CommandResult {
    let settings = Settings::load(config)?;
    let rows = settings.display_rows();
    if json {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .into_iter()
            .map(|(k, v)| (k.to_owned(), serde_json::Value::String(v)))
            .collect();
        println!("{}", json_pretty(&map)?);
    } else {
        println!("settings from {}", config.display());
        print_rows(&rows);
    }
    Ok(EXIT_SUCCESS)
}
