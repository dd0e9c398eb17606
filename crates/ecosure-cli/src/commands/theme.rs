use anyhow::Result;
use serde_json::json;

use crate::output::{OutputFormat, json::print_json};
use crate::state::ClientState;
use crate::theme::Biome;

pub fn run(biome: Option<Biome>, format: OutputFormat) -> Result<()> {
    let mut state = ClientState::load();
    if let Some(biome) = biome {
        state.biome = biome;
        state.save()?;
    }

    if format.is_json() {
        return print_json(&json!({ "biome": state.biome }));
    }
    println!("Theme: {}", state.biome.heading(state.biome.name()));
    Ok(())
}
