use std::path::Path;

use anyhow::Result;

use super::{load_config, print_json};

pub fn run(path: Option<&Path>) -> Result<()> {
    print_json(&load_config(path)?)
}
