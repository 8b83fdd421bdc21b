use anyhow::{Result, bail};
use crosslink_core::Config;

use super::Project;

/// Show current effective configuration
pub async fn cmd_config_show(project: &Project) -> Result<()> {
  let project_config = Config::project_config_path(&project.root);
  let user_config = Config::user_config_path();

  println!("Effective configuration for: {}", project.root.display());
  println!();

  if project_config.exists() {
    println!("Using project config: {}", project_config.display());
  } else if let Some(user_path) = user_config.filter(|p| p.exists()) {
    println!("Using user config: {}", user_path.display());
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  println!("{}", toml::to_string_pretty(&project.config)?);
  Ok(())
}

/// Initialize project configuration file
pub async fn cmd_config_init(project: &Project) -> Result<()> {
  let config_path = Config::project_config_path(&project.root);
  if config_path.exists() {
    bail!(
      "Config file already exists: {} (delete it first to regenerate)",
      config_path.display()
    );
  }

  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&config_path, Config::generate_template())?;

  println!("Created project config: {}", config_path.display());
  println!("Edit the file to customize settings.");
  Ok(())
}
