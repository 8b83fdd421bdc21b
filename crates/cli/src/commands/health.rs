use anyhow::{Result, bail};
use llm::OllamaService;

use super::Project;

pub async fn cmd_health(project: &Project) -> Result<()> {
  let model = &project.config.model;
  let service = OllamaService::new().with_url(&model.url);
  let health = service.check_health(&model.model).await;

  println!("crosslink Health Check");
  println!("======================\n");
  println!("Ollama:     {}", service.base_url());

  if !health.available {
    println!("Status:     NOT REACHABLE");
    bail!("Ollama is not reachable at {}", service.base_url());
  }
  println!("Status:     HEALTHY");
  println!(
    "Model:      {} ({})",
    health.configured_model,
    if health.configured_model_available {
      "available"
    } else {
      "missing, run `ollama pull`"
    }
  );
  if !health.models.is_empty() {
    println!("Installed:  {}", health.models.join(", "));
  }
  Ok(())
}
