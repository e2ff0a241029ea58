// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waflow config check` command implementation.
//!
//! Schema and range validation already ran while loading. This goes one step
//! further and constructs every component that needs a secret, so a missing
//! key is reported here instead of at `serve` startup.

use waflow_anthropic::AnthropicSummarizer;
use waflow_config::WaflowConfig;
use waflow_core::WaflowError;
use waflow_ingress::IngressSettings;
use waflow_whatsapp::WhatsAppGateway;

/// Problems that would stop `serve` from starting.
pub fn readiness_problems(config: &WaflowConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if let Err(e) = IngressSettings::from_config(&config.ingress) {
        problems.push(e.to_string());
    }
    if let Err(e) = WhatsAppGateway::from_config(&config.whatsapp) {
        problems.push(e.to_string());
    }
    if let Err(e) = AnthropicSummarizer::from_config(&config.summarizer) {
        problems.push(e.to_string());
    }
    problems
}

pub fn run_check(config: &WaflowConfig) -> Result<(), WaflowError> {
    let problems = readiness_problems(config);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  - {problem}");
        }
        return Err(WaflowError::Config(format!(
            "{} problem(s) would prevent `waflow serve` from starting",
            problems.len()
        )));
    }

    println!("config ok");
    println!("  database:   {}", config.storage.database_path);
    println!(
        "  ingress:    {}:{}",
        config.ingress.bind_address, config.ingress.port
    );
    println!(
        "  workers:    {} outreach, {} summarize",
        config.worker.outreach_workers, config.worker.summarize_workers
    );
    println!(
        "  scheduler:  {}",
        if config.scheduler.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}
