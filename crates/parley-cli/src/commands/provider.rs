//! Provider and model listings.

use parley_providers::providers;

use crate::AppContext;

pub fn list_providers(ctx: &AppContext) {
    let current = &ctx.config.endpoint.provider;
    println!("Known providers:\n");
    for spec in providers::all() {
        let marker = if spec.id.eq_ignore_ascii_case(current) {
            " (configured)"
        } else {
            ""
        };
        println!("  {} - {}{}", spec.id, spec.name, marker);
        if !spec.base_url.is_empty() {
            println!("    Base URL:      {}", spec.base_url);
        }
        println!("    Auth:          {:?}", spec.auth);
        if let Some(var) = spec.api_key_env {
            let status = if std::env::var(var).map_or(false, |v| !v.is_empty()) {
                "set"
            } else {
                "not set"
            };
            println!("    API key env:   {} ({})", var, status);
        }
        if spec.requires_folder_id {
            println!("    Folder id:     required");
        }
        match spec.default_model {
            Some(model) => println!("    Default model: {}", model),
            None => println!("    Default model: none"),
        }
        println!();
    }
}

pub fn list_models(provider: Option<&str>, ctx: &AppContext) {
    let catalog = ctx.catalog();
    let catalog = catalog.read();

    let entries: Vec<_> = match provider {
        Some(provider) => catalog.candidates(provider),
        None => catalog.entries().iter().collect(),
    };

    if entries.is_empty() {
        println!("No models registered.");
        return;
    }

    println!(
        "{:<12} {:<28} {:<9} {:>8} {:<6} {:<6} {:>4}",
        "PROVIDER", "MODEL", "TIER", "CONTEXT", "TOOLS", "VISION", "PRIO"
    );
    for entry in entries {
        let caps = &entry.capabilities;
        println!(
            "{:<12} {:<28} {:<9} {:>8} {:<6} {:<6} {:>4}",
            entry.provider,
            entry.model,
            entry.tier().to_string(),
            caps.context_window,
            yes_no(caps.tools),
            yes_no(caps.vision),
            entry.priority
        );
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
