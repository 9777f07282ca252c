//! `careclaw tools`: List the clinical tools and which roles may use them.

use careclaw_core::role::Role;
use careclaw_core::tool::ToolDefinition;
use careclaw_tools::default_registry;

pub fn run(role: Option<Role>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let definitions = visible_definitions(role);

    if json {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    println!("Clinical tools");
    println!("==============");
    for def in &definitions {
        let roles: Vec<&str> = Role::ALL
            .into_iter()
            .filter(|r| r.policy().allows_tool(&def.name))
            .map(|r| r.as_str())
            .collect();
        println!();
        println!("  {}", def.name);
        println!("    {}", def.description);
        println!("    roles: {}", roles.join(", "));
    }
    Ok(())
}

/// Definitions of the default registry, limited to `role` when given.
fn visible_definitions(role: Option<Role>) -> Vec<ToolDefinition> {
    default_registry()
        .definitions()
        .into_iter()
        .filter(|def| role.is_none_or(|r| r.policy().allows_tool(&def.name)))
        .collect()
}
