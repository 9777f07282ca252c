//! `careclaw config`: Print the effective configuration.

use careclaw_config::AppConfig;

pub fn run(config: &AppConfig) {
    println!(
        "# {}",
        AppConfig::config_dir().join("config.toml").display()
    );
    print!("{}", config.to_toml());
}
