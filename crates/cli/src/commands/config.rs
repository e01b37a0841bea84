use anyhow::Result;
use bsod_core::db::{load_config_file, save_config, AnalyzerConfig, DataLayout};

/// Print the effective configuration.
///
/// With `init`, the stored file (defaults filled in, environment overrides
/// left out) is written back to `config.json` first.
pub fn config_command(layout: &DataLayout, config: &AnalyzerConfig, init: bool) -> Result<()> {
    if init {
        save_config(layout, &load_config_file(layout)?)?;
        println!("Wrote {}", layout.config_path.display());
    }

    println!("Core library: bsod-core {}", bsod_core::version());
    println!("Data dir: {}", layout.root.display());
    println!("Config file: {}", layout.config_path.display());
    println!("Database: {}", layout.resolve(&config.database_path).display());
    println!("Default dump dir: {}", config.default_dump_dir);
    println!("Max stack frames: {}", config.max_stack_frames);
    println!("Confidence threshold: {:.2}", config.confidence_threshold);
    println!("Log level: {}", config.log_level);
    match &config.known_bad_drivers_file {
        Some(file) => println!("Known-bad driver file: {}", layout.resolve(file).display()),
        None => println!("Known-bad driver file: (built-in table only)"),
    }
    Ok(())
}
