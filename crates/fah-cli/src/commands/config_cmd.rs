//! Config subcommand handlers.

use fah_config::{Config, Profile};


use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            profile,
            host,
            username,
            password,
            tls,
            insecure,
        } => {
            let mut config = fah_config::load_config_or_default();

            config.profiles.insert(
                profile.clone(),
                Profile {
                    host,
                    username,
                    password,
                    tls: tls.then_some(true),
                    insecure: insecure.then_some(true),
                    timeout: None,
                },
            );
            if config.default_profile.is_none() || config.profiles.len() == 1 {
                config.default_profile = Some(profile.clone());
            }

            fah_config::save_config(&config)?;
            output::print_output(
                &format!(
                    "Profile '{profile}' written to {}",
                    fah_config::config_path().display()
                ),
                global.quiet,
            );
        }

        ConfigCommand::Show => {
            let config = fah_config::load_config_or_default();
            output::print_output(&render_config(&config)?, global.quiet);
        }

        ConfigCommand::Path => {
            output::print_output(&fah_config::config_path().display().to_string(), global.quiet);
        }

        ConfigCommand::Profiles => {
            let config = fah_config::load_config_or_default();
            let default = config.default_profile.as_deref().unwrap_or("");

            let mut names: Vec<&String> = config.profiles.keys().collect();
            names.sort();
            let listing = names
                .iter()
                .map(|name| {
                    if name.as_str() == default {
                        format!("{name} (default)")
                    } else {
                        (*name).to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&listing, global.quiet);
        }

        ConfigCommand::Use { name } => {
            let mut config = fah_config::load_config_or_default();
            if !config.profiles.contains_key(&name) {
                let mut available: Vec<&String> = config.profiles.keys().collect();
                available.sort();
                return Err(CliError::ProfileNotFound {
                    name,
                    available: available
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }

            config.default_profile = Some(name.clone());
            fah_config::save_config(&config)?;
            output::print_output(&format!("Default profile set to '{name}'"), global.quiet);
        }
    }

    Ok(())
}

/// Render the resolved config as TOML, with passwords redacted.
fn render_config(config: &Config) -> Result<String, CliError> {
    let mut redacted = config.clone();
    for profile in redacted.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some("<redacted>".into());
        }
    }

    toml::to_string_pretty(&redacted).map_err(|e| CliError::Config(e.to_string()))
}
