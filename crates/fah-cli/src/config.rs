//! Flag-aware configuration resolution on top of `fah_config`.
//!
//! The library crates never see CLI flags -- this module is the single
//! boundary where `GlobalOpts` and the TOML profiles meet to produce a
//! `GatewayConfig`.

use std::time::Duration;

use secrecy::SecretString;

use fah_api::transport::GatewayConfig;
use fah_config::{Config, Profile};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `GatewayConfig` from the config file, profile, and CLI overrides.
///
/// Flags and environment beat the profile, the profile beats the file's
/// `[defaults]` section. Works without any config file as long as the
/// flags carry a host, username, and password.
pub fn build_gateway_config(global: &GlobalOpts) -> Result<GatewayConfig, CliError> {
    let config = fah_config::load_config_or_default();
    let profile_name = active_profile_name(global, &config);
    let profile = config.profiles.get(&profile_name);

    if profile.is_none() && global.host.is_none() {
        return Err(CliError::NoConfig {
            path: fah_config::config_path().display().to_string(),
        });
    }

    let host = global
        .host
        .clone()
        .or_else(|| profile.map(|p| p.host.clone()))
        .ok_or_else(|| CliError::Validation {
            field: "host".into(),
            reason: "no gateway host configured".into(),
        })?;

    let username = global
        .username
        .clone()
        .or_else(|| profile.map(|p| p.username.clone()))
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.clone(),
        })?;

    let password = resolve_password(global, profile, &profile_name)?;

    let tls = global.tls || profile.and_then(|p| p.tls).unwrap_or(false);
    let insecure = global.insecure
        || profile
            .and_then(|p| p.insecure)
            .unwrap_or(config.defaults.insecure);
    let timeout = profile
        .and_then(|p| p.timeout)
        .filter(|_| global.timeout == 30)
        .unwrap_or(global.timeout);

    Ok(GatewayConfig::new(host, username, password)
        .with_tls(tls)
        .with_insecure(insecure)
        .with_timeout(Duration::from_secs(timeout)))
}

/// Resolve the password: flag/env first, then the profile chain.
fn resolve_password(
    global: &GlobalOpts,
    profile: Option<&Profile>,
    profile_name: &str,
) -> Result<SecretString, CliError> {
    if let Some(ref pw) = global.password {
        return Ok(SecretString::from(pw.clone()));
    }

    let profile = profile.ok_or_else(|| CliError::NoCredentials {
        profile: profile_name.to_owned(),
    })?;
    Ok(fah_config::resolve_password(profile, profile_name)?)
}
