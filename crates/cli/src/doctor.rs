//! `pgrid doctor` — inspect the resolved provider configuration.

use promptgrid_config::keys;
use promptgrid_config::settings::{Provider, Settings};
use promptgrid_providers::LocalClient;

use crate::exit_codes::{EXIT_PROVIDER_MISSING_KEY, EXIT_PROVIDER_UNREACHABLE};
use crate::CliError;

#[derive(Clone, Copy, PartialEq)]
enum DoctorStatus {
    Ready,
    MissingKey,
    Unreachable,
}

impl DoctorStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DoctorStatus::Ready => "ready",
            DoctorStatus::MissingKey => "missing_key",
            DoctorStatus::Unreachable => "unreachable",
        }
    }
}

pub fn cmd_doctor(test: bool) -> Result<(), CliError> {
    let settings = Settings::load();
    let provider = settings.provider;

    let key_lookup = keys::get_api_key(keys::HOSTED_PROVIDER);
    let key_needed = provider.needs_api_key();

    let mut status = if key_needed && key_lookup.key.is_none() {
        DoctorStatus::MissingKey
    } else {
        DoctorStatus::Ready
    };

    println!("Provider Configuration");
    println!("──────────────────────────────");
    println!("provider:        {}", provider.name());
    println!("model:           {}", settings.effective_model());
    if provider == Provider::Local {
        println!("endpoint:        {}", settings.effective_local_endpoint());
    }
    if key_needed {
        println!(
            "key:             {}",
            if key_lookup.key.is_some() { "present" } else { "missing" }
        );
        println!("key_source:      {}", key_lookup.source.as_str());
    }
    println!(
        "keychain:        {}",
        if keys::keychain_available() { "ok" } else { "unavailable" }
    );
    println!("settings file:   {}", Settings::config_path_display());

    // --test: reachability for the local endpoint; the hosted provider is
    // only checked for a key here (real validation happens on first use)
    let mut test_detail: Option<String> = None;
    if test && status == DoctorStatus::Ready {
        match provider {
            Provider::Local => {
                let client = LocalClient::from_settings(&settings);
                match client.ping() {
                    Ok(()) => test_detail = Some("endpoint reachable".to_string()),
                    Err(e) => {
                        status = DoctorStatus::Unreachable;
                        test_detail = Some(e.to_string());
                    }
                }
            }
            Provider::Hosted => {
                test_detail = Some(format!(
                    "API key present ({})",
                    key_lookup.source.as_str()
                ));
            }
        }
    }
    if test {
        println!(
            "test:            {}",
            test_detail.as_deref().unwrap_or("skipped")
        );
    }
    println!("status:          {}", status.as_str());

    // Actionable fix suggestions
    match status {
        DoctorStatus::MissingKey => {
            println!();
            println!("Fix: store a key with `pgrid key set`, or set {}",
                keys::env_var_name(keys::HOSTED_PROVIDER));
            Err(CliError {
                code: EXIT_PROVIDER_MISSING_KEY,
                message: "provider misconfigured: no API key".to_string(),
                hint: None,
            })
        }
        DoctorStatus::Unreachable => {
            println!();
            println!("Fix: start the local server, or point local.endpoint at it");
            println!("     (settings: {})", Settings::config_path_display());
            Err(CliError {
                code: EXIT_PROVIDER_UNREACHABLE,
                message: format!(
                    "local endpoint unreachable: {}",
                    test_detail.unwrap_or_default()
                ),
                hint: None,
            })
        }
        DoctorStatus::Ready => Ok(()),
    }
}
