//! `imsim config validate|show`.

use std::collections::BTreeMap;

use im_credentials::load_signing_key;
use im_domain::config::{Config, ConfigError, ConfigSeverity};

/// Static checks plus an offline load of the signing key. Returns `false`
/// when any error was found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = check(config);
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();

    for (section, items) in by_section(&issues) {
        println!("[{section}]");
        for issue in items {
            println!("  {issue}");
        }
    }

    if issues.is_empty() {
        println!("Config OK ({config_path})");
    } else {
        println!(
            "\n{errors} error(s), {} warning(s) in {config_path}",
            issues.len() - errors
        );
    }
    errors == 0
}

/// `Config::validate` issues followed by the key check. The key is only
/// loaded when the static checks found nothing wrong with `[credentials]`.
pub fn check(config: &Config) -> Vec<ConfigError> {
    let mut issues = config.validate();
    let credentials_ok = !issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field.starts_with("credentials."));

    if credentials_ok {
        let creds = &config.credentials;
        match load_signing_key(&creds.key_path, creds.key_format, creds.kid.as_deref()) {
            Ok(key) => tracing::debug!(kid = %key.kid(), bits = key.bits(), "signing key usable"),
            Err(e) => issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "credentials.key_path".into(),
                message: e.to_string(),
            }),
        }
    }
    issues
}

fn by_section(issues: &[ConfigError]) -> BTreeMap<&str, Vec<&ConfigError>> {
    let mut sections: BTreeMap<&str, Vec<&ConfigError>> = BTreeMap::new();
    for issue in issues {
        let section = issue.field.split('.').next().unwrap_or("config");
        sections.entry(section).or_default().push(issue);
    }
    sections
}

/// Print the resolved config (defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    print!("{}", render(config)?);
    Ok(())
}

/// TOML rendering with the plaintext client secret masked.
pub fn render(config: &Config) -> anyhow::Result<String> {
    let mut redacted = config.clone();
    if let Some(cc) = redacted.exchange.client_credentials.as_mut() {
        if cc.client_secret.is_some() {
            cc.client_secret = Some("[REDACTED]".into());
        }
    }
    Ok(toml::to_string_pretty(&redacted)?)
}
