use im_domain::config::{Config, ExchangeStyle, KeyFormat};

#[test]
fn default_assertion_window_is_three_minutes() {
    let config = Config::default();
    assert_eq!(config.credentials.validity_window_secs, 180);
    assert_eq!(config.credentials.clock_skew_tolerance_secs, 30);
}

#[test]
fn default_key_format_is_sniffed() {
    let config = Config::default();
    assert_eq!(config.credentials.key_format, KeyFormat::Auto);
}

#[test]
fn default_safety_margin_is_thirty_seconds() {
    let config = Config::default();
    assert_eq!(config.session.safety_margin_secs, 30);
}

#[test]
fn default_stream_tuning() {
    let config = Config::default();
    assert_eq!(config.stream.path, "/eventrouter/v1/sse");
    assert_eq!(config.stream.max_reconnect_attempts, 5);
    assert_eq!(config.stream.initial_backoff_ms, 500);
}

#[test]
fn partial_toml_keeps_defaults() {
    let toml_str = r#"
[service]
base_url = "https://scrt.example.com"
org_id = "00D000000000001"
es_developer_name = "Web_Chat"

[credentials]
key_path = "keys/private.pem"
key_format = "pem"
kid = "kid-42"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.credentials.key_format, KeyFormat::Pem);
    assert_eq!(config.credentials.kid.as_deref(), Some("kid-42"));
    assert_eq!(config.credentials.subject, "user123");
    assert_eq!(config.service.platform, "Web");
    assert_eq!(config.exchange.style, ExchangeStyle::MessagingJson);
}

#[test]
fn exchange_style_parses_snake_case() {
    let toml_str = r#"
[exchange]
style = "oauth_form"
token_url = "https://login.example.com/services/oauth2/token"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.exchange.style, ExchangeStyle::OauthForm);
    assert_eq!(
        config.exchange.token_url.as_deref(),
        Some("https://login.example.com/services/oauth2/token")
    );
}

#[test]
fn stream_section_overrides() {
    let toml_str = r#"
[stream]
max_reconnect_attempts = 2
idle_timeout_ms = 1000
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.stream.max_reconnect_attempts, 2);
    assert_eq!(config.stream.idle_timeout_ms, 1000);
    assert_eq!(config.stream.channel_type, "embedded_messaging");
}
