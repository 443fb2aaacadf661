use std::io::Write;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.delta.max_length.get(), 20);
    assert_eq!(settings.state.path, PathBuf::from(DEFAULT_STATE_PATH));
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_max_length_is_rejected() {
    let mut raw = RawSettings::default();
    raw.delta.max_length = Some(0);

    let err = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "delta.max_length",
            ..
        }
    ));
}

#[test]
fn invalid_log_level_names_key() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(err.to_string().contains("logging.level"));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["flagsync"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "flagsync",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--delta-max-length",
        "50",
        "--state-path",
        "/var/lib/flagsync/state.json",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.delta_max_length, Some(50));
            assert_eq!(
                serve.overrides.state.state_path.as_deref(),
                Some(std::path::Path::new("/var/lib/flagsync/state.json"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_check_arguments() {
    let args = CliArgs::parse_from(["flagsync", "check", "--state-path", "/tmp/state.json"]);

    match args.command.expect("check command") {
        Command::Check(check) => {
            assert_eq!(
                check.state.state_path.as_deref(),
                Some(std::path::Path::new("/tmp/state.json"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn config_file_is_overridden_by_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[delta]\nmax_length = 64\n\n[server]\nport = 5000\n\n[state]\npath = \"from-file.json\""
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "flagsync".to_string(),
        "--config-file".to_string(),
        file.path().display().to_string(),
        "serve".to_string(),
        "--server-port".to_string(),
        "6000".to_string(),
    ]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.delta.max_length.get(), 64);
    assert_eq!(settings.server.addr.port(), 6000);
    assert_eq!(settings.state.path, PathBuf::from("from-file.json"));
}
