use clap::Parser;
use voltrack::cli::Cli;
use voltrack::error::ExitCode;
use voltrack::lock::RunLock;

use super::support::Env;

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["voltrack", "-q"];
    argv.extend_from_slice(args);
    voltrack::run_app(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_scan_then_reports() {
    let env = Env::new();
    env.write("a.bin", b"same");
    env.write("sub/b.bin", b"same");
    let config = env.config_file();
    let config = config.to_str().unwrap();

    assert_eq!(run(&["--config", config, "scan"]).unwrap(), ExitCode::Success);
    let stats = env.store().stats().unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.pending_hash, 0);

    assert_eq!(
        run(&["--config", config, "duplicates", "--json"]).unwrap(),
        ExitCode::Success
    );
    assert_eq!(run(&["--config", config, "status"]).unwrap(), ExitCode::Success);
    assert_eq!(
        run(&["--config", config, "purge", "--older-than", "30"]).unwrap(),
        ExitCode::Success
    );
    assert_eq!(env.store().duplicate_groups(1).unwrap().len(), 1);
}

#[test]
fn test_scan_no_find_only_hashes() {
    let env = Env::new();
    env.write("a.txt", b"alpha");
    let config = env.config_file();
    let config = config.to_str().unwrap();

    assert_eq!(
        run(&["--config", config, "scan", "--no-find"]).unwrap(),
        ExitCode::Success
    );
    assert!(env.record("a.txt").is_none());
}

#[test]
fn test_volume_flag_overrides_config() {
    let env = Env::new();
    let other = tempfile::TempDir::new().unwrap();
    std::fs::write(other.path().join("x.txt"), b"x").unwrap();
    env.write("ignored.txt", b"not scanned");
    let config = env.config_file();

    let code = run(&[
        "--config",
        config.to_str().unwrap(),
        "scan",
        "--volume",
        other.path().to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(code, ExitCode::Success);

    let store = env.store();
    assert!(store
        .find_by_path(&other.path().join("x.txt"))
        .unwrap()
        .is_some());
    assert!(env.record("ignored.txt").is_none());
}

#[test]
fn test_held_volume_lock_exit_code() {
    let env = Env::new();
    env.write("a.txt", b"alpha");
    let config = env.config_file();
    let _held = RunLock::for_volume(&env.config.scan.lock_dir, env.volume.path()).unwrap();

    let err = run(&["--config", config.to_str().unwrap(), "scan"]).unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::RunInProgress);
    assert_eq!(ExitCode::from_error(&err).as_i32(), 5);
}

#[test]
fn test_missing_volumes_is_config_error() {
    let env = Env::new();
    let config = env.state.path().join("empty.toml");
    std::fs::write(
        &config,
        format!(
            "[database]\npath = {}\n",
            super::support::toml_string(&env.config.database.path)
        ),
    )
    .unwrap();

    let err = run(&["--config", config.to_str().unwrap(), "scan"]).unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);
}

#[test]
fn test_relative_volume_is_config_error() {
    let env = Env::new();
    let config = env.config_file();
    let err = run(&[
        "--config",
        config.to_str().unwrap(),
        "watch",
        "--volume",
        "relative/path",
    ])
    .unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);
}
