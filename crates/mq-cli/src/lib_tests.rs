//! Tests for CLI parsing, configuration loading, and the binary surface.

use super::*;
use mq_runtime::DriverKind;

mod parsing {
    use super::*;

    /// Verify the worker command parses its binding arguments.
    #[test]
    fn test_parse_worker() {
        let cli = Cli::try_parse_from([
            "mq-cli", "worker", "--exchange", "orders", "--queue", "create", "--route", "new",
        ])
        .unwrap();

        match cli.command {
            Commands::Worker {
                exchange,
                queue,
                route,
            } => {
                assert_eq!(exchange, "orders");
                assert_eq!(queue, "create");
                assert_eq!(route, "new");
            }
            _ => panic!("expected worker command"),
        }
    }

    /// Verify short flags work for the publish command.
    #[test]
    fn test_parse_publish_short_flags() {
        let cli = Cli::try_parse_from([
            "mq-cli", "publish", "-e", "orders", "-q", "create", "-r", "new", "-b", "payload-A",
            "-d", "30",
        ])
        .unwrap();

        match cli.command {
            Commands::Publish {
                body,
                delay,
                ..
            } => {
                assert_eq!(body, "payload-A");
                assert_eq!(delay, Some(30));
            }
            _ => panic!("expected publish command"),
        }
    }

    /// Verify a publish without --delay is immediate.
    #[test]
    fn test_parse_publish_without_delay() {
        let cli = Cli::try_parse_from([
            "mq-cli", "publish", "-e", "orders", "-q", "create", "-r", "new", "-b", "x",
        ])
        .unwrap();

        match cli.command {
            Commands::Publish { delay, .. } => assert_eq!(delay, None),
            _ => panic!("expected publish command"),
        }
    }

    /// Verify missing required arguments are rejected.
    #[test]
    fn test_missing_arguments_rejected() {
        assert!(Cli::try_parse_from(["mq-cli", "worker", "--exchange", "orders"]).is_err());
        assert!(Cli::try_parse_from(["mq-cli"]).is_err());
    }

    /// Verify global options parse alongside a subcommand.
    #[test]
    fn test_global_options() {
        let cli = Cli::try_parse_from([
            "mq-cli",
            "--config",
            "/tmp/mq.yaml",
            "--log-level",
            "debug",
            "--json-logs",
            "config",
            "--show",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/mq.yaml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }
}

mod configuration {
    use super::*;
    use std::io::Write;

    /// Verify defaults load when no file exists.
    #[test]
    fn test_load_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.driver, DriverKind::Amqp);
        assert_eq!(config.retry, 3);
    }

    /// Verify an explicit file overrides the defaults.
    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "driver: memory\nretry: 5\nconnections:\n  redis:\n    host: cache.internal"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.driver, DriverKind::Memory);
        assert_eq!(config.retry, 5);
        assert_eq!(config.connections.redis.host, "cache.internal");
        // Unnamed fields keep their defaults
        assert_eq!(config.connections.redis.port, 6379);
    }

    /// Verify a missing explicit file is a hard error.
    #[test]
    fn test_missing_explicit_file_rejected() {
        let result = load_config(Some(Path::new("/nonexistent/mq.yaml")));
        assert!(matches!(result, Err(CliError::Configuration(_))));
    }

    /// Verify a malformed file is a hard error.
    #[test]
    fn test_malformed_file_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "driver: [not, a, string").unwrap();

        assert!(load_config(Some(file.path())).is_err());
    }

    /// Verify semantic validation runs after deserialization.
    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "retry: 0").unwrap();

        let result = load_config(Some(file.path()));
        assert!(matches!(result, Err(CliError::Configuration(_))));
    }
}

mod binary {
    use assert_cmd::Command;
    use predicates::prelude::*;

    /// Verify the binary lists its commands in help output.
    #[test]
    fn test_help() {
        Command::cargo_bin("mq-cli")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("worker"))
            .stdout(predicate::str::contains("publish"));
    }

    /// Verify the config command validates the default configuration.
    #[test]
    fn test_config_command() {
        Command::cargo_bin("mq-cli")
            .unwrap()
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("configuration OK"));
    }

    /// Verify the resolved configuration renders with --show.
    #[test]
    fn test_config_show() {
        Command::cargo_bin("mq-cli")
            .unwrap()
            .args(["config", "--show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"driver\""));
    }

    /// Verify an unknown subcommand fails.
    #[test]
    fn test_unknown_command() {
        Command::cargo_bin("mq-cli")
            .unwrap()
            .arg("frobnicate")
            .assert()
            .failure();
    }
}
