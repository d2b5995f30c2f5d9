//! Launch-mode resolution.
//!
//! A process of a coupled run arrives in one of three mutually exclusive
//! ways: started by the framework's own multi-application launcher
//! (configuration supplied implicitly through the environment), started
//! as one of several programs of a manual MPMD launch (configuration
//! recovered from a marker embedded in the argument vector), or started
//! as a single ordinary program that must re-invoke itself through the
//! launcher. The detection heuristics live behind [`LaunchProbe`] so they
//! can be replaced without touching the bootstrap.

use std::process::Command;

use simbus_config::{APP_ARGV_OPTION, CONFIG_ARGV_OPTION, CONFIG_ENV_VAR};

use crate::Error;

/// Name of the framework launcher binary a standalone process re-invokes
/// itself through.
pub const LAUNCHER_BIN: &str = "simbus-launch";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchMode {
    /// Started by the framework launcher.
    Framework,
    /// One program of a manual multi-program launch.
    Mpmd,
    /// Ordinary single program; must relaunch through the framework.
    Standalone,
}

/// Resolved launch metadata.
#[derive(Clone, Debug)]
pub struct Launch {
    pub mode: LaunchMode,
    /// Description text or path recovered from the argument vector, if
    /// any. Takes priority over every other configuration source.
    pub config_override: Option<String>,
    /// Application label recovered from the argument vector, if any.
    pub app_label: Option<String>,
}

impl Launch {
    pub fn launched_by_framework(&self) -> bool {
        self.mode == LaunchMode::Framework
    }
}

/// Strategy deciding how this process was launched. Implementations must
/// be pure with respect to the argument vector: resolution may run more
/// than once and has to come to the same answer.
pub trait LaunchProbe {
    fn resolve(&self, argv: &[String]) -> Result<Launch, Error>;
}

/// Stock probe: launcher environment marker first, then the embedded
/// argument-vector marker, then standalone. The markers may sit anywhere
/// in the argument vector; no positional assumptions are made.
#[derive(Clone, Debug)]
pub struct EnvArgvProbe {
    env_var: String,
}

impl EnvArgvProbe {
    pub fn new() -> Self {
        Self {
            env_var: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Probe a non-default environment variable (used by tests to avoid
    /// cross-talk through the process environment).
    pub fn with_env_var(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
        }
    }
}

impl Default for EnvArgvProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchProbe for EnvArgvProbe {
    fn resolve(&self, argv: &[String]) -> Result<Launch, Error> {
        let app_label = get_option(argv, APP_ARGV_OPTION);

        if std::env::var_os(&self.env_var).is_some() {
            log::debug!("launched by the framework launcher ({} is set)", self.env_var);
            return Ok(Launch {
                mode: LaunchMode::Framework,
                config_override: None,
                app_label,
            });
        }

        if let Some(config) = get_option(argv, CONFIG_ARGV_OPTION) {
            log::debug!("manual MPMD launch detected ({CONFIG_ARGV_OPTION} marker found)");
            return Ok(Launch {
                mode: LaunchMode::Mpmd,
                config_override: Some(config),
                app_label,
            });
        }

        log::debug!("standalone launch detected");
        Ok(Launch {
            mode: LaunchMode::Standalone,
            config_override: None,
            app_label,
        })
    }
}

/// Scan an argument vector for `--option value` or `--option=value`.
pub fn get_option(argv: &[String], option: &str) -> Option<String> {
    let mut args = argv.iter();
    while let Some(arg) = args.next() {
        if arg == option {
            return args.next().cloned();
        }
        if let Some(value) = arg.strip_prefix(option).and_then(|s| s.strip_prefix('=')) {
            return Some(value.to_string());
        }
    }
    None
}

/// Build the command a standalone process uses to re-invoke itself
/// through the framework launcher with its original arguments. The caller
/// (typically a thin binary wrapper) is expected to exec it and never
/// proceed past launch-mode resolution in the original invocation.
pub fn relaunch_command(config_file: &str, argv: &[String]) -> Command {
    let mut cmd = Command::new(LAUNCHER_BIN);
    cmd.arg(config_file);
    cmd.args(argv);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn env_marker_means_framework() {
        std::env::set_var("SIMBUS_TEST_LAUNCH_ENV", "applications: []");
        let probe = EnvArgvProbe::with_env_var("SIMBUS_TEST_LAUNCH_ENV");

        let launch = probe.resolve(&argv(&["prog"])).unwrap();
        assert_eq!(launch.mode, LaunchMode::Framework);
        assert!(launch.config_override.is_none());

        std::env::remove_var("SIMBUS_TEST_LAUNCH_ENV");
    }

    #[test]
    fn env_marker_beats_argv_marker() {
        std::env::set_var("SIMBUS_TEST_LAUNCH_PRIO", "applications: []");
        let probe = EnvArgvProbe::with_env_var("SIMBUS_TEST_LAUNCH_PRIO");

        let launch = probe
            .resolve(&argv(&["prog", "--simbus-config", "x.yaml"]))
            .unwrap();
        assert_eq!(launch.mode, LaunchMode::Framework);

        std::env::remove_var("SIMBUS_TEST_LAUNCH_PRIO");
    }

    #[test]
    fn argv_marker_means_mpmd() {
        let probe = EnvArgvProbe::with_env_var("SIMBUS_TEST_LAUNCH_UNSET");

        let launch = probe
            .resolve(&argv(&["prog", "-v", "--simbus-config", "run.yaml"]))
            .unwrap();
        assert_eq!(launch.mode, LaunchMode::Mpmd);
        assert_eq!(launch.config_override.as_deref(), Some("run.yaml"));

        // `=` form, arbitrary position.
        let launch = probe
            .resolve(&argv(&[
                "prog",
                "--simbus-config=run.yaml",
                "--simbus-app=receiver",
            ]))
            .unwrap();
        assert_eq!(launch.mode, LaunchMode::Mpmd);
        assert_eq!(launch.config_override.as_deref(), Some("run.yaml"));
        assert_eq!(launch.app_label.as_deref(), Some("receiver"));
    }

    #[test]
    fn no_marker_means_standalone() {
        let probe = EnvArgvProbe::with_env_var("SIMBUS_TEST_LAUNCH_UNSET");
        let launch = probe.resolve(&argv(&["prog", "--verbose"])).unwrap();
        assert_eq!(launch.mode, LaunchMode::Standalone);
    }

    #[test]
    fn resolution_is_repeatable() {
        let probe = EnvArgvProbe::with_env_var("SIMBUS_TEST_LAUNCH_UNSET");
        let args = argv(&["prog", "--simbus-config=run.yaml"]);

        let first = probe.resolve(&args).unwrap();
        let second = probe.resolve(&args).unwrap();
        assert_eq!(first.mode, second.mode);
        assert_eq!(first.config_override, second.config_override);
    }

    #[test]
    fn relaunch_preserves_arguments() {
        let cmd = relaunch_command("run.yaml", &argv(&["prog", "--flag"]));
        assert_eq!(cmd.get_program(), LAUNCHER_BIN);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy()).collect();
        assert_eq!(args, ["run.yaml", "prog", "--flag"]);
    }
}
