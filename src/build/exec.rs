// src/build/exec.rs

//! Command execution for build profiles
//!
//! Commands run through `sh -c` with the merged build environment. Before a
//! command runs, `${NAME}` references are replaced from that environment and
//! `$((command))` sub-shells are replaced by their trimmed output. A step
//! consisting only of `$(name)` calls the descriptor function `name`.

use crate::descriptor::Function;
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]*)\}").unwrap_or_else(|_| unreachable!("static pattern"))
});

static SUBSHELL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(\((.*?)\)\)").unwrap_or_else(|_| unreachable!("static pattern"))
});

static FUNCTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\$\(([A-Za-z0-9_.-]+)\)\s*$").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Prefix of the variables the builder sets itself; these may be empty
pub const BUILD_VAR_PREFIX: &str = "ART_";

/// Name of the function a `$(name)` step calls
pub fn function_call(step: &str) -> Option<&str> {
    FUNCTION_PATTERN
        .captures(step)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Environment visible to profile commands
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    vars: HashMap<String, String>,
    interactive: bool,
}

impl BuildEnv {
    /// Start from the current process environment
    pub fn from_process(interactive: bool) -> Self {
        Self {
            vars: std::env::vars().collect(),
            interactive,
        }
    }

    /// Start from an explicit set of variables
    pub fn from_vars(vars: HashMap<String, String>, interactive: bool) -> Self {
        Self { vars, interactive }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Overlay `vars`, resolving `$((command))` values in `dir` first
    ///
    /// Later layers win on conflicting names.
    pub fn overlay(&mut self, vars: &HashMap<String, String>, dir: &Path) -> Result<()> {
        let mut names: Vec<&String> = vars.keys().collect();
        names.sort();
        for name in names {
            let value = self.eval_subshells(&vars[name], dir)?;
            self.vars.insert(name.clone(), value);
        }
        Ok(())
    }

    /// Replace every `${NAME}` in `input`
    ///
    /// An undefined or empty variable is an error, unless the build is
    /// interactive, in which case its value is read from stdin and
    /// remembered. `ART_*` variables are taken as they are.
    pub fn expand(&mut self, input: &str) -> Result<String> {
        let names: Vec<String> = VAR_PATTERN
            .captures_iter(input)
            .map(|c| c[1].to_string())
            .collect();

        let mut output = input.to_string();
        for name in names {
            let value = match self
                .vars
                .get(&name)
                .filter(|v| !v.is_empty() || name.starts_with(BUILD_VAR_PREFIX))
            {
                Some(value) => value.clone(),
                None if self.interactive => {
                    let value = prompt_for(&name)?;
                    self.vars.insert(name.clone(), value.clone());
                    value
                }
                None => {
                    return Err(Error::Execution(format!(
                        "environment variable '{}' is not defined",
                        name
                    )));
                }
            };
            output = output.replace(&format!("${{{}}}", name), &value);
        }
        Ok(output)
    }

    /// Replace every `$((command))` in `input` with the command's output
    pub fn eval_subshells(&self, input: &str, dir: &Path) -> Result<String> {
        let mut output = input.to_string();
        let shells: Vec<(String, String)> = SUBSHELL_PATTERN
            .captures_iter(input)
            .map(|c| (c[0].to_string(), c[1].to_string()))
            .collect();
        for (expression, command) in shells {
            let value = self.capture(&command, dir)?;
            output = output.replace(&expression, value.trim());
        }
        Ok(output)
    }

    /// Run one step, either a command or a `$(name)` function call
    pub fn run_step(&mut self, step: &str, dir: &Path, functions: &[Function]) -> Result<()> {
        self.run_nested(step, dir, functions, &mut Vec::new())
    }

    /// Run the commands of function `name`
    ///
    /// The function environment is overlaid on a copy of this one and does
    /// not outlive the call.
    pub fn call_function(&self, name: &str, dir: &Path, functions: &[Function]) -> Result<()> {
        self.call_nested(name, dir, functions, &mut Vec::new())
    }

    fn run_nested(
        &mut self,
        step: &str,
        dir: &Path,
        functions: &[Function],
        stack: &mut Vec<String>,
    ) -> Result<()> {
        match function_call(step) {
            Some(name) => self.call_nested(name, dir, functions, stack),
            None => self.run(step, dir),
        }
    }

    fn call_nested(
        &self,
        name: &str,
        dir: &Path,
        functions: &[Function],
        stack: &mut Vec<String>,
    ) -> Result<()> {
        let function = functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::Execution(format!("function '{}' is not defined", name)))?;
        if stack.iter().any(|n| n == name) {
            return Err(Error::Execution(format!(
                "function '{}' calls itself: {} -> {}",
                name,
                stack.join(" -> "),
                name
            )));
        }

        info!("Calling function '{}'", name);
        stack.push(name.to_string());
        let mut env = self.clone();
        env.overlay(&function.env, dir)?;
        for step in &function.run {
            env.run_nested(step, dir, functions, stack)?;
        }
        stack.pop();
        Ok(())
    }

    /// Expand and run one profile command
    pub fn run(&mut self, command: &str, dir: &Path) -> Result<()> {
        let command = self.eval_subshells(command, dir)?;
        let command = self.expand(&command)?;
        info!("Running: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(dir)
            .env_clear()
            .envs(&self.vars);

        if self.interactive {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| Error::Execution(format!("cannot start '{}': {}", command, e)))?;
            if !status.success() {
                return Err(command_failed(&command, status.code(), ""));
            }
            return Ok(());
        }

        let output = cmd
            .output()
            .map_err(|e| Error::Execution(format!("cannot start '{}': {}", command, e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines() {
            debug!("[stdout] {}", line);
        }
        for line in stderr.lines() {
            debug!("[stderr] {}", line);
        }

        if !output.status.success() {
            return Err(command_failed(&command, output.status.code(), &stderr));
        }
        Ok(())
    }

    fn capture(&self, command: &str, dir: &Path) -> Result<String> {
        debug!("Evaluating sub-shell: {}", command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .env_clear()
            .envs(&self.vars)
            .output()
            .map_err(|e| Error::Execution(format!("cannot start '{}': {}", command, e)))?;
        if !output.status.success() {
            return Err(command_failed(
                command,
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Explanation of a shell exit code
pub fn exit_message(code: i32) -> &'static str {
    match code {
        1 => "general error",
        2 => "misuse of shell built-ins",
        126 => "command invoked cannot execute",
        127 => "command not found",
        128 => "invalid argument to exit",
        130 => "script terminated by Control-C",
        _ => "unknown error",
    }
}

fn command_failed(command: &str, code: Option<i32>, stderr: &str) -> Error {
    let reason = match code {
        Some(code) => format!("exit code {} ({})", code, exit_message(code)),
        None => "terminated by a signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Error::Execution(format!("'{}' failed: {}", command, reason))
    } else {
        Error::Execution(format!("'{}' failed: {}\n{}", command, reason, stderr))
    }
}

/// Ask for a variable value on the terminal
fn prompt_for(name: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{}: ", name)?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        return Err(Error::Execution(format!("no value given for '{}'", name)));
    }
    Ok(value)
}

/// Wait for `target` to appear, checking `attempts` times
///
/// Build tools may return before their output is on disk.
pub fn wait_for_target(target: &Path, attempts: u32, interval: Duration) -> Result<()> {
    for attempt in 0..attempts.max(1) {
        if target.exists() {
            if attempt > 0 {
                debug!("Target {} appeared after {} checks", target.display(), attempt + 1);
            }
            return Ok(());
        }
        if attempt + 1 < attempts {
            thread::sleep(interval);
        }
    }

    warn!("Target {} never appeared", target.display());
    Err(Error::TargetNotFound(target.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> BuildEnv {
        BuildEnv::from_vars(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            false,
        )
    }

    #[test]
    fn test_expand() {
        let mut env = env(&[("APP", "shop"), ("VERSION", "1.2")]);
        assert_eq!(
            env.expand("build ${APP}-${VERSION}.jar ${APP}").unwrap(),
            "build shop-1.2.jar shop"
        );
        assert_eq!(env.expand("no variables").unwrap(), "no variables");
    }

    #[test]
    fn test_expand_undefined_is_error() {
        let mut env = env(&[]);
        assert!(matches!(
            env.expand("echo ${MISSING}"),
            Err(Error::Execution(_))
        ));
    }

    #[test]
    fn test_expand_empty_is_undefined() {
        let mut env = env(&[("TOKEN", ""), ("ART_GIT_COMMIT", "")]);
        assert!(matches!(
            env.expand("login ${TOKEN}"),
            Err(Error::Execution(_))
        ));
        // builder variables are empty for unversioned sources
        assert_eq!(env.expand("rev=${ART_GIT_COMMIT}").unwrap(), "rev=");
    }

    #[test]
    fn test_function_call_pattern() {
        assert_eq!(function_call("$(clean)"), Some("clean"));
        assert_eq!(function_call("  $(build-docs) "), Some("build-docs"));
        assert_eq!(function_call("echo $(date)"), None);
        assert_eq!(function_call("$((echo hi))"), None);
    }

    fn function(name: &str, env: &[(&str, &str)], run: &[&str]) -> Function {
        Function {
            name: name.to_string(),
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            run: run.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_run_step_calls_function() {
        let temp_dir = TempDir::new().unwrap();
        let functions = vec![
            function("outer", &[("WHO", "outer")], &["$(inner)", "echo ${WHO} >> log.txt"]),
            function("inner", &[("WHO", "inner")], &["echo ${WHO} >> log.txt"]),
        ];
        let mut env = env(&[("PATH", "/usr/bin:/bin"), ("WHO", "caller")]);

        env.run_step("$(outer)", temp_dir.path(), &functions).unwrap();
        env.run_step("echo ${WHO} >> log.txt", temp_dir.path(), &functions)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("log.txt")).unwrap(),
            "inner\nouter\ncaller\n"
        );
    }

    #[test]
    fn test_function_errors() {
        let temp_dir = TempDir::new().unwrap();
        let functions = vec![
            function("ping", &[], &["$(pong)"]),
            function("pong", &[], &["$(ping)"]),
        ];
        let env = env(&[("PATH", "/usr/bin:/bin")]);

        let err = env
            .call_function("ping", temp_dir.path(), &functions)
            .unwrap_err();
        assert!(err.to_string().contains("ping -> pong -> ping"));
        assert!(matches!(
            env.call_function("missing", temp_dir.path(), &functions),
            Err(Error::Execution(_))
        ));
    }

    #[test]
    fn test_overlay_with_subshell() {
        let temp_dir = TempDir::new().unwrap();
        let mut env = env(&[("PATH", "/usr/bin:/bin"), ("STAGE", "dev")]);
        let vars = HashMap::from([
            ("STAGE".to_string(), "prod".to_string()),
            ("GREETING".to_string(), "$((echo hello))-world".to_string()),
        ]);

        env.overlay(&vars, temp_dir.path()).unwrap();
        assert_eq!(env.get("STAGE"), Some("prod"));
        assert_eq!(env.get("GREETING"), Some("hello-world"));
    }

    #[test]
    fn test_run_uses_environment() {
        let temp_dir = TempDir::new().unwrap();
        let mut env = env(&[("PATH", "/usr/bin:/bin"), ("NAME", "art")]);

        env.run("echo \"$NAME ${NAME}\" > out.txt", temp_dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("out.txt")).unwrap(),
            "art art\n"
        );
    }

    #[test]
    fn test_run_failure_reports_exit_code() {
        let temp_dir = TempDir::new().unwrap();
        let mut env = env(&[("PATH", "/usr/bin:/bin")]);

        let err = env.run("exit 127", temp_dir.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("127"));
        assert!(message.contains("command not found"));
    }

    #[test]
    fn test_exit_messages() {
        assert_eq!(exit_message(2), "misuse of shell built-ins");
        assert_eq!(exit_message(130), "script terminated by Control-C");
        assert_eq!(exit_message(42), "unknown error");
    }

    #[test]
    fn test_wait_for_target() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("out.txt");
        assert!(matches!(
            wait_for_target(&target, 2, Duration::from_millis(10)),
            Err(Error::TargetNotFound(_))
        ));

        std::fs::write(&target, "ok").unwrap();
        wait_for_target(&target, 2, Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn test_wait_for_late_target() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("late.txt");
        let writer_target = target.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            std::fs::write(writer_target, "ok").unwrap();
        });

        wait_for_target(&target, 50, Duration::from_millis(20)).unwrap();
        writer.join().unwrap();
    }
}
