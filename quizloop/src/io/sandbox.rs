//! Restricted execution of generated code.
//!
//! The [`Sandbox`] trait is a capability boundary: code in, a single `result`
//! value (or a fault) out. [`PythonSandbox`] runs an isolated interpreter as a
//! child process whose builtins exclude file, eval and input access and whose
//! imports are limited to an allow-list.
//!
//! Before anything runs, the code is parsed and rejected if it names any
//! `_`-prefixed identifier or a frame attribute, so dunder introspection
//! cannot climb back to the real builtins. Imported modules are handed over
//! as namespaces without their private names or nested modules, and the real
//! import hook only lives in a closure.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

const RESULT_MARKER: &str = "__QUIZLOOP_RESULT__ ";

const PRELUDE: &str = r#"
def _main():
    import ast, builtins, json, sys, types

    allowed = frozenset(json.loads(sys.argv[1]))
    real_import = builtins.__import__
    frame_attrs = frozenset((
        "gi_frame", "gi_code", "cr_frame", "cr_code", "ag_frame", "ag_code",
        "f_back", "f_builtins", "f_code", "f_globals", "f_locals",
        "tb_frame", "tb_next",
    ))
    match_class = getattr(ast, "MatchClass", ())

    def identifiers(node):
        if isinstance(node, ast.Attribute):
            return (node.attr,)
        if isinstance(node, ast.Name):
            return (node.id,)
        if isinstance(node, ast.arg):
            return (node.arg,)
        if isinstance(node, ast.alias):
            return tuple(node.name.split(".")) + ((node.asname,) if node.asname else ())
        if isinstance(node, (ast.FunctionDef, ast.AsyncFunctionDef, ast.ClassDef)):
            return (node.name,)
        if isinstance(node, match_class):
            return tuple(node.kwd_attrs)
        return ()

    def check(tree):
        for node in ast.walk(tree):
            for name in identifiers(node):
                if name.startswith("_") or (isinstance(node, ast.Attribute) and name in frame_attrs):
                    raise SyntaxError("name '%s' is not allowed (line %s)" % (name, getattr(node, "lineno", "?")))

    def expose(module):
        return types.SimpleNamespace(**{
            key: value for key, value in vars(module).items()
            if not key.startswith("_") and not isinstance(value, types.ModuleType)
        })

    def guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
        if level != 0 or name.split(".")[0] not in allowed:
            raise ImportError("import of '%s' is not allowed" % name)
        return expose(real_import(name, globals, locals, fromlist, level))

    names = (
        "abs", "all", "any", "bool", "chr", "dict", "divmod", "enumerate", "filter",
        "float", "format", "frozenset", "int", "isinstance", "len", "list", "map",
        "max", "min", "ord", "pow", "print", "range", "repr", "reversed", "round",
        "set", "slice", "sorted", "str", "sum", "tuple", "zip", "Exception",
        "ValueError", "TypeError", "KeyError", "IndexError", "ZeroDivisionError",
    )
    safe = {n: getattr(builtins, n) for n in names}
    safe["__import__"] = guarded_import

    tree = ast.parse(sys.stdin.read(), "<generated>")
    check(tree)
    scope = {"__builtins__": safe, "__name__": "__quiz__"}
    exec(compile(tree, "<generated>", "exec"), scope)

    if "result" in scope:
        value = scope["result"]
        try:
            payload = json.dumps({"result": value})
        except (TypeError, ValueError):
            payload = json.dumps({"result": str(value)})
    else:
        payload = json.dumps({"missing": True})
    sys.stdout.write("\n__QUIZLOOP_RESULT__ " + payload + "\n")

_main()
"#;

/// Executes generated code and returns its `result` binding.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// `Ok(None)` when the code ran but never assigned `result`.
    async fn run(&self, code: &str) -> Result<Option<Value>>;
}

/// Sandbox backed by an isolated Python child process.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    python: String,
    timeout: Duration,
    output_limit_bytes: usize,
    allowed_imports: Vec<String>,
}

impl PythonSandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            python: config.python.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            allowed_imports: config.allowed_imports.clone(),
        }
    }

    fn command(&self) -> Result<Command> {
        let allowed = serde_json::to_string(&self.allowed_imports).context("encode allow-list")?;
        let mut cmd = Command::new(&self.python);
        cmd.arg("-I").arg("-c").arg(PRELUDE).arg(allowed);
        Ok(cmd)
    }
}

#[async_trait]
impl Sandbox for PythonSandbox {
    #[instrument(skip_all, fields(code_bytes = code.len(), timeout_secs = self.timeout.as_secs()))]
    async fn run(&self, code: &str) -> Result<Option<Value>> {
        let cmd = self.command()?;
        let input = code.as_bytes().to_vec();
        let timeout = self.timeout;
        let limit = self.output_limit_bytes;

        let output = tokio::task::spawn_blocking(move || {
            run_command_with_timeout(cmd, Some(&input), timeout, limit)
        })
        .await
        .context("join sandbox task")?
        .context("run sandbox")?;

        if output.timed_out {
            warn!("sandbox timed out");
            return Err(anyhow!("sandbox timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "sandbox exited with {:?}: {}",
                output.status.code(),
                last_lines(&output.stderr_text(), 5)
            ));
        }
        let value = parse_sandbox_stdout(&output.stdout_text())?;
        debug!(has_result = value.is_some(), "sandbox finished");
        Ok(value)
    }
}

/// Read the result marker line written by the prelude.
pub fn parse_sandbox_stdout(stdout: &str) -> Result<Option<Value>> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
        .ok_or_else(|| anyhow!("sandbox output has no result marker"))?;
    let payload: Value = serde_json::from_str(line).context("parse sandbox result")?;
    match payload.get("result") {
        Some(value) => Ok(Some(value.clone())),
        None => Ok(None),
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_result_marker_after_user_prints() {
        let stdout = "debug 1\ndebug 2\n\n__QUIZLOOP_RESULT__ {\"result\": 12345}\n";
        assert_eq!(parse_sandbox_stdout(stdout).expect("parse"), Some(json!(12345)));
    }

    #[test]
    fn missing_result_is_none() {
        let stdout = "__QUIZLOOP_RESULT__ {\"missing\": true}\n";
        assert_eq!(parse_sandbox_stdout(stdout).expect("parse"), None);
    }

    #[test]
    fn absent_marker_is_an_error() {
        assert!(parse_sandbox_stdout("just text").is_err());
    }

    #[test]
    fn last_lines_keeps_tail() {
        assert_eq!(last_lines("a\nb\nc", 2), "b\nc");
    }

    #[test]
    fn command_runs_isolated_with_allow_list() {
        let sandbox = PythonSandbox::new(&SandboxConfig {
            allowed_imports: vec!["math".to_string()],
            ..SandboxConfig::default()
        });
        let cmd = sandbox.command().expect("command");
        let args: Vec<_> = cmd.get_args().map(|arg| arg.to_string_lossy()).collect();
        assert_eq!(args[0], "-I");
        assert_eq!(args[1], "-c");
        assert!(args[2].contains("check(tree)"));
        assert_eq!(args[3], r#"["math"]"#);
    }

    #[tokio::test]
    #[ignore = "requires python3 on PATH"]
    async fn python_sandbox_rejects_introspection_escapes() {
        let sandbox = PythonSandbox::new(&SandboxConfig::default());

        for code in [
            "os = __import__.__globals__['_real_import']('os')\nresult = os.getcwd()",
            "result = ().__class__.__base__.__subclasses__()",
            "import json\nresult = json.codecs.open('/etc/hostname').read()",
            "import statistics\nresult = statistics.sys.modules['os'].getcwd()",
            "def g():\n    yield 1\nresult = str(g().gi_frame)",
            "from json import _default_encoder\nresult = 1",
        ] {
            let err = sandbox.run(code).await.expect_err(code);
            let message = err.to_string();
            assert!(
                message.contains("is not allowed") || message.contains("AttributeError"),
                "{code}: {message}"
            );
        }

        let value = sandbox
            .run("from fractions import Fraction\nimport json\nresult = json.loads(str(Fraction(6, 3)))")
            .await
            .expect("run");
        assert_eq!(value, Some(json!(2)));
    }

    #[tokio::test]
    #[ignore = "requires python3 on PATH"]
    async fn python_sandbox_runs_code_and_blocks_imports() {
        let sandbox = PythonSandbox::new(&SandboxConfig::default());

        let value = sandbox
            .run("import math\nresult = math.floor(2.7) + sum([1, 2])")
            .await
            .expect("run");
        assert_eq!(value, Some(json!(5)));

        assert!(sandbox.run("import os\nresult = 1").await.is_err());
        assert!(sandbox.run("result = open('/etc/passwd').read()").await.is_err());
        assert_eq!(sandbox.run("x = 1").await.expect("run"), None);
    }
}
