//! Tarn CLI - Command line interface
//!
//! `tarn run [FILE]` 执行源文件（省略时读取 `tarn.json` 的 entry），
//! `tarn check [FILE]` 只编译，`tarn repl` 启动交互式会话。

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

mod config;
mod logging;
mod report;

use crate::config::{log_level, LogConfig, PROJECT_FILE};
use crate::logging::LogFormat;
use crate::report::{numbered_source, print_error_with_source};
use tarn_api::{
    compile_with_config, init_config, run, ApiError, ProjectConfig, RunConfig, Session, Value,
};
use tarn_core::kit::lexer::split_lines;

const TARGET: &str = "tarn::cli";

/// CLI 错误
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[derive(Parser)]
#[command(name = "tarn", about = "Tarn - a stack-based concatenative language", version)]
struct Cli {
    /// Global log level: trace, debug, info, warn, error
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Per-phase log level, e.g. `vm=trace` (repeatable)
    #[arg(long = "log", global = true, value_name = "PHASE=LEVEL")]
    log_phase: Vec<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and run a source file
    Run {
        /// Source file (default: entry of ./tarn.json)
        file: Option<PathBuf>,
        /// Print the compiled operation sequence
        #[arg(long)]
        dump_ops: bool,
        /// Echo the source before running
        #[arg(long)]
        show_source: bool,
    },
    /// Compile a source file without running it
    Check {
        /// Source file (default: entry of ./tarn.json)
        file: Option<PathBuf>,
        /// Print the compiled operation sequence
        #[arg(long)]
        dump_ops: bool,
        /// Report errors as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session
    Repl {
        /// Print the operations compiled for each input
        #[arg(long)]
        dump_ops: bool,
    },
}

/// 一次调用要处理的源码与来自项目文件的设置
struct Job {
    path: PathBuf,
    source: String,
    project: Option<ProjectConfig>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = real_main(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn real_main(cli: Cli) -> Result<(), CliError> {
    let project = match &cli.command {
        Command::Run { file: None, .. } | Command::Check { file: None, .. } => {
            Some(config::read_project(Path::new(PROJECT_FILE))?)
        }
        _ => None,
    };

    let log_config = build_log_config(&cli, project.as_ref())?;
    logging::init_with_file(&log_config, cli.log_format, cli.log_file.as_deref())?;
    let logger = logging::engine_logger(&log_config);

    let mut run_config = RunConfig {
        logger,
        ..RunConfig::default()
    };
    if let Some(p) = &project {
        run_config.compiler = p.compiler.clone();
        run_config.limits = p.limits.clone();
    }

    match cli.command {
        Command::Run {
            file,
            dump_ops,
            show_source,
        } => {
            let job = load_job(file, project)?;
            let (compile_only, show_source) = match &job.project {
                Some(p) => (p.compile_only, show_source || p.show_source),
                None => (false, show_source),
            };
            run_config.dump_ops = dump_ops || job.project.as_ref().is_some_and(|p| p.dump_ops);
            init_config(run_config.clone());
            tracing::info!(target: TARGET, file = %job.path.display(), "running");

            if show_source {
                println!("[Source]");
                print!("{}", numbered_source(&job.source));
                println!("[Execution Result]");
            }
            if compile_only {
                handle_check(&job.source, &run_config, false);
            } else {
                handle_run(&job.source, &run_config);
            }
        }
        Command::Check {
            file,
            dump_ops,
            json,
        } => {
            let job = load_job(file, project)?;
            run_config.dump_ops = dump_ops;
            init_config(run_config.clone());
            tracing::info!(target: TARGET, file = %job.path.display(), "checking");
            handle_check(&job.source, &run_config, json);
        }
        Command::Repl { dump_ops } => {
            run_config.dump_ops = dump_ops;
            init_config(run_config.clone());
            repl(&run_config)?;
        }
    }
    Ok(())
}

fn build_log_config(cli: &Cli, project: Option<&ProjectConfig>) -> Result<LogConfig, CliError> {
    let mut log_config = LogConfig::default();
    if let Some(level) = project.and_then(|p| p.log_level) {
        log_config.global = log_level(level);
    }
    if let Some(level) = &cli.log_level {
        log_config.global = level
            .parse()
            .map_err(|e: tarn_log::Error| CliError::Config(e.to_string()))?;
    }
    for directive in &cli.log_phase {
        log_config.apply_override(directive)?;
    }
    Ok(log_config)
}

/// 显式文件优先；否则使用项目文件的 entry
fn load_job(file: Option<PathBuf>, project: Option<ProjectConfig>) -> Result<Job, CliError> {
    let path = match (&file, &project) {
        (Some(f), _) => f.clone(),
        (None, Some(p)) => config::resolve_entry(Path::new(PROJECT_FILE), &p.entry),
        (None, None) => return Err(CliError::Config("no source file given".to_string())),
    };
    let source = std::fs::read_to_string(&path).map_err(|source| CliError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(Job {
        path,
        source,
        project: if file.is_some() { None } else { project },
    })
}

fn print_ops(ops: &[String]) {
    println!("[Operations]");
    for (pc, op) in ops.iter().enumerate() {
        println!("{pc:5}  {op}");
    }
}

fn print_stack(stack: &[Value]) {
    if stack.is_empty() {
        return;
    }
    let items: Vec<String> = stack.iter().map(Value::dump).collect();
    println!("{}", items.join(" "));
}

fn fail(e: &ApiError, source: &str, json: bool) -> ! {
    if json {
        println!("{}", e.to_report().to_json());
    } else {
        print_error_with_source(e, source);
    }
    process::exit(1);
}

fn handle_check(source: &str, config: &RunConfig, json: bool) {
    match compile_with_config(source, config) {
        Ok(output) => {
            if config.dump_ops {
                print_ops(&output.ops);
            }
            if json {
                let ok = serde_json::json!({ "ok": true, "ops": output.ops.len() });
                println!("{ok}");
            } else {
                println!("ok: {} operations", output.ops.len());
            }
        }
        Err(e) => fail(&e, source, json),
    }
}

fn handle_run(source: &str, config: &RunConfig) {
    match run(source, config) {
        Ok(output) => {
            if let Some(ops) = &output.ops {
                print_ops(ops);
            }
            print_stack(&output.stack);
        }
        Err(e) => fail(&e, source, false),
    }
}

// ==================== REPL ====================

/// 栈顶的值及其类型名
fn describe_top(stack: &[Value]) -> Option<String> {
    stack
        .last()
        .map(|top| format!("{} : {}", top.dump(), top.type_name()))
}

fn eval_group(session: &mut Session, group: &str) {
    match session.eval(group) {
        Ok(stack) => {
            if let Some(line) = describe_top(stack) {
                println!("{line}");
            }
        }
        Err(e) => print_error_with_source(&e, group),
    }
}

/// 读到空行为止，把累积的输入作为一组编译执行
fn repl(config: &RunConfig) -> Result<(), CliError> {
    let mut session = Session::new(config);
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();

    if !interactive {
        let mut input = String::new();
        stdin
            .lock()
            .read_to_string(&mut input)
            .map_err(|source| CliError::Io {
                path: PathBuf::from("<stdin>"),
                source,
            })?;
        for group in split_lines(&input) {
            eval_group(&mut session, &group);
        }
        return Ok(());
    }

    println!("Tarn REPL. A blank line runs the input; Ctrl-D exits.");
    let mut buffer = String::new();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", if buffer.is_empty() { "> " } else { "| " });
        let _ = io::stdout().flush();
        let Some(line) = lines.next() else { break };
        let line = line.map_err(|source| CliError::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        if !line.trim().is_empty() {
            buffer.push_str(&line);
            buffer.push('\n');
            continue;
        }
        if !buffer.is_empty() {
            eval_group(&mut session, &buffer);
            buffer.clear();
        }
    }
    if !buffer.trim().is_empty() {
        eval_group(&mut session, &buffer);
    }
    println!();
    Ok(())
}
