use std::{path::Path, process::ExitCode};

use {
    anyhow::{Context, Result, bail},
    sandboxed_engine::{CommandResult, Language, SandboxEngine, SandboxOption},
};

pub fn languages() {
    println!("{:<10} IMAGE", "LANGUAGE");
    for lang in Language::ALL {
        println!("{:<10} {}", lang.as_str(), lang.image());
    }
}

pub fn read_source(code: Option<String>, file: Option<&Path>) -> Result<String> {
    match (code, file) {
        (Some(code), _) => Ok(code),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        (None, None) => bail!("either --code or --file is required"),
    }
}

/// Process exit status mirroring the command's exit code.
fn exit_status(result: &CommandResult) -> u8 {
    u8::try_from(result.exit_code).unwrap_or(1)
}

fn print_result(result: &CommandResult) {
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
}

pub async fn run(
    engine: &SandboxEngine,
    language: &str,
    source: &str,
    namespace: Option<String>,
) -> Result<ExitCode> {
    let options: Vec<SandboxOption> = namespace.into_iter().map(SandboxOption::Namespace).collect();
    let result = engine.run_oneshot(language, source, &options).await?;
    print_result(&result);
    Ok(ExitCode::from(exit_status(&result)))
}

pub async fn exec(
    engine: &SandboxEngine,
    name: &str,
    namespace: Option<&str>,
    command: &[String],
) -> Result<ExitCode> {
    let sandbox = engine.attach(name, namespace).await?;
    let result = sandbox.run(&command.join(" ")).await?;
    print_result(&result);
    Ok(ExitCode::from(exit_status(&result)))
}

pub async fn destroy(
    engine: &SandboxEngine,
    name: &str,
    namespace: Option<&str>,
) -> Result<ExitCode> {
    engine.destroy(name, namespace).await?;
    println!("Destroyed: {name}");
    Ok(ExitCode::SUCCESS)
}

pub async fn pods(engine: &SandboxEngine, namespace: Option<&str>) -> Result<ExitCode> {
    let pods = engine.list_pods(namespace).await?;
    if pods.is_empty() {
        println!("No sandbox pods found.");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{:<40} {:<10} {:<6} IMAGE", "NAME", "PHASE", "READY");
    for pod in &pods {
        println!(
            "{:<40} {:<10} {:<6} {}",
            pod.name,
            pod.phase.to_string(),
            pod.ready,
            pod.image.as_deref().unwrap_or("-")
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn logs(engine: &SandboxEngine, name: &str, namespace: Option<&str>) -> Result<ExitCode> {
    let sandbox = engine.attach(name, namespace).await?;
    print!("{}", sandbox.logs().await?);
    Ok(ExitCode::SUCCESS)
}
