//! Thin wrapper over the docker CLI for service containers.

use tokio::process::Command;

use crate::error::PipelineError;
use crate::services::ServiceSpec;

/// Arguments for `docker run` on one service. The port is published on
/// the loopback interface only.
pub fn run_args(spec: &ServiceSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.container_name.clone(),
        "-p".to_string(),
        format!("127.0.0.1:{}:{}", spec.host_port, spec.kind.container_port()),
    ];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

/// Arguments for `docker rm -f` on one container.
pub fn rm_args(container_name: &str) -> Vec<String> {
    vec![
        "rm".to_string(),
        "-f".to_string(),
        container_name.to_string(),
    ]
}

async fn invoke(bin: &str, args: &[String]) -> Result<std::process::Output, PipelineError> {
    Command::new(bin)
        .args(args)
        .output()
        .await
        .map_err(|e| PipelineError::Process(format!("failed to run {bin}: {e}")))
}

/// Start a service container detached. Returns the container id.
pub async fn run_detached(bin: &str, spec: &ServiceSpec) -> Result<String, PipelineError> {
    let output = invoke(bin, &run_args(spec)).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Service(format!(
            "docker run {} failed: {}",
            spec.container_name,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Force-remove a container. A container that does not exist is fine,
/// only a docker binary that cannot be spawned is an error.
pub async fn remove(bin: &str, container_name: &str) -> Result<(), PipelineError> {
    let output = invoke(bin, &rm_args(container_name)).await?;
    if !output.status.success() {
        tracing::debug!(
            container = container_name,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "docker rm reported failure"
        );
    }
    Ok(())
}
