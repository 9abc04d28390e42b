//! Docker backend — drives the `docker` CLI as a subprocess.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ContainerInfo, ContainerRuntime, ListScope};

/// Container runtime backed by the `docker` command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    /// Path or name of the docker binary.
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
}

impl DockerCli {
    /// Use a specific docker binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run `docker <args>` and return its stdout.
    async fn docker(&self, args: &[&str]) -> RuntimeResult<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        trace!(%command, "running docker");

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list(&self, scope: ListScope) -> RuntimeResult<Vec<ContainerInfo>> {
        let mut args = vec!["ps", "--no-trunc", "--format", "{{json .}}"];
        if scope == ListScope::All {
            args.push("--all");
        }
        let stdout = self.docker(&args).await?;
        parse_ps(&stdout)
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        match self.docker(&["image", "inspect", "--format", "{{.Id}}", image]).await {
            Ok(_) => Ok(true),
            Err(RuntimeError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        self.docker(&["pull", "--quiet", image]).await?;
        debug!(%image, "image pulled");
        Ok(())
    }

    async fn run(&self, name: &str, image: &str) -> RuntimeResult<()> {
        let id = self.docker(&["run", "--detach", "--name", name, image]).await?;
        debug!(%name, %image, container_id = %id.trim(), "container started");
        Ok(())
    }

    async fn stop(&self, identity: &str) -> RuntimeResult<()> {
        self.docker(&["stop", identity]).await?;
        Ok(())
    }

    async fn remove(&self, identity: &str) -> RuntimeResult<()> {
        self.docker(&["rm", "--force", identity]).await?;
        Ok(())
    }

    async fn inspect_ip(&self, identity: &str) -> RuntimeResult<Option<String>> {
        let stdout = self
            .docker(&[
                "inspect",
                "--format",
                "{{range .NetworkSettings.Networks}}{{.IPAddress}} {{end}}",
                identity,
            ])
            .await?;
        Ok(stdout.split_whitespace().next().map(str::to_string))
    }
}

fn parse_ps(stdout: &str) -> RuntimeResult<Vec<ContainerInfo>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let entry: PsEntry = serde_json::from_str(line)
                .map_err(|e| RuntimeError::Parse(format!("{e}: {line}")))?;
            // A container may carry several comma-separated names; the
            // first is the one it was created with.
            let identity = entry
                .names
                .split(',')
                .next()
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string();
            Ok(ContainerInfo {
                identity,
                id: entry.id,
                image: entry.image,
                state: entry.state,
                uptime: entry.status,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ps_lines() {
        let out = concat!(
            r#"{"Command":"\"nginx\"","ID":"3f2a9c1b7d4e","Image":"nginx:alpine","Names":"web-abcdefghijklmnopqrst","State":"running","Status":"Up 5 minutes"}"#,
            "\n",
            r#"{"Image":"redis","Names":"/cache-abcdefghijklmnopqrst,alias","State":"exited","Status":"Exited (0) 1 hour ago"}"#,
            "\n\n",
        );
        let containers = parse_ps(out).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].identity, "web-abcdefghijklmnopqrst");
        assert_eq!(containers[0].id, "3f2a9c1b7d4e");
        assert!(containers[1].id.is_empty());
        assert!(containers[0].is_running());
        assert_eq!(containers[0].uptime, "Up 5 minutes");
        assert_eq!(containers[1].identity, "cache-abcdefghijklmnopqrst");
        assert!(!containers[1].is_running());
    }

    #[test]
    fn parse_ps_rejects_garbage() {
        assert!(matches!(parse_ps("not json"), Err(RuntimeError::Parse(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let cli = DockerCli::new("/nonexistent/docker-binary");
        let err = cli.list(ListScope::All).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }
}
