//! Platform-specific utilities
//!
//! Shell selection, opening URLs in the system browser and launching
//! applications differ per operating system. Everything that branches on
//! the target OS lives here so skills stay platform-neutral.

use std::io;
use std::process::Stdio;
use tracing::debug;

/// Human-readable name of the host operating system
pub fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "macOS",
        "linux" => "Linux",
        other => other,
    }
}

/// Build a command that runs `command` through the platform shell
///
/// `/bin/sh -c` on Unix, `cmd /C` on Windows.
#[cfg(unix)]
pub fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
pub fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Open `url` in the default browser
///
/// Returns once the opener has been spawned; the browser itself is not
/// awaited.
pub fn open_url(url: &str) -> io::Result<()> {
    spawn_reaped(opener_command(url))
}

/// Launch an application by name without waiting for it to exit
///
/// Must be called inside a Tokio runtime; the child is reaped by a
/// background task when it exits.
pub fn launch_application(name: &str) -> io::Result<()> {
    spawn_reaped(launcher_command(name))
}

fn spawn_reaped(cmd: std::process::Command) -> io::Result<()> {
    let mut child = tokio::process::Command::from(cmd).spawn()?;
    let pid = child.id();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(?pid, %status, "Launched process exited"),
            Err(e) => debug!(?pid, error = %e, "Failed to reap launched process"),
        }
    });
    Ok(())
}

#[cfg(target_os = "macos")]
fn opener_command(target: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("open");
    cmd.arg(target);
    detached(cmd)
}

#[cfg(windows)]
fn opener_command(target: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("cmd");
    cmd.args(["/C", "start", ""]).arg(target);
    detached(cmd)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn opener_command(target: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("xdg-open");
    cmd.arg(target);
    detached(cmd)
}

#[cfg(target_os = "macos")]
fn launcher_command(name: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("open");
    cmd.arg("-a").arg(name);
    detached(cmd)
}

#[cfg(windows)]
fn launcher_command(name: &str) -> std::process::Command {
    opener_command(name)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn launcher_command(name: &str) -> std::process::Command {
    detached(std::process::Command::new(name))
}

fn detached(mut cmd: std::process::Command) -> std::process::Command {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}
