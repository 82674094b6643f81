//! Pre-start package installation.
//!
//! Transforms routinely shell out to external tooling (FFmpeg, Python audio
//! stacks); the container declares what it needs through `PACKAGES` (runtime
//! packages, installed with pip) and `OS_PACKAGES` (Alpine packages,
//! installed with apk). Both are comma-separated lists and both abort the
//! bootstrap on the first failure.

use std::process::Command;

use tracing::info;

use crate::bootstrap::{BootstrapError, BootstrapResult};

/// Environment variable listing runtime packages.
pub const PACKAGES: &str = "PACKAGES";

/// Environment variable listing OS packages.
pub const OS_PACKAGES: &str = "OS_PACKAGES";

/// Installs both package lists from the environment, if declared.
pub fn install_from_env() -> BootstrapResult<()> {
    let packages = std::env::var(PACKAGES).unwrap_or_default();
    if !packages.trim().is_empty() {
        info!(packages = %packages, "Installing runtime packages");
        install_packages(&packages)?;
    }
    let os_packages = std::env::var(OS_PACKAGES).unwrap_or_default();
    if !os_packages.trim().is_empty() {
        info!(packages = %os_packages, "Installing OS packages");
        install_os_packages(&os_packages)?;
    }
    Ok(())
}

/// Installs runtime packages one at a time via pip.
pub fn install_packages(list: &str) -> BootstrapResult<()> {
    for package in split_list(list) {
        run_installer("pip3", &["install", package])?;
    }
    Ok(())
}

/// Installs OS packages in one apk invocation.
pub fn install_os_packages(list: &str) -> BootstrapResult<()> {
    let packages = split_list(list);
    if packages.is_empty() {
        return Ok(());
    }
    let mut args = vec!["add", "--no-cache"];
    args.extend(packages);
    run_installer("apk", &args)
}

fn run_installer(program: &str, args: &[&str]) -> BootstrapResult<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| BootstrapError::PackageInstall(format!("failed to run {program}: {e}")))?;
    if !status.success() {
        return Err(BootstrapError::PackageInstall(format!(
            "{program} {} exited with {status}",
            args.join(" "),
        )));
    }
    Ok(())
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("soundfile, ffmpeg ,"), vec!["soundfile", "ffmpeg"]);
        assert!(split_list("").is_empty());
        assert!(split_list(" , ,").is_empty());
    }

    #[test]
    fn test_empty_os_package_list_is_noop() {
        assert!(install_os_packages("  ,  ").is_ok());
    }
}
