use anyhow::{anyhow, Context};
use cargo_metadata::{Metadata, MetadataCommand};
use std::env;

fn main() -> anyhow::Result<()> {
    // Skip eBPF build if we're already building for the eBPF target
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default() == "bpf" {
        return Ok(());
    }

    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "linux" {
        println!("cargo:warning=eBPF compilation skipped: the probe only runs on Linux.");
        return Ok(());
    }

    // No bpf-linker on CI runners
    if env::var("CI").is_ok() {
        println!("cargo:warning=eBPF compilation skipped in CI. Use dedicated eBPF build job.");
        return Ok(());
    }

    // The probe crate is excluded from the workspace, so query its own manifest.
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let Metadata { packages, .. } = MetadataCommand::new()
        .manifest_path(format!("{}/oomkill-probes/Cargo.toml", manifest_dir))
        .no_deps()
        .exec()
        .context("MetadataCommand::exec")?;

    let ebpf_package = packages
        .into_iter()
        .find(|pkg| pkg.name == "oomkill-probes")
        .ok_or_else(|| anyhow!("oomkill-probes package not found"))?;

    let root_dir = ebpf_package
        .manifest_path
        .parent()
        .ok_or_else(|| anyhow!("oomkill-probes manifest has no parent directory"))?;
    aya_build::build_ebpf(
        [aya_build::Package {
            name: ebpf_package.name.as_str(),
            root_dir: root_dir.as_str(),
            ..Default::default()
        }],
        aya_build::Toolchain::default(),
    )?;

    let out_dir = env::var("OUT_DIR")?;
    let probe_path = format!("{}/oomkill", out_dir);
    if !std::path::Path::new(&probe_path).exists() {
        return Err(anyhow!(
            "eBPF probe compilation failed: {} not found",
            probe_path
        ));
    }

    Ok(())
}
