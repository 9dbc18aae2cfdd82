// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VM provisioning: XML definitions, disk overlays, cloud-init media.
//!
//! Per-VM on-disk artifacts live in the daemon workdir and are removed
//! when the VM is destroyed:
//! - `<workdir>/<name>-disk.qcow2`: copy-on-write overlay of the base image
//! - `<workdir>/<name>-cloud-init.iso`: first-boot configuration media
//! - `<workdir>/<name>-cloud-init/`: staging dir for the ISO contents

use crate::subprocess::{run_checked, GENISOIMAGE_TIMEOUT, QEMU_IMG_TIMEOUT};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use wso_core::net::{GATEWAY, PREFIX_LEN};

/// Errors from provisioning operations
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("disk overlay failed: {0}")]
    Disk(String),
    #[error("cloud-init media failed: {0}")]
    CloudInit(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inputs for a domain XML definition.
#[derive(Debug, Clone)]
pub struct DomainParams {
    pub name: String,
    pub cpus: u32,
    pub memory_kib: u64,
    pub emulator: PathBuf,
    pub disk_path: PathBuf,
    pub cloud_init_iso: PathBuf,
    pub network_name: String,
}

/// Inputs for the first-boot cloud-init media.
#[derive(Debug, Clone)]
pub struct CloudInitSpec {
    pub hostname: String,
    pub ip_address: Ipv4Addr,
    /// Contents of the operator's public key, installed for root.
    pub ssh_public_key: Option<String>,
}

/// Staged per-VM media, ready to be placed in a domain definition.
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    pub disk: PathBuf,
    pub iso: PathBuf,
}

/// Adapter for per-VM artifact provisioning.
#[async_trait]
pub trait Provisioner: Clone + Send + Sync + 'static {
    /// Stage a VM's disk overlay and cloud-init media.
    async fn prepare(
        &self,
        name: &str,
        image_path: &Path,
        spec: &CloudInitSpec,
    ) -> Result<PreparedMedia, ProvisionError>;

    /// Best-effort removal of a VM's on-disk artifacts.
    async fn cleanup(&self, name: &str);
}

/// Provisioner staging artifacts in the daemon workdir.
#[derive(Debug, Clone)]
pub struct WorkdirProvisioner {
    workdir: PathBuf,
}

impl WorkdirProvisioner {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

#[async_trait]
impl Provisioner for WorkdirProvisioner {
    async fn prepare(
        &self,
        name: &str,
        image_path: &Path,
        spec: &CloudInitSpec,
    ) -> Result<PreparedMedia, ProvisionError> {
        let disk = disk_path(&self.workdir, name);
        copy_base_disk(image_path, &disk).await?;
        let iso = build_cloud_init_iso(&self.workdir, name, spec).await?;
        Ok(PreparedMedia { disk, iso })
    }

    async fn cleanup(&self, name: &str) {
        remove_artifacts(&self.workdir, name).await;
    }
}

/// Per-VM disk overlay path.
pub fn disk_path(workdir: &Path, name: &str) -> PathBuf {
    workdir.join(format!("{name}-disk.qcow2"))
}

/// Per-VM cloud-init ISO path.
pub fn iso_path(workdir: &Path, name: &str) -> PathBuf {
    workdir.join(format!("{name}-cloud-init.iso"))
}

fn staging_dir(workdir: &Path, name: &str) -> PathBuf {
    workdir.join(format!("{name}-cloud-init"))
}

/// Render the KVM domain definition.
pub fn domain_xml(params: &DomainParams) -> String {
    format!(
        r#"<domain type='kvm'>
  <name>{name}</name>
  <memory unit='KiB'>{memory_kib}</memory>
  <vcpu>{cpus}</vcpu>
  <os>
    <type arch='x86_64'>hvm</type>
  </os>
  <clock sync='localtime'/>
  <devices>
    <emulator>{emulator}</emulator>
    <disk type='file' device='disk'>
      <driver name='qemu' type='qcow2'/>
      <source file='{disk}'/>
      <target dev='vda' bus='virtio'/>
    </disk>
    <disk type='file' device='cdrom'>
      <driver name='qemu' type='raw'/>
      <source file='{iso}'/>
      <target dev='hdc' bus='ide'/>
      <readonly/>
    </disk>
    <interface type='network'>
      <source network='{network}'/>
      <model type='virtio'/>
    </interface>
    <graphics type='vnc' port='-1'/>
  </devices>
</domain>
"#,
        name = params.name,
        memory_kib = params.memory_kib,
        cpus = params.cpus,
        emulator = params.emulator.display(),
        disk = params.disk_path.display(),
        iso = params.cloud_init_iso.display(),
        network = params.network_name,
    )
}

/// Render the shared NAT network definition.
pub fn network_xml(name: &str, bridge: &str) -> String {
    format!(
        r#"<network>
  <name>{name}</name>
  <forward mode='nat'>
    <nat>
      <port start='1024' end='65535'/>
    </nat>
  </forward>
  <bridge name='{bridge}' stp='on' delay='0'/>
  <ip address='{gateway}' netmask='255.255.255.0'/>
</network>
"#,
        gateway = GATEWAY,
    )
}

/// Create the per-VM copy-on-write overlay of the base image.
pub async fn copy_base_disk(base: &Path, dest: &Path) -> Result<(), ProvisionError> {
    let mut cmd = Command::new("qemu-img");
    cmd.arg("create")
        .arg("-f")
        .arg("qcow2")
        .arg("-b")
        .arg(base)
        .arg("-F")
        .arg("qcow2")
        .arg(dest);

    run_checked(cmd, QEMU_IMG_TIMEOUT, "qemu-img create")
        .await
        .map_err(ProvisionError::Disk)?;
    Ok(())
}

/// Build the cloud-init NoCloud ISO for a VM.
///
/// Writes `user-data` / `meta-data` / `network-config` to a staging dir,
/// then packs them with genisoimage under the `cidata` volume id.
pub async fn build_cloud_init_iso(
    workdir: &Path,
    name: &str,
    spec: &CloudInitSpec,
) -> Result<PathBuf, ProvisionError> {
    let staging = staging_dir(workdir, name);
    tokio::fs::create_dir_all(&staging).await?;

    tokio::fs::write(staging.join("user-data"), user_data(spec)).await?;
    tokio::fs::write(staging.join("meta-data"), meta_data(spec)).await?;
    tokio::fs::write(staging.join("network-config"), network_config(spec)).await?;

    let iso = iso_path(workdir, name);
    let mut cmd = Command::new("genisoimage");
    cmd.arg("-output")
        .arg(&iso)
        .arg("-volid")
        .arg("cidata")
        .arg("-joliet")
        .arg("-rock")
        .arg("user-data")
        .arg("meta-data")
        .arg("network-config")
        .current_dir(&staging);

    run_checked(cmd, GENISOIMAGE_TIMEOUT, "genisoimage")
        .await
        .map_err(ProvisionError::CloudInit)?;
    Ok(iso)
}

/// Remove a VM's on-disk artifacts. Best-effort: a VM being destroyed
/// must not be blocked by files that are already gone.
pub async fn remove_artifacts(workdir: &Path, name: &str) {
    for path in [disk_path(workdir, name), iso_path(workdir, name)] {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path = %path.display(), error = %e, "artifact removal skipped");
        }
    }
    let staging = staging_dir(workdir, name);
    if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
        tracing::debug!(path = %staging.display(), error = %e, "staging removal skipped");
    }
}

fn user_data(spec: &CloudInitSpec) -> String {
    let mut doc = format!("#cloud-config\nhostname: {}\n", spec.hostname);
    if let Some(key) = &spec.ssh_public_key {
        doc.push_str("disable_root: false\nssh_authorized_keys:\n");
        doc.push_str(&format!("  - {}\n", key.trim()));
    }
    doc
}

fn meta_data(spec: &CloudInitSpec) -> String {
    format!(
        "instance-id: {name}\nlocal-hostname: {name}\n",
        name = spec.hostname
    )
}

fn network_config(spec: &CloudInitSpec) -> String {
    format!(
        r#"version: 2
ethernets:
  eth0:
    addresses: [{ip}/{prefix}]
    gateway4: {gateway}
    nameservers:
      addresses: [1.1.1.1, 8.8.8.8]
"#,
        ip = spec.ip_address,
        prefix = PREFIX_LEN,
        gateway = GATEWAY,
    )
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{CloudInitSpec, PreparedMedia, Provisioner, ProvisionError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Recorded provisioner call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ProvisionCall {
        Prepare { name: String },
        Cleanup { name: String },
    }

    #[derive(Default)]
    struct FakeState {
        calls: Vec<ProvisionCall>,
        fail_prepare: bool,
    }

    /// Fake provisioner for testing. Stages nothing on disk.
    #[derive(Clone, Default)]
    pub struct FakeProvisioner {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeProvisioner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent prepare call fail
        pub fn fail_prepare(&self, fail: bool) {
            self.inner.lock().fail_prepare = fail;
        }

        /// Get all recorded calls
        pub fn calls(&self) -> Vec<ProvisionCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn prepare(
            &self,
            name: &str,
            _image_path: &Path,
            _spec: &CloudInitSpec,
        ) -> Result<PreparedMedia, ProvisionError> {
            let mut inner = self.inner.lock();
            inner.calls.push(ProvisionCall::Prepare {
                name: name.to_string(),
            });
            if inner.fail_prepare {
                return Err(ProvisionError::Disk(format!(
                    "injected prepare failure for {}",
                    name
                )));
            }
            Ok(PreparedMedia {
                disk: PathBuf::from(format!("/fake/{name}-disk.qcow2")),
                iso: PathBuf::from(format!("/fake/{name}-cloud-init.iso")),
            })
        }

        async fn cleanup(&self, name: &str) {
            self.inner.lock().calls.push(ProvisionCall::Cleanup {
                name: name.to_string(),
            });
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProvisioner, ProvisionCall};

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
