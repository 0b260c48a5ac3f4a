//! Job-kind shortcuts
//!
//! Short forms like `type: lxc_start` on a `proxmox` job expand into the
//! explicit parameters the executor expects (`type`, `api_command`, ...).
//! The table is applied once per job, before any placeholder is resolved.

use serde_json::{Map, Value};

use crate::domain::job::JobDefinition;

/// One entry of the shortcut table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortcut {
    pub executor: &'static str,
    pub kind: &'static str,
    /// Guest type injected as `type` (`lxc` or `qemu`)
    pub guest_type: &'static str,
    /// API sub-path injected as `api_command`
    pub api_command: &'static str,
    /// Whether `params` is moved to `api_params`
    pub takes_params: bool,
    /// Whether `list_mode: true` is injected
    pub list_mode: bool,
}

const fn proxmox(
    kind: &'static str,
    guest_type: &'static str,
    api_command: &'static str,
    takes_params: bool,
) -> Shortcut {
    Shortcut {
        executor: "proxmox",
        kind,
        guest_type,
        api_command,
        takes_params,
        list_mode: false,
    }
}

const fn proxmox_list(kind: &'static str, guest_type: &'static str) -> Shortcut {
    Shortcut {
        executor: "proxmox",
        kind,
        guest_type,
        api_command: "",
        takes_params: false,
        list_mode: true,
    }
}

/// Every known shortcut, keyed by `(executor, kind)`
pub static SHORTCUTS: &[Shortcut] = &[
    proxmox("lxc_create", "lxc", "create", true),
    proxmox("kvm_create", "qemu", "create", true),
    proxmox("lxc_start", "lxc", "status/start", false),
    proxmox("kvm_start", "qemu", "status/start", false),
    proxmox("lxc_stop", "lxc", "status/stop", false),
    proxmox("kvm_stop", "qemu", "status/stop", false),
    proxmox("lxc_delete", "lxc", "delete", false),
    proxmox("kvm_delete", "qemu", "delete", false),
    proxmox("lxc_snapshot", "lxc", "snapshot", true),
    proxmox("kvm_snapshot", "qemu", "snapshot", true),
    proxmox("lxc_status", "lxc", "status/current", false),
    proxmox("kvm_status", "qemu", "status/current", false),
    proxmox("lxc_config", "lxc", "config", false),
    proxmox("kvm_config", "qemu", "config", false),
    proxmox("lxc_agent_exec", "lxc", "agent/exec", true),
    proxmox("kvm_agent_exec", "qemu", "agent/exec", true),
    proxmox("lxc_vncproxy", "lxc", "vncproxy", false),
    proxmox("kvm_vncproxy", "qemu", "vncproxy", false),
    proxmox("lxc_migrate", "lxc", "migrate", true),
    proxmox("kvm_migrate", "qemu", "migrate", true),
    proxmox("lxc_clone", "lxc", "clone", true),
    proxmox("kvm_clone", "qemu", "clone", true),
    proxmox("lxc_resize", "lxc", "resize", true),
    proxmox("kvm_resize", "qemu", "resize", true),
    proxmox("lxc_firewall", "lxc", "firewall", false),
    proxmox("kvm_firewall", "qemu", "firewall", false),
    proxmox("lxc_metrics", "lxc", "rrddata", false),
    proxmox("kvm_metrics", "qemu", "rrddata", false),
    proxmox_list("lxc_list", "lxc"),
    proxmox_list("kvm_list", "qemu"),
];

/// Look up the shortcut for an executor and job kind
pub fn find(executor: &str, kind: &str) -> Option<&'static Shortcut> {
    SHORTCUTS
        .iter()
        .find(|s| s.executor == executor && s.kind == kind)
}

impl Shortcut {
    /// Inject this shortcut's parameters into a product bag
    pub fn apply(&self, product: &mut Map<String, Value>) {
        product.insert("type".into(), Value::String(self.guest_type.into()));
        product.insert(
            "api_command".into(),
            Value::String(self.api_command.into()),
        );
        if self.takes_params {
            if let Some(params) = product.remove("params") {
                product.insert("api_params".into(), params);
            }
        }
        if self.list_mode {
            product.insert("list_mode".into(), Value::Bool(true));
        }
    }
}

/// Expand the job's kind if it names a shortcut; returns whether one applied
pub fn apply_shortcut(job: &mut JobDefinition) -> bool {
    match find(&job.executor, &job.kind) {
        Some(shortcut) => {
            shortcut.apply(&mut job.product);
            true
        }
        None => false,
    }
}
