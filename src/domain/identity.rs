//! Request identity: the per-device header values every basket call must carry.
//!
//! Values are harvested passively from traffic the host application already sends
//! ([`IdentityCapture`]), then frozen into a [`RequestIdentity`] snapshot for a run.
//! Store, tenant and operating company fall back to defaults; device and workstation
//! id never do.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CaddieError, Result};

pub const HEADER_DEVICE_ID: &str = "kits-device-id";
pub const HEADER_WORKSTATION_ID: &str = "kits-workstation-id";
pub const HEADER_STORE_CODE: &str = "kits-store-code";
pub const HEADER_TENANT_ID: &str = "kits-tenant-id";
pub const HEADER_OPERATING_COMPANY: &str = "kits-operating-company";

/// Identity values as captured so far. Any field may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub device_id: Option<String>,
    pub workstation_id: Option<String>,
    pub store_code: Option<String>,
    pub tenant_id: Option<String>,
    pub operating_company: Option<String>,
    /// Session credential blob, sent verbatim as the `Cookie` header
    #[serde(skip_serializing)]
    pub session: Option<String>,
}

/// Fallbacks for the codes that have a safe default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityDefaults {
    pub store_code: String,
    pub tenant_id: String,
    pub operating_company: String,
}

impl Default for IdentityDefaults {
    fn default() -> Self {
        Self {
            store_code: "1502".to_string(),
            tenant_id: "CAFR".to_string(),
            operating_company: "CF01".to_string(),
        }
    }
}

/// Identity with every header value present, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub device_id: String,
    pub workstation_id: String,
    pub store_code: String,
    pub tenant_id: String,
    pub operating_company: String,
    pub session: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RequestIdentity {
    /// Fill in defaults and check the values that have none.
    ///
    /// # Errors
    /// Returns [`CaddieError::IdentityMissing`] naming every absent or blank
    /// device/workstation header.
    pub fn resolve(&self, defaults: &IdentityDefaults) -> Result<ResolvedIdentity> {
        let device_id = present(&self.device_id);
        let workstation_id = present(&self.workstation_id);

        let (Some(device_id), Some(workstation_id)) = (device_id, workstation_id) else {
            let mut missing = Vec::new();
            if device_id.is_none() {
                missing.push(HEADER_DEVICE_ID);
            }
            if workstation_id.is_none() {
                missing.push(HEADER_WORKSTATION_ID);
            }
            return Err(CaddieError::IdentityMissing(missing));
        };

        let or_default = |value: &Option<String>, fallback: &str| {
            present(value).unwrap_or(fallback).to_string()
        };

        Ok(ResolvedIdentity {
            device_id: device_id.to_string(),
            workstation_id: workstation_id.to_string(),
            store_code: or_default(&self.store_code, &defaults.store_code),
            tenant_id: or_default(&self.tenant_id, &defaults.tenant_id),
            operating_company: or_default(&self.operating_company, &defaults.operating_company),
            session: present(&self.session).map(str::to_string),
        })
    }

    /// Whether both values without a fallback have been seen.
    pub fn is_ready(&self) -> bool {
        present(&self.device_id).is_some() && present(&self.workstation_id).is_some()
    }

    /// Record one observed header. Unrelated headers are ignored.
    ///
    /// Returns true if the header was one of the five identity keys.
    pub fn observe(&mut self, key: &str, value: &str) -> bool {
        let slot = match key.trim().to_ascii_lowercase().as_str() {
            HEADER_DEVICE_ID => &mut self.device_id,
            HEADER_WORKSTATION_ID => &mut self.workstation_id,
            HEADER_STORE_CODE => &mut self.store_code,
            HEADER_TENANT_ID => &mut self.tenant_id,
            HEADER_OPERATING_COMPANY => &mut self.operating_company,
            _ => return false,
        };
        *slot = Some(value.trim().to_string());
        true
    }
}

impl ResolvedIdentity {
    /// Per-device headers, in the order they are sent.
    pub fn headers(&self) -> [(&'static str, &str); 5] {
        [
            (HEADER_DEVICE_ID, self.device_id.as_str()),
            (HEADER_WORKSTATION_ID, self.workstation_id.as_str()),
            (HEADER_STORE_CODE, self.store_code.as_str()),
            (HEADER_TENANT_ID, self.tenant_id.as_str()),
            (HEADER_OPERATING_COMPANY, self.operating_company.as_str()),
        ]
    }
}

/// Fixed headers identifying the client application to the basket service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProfile {
    pub app_version: String,
    pub application_name: String,
    pub device_type: String,
    pub process_name: String,
    pub release_version: String,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            app_version: "2.0.0".to_string(),
            application_name: "DigitalColleague".to_string(),
            device_type: "desktop".to_string(),
            process_name: "Default".to_string(),
            release_version: "CHG0175940".to_string(),
        }
    }
}

impl ClientProfile {
    pub fn headers(&self) -> [(&'static str, &str); 5] {
        [
            ("kits-app-version", self.app_version.as_str()),
            ("kits-application-name", self.application_name.as_str()),
            ("kits-device-type", self.device_type.as_str()),
            ("kits-process-name", self.process_name.as_str()),
            ("kits-release-version", self.release_version.as_str()),
        ]
    }
}

/// Shared, passively updated identity store.
///
/// Observers write into it as headers go by. A run only ever reads a
/// [`snapshot`](IdentityCapture::snapshot).
#[derive(Debug, Clone, Default)]
pub struct IdentityCapture {
    inner: Arc<RwLock<RequestIdentity>>,
}

impl IdentityCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one header key/value pair, keeping the latest value per key.
    pub fn observe(&self, key: &str, value: &str) -> bool {
        let captured = self.inner.write().observe(key, value);
        if captured {
            tracing::debug!(header = %key.trim().to_ascii_lowercase(), "Captured identity header");
        }
        captured
    }

    /// Record every pair from an iterator of headers.
    pub fn observe_all<'a, I>(&self, headers: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        headers
            .into_iter()
            .filter(|(key, value)| self.observe(key, value))
            .count()
    }

    /// Feed a raw header dump, one `Name: value` per line, as copied from browser tools.
    ///
    /// Lines without a colon are ignored. Returns the number of identity headers captured.
    pub fn observe_dump(&self, dump: &str) -> usize {
        self.observe_all(dump.lines().filter_map(|line| line.split_once(':')))
    }

    /// Set the session credential attached to outgoing requests.
    pub fn set_session(&self, session: impl Into<String>) {
        self.inner.write().session = Some(session.into());
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().is_ready()
    }

    /// Copy of the identity as captured right now.
    pub fn snapshot(&self) -> RequestIdentity {
        self.inner.read().clone()
    }
}
