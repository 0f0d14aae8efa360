//! Consumer identity used to match migration rules.

use serde::{Deserialize, Serialize};

/// The remote service a consumer calls, plus the application it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerIdentity {
    /// RPC interface name.
    pub interface: String,
    /// Service group, if any.
    #[serde(default)]
    pub group: Option<String>,
    /// Service version, if any.
    #[serde(default)]
    pub version: Option<String>,
    /// Consuming application name.
    pub application: String,
}

impl ConsumerIdentity {
    pub fn new(interface: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            group: None,
            version: None,
            application: application.into(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into()).filter(|g: &String| !g.is_empty());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into()).filter(|v: &String| !v.is_empty());
        self
    }

    /// Full service key: `group/interface:version`, omitting absent parts.
    pub fn service_key(&self) -> String {
        let mut key = String::new();
        if let Some(group) = &self.group {
            key.push_str(group);
            key.push('/');
        }
        key.push_str(&self.interface);
        if let Some(version) = &self.version {
            key.push(':');
            key.push_str(version);
        }
        key
    }

    /// Short form used in log lines: `interface:version`.
    pub fn display_service_key(&self) -> String {
        match &self.version {
            Some(version) => format!("{}:{}", self.interface, version),
            None => self.interface.clone(),
        }
    }
}

impl std::fmt::Display for ConsumerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.service_key(), self.application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_key_formats() {
        let bare = ConsumerIdentity::new("demo.Greeter", "shop");
        assert_eq!(bare.service_key(), "demo.Greeter");
        assert_eq!(bare.display_service_key(), "demo.Greeter");

        let full = bare.clone().with_group("blue").with_version("1.0.0");
        assert_eq!(full.service_key(), "blue/demo.Greeter:1.0.0");
        assert_eq!(full.display_service_key(), "demo.Greeter:1.0.0");
        assert_eq!(full.to_string(), "blue/demo.Greeter:1.0.0@shop");
    }

    #[test]
    fn empty_group_is_absent() {
        let id = ConsumerIdentity::new("demo.Greeter", "shop").with_group("");
        assert_eq!(id.group, None);
    }
}
